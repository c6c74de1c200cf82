//! Producer/consumer integration tests
//!
//! Real distributors and a real discovery manager talking UDP on localhost.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

use lc_consumer::DiscoveryManager;
use lc_core::config::{DistributorConfig, SubscriberConfig};
use lc_core::{LogRecord, PortRange, Severity};
use lc_producer::Distributor;
use lc_protocol::PublishNotice;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Each test gets its own producer and consumer port blocks
static PORT_COUNTER: AtomicU16 = AtomicU16::new(0);

struct Ports {
    producers: PortRange,
    consumers: PortRange,
}

fn test_ports() -> Ports {
    let block = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
    Ports {
        producers: PortRange::new(43000 + block * 10, 10),
        consumers: PortRange::new(44000 + block * 50, 50),
    }
}

fn producer(facility: &str, ports: &Ports) -> Distributor {
    Distributor::start(DistributorConfig {
        facility: Some(facility.to_string()),
        listen_ip: LOCALHOST,
        listen_ports: ports.producers,
        ..Default::default()
    })
}

fn subscriber(facility: &str, ports: &Ports) -> SubscriberConfig {
    SubscriberConfig {
        facility: facility.to_string(),
        base_ip: LOCALHOST,
        discovery_ports: ports.producers,
        bind_ip: LOCALHOST,
        bind_ports: ports.consumers,
        discovery_interval: Duration::from_millis(100),
        tick_interval: Duration::from_millis(50),
        heartbeat_interval: Duration::from_millis(200),
        heartbeat_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

async fn wait_ready(distributor: &Distributor) -> SocketAddr {
    for _ in 0..200 {
        if let Some(addr) = distributor.local_addr() {
            return addr;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("distributor never became ready");
}

/// Publish until the consumer sees a record carrying `text`
async fn publish_until_received(
    distributor: &Distributor,
    rx: &mut mpsc::Receiver<PublishNotice>,
    text: &str,
) -> PublishNotice {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        let _ = distributor
            .publish(&LogRecord::new(Severity::Warning, text.to_string()))
            .await;
        if let Ok(Some(notice)) = timeout(Duration::from_millis(50), rx.recv()).await {
            if notice.message == text {
                return notice;
            }
        }
    }
    panic!("no record received within 10s");
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_records_flow_to_matching_subscriber_only() {
    let ports = test_ports();
    let billing = producer("billing", &ports);
    let inventory = producer("inventory", &ports);
    let billing_addr = wait_ready(&billing).await;
    wait_ready(&inventory).await;

    let (tx, mut rx) = mpsc::channel(64);
    let manager = Arc::new(
        DiscoveryManager::bind(subscriber("billing", &ports), tx)
            .await
            .unwrap(),
    );
    assert!(ports.consumers.contains(manager.local_addr().port()));

    let cancel = CancellationToken::new();
    let running = {
        let manager = manager.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { manager.run(cancel).await })
    };

    let notice = publish_until_received(&billing, &mut rx, "invoice 42 settled").await;
    assert_eq!(notice.message, "invoice 42 settled");
    assert_eq!(notice.facility, "billing");

    assert_eq!(manager.peers(), vec![billing_addr]);
    assert_eq!(billing.subscribers(), vec![manager.local_addr()]);
    assert!(inventory.subscribers().is_empty());

    cancel.cancel();
    running.await.unwrap();
    billing.shutdown().await;
    inventory.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_vanished_producer_is_dropped_and_replacement_found() {
    let ports = test_ports();
    let first = producer("billing", &ports);
    wait_ready(&first).await;

    let (tx, mut rx) = mpsc::channel(64);
    let manager = Arc::new(
        DiscoveryManager::bind(subscriber("billing", &ports), tx)
            .await
            .unwrap(),
    );
    let cancel = CancellationToken::new();
    let running = {
        let manager = manager.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { manager.run(cancel).await })
    };

    publish_until_received(&first, &mut rx, "before").await;
    first.shutdown().await;

    assert!(
        wait_until(|| manager.peers().is_empty()).await,
        "silent producer was never dropped"
    );

    // Rediscovery picks up a new producer in the same range
    let second = producer("billing", &ports);
    let second_addr = wait_ready(&second).await;
    let notice = publish_until_received(&second, &mut rx, "after").await;
    assert_eq!(notice.message, "after");
    assert_eq!(manager.peers(), vec![second_addr]);

    cancel.cancel();
    running.await.unwrap();
    second.shutdown().await;
}
