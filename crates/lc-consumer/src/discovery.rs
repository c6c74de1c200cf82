//! Discovery, subscription and liveness of producers

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use lc_core::config::SubscriberConfig;
use lc_core::error::RegistryError;
use lc_core::transport::bind_random;
use lc_core::{
    Communicator, Dispatcher, Inbound, PeerIdentity, TaskOptions, TaskRegistry,
};
use lc_protocol::{InfoResponse, Message, MessageKind, PublishNotice, SubscribeResponse};

use crate::error::ConsumerError;
use crate::liveness::PeerLiveness;

/// State reachable from the message handlers
struct Peers {
    config: SubscriberConfig,
    registry: TaskRegistry<SocketAddr, PeerLiveness>,
    notices: mpsc::Sender<PublishNotice>,
    rediscover: Arc<AtomicBool>,
}

impl Peers {
    fn new(config: SubscriberConfig, notices: mpsc::Sender<PublishNotice>) -> Self {
        Self {
            config,
            registry: TaskRegistry::new(),
            notices,
            rediscover: Arc::new(AtomicBool::new(false)),
        }
    }

    fn task_options(&self) -> TaskOptions<SocketAddr> {
        let rediscover = self.rediscover.clone();
        TaskOptions::default().on_error(move |addr: &SocketAddr, e| {
            warn!("Lost producer {}: {}", addr, e);
            rediscover.store(true, Ordering::SeqCst);
        })
    }

    async fn handle_info_response(&self, inbound: Inbound, response: InfoResponse) {
        if !response.is_ok() {
            debug!(
                "Probe rejected by {}: {}",
                inbound.remote(),
                response.error_message
            );
            return;
        }
        if response.facility != self.config.facility {
            trace!(
                "Ignoring {} at {}",
                response.facility,
                inbound.remote()
            );
            return;
        }

        let request = self.config.credential.subscribe_request(&self.config.facility);
        if let Err(e) = inbound.reply(request).await {
            debug!("Subscribe to {} failed: {}", inbound.remote(), e);
        }
    }

    async fn handle_subscribe_response(&self, inbound: Inbound, response: SubscribeResponse) {
        let addr = inbound.remote();
        if !response.is_ok() {
            warn!("Subscription refused by {}: {}", addr, response.error_message);
            return;
        }

        if let Some(peer) = self.registry.get(&addr) {
            peer.refresh();
            return;
        }

        let peer = PeerLiveness::new(
            PeerIdentity::new(addr, self.config.facility.as_str()),
            inbound.link().clone(),
            &self.config.credential,
            self.config.heartbeat_interval,
            self.config.heartbeat_timeout,
        );

        match self.registry.register(addr, peer, self.task_options()).await {
            Ok(peer) => info!("Subscribed to {}", peer.peer()),
            Err(RegistryError::AlreadyRegistered(_)) => {
                // Lost the race against a concurrent response from the same peer
                if let Some(peer) = self.registry.get(&addr) {
                    peer.refresh();
                }
            }
            Err(e) => warn!("Cannot track {}: {}", addr, e),
        }
    }

    fn handle_publish(&self, inbound: Inbound, notice: PublishNotice) {
        let Some(peer) = self.registry.get(&inbound.remote()) else {
            trace!("Notice from untracked {}", inbound.remote());
            return;
        };
        peer.refresh();

        match self.notices.try_send(notice) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Notice queue full, dropping record from {}", inbound.remote());
            }
            Err(TrySendError::Closed(_)) => {
                trace!("Notice receiver gone");
            }
        }
    }

    fn dispatcher(self: &Arc<Self>) -> Dispatcher {
        let on_info = self.clone();
        let on_subscribe = self.clone();
        let on_publish = self.clone();

        Dispatcher::new()
            .on(MessageKind::InfoResponse, move |inbound, message| {
                let peers = on_info.clone();
                async move {
                    if let Message::InfoResponse(response) = message {
                        peers.handle_info_response(inbound, response).await;
                    }
                }
            })
            .on(MessageKind::SubscribeResponse, move |inbound, message| {
                let peers = on_subscribe.clone();
                async move {
                    if let Message::SubscribeResponse(response) = message {
                        peers.handle_subscribe_response(inbound, response).await;
                    }
                }
            })
            .on(MessageKind::PublishNotice, move |inbound, message| {
                let peers = on_publish.clone();
                async move {
                    if let Message::PublishNotice(notice) = message {
                        peers.handle_publish(inbound, notice);
                    }
                }
            })
            .accept(MessageKind::InfoRequest)
            .accept(MessageKind::SubscribeRequest)
    }
}

/// Finds producers of one facility and keeps their subscriptions alive
///
/// Received records are forwarded to the notice channel given at
/// construction.
pub struct DiscoveryManager {
    peers: Arc<Peers>,
    link: Arc<dyn Communicator>,
}

impl DiscoveryManager {
    /// Bind a random port of `config.bind_ports` and start receiving
    pub async fn bind(
        config: SubscriberConfig,
        notices: mpsc::Sender<PublishNotice>,
    ) -> Result<Self, ConsumerError> {
        config.validate()?;
        let peers = Arc::new(Peers::new(config, notices));

        let communicator = bind_random(
            peers.config.bind_ip,
            &peers.config.bind_ports,
            peers.config.bind_attempts,
            peers.dispatcher(),
            &peers.config.transport,
        )
        .await?;
        info!(
            "Subscriber for {} bound on {}",
            peers.config.facility,
            communicator.local_addr()
        );

        Ok(Self {
            peers,
            link: communicator,
        })
    }

    /// Manager sending through an existing communicator.
    ///
    /// Inbound messages must be routed to [`DiscoveryManager::dispatcher`].
    pub fn with_link(
        config: SubscriberConfig,
        link: Arc<dyn Communicator>,
        notices: mpsc::Sender<PublishNotice>,
    ) -> Result<Self, ConsumerError> {
        config.validate()?;
        Ok(Self {
            peers: Arc::new(Peers::new(config, notices)),
            link,
        })
    }

    /// Handlers for inbound messages
    pub fn dispatcher(&self) -> Dispatcher {
        self.peers.dispatcher()
    }

    /// Facility subscribed to
    pub fn facility(&self) -> &str {
        &self.peers.config.facility
    }

    /// Our own address
    pub fn local_addr(&self) -> SocketAddr {
        self.link.local_addr()
    }

    /// Addresses of the producers currently tracked
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.peers.registry.keys()
    }

    /// Liveness of the producer at `addr`
    pub fn peer(&self, addr: &SocketAddr) -> Option<Arc<PeerLiveness>> {
        self.peers.registry.get(addr)
    }

    /// Probe every untracked port of the discovery range. Returns the number
    /// of probes sent.
    pub async fn broadcast(&self) -> usize {
        let config = &self.peers.config;
        let probe: Message = config.credential.info_request().into();
        let mut sent = 0;

        for addr in config.discovery_ports.addrs(config.base_ip) {
            if self.peers.registry.contains(&addr) {
                continue;
            }
            match self.link.send(addr, &probe).await {
                Ok(()) => sent += 1,
                Err(e) => trace!("Probe to {} failed: {}", addr, e),
            }
        }

        trace!("Sent {} discovery probes", sent);
        sent
    }

    /// Run every liveness check once; if any producer was lost, probe
    /// again. Returns the number of producers lost.
    pub async fn check_peers(&self, cancel: &CancellationToken) -> usize {
        let failures = self.peers.registry.tick(cancel).await;

        if self.peers.rediscover.swap(false, Ordering::SeqCst) {
            debug!("Rediscovering after {} lost producer(s)", failures);
            self.broadcast().await;
        }

        failures
    }

    /// Probe and check until `cancel` fires, then drop every producer and
    /// close the communicator.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut discovery = tokio::time::interval(self.peers.config.discovery_interval);
        discovery.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = tokio::time::interval(self.peers.config.tick_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = discovery.tick() => {
                    self.broadcast().await;
                }
                _ = ticks.tick() => {
                    self.check_peers(&cancel).await;
                }
            }
        }

        self.peers.registry.clear().await;
        self.link.close().await;
        debug!("Subscriber for {} stopped", self.peers.config.facility);
    }
}
