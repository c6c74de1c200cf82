//! logcast subscribe monitor
//!
//! Discovers the producers of one facility on a host and prints every log
//! record they publish.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lc_consumer::DiscoveryManager;
use lc_core::config::{self, LogcastConfig};
use lc_core::Severity;
use lc_protocol::PublishNotice;

#[derive(Parser)]
#[command(name = "lc-subscribe")]
#[command(about = "logcast monitor - subscribes to a facility's producers and prints their records")]
#[command(version)]
struct Args {
    /// Facility to subscribe to
    #[arg(short, long)]
    facility: String,

    /// Host whose producers are probed
    #[arg(short, long)]
    ip: IpAddr,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn print_notice(notice: &PublishNotice) {
    let severity = Severity::from_i32(notice.severity)
        .map(|s| s.as_str())
        .unwrap_or("UNKNOWN");
    println!(
        "{} {} {}[{}] {} {}:{} {}",
        notice.timestamp,
        severity,
        notice.host,
        notice.pid,
        notice.facility,
        notice.source_file,
        notice.source_line,
        notice.message
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let config: LogcastConfig = if config_path.exists() {
        config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        LogcastConfig::default()
    };

    // Apply command-line overrides
    let mut subscriber = config.subscriber;
    subscriber.facility = args.facility;
    subscriber.base_ip = args.ip;

    let (tx, mut rx) = mpsc::channel(subscriber.notice_capacity.max(1));
    let manager = DiscoveryManager::bind(subscriber, tx)
        .await
        .context("Failed to start subscriber")?;

    tracing::info!(
        "Watching {} on {} from {}",
        manager.facility(),
        args.ip,
        manager.local_addr()
    );

    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let printer = tokio::spawn(async move {
        while let Some(notice) = rx.recv().await {
            print_notice(&notice);
        }
    });

    manager.run(cancel).await;
    drop(manager);
    let _ = printer.await;

    tracing::info!("Subscriber stopped");
    Ok(())
}
