//! logcast demo producer
//!
//! Logs a rotating mix of severities once per second. Every record goes to
//! the local log file, to any consumer subscribed to this process, and
//! optionally to a fixed collector (`--writer host:port`).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lc_core::config::{self, LogcastConfig, WriterConfig};
use lc_core::sink::{LogFileSink, RotatingFile};
use lc_core::{LogRecord, Severity};
use lc_producer::{Distributor, PublishLayer, ReconnectingWriter};

#[derive(Parser)]
#[command(name = "lc-producer")]
#[command(about = "logcast demo producer - emits log records for subscribers to pick up")]
#[command(version)]
struct Args {
    /// Facility to advertise (defaults to the program name)
    #[arg(short, long)]
    facility: Option<String>,

    /// Also push records to this collector (host:port)
    #[arg(short, long)]
    writer: Option<String>,

    /// Directory for local log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut config: LogcastConfig = if config_path.exists() {
        config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        LogcastConfig::default()
    };

    // Apply command-line overrides
    if let Some(facility) = args.facility {
        config.distributor.facility = Some(facility);
    }
    if let Some(log_dir) = args.log_dir {
        config.sink.log_dir = log_dir;
    }
    if let Some(address) = args.writer {
        config.writer = Some(WriterConfig {
            address,
            ..config.writer.unwrap_or_default()
        });
    }

    let distributor = Arc::new(Distributor::start(config.distributor.clone()));

    // Initialize logging: console, local file, subscribers
    let log_file = RotatingFile::open(LogFileSink::new(&config.sink), config.sink.max_size_bytes())
        .context("Failed to create log file")?;
    let log_path = log_file.path().to_path_buf();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .with(PublishLayer::new(distributor.clone()))
        .init();

    tracing::info!(
        "logcast producer starting (facility {}, log file {})",
        distributor.facility(),
        log_path.display()
    );

    let writer = match &config.writer {
        Some(writer_config) => {
            let writer = ReconnectingWriter::open(writer_config)
                .with_context(|| format!("Failed to connect to {}", writer_config.address))?;
            Some(Arc::new(writer))
        }
        None => None,
    };

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

    let severities = [
        Severity::Debug,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Fatal,
    ];
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    let mut sequence: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let severity = severities[(sequence % severities.len() as u64) as usize];
        let text = format!("demo record #{} at {}", sequence, severity);
        sequence += 1;

        match severity {
            Severity::Debug => tracing::debug!(target: "demo", "{}", text),
            Severity::Info => tracing::info!(target: "demo", "{}", text),
            Severity::Warning => tracing::warn!(target: "demo", "{}", text),
            Severity::Error | Severity::Fatal => tracing::error!(target: "demo", "{}", text),
        }

        if let Some(writer) = &writer {
            let record = LogRecord::new(severity, text)
                .with_facility(distributor.facility())
                .with_source(file!(), module_path!(), line!());
            let writer = writer.clone();
            match tokio::task::spawn_blocking(move || writer.write(&record)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!("Writer: {}", e),
                Err(e) => tracing::warn!("Writer task failed: {}", e),
            }
        }
    }

    tracing::info!("Shutting down...");
    if let Some(writer) = writer {
        writer.close();
    }
    distributor.shutdown().await;

    Ok(())
}
