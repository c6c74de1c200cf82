//! Producer-side distribution of log records
//!
//! The distributor answers discovery probes and subscribe requests from
//! consumers and relays every published record to the current subscribers.
//!
//! # Lifecycle
//!
//! 1. [`Distributor::start`] spawns the egress loop and returns at once
//! 2. The loop binds a UDP communicator on a random port of the configured
//!    range, retrying on its own timer until it succeeds (the distributor
//!    is *ready* from then on)
//! 3. Each notice handed over by [`Distributor::publish`] is sent to a
//!    snapshot of the subscribers; a subscriber whose send fails is dropped
//! 4. [`Distributor::shutdown`] stops the loop and releases the socket

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lc_core::config::DistributorConfig;
use lc_core::pool::Pool;
use lc_core::transport::bind_random;
use lc_core::{Communicator, Credential, Dispatcher, Inbound, LogRecord};
use lc_protocol::message::AUTH_FAILED;
use lc_protocol::{
    InfoRequest, InfoResponse, Message, MessageKind, PublishNotice, SubscribeRequest,
    SubscribeResponse,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Granularity of the tokio timer
const TIMER_RESOLUTION: Duration = Duration::from_millis(1);

/// Publish errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// No socket bound yet
    #[error("Distributor not ready")]
    NotReady,

    /// The egress loop did not take the notice in time
    #[error("Publish hand-off timed out")]
    Timeout,

    /// The distributor was shut down
    #[error("Distributor closed")]
    Closed,
}

/// State shared between the distributor, its handlers and its egress loop
struct Shared {
    facility: String,
    credential: Credential,
    subscriptions: DashMap<SocketAddr, ()>,
    link: RwLock<Option<Arc<dyn Communicator>>>,
}

impl Shared {
    fn new(facility: String, credential: Credential) -> Self {
        Self {
            facility,
            credential,
            subscriptions: DashMap::new(),
            link: RwLock::new(None),
        }
    }

    fn link(&self) -> Option<Arc<dyn Communicator>> {
        self.link
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_link(&self, link: Option<Arc<dyn Communicator>>) {
        *self.link.write().unwrap_or_else(PoisonError::into_inner) = link;
    }

    async fn handle_info(&self, inbound: Inbound, request: InfoRequest) {
        let response = if self.credential.verify(&request.name, &request.password) {
            debug!("Discovery probe from {}", inbound.remote());
            InfoResponse::facility(self.facility.as_str())
        } else {
            warn!("Rejected discovery probe from {}: {}", inbound.remote(), AUTH_FAILED);
            InfoResponse::rejected(AUTH_FAILED)
        };

        if let Err(e) = inbound.reply(response).await {
            debug!("Failed to answer probe from {}: {}", inbound.remote(), e);
        }
    }

    async fn handle_subscribe(&self, inbound: Inbound, request: SubscribeRequest) {
        let authorized = self.credential.verify(&request.name, &request.password)
            && request.facility == self.facility;

        let response = if authorized {
            if self.subscriptions.insert(inbound.remote(), ()).is_none() {
                info!("New subscriber {} for {}", inbound.remote(), self.facility);
            }
            SubscribeResponse::accepted()
        } else {
            warn!(
                "Rejected subscribe from {} for facility {:?}",
                inbound.remote(),
                request.facility
            );
            SubscribeResponse::rejected(AUTH_FAILED)
        };

        if let Err(e) = inbound.reply(response).await {
            debug!("Failed to answer subscribe from {}: {}", inbound.remote(), e);
        }
    }

    /// Send `message` to every current subscriber, dropping those that fail.
    /// Returns the number of successful sends.
    async fn fan_out(&self, link: &dyn Communicator, message: &Message) -> usize {
        let targets: Vec<SocketAddr> = self.subscriptions.iter().map(|entry| *entry.key()).collect();
        let mut delivered = 0;

        for addr in targets {
            match link.send(addr, message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    self.subscriptions.remove(&addr);
                    warn!("Dropping subscriber {}: {}", addr, e);
                }
            }
        }

        delivered
    }

    fn dispatcher(self: &Arc<Self>) -> Dispatcher {
        let on_info = self.clone();
        let on_subscribe = self.clone();

        Dispatcher::new()
            .on(MessageKind::InfoRequest, move |inbound, message| {
                let shared = on_info.clone();
                async move {
                    if let Message::InfoRequest(request) = message {
                        shared.handle_info(inbound, request).await;
                    }
                }
            })
            .on(MessageKind::SubscribeRequest, move |inbound, message| {
                let shared = on_subscribe.clone();
                async move {
                    if let Message::SubscribeRequest(request) = message {
                        shared.handle_subscribe(inbound, request).await;
                    }
                }
            })
            .accept(MessageKind::InfoResponse)
            .accept(MessageKind::SubscribeResponse)
            .accept(MessageKind::PublishNotice)
    }
}

/// Distributes published records to subscribed consumers
pub struct Distributor {
    shared: Arc<Shared>,
    notices: mpsc::Sender<PublishNotice>,
    pool: Arc<Pool<PublishNotice>>,
    hand_off_timeout: Duration,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Distributor {
    /// Spawn the egress loop. Must be called within a tokio runtime.
    pub fn start(config: DistributorConfig) -> Self {
        let shared = Arc::new(Shared::new(config.facility_name(), config.credential.clone()));
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let pool = Arc::new(Pool::new(config.pool_capacity));
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(egress_loop(
            shared.clone(),
            rx,
            pool.clone(),
            config.clone(),
            cancel.clone(),
        ));

        Self {
            shared,
            notices: tx,
            pool,
            hand_off_timeout: config.hand_off_timeout,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Facility this distributor serves
    pub fn facility(&self) -> &str {
        &self.shared.facility
    }

    /// Bound address, once ready
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.link().map(|link| link.local_addr())
    }

    /// Whether a socket is bound
    pub fn is_ready(&self) -> bool {
        self.shared.link().is_some()
    }

    /// Current subscriber addresses
    pub fn subscribers(&self) -> Vec<SocketAddr> {
        self.shared
            .subscriptions
            .iter()
            .map(|entry| *entry.key())
            .collect()
    }

    /// Hand `record` to the egress loop, waiting at most the hand-off timeout.
    ///
    /// The tokio timer only resolves whole milliseconds, so it is used for the
    /// bulk of long waits and the last stretch is polled against the deadline.
    pub async fn publish(&self, record: &LogRecord) -> Result<(), PublishError> {
        self.check_open()?;
        let deadline = Instant::now() + self.hand_off_timeout;
        let mut notice = self.prepare(record);

        loop {
            match self.notices.try_send(notice) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(returned)) => notice = returned,
                Err(TrySendError::Closed(returned)) => {
                    self.pool.put(returned);
                    return Err(PublishError::Closed);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.pool.put(notice);
                return Err(PublishError::Timeout);
            }

            if remaining > TIMER_RESOLUTION {
                match self
                    .notices
                    .send_timeout(notice, remaining - TIMER_RESOLUTION)
                    .await
                {
                    Ok(()) => return Ok(()),
                    Err(SendTimeoutError::Timeout(returned)) => notice = returned,
                    Err(SendTimeoutError::Closed(returned)) => {
                        self.pool.put(returned);
                        return Err(PublishError::Closed);
                    }
                }
            } else {
                tokio::task::yield_now().await;
            }
        }
    }

    /// Hand `record` to the egress loop without waiting
    pub fn try_publish(&self, record: &LogRecord) -> Result<(), PublishError> {
        self.check_open()?;
        let notice = self.prepare(record);

        match self.notices.try_send(notice) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(notice)) => {
                self.pool.put(notice);
                Err(PublishError::Timeout)
            }
            Err(TrySendError::Closed(notice)) => {
                self.pool.put(notice);
                Err(PublishError::Closed)
            }
        }
    }

    /// Stop the egress loop and release the socket
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }

    fn check_open(&self) -> Result<(), PublishError> {
        if self.cancel.is_cancelled() {
            return Err(PublishError::Closed);
        }
        if !self.is_ready() {
            return Err(PublishError::NotReady);
        }
        Ok(())
    }

    fn prepare(&self, record: &LogRecord) -> PublishNotice {
        let mut notice = self.pool.get();
        record.fill_notice(&mut notice);
        notice.facility.push_str(&self.shared.facility);
        notice
    }
}

impl Drop for Distributor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn egress_loop(
    shared: Arc<Shared>,
    mut notices: mpsc::Receiver<PublishNotice>,
    pool: Arc<Pool<PublishNotice>>,
    config: DistributorConfig,
    cancel: CancellationToken,
) {
    let attempts = config.listen_ports.len();
    let link: Arc<dyn Communicator> = loop {
        let bound = tokio::select! {
            _ = cancel.cancelled() => return,
            bound = bind_random(
                config.listen_ip,
                &config.listen_ports,
                attempts,
                shared.dispatcher(),
                &config.transport,
            ) => bound,
        };

        match bound {
            Ok(communicator) => {
                let communicator: Arc<dyn Communicator> = communicator;
                break communicator;
            }
            Err(e) => {
                warn!(
                    "Distributor bind failed: {}; retrying in {:?}",
                    e, config.bind_retry_delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(config.bind_retry_delay) => {}
                }
            }
        }
    };

    shared.set_link(Some(link.clone()));
    info!(
        "Distributor for {} listening on {}",
        shared.facility,
        link.local_addr()
    );

    loop {
        let notice = tokio::select! {
            _ = cancel.cancelled() => break,
            notice = notices.recv() => match notice {
                Some(notice) => notice,
                None => break,
            },
        };

        let message = Message::PublishNotice(notice);
        shared.fan_out(link.as_ref(), &message).await;
        if let Message::PublishNotice(notice) = message {
            pool.put(notice);
        }
    }

    shared.set_link(None);
    link.close().await;
    debug!("Distributor for {} stopped", shared.facility);
}

#[cfg(test)]
impl Distributor {
    /// Distributor wired to `link` with no egress loop; the receiver stands
    /// in for the loop.
    pub(crate) fn detached(
        config: DistributorConfig,
        link: Option<Arc<dyn Communicator>>,
    ) -> (Self, mpsc::Receiver<PublishNotice>) {
        let shared = Arc::new(Shared::new(config.facility_name(), config.credential.clone()));
        shared.set_link(link);
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));

        let distributor = Self {
            shared,
            notices: tx,
            pool: Arc::new(Pool::new(config.pool_capacity)),
            hand_off_timeout: config.hand_off_timeout,
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        };
        (distributor, rx)
    }
}
