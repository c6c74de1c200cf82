//! UDP communicator

use async_trait::async_trait;
use lc_protocol::{decode_datagram, encode_datagram, Message};
use rand::Rng;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::TransportOptions;
use crate::dispatch::{Dispatcher, Inbound};
use crate::error::TransportError;
use crate::traits::Communicator;
use crate::types::PortRange;

type InboundQueue = Arc<tokio::sync::Mutex<mpsc::Receiver<(SocketAddr, Message)>>>;

/// Sending half of a bound socket; what handlers get to reply through
struct UdpLink {
    socket: RwLock<Option<Arc<UdpSocket>>>,
    local: SocketAddr,
    closed: AtomicBool,
}

impl UdpLink {
    fn socket(&self) -> Result<Arc<UdpSocket>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.socket
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TransportError::Closed)
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.socket
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[async_trait]
impl Communicator for UdpLink {
    async fn send(&self, addr: SocketAddr, message: &Message) -> Result<(), TransportError> {
        let socket = self.socket()?;
        let datagram = encode_datagram(message)?;
        socket
            .send_to(&datagram, addr)
            .await
            .map_err(|source| TransportError::Send { addr, source })?;
        trace!("Sent {:?} to {}", message.kind(), addr);
        Ok(())
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    async fn close(&self) {
        self.shutdown();
    }
}

/// Bound UDP socket with its receive loop and dispatch workers
///
/// Every datagram carries exactly one frame. Datagrams that do not decode
/// are logged and dropped; decoded messages are queued and handed to the
/// [`Dispatcher`] by `options.workers` workers. When the queue is full new
/// datagrams are dropped.
pub struct UdpCommunicator {
    link: Arc<UdpLink>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl UdpCommunicator {
    /// Bind `addr` and start receiving
    pub async fn bind(
        addr: SocketAddr,
        dispatcher: Dispatcher,
        options: &TransportOptions,
    ) -> Result<Arc<Self>, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local = socket
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;
        let socket = Arc::new(socket);

        let link = Arc::new(UdpLink {
            socket: RwLock::new(Some(socket.clone())),
            local,
            closed: AtomicBool::new(false),
        });

        let cancel = CancellationToken::new();
        let (queue_tx, queue_rx) = mpsc::channel(options.queue_size.max(1));
        let queue: InboundQueue = Arc::new(tokio::sync::Mutex::new(queue_rx));
        let dispatcher = Arc::new(dispatcher);

        let mut tasks = Vec::with_capacity(options.workers.max(1) + 1);
        tasks.push(tokio::spawn(receive_loop(
            socket,
            options.max_datagram.max(lc_protocol::HEADER_SIZE),
            queue_tx,
            cancel.clone(),
        )));
        for _ in 0..options.workers.max(1) {
            let reply_link: Arc<dyn Communicator> = link.clone();
            tasks.push(tokio::spawn(dispatch_worker(
                queue.clone(),
                dispatcher.clone(),
                reply_link,
                cancel.clone(),
            )));
        }

        debug!("UDP communicator bound on {}", local);

        Ok(Arc::new(Self {
            link,
            cancel,
            tasks: Mutex::new(tasks),
        }))
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.link.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Communicator for UdpCommunicator {
    async fn send(&self, addr: SocketAddr, message: &Message) -> Result<(), TransportError> {
        self.link.send(addr, message).await
    }

    fn local_addr(&self) -> SocketAddr {
        self.link.local
    }

    async fn close(&self) {
        self.link.shutdown();
        self.cancel.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            let _ = task.await;
        }
        debug!("UDP communicator on {} closed", self.link.local);
    }
}

impl Drop for UdpCommunicator {
    fn drop(&mut self) {
        self.link.shutdown();
        self.cancel.cancel();
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    max_datagram: usize,
    queue: mpsc::Sender<(SocketAddr, Message)>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; max_datagram];

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        let (len, from) = match received {
            Ok(received) => received,
            Err(e) => {
                // ICMP port-unreachable surfaces here on some platforms
                debug!("Receive error: {}", e);
                continue;
            }
        };

        let message = match decode_datagram(&buf[..len]) {
            Ok(message) => message,
            Err(e) => {
                debug!("Dropping undecodable datagram from {}: {}", from, e);
                continue;
            }
        };

        match queue.try_send((from, message)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full((from, message))) => {
                warn!("Inbound queue full, dropping {:?} from {}", message.kind(), from);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }

    trace!("Receive loop stopped");
}

async fn dispatch_worker(
    queue: InboundQueue,
    dispatcher: Arc<Dispatcher>,
    link: Arc<dyn Communicator>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => None,
                next = queue.recv() => next,
            }
        };

        let Some((from, message)) = next else {
            break;
        };

        dispatcher
            .dispatch(Inbound::new(from, link.clone()), message)
            .await;
    }
}

/// Bind a random port of `range` on `ip`, trying at most `attempts` times
pub async fn bind_random(
    ip: IpAddr,
    range: &PortRange,
    attempts: usize,
    dispatcher: Dispatcher,
    options: &TransportOptions,
) -> Result<Arc<UdpCommunicator>, TransportError> {
    let len = range.len();
    if len > 0 {
        for attempt in 1..=attempts {
            let index = rand::thread_rng().gen_range(0..len);
            let Some(port) = range.nth(index) else {
                continue;
            };

            let addr = SocketAddr::new(ip, port);
            match UdpCommunicator::bind(addr, dispatcher.clone(), options).await {
                Ok(communicator) => return Ok(communicator),
                Err(e) => debug!("Bind attempt {}/{} failed: {}", attempt, attempts, e),
            }
        }
    }

    Err(TransportError::NoAvailablePort {
        range: range.to_string(),
        attempts,
    })
}
