//! In-process communicator

use async_trait::async_trait;
use lc_protocol::Message;
use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::TransportError;
use crate::traits::Communicator;

/// Communicator that records outbound messages instead of sending them.
///
/// Sends to addresses marked with [`MemoryLink::fail_sends_to`] fail with a
/// connection-refused error, which is how handlers and tasks are exercised
/// against unreachable peers.
#[derive(Debug)]
pub struct MemoryLink {
    local: SocketAddr,
    sent: Mutex<Vec<(SocketAddr, Message)>>,
    unreachable: Mutex<HashSet<SocketAddr>>,
    closed: AtomicBool,
}

impl MemoryLink {
    /// Create a link that claims to be bound on `local`
    pub fn new(local: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            local,
            sent: Mutex::new(Vec::new()),
            unreachable: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Make every later send to `addr` fail
    pub fn fail_sends_to(&self, addr: SocketAddr) {
        self.unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addr);
    }

    /// Make sends to `addr` succeed again
    pub fn restore(&self, addr: SocketAddr) {
        self.unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&addr);
    }

    /// Every successful send, in order
    pub fn sent(&self) -> Vec<(SocketAddr, Message)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages successfully sent to `addr`, in order
    pub fn sent_to(&self, addr: SocketAddr) -> Vec<Message> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(to, _)| *to == addr)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Drain the record of sent messages
    pub fn take_sent(&self) -> Vec<(SocketAddr, Message)> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Communicator for MemoryLink {
    async fn send(&self, addr: SocketAddr, message: &Message) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let refused = self
            .unreachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&addr);
        if refused {
            return Err(TransportError::Send {
                addr,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "peer unreachable"),
            });
        }

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((addr, message.clone()));
        Ok(())
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
