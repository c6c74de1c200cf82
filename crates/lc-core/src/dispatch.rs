//! Per-kind routing of inbound messages
//!
//! A [`Dispatcher`] maps each [`MessageKind`] to an optional async handler.
//! Kinds that are registered without a handler are accepted and dropped;
//! kinds that are not registered at all are dropped as well, so a peer
//! speaking a message we do not care about is never an error.

use futures::future::BoxFuture;
use lc_protocol::{Message, MessageKind};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::trace;

use crate::error::TransportError;
use crate::traits::Communicator;

/// Async message handler
pub type Handler = Arc<dyn Fn(Inbound, Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Where an inbound message came from, and how to answer it
#[derive(Clone)]
pub struct Inbound {
    remote: SocketAddr,
    link: Arc<dyn Communicator>,
}

impl Inbound {
    /// Create an inbound context
    pub fn new(remote: SocketAddr, link: Arc<dyn Communicator>) -> Self {
        Self { remote, link }
    }

    /// Sender address
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Communicator the message arrived on
    pub fn link(&self) -> &Arc<dyn Communicator> {
        &self.link
    }

    /// Send `message` back to the sender
    pub async fn reply(&self, message: impl Into<Message>) -> Result<(), TransportError> {
        self.link.send(self.remote, &message.into()).await
    }
}

impl fmt::Debug for Inbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbound")
            .field("remote", &self.remote)
            .field("local", &self.link.local_addr())
            .finish()
    }
}

/// Table of message handlers keyed by kind
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<MessageKind, Option<Handler>>,
}

impl Dispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `kind` to `handler`, replacing any previous entry
    pub fn on<F, Fut>(mut self, kind: MessageKind, handler: F) -> Self
    where
        F: Fn(Inbound, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = Arc::new(
            move |inbound: Inbound, message: Message| -> BoxFuture<'static, ()> {
                Box::pin(handler(inbound, message))
            },
        );
        self.handlers.insert(kind, Some(handler));
        self
    }

    /// Accept `kind` without handling it
    pub fn accept(mut self, kind: MessageKind) -> Self {
        self.handlers.entry(kind).or_insert(None);
        self
    }

    /// Check whether `kind` has an entry, with or without a handler
    pub fn is_registered(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Handler for `kind`, if any
    pub fn handler(&self, kind: MessageKind) -> Option<&Handler> {
        self.handlers.get(&kind).and_then(Option::as_ref)
    }

    /// Run the handler for `message`. Returns whether a handler ran.
    pub async fn dispatch(&self, inbound: Inbound, message: Message) -> bool {
        let kind = message.kind();
        match self.handler(kind) {
            Some(handler) => {
                handler(inbound, message).await;
                true
            }
            None => {
                trace!("No handler for {:?} from {}", kind, inbound.remote());
                false
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().map(|k| k.as_u8()).collect();
        kinds.sort_unstable();
        f.debug_struct("Dispatcher").field("kinds", &kinds).finish()
    }
}
