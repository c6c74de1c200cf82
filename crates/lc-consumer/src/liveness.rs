//! Per-producer heartbeat state machine
//!
//! Each subscribed producer gets one [`PeerLiveness`] task. Anything heard
//! from the producer refreshes it. After `heartbeat_interval` of silence a
//! heartbeat (a repeated subscribe request) is sent; if the producer is
//! still silent `heartbeat_timeout` after that, the task fails and the
//! registry drops it.

use async_trait::async_trait;
use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use lc_core::{Communicator, Credential, PeerIdentity, Task, TaskError};
use lc_protocol::Message;

/// What a liveness check decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Heard from recently enough
    Idle,
    /// Heartbeat due; the task is now awaiting an answer
    SendHeartbeat,
    /// No answer to the outstanding heartbeat
    Failed { silent_for: Duration },
}

#[derive(Debug)]
struct LivenessState {
    last_refresh: Instant,
    awaiting: bool,
}

/// Liveness tracking for one producer
pub struct PeerLiveness {
    peer: PeerIdentity,
    link: Arc<dyn Communicator>,
    heartbeat: Message,
    interval: Duration,
    timeout: Duration,
    state: Mutex<LivenessState>,
}

impl PeerLiveness {
    /// Track `peer`, heartbeating through `link`
    pub fn new(
        peer: PeerIdentity,
        link: Arc<dyn Communicator>,
        credential: &Credential,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        let heartbeat = credential.subscribe_request(&peer.facility).into();
        Self {
            peer,
            link,
            heartbeat,
            interval,
            timeout,
            state: Mutex::new(LivenessState {
                last_refresh: Instant::now(),
                awaiting: false,
            }),
        }
    }

    /// The producer being tracked
    pub fn peer(&self) -> &PeerIdentity {
        &self.peer
    }

    /// Record that the producer was heard from
    pub fn refresh(&self) {
        let mut state = self.lock();
        let now = Instant::now();
        // Strictly increasing, even within one clock tick
        state.last_refresh = if now > state.last_refresh {
            now
        } else {
            state.last_refresh + Duration::from_nanos(1)
        };
        state.awaiting = false;
    }

    /// Last time the producer was heard from, or a heartbeat was sent
    pub fn last_refresh(&self) -> Instant {
        self.lock().last_refresh
    }

    /// Whether a heartbeat is outstanding
    pub fn is_awaiting(&self) -> bool {
        self.lock().awaiting
    }

    /// Advance the state machine to `now`
    pub fn poll(&self, now: Instant) -> HeartbeatAction {
        let mut state = self.lock();
        let silent_for = now.saturating_duration_since(state.last_refresh);

        if silent_for < self.interval {
            return HeartbeatAction::Idle;
        }

        if state.awaiting {
            if silent_for >= self.timeout {
                return HeartbeatAction::Failed { silent_for };
            }
            return HeartbeatAction::Idle;
        }

        state.awaiting = true;
        state.last_refresh = now;
        HeartbeatAction::SendHeartbeat
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LivenessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Task for PeerLiveness {
    async fn run_once(&self, _cancel: &CancellationToken) -> Result<(), TaskError> {
        let action = self.poll(Instant::now());
        match action {
            HeartbeatAction::Idle => Ok(()),
            HeartbeatAction::SendHeartbeat => {
                trace!("Heartbeat to {}", self.peer);
                self.link.send(self.peer.addr, &self.heartbeat).await?;
                Ok(())
            }
            HeartbeatAction::Failed { silent_for } => Err(TaskError::PeerSilent {
                addr: self.peer.addr,
                silent_for,
            }),
        }
    }

    async fn destroy(&self) {
        debug!("Stopped tracking {}", self.peer);
    }

    fn user_data(&self) -> Option<&(dyn Any + Send + Sync)> {
        Some(&self.peer)
    }
}
