use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use repair_data::Principal;
use tokio::sync::watch;
use tracing::info;

use crate::service::JobService;

/// Authenticated client handle bound to one identity.
#[derive(Clone)]
pub struct SessionHandle {
    pub generation: u64,
    pub principal: Principal,
    pub service: Arc<dyn JobService>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("generation", &self.generation)
            .field("principal", &self.principal)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum SessionState {
    Absent { generation: u64 },
    Initializing { generation: u64 },
    Ready(SessionHandle),
}

impl SessionState {
    pub fn generation(&self) -> u64 {
        match self {
            SessionState::Absent { generation } => *generation,
            SessionState::Initializing { generation } => *generation,
            SessionState::Ready(handle) => handle.generation,
        }
    }

    pub fn handle(&self) -> Option<&SessionHandle> {
        match self {
            SessionState::Ready(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn is_initializing(&self) -> bool {
        matches!(self, SessionState::Initializing { .. })
    }
}

/// Publishes the current session handle.
///
/// Every identity change (establish or clear) moves to a new generation, so
/// anything derived from an older handle can be recognized as stale.
pub struct Session {
    generation: AtomicU64,
    state_tx: watch::Sender<SessionState>,
}

impl Session {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(SessionState::Absent { generation: 0 });
        Self {
            generation: AtomicU64::new(0),
            state_tx,
        }
    }

    /// a session that is ready right away, mostly for tools and tests
    pub fn ready(principal: Principal, service: Arc<dyn JobService>) -> Self {
        let session = Self::new();
        session.establish(principal, service);
        session
    }

    pub fn current(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// receiver that observes every later state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// login started, the handle is not usable yet
    pub fn begin_login(&self) {
        let generation = self.generation.load(Ordering::SeqCst);
        info!("session initializing");
        self.publish(SessionState::Initializing { generation });
    }

    pub fn establish(&self, principal: Principal, service: Arc<dyn JobService>) -> SessionHandle {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("session established for {}, generation {}", principal, generation);
        let handle = SessionHandle {
            generation,
            principal,
            service,
        };
        self.publish(SessionState::Ready(handle.clone()));
        handle
    }

    /// logout, drops the handle
    pub fn clear(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("session cleared, generation {}", generation);
        self.publish(SessionState::Absent { generation });
    }

    fn publish(&self, state: SessionState) {
        // send_replace keeps the value even when nobody subscribed
        self.state_tx.send_replace(state);
    }
}
