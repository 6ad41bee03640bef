pub mod handlers;
pub mod routes;
pub mod session;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::driver::Driver;

pub use routes::{create_router, RouterConfig};
pub use session::{ReconnectStrategy, Session, SessionPhase};

/// Shared state for all sockets.
#[derive(Clone)]
pub struct AppState {
    pub driver: Arc<dyn Driver>,
    pub active_sessions: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            active_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }
}
