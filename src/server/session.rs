//! Per-socket database session
//!
//! Each WebSocket owns exactly one [`Session`], and a session owns at most
//! one live database handle. The handle is replaced on `connect` and
//! `reconnect` and released when the socket goes away.

use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;
use uuid::Uuid;

use crate::driver::{DatabaseHandle, DatabaseKind, Driver, DriverResult};
use crate::error::{BrowserError, BrowserResult};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unestablished,
    Established(DatabaseKind),
    Closed,
}

/// Rebuilds a handle for another database on the server the session first
/// connected to, keeping scheme, credentials, host and query options.
#[derive(Clone)]
pub struct ReconnectStrategy {
    url: Url,
    driver: Arc<dyn Driver>,
}

impl ReconnectStrategy {
    pub fn new(url: Url, driver: Arc<dyn Driver>) -> Self {
        Self { url, driver }
    }

    /// The connect URL with only its path replaced by `database`.
    pub fn url_for(&self, database: &str) -> Url {
        let mut url = self.url.clone();
        url.set_path(&format!("/{}", database));
        url
    }

    pub async fn connect(&self, database: &str) -> DriverResult<Arc<dyn DatabaseHandle>> {
        self.driver.connect(&self.url_for(database)).await
    }
}

#[derive(Default)]
struct SessionState {
    handle: Option<Arc<dyn DatabaseHandle>>,
    reconnect: Option<ReconnectStrategy>,
    closed: bool,
}

pub struct Session {
    id: Uuid,
    driver: Arc<dyn Driver>,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        let state = self.state.lock();
        if state.closed {
            SessionPhase::Closed
        } else {
            match &state.handle {
                Some(handle) => SessionPhase::Established(handle.kind()),
                None => SessionPhase::Unestablished,
            }
        }
    }

    pub fn can_reconnect(&self) -> bool {
        let state = self.state.lock();
        !state.closed && state.reconnect.is_some()
    }

    /// The live handle, or `NotConnected`.
    pub fn handle(&self) -> BrowserResult<Arc<dyn DatabaseHandle>> {
        let state = self.state.lock();
        match (&state.handle, state.closed) {
            (Some(handle), false) => Ok(handle.clone()),
            _ => Err(BrowserError::NotConnected),
        }
    }

    /// Open a handle for `url` and install it, replacing any current one.
    ///
    /// On failure the session keeps whatever handle it had.
    pub async fn connect(&self, url: Url) -> BrowserResult<DatabaseKind> {
        let handle = self.driver.connect(&url).await.map_err(|e| {
            tracing::warn!("Session {}: connect failed: {}", self.id, e);
            BrowserError::from(e)
        })?;
        let kind = handle.kind();

        let strategy = ReconnectStrategy::new(url.clone(), self.driver.clone());
        self.install(handle, Some(strategy))?;

        tracing::info!(
            "Session {}: connected to {} ({:?})",
            self.id,
            url.host_str().unwrap_or("localhost"),
            kind
        );
        Ok(kind)
    }

    /// Point the session at another database using the connect URL.
    ///
    /// The new handle is opened first; the old one is closed in the
    /// background only once the new one is installed.
    pub async fn reconnect(&self, database: &str) -> BrowserResult<DatabaseKind> {
        let strategy = {
            let state = self.state.lock();
            match (&state.reconnect, state.closed) {
                (Some(strategy), false) => strategy.clone(),
                _ => return Err(BrowserError::NotConnected),
            }
        };

        let handle = strategy.connect(database).await.map_err(|e| {
            tracing::warn!("Session {}: reconnect to {} failed: {}", self.id, database, e);
            BrowserError::from(e)
        })?;
        let kind = handle.kind();
        self.install(handle, None)?;

        tracing::info!("Session {}: switched to database {}", self.id, database);
        Ok(kind)
    }

    fn install(
        &self,
        handle: Arc<dyn DatabaseHandle>,
        strategy: Option<ReconnectStrategy>,
    ) -> BrowserResult<()> {
        let previous = {
            let mut state = self.state.lock();
            if state.closed {
                drop(state);
                // The socket went away while connecting.
                close_detached(self.id, handle);
                return Err(BrowserError::NotConnected);
            }
            if let Some(strategy) = strategy {
                state.reconnect = Some(strategy);
            }
            state.handle.replace(handle)
        };

        if let Some(previous) = previous {
            close_detached(self.id, previous);
        }
        Ok(())
    }

    /// Release the handle when the socket closes. Idempotent.
    pub async fn close(&self) {
        let handle = {
            let mut state = self.state.lock();
            state.closed = true;
            state.reconnect = None;
            state.handle.take()
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.close().await {
                tracing::warn!("Session {}: failed to close database handle: {}", self.id, e);
            }
            tracing::info!("Session {}: database handle released", self.id);
        }
    }
}

/// Close a replaced handle without waiting for it; failures are only logged.
fn close_detached(session: Uuid, handle: Arc<dyn DatabaseHandle>) {
    tokio::spawn(async move {
        if let Err(e) = handle.close().await {
            tracing::warn!("Session {}: failed to close previous handle: {}", session, e);
        }
    });
}
