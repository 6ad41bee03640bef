use super::DbBrowserClient;
use crate::protocol::ClientError;

pub const DEFAULT_WS_PATH: &str = "/ws";

/// Builds a [`DbBrowserClient`] from a relay address.
///
/// `http://` and `https://` addresses are mapped to `ws://` and `wss://`;
/// a bare `host:port` is treated as `ws://`.
pub struct DbBrowserClientBuilder {
    addr: String,
    path: String,
}

impl DbBrowserClientBuilder {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.trim_end_matches('/').to_string(),
            path: DEFAULT_WS_PATH.to_string(),
        }
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        self
    }

    pub fn url(&self) -> String {
        let base = if let Some(rest) = self.addr.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.addr.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else if self.addr.starts_with("ws://") || self.addr.starts_with("wss://") {
            self.addr.clone()
        } else {
            format!("ws://{}", self.addr)
        };
        format!("{}{}", base, self.path)
    }

    pub async fn build(self) -> Result<DbBrowserClient, ClientError> {
        DbBrowserClient::connect_to(&self.url()).await
    }
}
