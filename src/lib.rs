pub mod driver;
pub mod error;
pub mod server;

pub use dbbrowser_client::protocol;

pub use driver::{DatabaseHandle, DatabaseKind, DefaultDriver, Driver};
pub use error::{BrowserError, BrowserResult};
pub use server::{create_router, AppState, RouterConfig, Session};
