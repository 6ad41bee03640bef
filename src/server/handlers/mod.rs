//! Action dispatch
//!
//! Every decoded request ends here and produces exactly one [`Reply`]
//! carrying the request's token. Handlers return `BrowserResult`; failures
//! and panics are turned into failure envelopes at this boundary.

use std::panic::AssertUnwindSafe;

use bson::Bson;
use futures::FutureExt;

use crate::driver::DatabaseKind;
use crate::error::{BrowserError, BrowserResult};
use crate::protocol::{Action, ActionKind, Reply, Request};
use crate::server::session::{Session, SessionPhase};

pub mod command;
pub mod connection;
pub mod rows;
pub mod schema;
pub mod websocket;

pub use websocket::ws_handler;

pub async fn dispatch(session: &Session, request: Request) -> Reply {
    let token = request.token.clone();
    let action = request.kind.map(|kind| kind.name()).unwrap_or("?");

    match AssertUnwindSafe(execute(session, request)).catch_unwind().await {
        Ok(Ok(data)) => Reply::ok(token, data),
        Ok(Err(e @ BrowserError::Driver(_))) => {
            tracing::warn!("Session {}: {} failed: {}", session.id(), action, e);
            Reply::error(token, e)
        }
        Ok(Err(e)) => {
            tracing::debug!("Session {}: {} rejected: {}", session.id(), action, e);
            Reply::error(token, e)
        }
        Err(_) => {
            tracing::error!("Session {}: {} panicked", session.id(), action);
            Reply::error(token, BrowserError::Internal)
        }
    }
}

/// Gate on the session, then validate and run the action.
///
/// Checks run in a fixed order: unknown action, missing connection,
/// SQL-only actions on a document store, field validation, then the
/// driver call.
async fn execute(session: &Session, request: Request) -> BrowserResult<Option<Bson>> {
    let kind = request.kind.ok_or(BrowserError::UnknownAction)?;
    match kind {
        ActionKind::Connect => {}
        ActionKind::Reconnect => {
            if !session.can_reconnect() {
                return Err(BrowserError::NotConnected);
            }
        }
        ActionKind::TableInfo | ActionKind::MaterializedViews => match session.phase() {
            SessionPhase::Established(DatabaseKind::Sql) => {}
            SessionPhase::Established(DatabaseKind::Document) => {
                return Err(BrowserError::Unsupported)
            }
            _ => return Err(BrowserError::NotConnected),
        },
        _ => {
            if !matches!(session.phase(), SessionPhase::Established(_)) {
                return Err(BrowserError::NotConnected);
            }
        }
    }

    match request.action? {
        Action::Connect { url } => connection::handle_connect(session, url).await,
        Action::Reconnect { database } => connection::handle_reconnect(session, &database).await,
        Action::Databases => schema::handle_databases(&*session.handle()?).await,
        Action::Tables => schema::handle_tables(&*session.handle()?).await,
        Action::Views => schema::handle_views(&*session.handle()?).await,
        Action::MaterializedViews => schema::handle_materialized_views(&*session.handle()?).await,
        Action::TableInfo { table } => schema::handle_table_info(&*session.handle()?, &table).await,
        Action::DeleteRows { table, keys } => {
            rows::handle_delete_rows(&*session.handle()?, &table, &keys).await
        }
        Action::UpdateItems { table, items } => {
            rows::handle_update_items(&*session.handle()?, &table, &items).await
        }
        Action::RunCommand { command } => {
            command::handle_run_command(&*session.handle()?, command).await
        }
    }
}
