use bson::Bson;

use crate::driver::{DatabaseHandle, DatabaseKind};
use crate::error::{BrowserError, BrowserResult};
use crate::protocol::CommandPayload;

/// Run a raw command on the live handle.
///
/// SQL handles take command text and answer with the result rows.
/// Document-store handles take a command document and answer with the
/// driver's reply as is; cursors in it are drained by the client.
pub async fn handle_run_command(
    handle: &dyn DatabaseHandle,
    command: CommandPayload,
) -> BrowserResult<Option<Bson>> {
    match (handle.kind(), command) {
        (DatabaseKind::Sql, CommandPayload::Sql(sql)) => {
            let sql_handle = handle.as_sql().ok_or(BrowserError::Unsupported)?;
            let rows = sql_handle.execute(&sql).await?;
            Ok(Some(Bson::Array(rows.into_iter().map(Bson::Document).collect())))
        }
        (DatabaseKind::Document, CommandPayload::Document(command)) => {
            let documents = handle.as_document().ok_or(BrowserError::Unsupported)?;
            let reply = documents.run_command(command).await?;
            Ok(Some(Bson::Document(reply)))
        }
        _ => Err(BrowserError::InvalidCommand),
    }
}
