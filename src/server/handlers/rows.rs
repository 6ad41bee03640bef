//! Row edits from the result grid

use bson::{Bson, Document};
use futures::future::try_join_all;

use crate::driver::{DatabaseHandle, Filter};
use crate::error::BrowserResult;
use crate::protocol::UpdateItem;

/// Delete every row matching any of `keys` with a single driver call.
pub async fn handle_delete_rows(
    handle: &dyn DatabaseHandle,
    table: &str,
    keys: &[Document],
) -> BrowserResult<Option<Bson>> {
    let deleted = handle.delete(table, &Filter::any_of(keys)).await?;
    tracing::debug!("Deleted {} rows from {}", deleted, table);
    Ok(None)
}

/// Update one row per item, all concurrently. Any failure fails the whole
/// action; there is no partial-success reply.
pub async fn handle_update_items(
    handle: &dyn DatabaseHandle,
    table: &str,
    items: &[UpdateItem],
) -> BrowserResult<Option<Bson>> {
    let updates = items.iter().map(|item| async move {
        let filter = Filter::key(&item.key);
        handle.update_one(table, &filter, &item.update).await
    });
    try_join_all(updates).await?;
    Ok(None)
}
