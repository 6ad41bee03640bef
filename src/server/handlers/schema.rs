//! Schema browsing: databases, tables, views and table structure

use bson::Bson;

use crate::driver::{CollectionType, DatabaseHandle, DocumentHandle, SqlHandle};
use crate::error::{BrowserError, BrowserResult};
use dbbrowser_client::TableInfo;

fn names(names: Vec<String>) -> Option<Bson> {
    Some(Bson::Array(names.into_iter().map(Bson::String).collect()))
}

fn sql(handle: &dyn DatabaseHandle) -> BrowserResult<&dyn SqlHandle> {
    handle.as_sql().ok_or(BrowserError::Unsupported)
}

async fn collections_of(
    handle: &dyn DocumentHandle,
    collection_type: CollectionType,
) -> BrowserResult<Option<Bson>> {
    let collections = handle.collections().await?;
    Ok(names(
        collections
            .into_iter()
            .filter(|c| c.collection_type == collection_type)
            .map(|c| c.name)
            .collect(),
    ))
}

pub async fn handle_databases(handle: &dyn DatabaseHandle) -> BrowserResult<Option<Bson>> {
    Ok(names(handle.databases().await?))
}

pub async fn handle_tables(handle: &dyn DatabaseHandle) -> BrowserResult<Option<Bson>> {
    match handle.as_document() {
        Some(documents) => collections_of(documents, CollectionType::Collection).await,
        None => Ok(names(sql(handle)?.tables().await?)),
    }
}

pub async fn handle_views(handle: &dyn DatabaseHandle) -> BrowserResult<Option<Bson>> {
    match handle.as_document() {
        Some(documents) => collections_of(documents, CollectionType::View).await,
        None => Ok(names(sql(handle)?.views().await?)),
    }
}

pub async fn handle_materialized_views(handle: &dyn DatabaseHandle) -> BrowserResult<Option<Bson>> {
    Ok(names(sql(handle)?.materialized_views().await?))
}

/// `{primaryKey: [...], columns: [{name, type, isOptional}]}`
pub async fn handle_table_info(
    handle: &dyn DatabaseHandle,
    table: &str,
) -> BrowserResult<Option<Bson>> {
    let sql = sql(handle)?;
    let (columns, primary_key) = futures::try_join!(sql.columns(table), sql.primary_key(table))?;

    let info = TableInfo {
        primary_key,
        columns,
    };
    let data = bson::to_bson(&info).map_err(|e| BrowserError::Driver(e.to_string()))?;
    Ok(Some(data))
}
