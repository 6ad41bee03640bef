//! Database driver layer
//!
//! A [`Driver`] turns a connection URL into a live [`DatabaseHandle`]. SQL
//! handles (MySQL, PostgreSQL) expose schema listings and raw statement
//! execution through [`SqlHandle`]; document-store handles (MongoDB) expose
//! collection listings and raw commands through [`DocumentHandle`].

use std::sync::Arc;

use async_trait::async_trait;
use bson::Document;
use url::Url;

pub mod error;
pub mod filter;
pub mod mongo;
pub mod sql;

pub use dbbrowser_client::ColumnInfo;
pub use error::{DriverError, DriverResult};
pub use filter::{Dialect, Filter};
pub use mongo::MongoHandle;
pub use sql::SqlConnection;

/// Flavor of a live handle, which decides the valid actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseKind {
    Sql,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionType {
    Collection,
    View,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub collection_type: CollectionType,
}

#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    fn kind(&self) -> DatabaseKind;

    async fn databases(&self) -> DriverResult<Vec<String>>;

    /// Delete every row or document matching `filter`; returns the count.
    async fn delete(&self, table: &str, filter: &Filter) -> DriverResult<u64>;

    /// Apply `update` to a single row or document matching `filter`.
    async fn update_one(&self, table: &str, filter: &Filter, update: &Document) -> DriverResult<u64>;

    async fn close(&self) -> DriverResult<()>;

    fn as_sql(&self) -> Option<&dyn SqlHandle> {
        None
    }

    fn as_document(&self) -> Option<&dyn DocumentHandle> {
        None
    }
}

#[async_trait]
pub trait SqlHandle: Send + Sync {
    async fn tables(&self) -> DriverResult<Vec<String>>;
    async fn views(&self) -> DriverResult<Vec<String>>;
    /// Fails with [`DriverError::Unsupported`] on engines without them.
    async fn materialized_views(&self) -> DriverResult<Vec<String>>;
    async fn columns(&self, table: &str) -> DriverResult<Vec<ColumnInfo>>;
    async fn primary_key(&self, table: &str) -> DriverResult<Vec<String>>;
    /// Run literal SQL text and return each result row as a document.
    async fn execute(&self, sql: &str) -> DriverResult<Vec<Document>>;
}

#[async_trait]
pub trait DocumentHandle: Send + Sync {
    async fn collections(&self) -> DriverResult<Vec<CollectionInfo>>;
    async fn run_command(&self, command: Document) -> DriverResult<Document>;
}

#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(&self, url: &Url) -> DriverResult<Arc<dyn DatabaseHandle>>;
}

/// Picks the concrete driver from the URL scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDriver;

#[async_trait]
impl Driver for DefaultDriver {
    async fn connect(&self, url: &Url) -> DriverResult<Arc<dyn DatabaseHandle>> {
        let handle: Arc<dyn DatabaseHandle> = match url.scheme() {
            "mysql" => Arc::new(SqlConnection::connect(Dialect::MySql, url).await?),
            "postgres" | "postgresql" => {
                Arc::new(SqlConnection::connect(Dialect::Postgres, url).await?)
            }
            "mongodb" | "mongodb+srv" => Arc::new(MongoHandle::connect(url).await?),
            other => {
                return Err(DriverError::InvalidUrl(format!(
                    "unsupported scheme '{}'",
                    other
                )))
            }
        };
        Ok(handle)
    }
}
