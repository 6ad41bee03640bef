//! Common test utilities
//!
//! An in-memory driver whose handles record every call, so session and
//! dispatch behavior can be checked without a live database.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Document};
use parking_lot::Mutex;
use tokio::sync::Notify;
use url::Url;

use dbbrowser::driver::{
    CollectionInfo, CollectionType, ColumnInfo, DatabaseHandle, DatabaseKind, DocumentHandle,
    Driver, DriverError, DriverResult, Filter, SqlHandle,
};

#[derive(Default)]
pub struct FakeDriver {
    pub connects: Mutex<Vec<Url>>,
    pub handles: Mutex<Vec<Arc<FakeHandle>>>,
    /// Connections to URLs whose path is listed here are refused.
    pub refuse_paths: Mutex<Vec<String>>,
    /// Scripted replies handed to every new document-store handle.
    pub command_replies: Mutex<VecDeque<Document>>,
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse(&self, path: &str) {
        self.refuse_paths.lock().push(path.to_string());
    }

    pub fn handle(&self, index: usize) -> Arc<FakeHandle> {
        self.handles.lock()[index].clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn connect(&self, url: &Url) -> DriverResult<Arc<dyn DatabaseHandle>> {
        self.connects.lock().push(url.clone());
        if self.refuse_paths.lock().iter().any(|p| p == url.path()) {
            return Err(DriverError::Connection(format!(
                "Unknown database '{}'",
                url.path().trim_start_matches('/')
            )));
        }

        let kind = if url.scheme().starts_with("mongodb") {
            DatabaseKind::Document
        } else {
            DatabaseKind::Sql
        };
        let handle = Arc::new(FakeHandle::new(url.clone(), kind));
        *handle.command_replies.lock() = self.command_replies.lock().drain(..).collect();
        self.handles.lock().push(handle.clone());
        Ok(handle)
    }
}

pub struct FakeHandle {
    pub url: Url,
    pub kind: DatabaseKind,
    pub calls: AtomicUsize,
    pub deletes: Mutex<Vec<(String, Filter)>>,
    pub updates: Mutex<Vec<(String, Filter, Document)>>,
    pub statements: Mutex<Vec<String>>,
    pub commands: Mutex<Vec<Document>>,
    pub command_replies: Mutex<VecDeque<Document>>,
    /// Updates whose key equals this document fail.
    pub fail_update_key: Mutex<Option<Document>>,
    pub update_delay: Mutex<Option<Duration>>,
    pub closed: AtomicBool,
    pub closed_notify: Notify,
}

impl FakeHandle {
    fn new(url: Url, kind: DatabaseKind) -> Self {
        Self {
            url,
            kind,
            calls: AtomicUsize::new(0),
            deletes: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            statements: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            command_replies: Mutex::new(VecDeque::new()),
            fail_update_key: Mutex::new(None),
            update_delay: Mutex::new(None),
            closed: AtomicBool::new(false),
            closed_notify: Notify::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait until the handle has been closed, including detached closes.
    pub async fn wait_closed(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.closed_notify.notified();
                if self.is_closed() {
                    break;
                }
                notified.await;
            }
        })
        .await
        .expect("handle was never closed");
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn database(&self) -> String {
        self.url.path().trim_start_matches('/').to_string()
    }
}

#[async_trait]
impl DatabaseHandle for FakeHandle {
    fn kind(&self) -> DatabaseKind {
        self.kind
    }

    async fn databases(&self) -> DriverResult<Vec<String>> {
        self.touch();
        Ok(vec!["inventory".to_string(), self.database()])
    }

    async fn delete(&self, table: &str, filter: &Filter) -> DriverResult<u64> {
        self.touch();
        self.deletes.lock().push((table.to_string(), filter.clone()));
        Ok(1)
    }

    async fn update_one(&self, table: &str, filter: &Filter, update: &Document) -> DriverResult<u64> {
        self.touch();
        let delay = *self.update_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self.fail_update_key.lock().clone();
        if let Some(key) = failing {
            if Filter::key(&key) == *filter {
                return Err(DriverError::Query("Deadlock found when trying to get lock".to_string()));
            }
        }
        self.updates
            .lock()
            .push((table.to_string(), filter.clone(), update.clone()));
        Ok(1)
    }

    async fn close(&self) -> DriverResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.closed_notify.notify_waiters();
        Ok(())
    }

    fn as_sql(&self) -> Option<&dyn SqlHandle> {
        match self.kind {
            DatabaseKind::Sql => Some(self),
            DatabaseKind::Document => None,
        }
    }

    fn as_document(&self) -> Option<&dyn DocumentHandle> {
        match self.kind {
            DatabaseKind::Document => Some(self),
            DatabaseKind::Sql => None,
        }
    }
}

#[async_trait]
impl SqlHandle for FakeHandle {
    async fn tables(&self) -> DriverResult<Vec<String>> {
        self.touch();
        Ok(vec!["orders".to_string(), "users".to_string()])
    }

    async fn views(&self) -> DriverResult<Vec<String>> {
        self.touch();
        Ok(vec!["active_users".to_string()])
    }

    async fn materialized_views(&self) -> DriverResult<Vec<String>> {
        self.touch();
        if self.url.scheme() == "mysql" {
            return Err(DriverError::Unsupported);
        }
        Ok(vec!["daily_totals".to_string()])
    }

    async fn columns(&self, table: &str) -> DriverResult<Vec<ColumnInfo>> {
        self.touch();
        if table != "users" {
            return Err(DriverError::Query(format!("relation \"{}\" does not exist", table)));
        }
        Ok(vec![
            ColumnInfo {
                name: "id".to_string(),
                data_type: "integer".to_string(),
                is_optional: false,
            },
            ColumnInfo {
                name: "email".to_string(),
                data_type: "character varying".to_string(),
                is_optional: true,
            },
        ])
    }

    async fn primary_key(&self, _table: &str) -> DriverResult<Vec<String>> {
        self.touch();
        Ok(vec!["id".to_string()])
    }

    async fn execute(&self, sql: &str) -> DriverResult<Vec<Document>> {
        self.touch();
        self.statements.lock().push(sql.to_string());
        if sql.trim().is_empty() {
            return Err(DriverError::Query("Query was empty".to_string()));
        }
        Ok(vec![doc! { "id": 1, "email": "ada@example.com" }, doc! { "id": 2, "email": bson::Bson::Null }])
    }
}

#[async_trait]
impl DocumentHandle for FakeHandle {
    async fn collections(&self) -> DriverResult<Vec<CollectionInfo>> {
        self.touch();
        Ok(vec![
            CollectionInfo {
                name: "orders".to_string(),
                collection_type: CollectionType::Collection,
            },
            CollectionInfo {
                name: "big_orders".to_string(),
                collection_type: CollectionType::View,
            },
            CollectionInfo {
                name: "metrics".to_string(),
                collection_type: CollectionType::Other,
            },
        ])
    }

    async fn run_command(&self, command: Document) -> DriverResult<Document> {
        self.touch();
        self.commands.lock().push(command.clone());
        let scripted = self.command_replies.lock().pop_front();
        Ok(scripted.unwrap_or_else(|| doc! { "ok": 1.0, "echo": command }))
    }
}
