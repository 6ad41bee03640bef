use std::sync::Arc;

use bson::{Bson, Document};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use url::Url;

use super::cursor::drain_cursor;
use super::transport::connect_websocket;
use super::{ConnectionState, Correlator};
use crate::protocol::{
    relax, Action, ClientError, CommandPayload, DecodeOptions, ProtocolError, UpdateItem,
};

/// Column description returned by `tableInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(rename = "isOptional")]
    pub is_optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    #[serde(rename = "primaryKey")]
    pub primary_key: Vec<String>,
    pub columns: Vec<ColumnInfo>,
}

/// Typed handle on one relay socket.
///
/// Cloning is cheap and every clone shares the same socket, so calls from
/// several tasks are multiplexed over it.
#[derive(Clone)]
pub struct DbBrowserClient {
    correlator: Arc<Correlator>,
}

impl DbBrowserClient {
    /// Open a socket to `url` (e.g. `ws://localhost:8080/ws`).
    pub async fn connect_to(url: &str) -> Result<Self, ClientError> {
        let correlator = connect_websocket(url).await?;
        Ok(Self { correlator })
    }

    /// Wrap an existing correlator, e.g. one driven by a custom transport.
    pub fn from_correlator(correlator: Arc<Correlator>) -> Self {
        Self { correlator }
    }

    pub fn state(&self) -> ConnectionState {
        self.correlator.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.correlator.subscribe()
    }

    /// Close the socket. Calls still waiting for a reply stay pending;
    /// new calls fail with `NotOpen` from here on.
    pub fn close(&self) {
        self.correlator.set_state(ConnectionState::Closed);
        self.correlator.shutdown.notify_one();
    }

    /// Send a raw request payload and wait for its reply data.
    pub async fn call(
        &self,
        payload: Document,
        options: Option<DecodeOptions>,
    ) -> Result<Bson, ClientError> {
        self.correlator.call(payload, options).await
    }

    async fn perform(&self, action: Action, options: Option<DecodeOptions>) -> Result<Bson, ClientError> {
        let payload = action.to_document()?;
        self.call(payload, options).await
    }

    fn extract<T: DeserializeOwned>(data: Bson) -> Result<T, ClientError> {
        bson::from_bson(data).map_err(|e| ClientError::UnexpectedResponse(e.to_string()))
    }

    /// Ask the relay to open a database handle for this socket.
    pub async fn connect(&self, url: &str) -> Result<(), ClientError> {
        let url = Url::parse(url).map_err(|_| ProtocolError::InvalidUrl)?;
        self.perform(Action::Connect { url }, None).await?;
        Ok(())
    }

    /// Switch the session to another database on the same server.
    pub async fn reconnect(&self, database: &str) -> Result<(), ClientError> {
        self.perform(
            Action::Reconnect {
                database: database.to_string(),
            },
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn databases(&self) -> Result<Vec<String>, ClientError> {
        Self::extract(self.perform(Action::Databases, None).await?)
    }

    pub async fn tables(&self) -> Result<Vec<String>, ClientError> {
        Self::extract(self.perform(Action::Tables, None).await?)
    }

    pub async fn views(&self) -> Result<Vec<String>, ClientError> {
        Self::extract(self.perform(Action::Views, None).await?)
    }

    pub async fn materialized_views(&self) -> Result<Vec<String>, ClientError> {
        Self::extract(self.perform(Action::MaterializedViews, None).await?)
    }

    pub async fn table_info(&self, table: &str) -> Result<TableInfo, ClientError> {
        let data = self
            .perform(
                Action::TableInfo {
                    table: table.to_string(),
                },
                None,
            )
            .await?;
        Self::extract(data)
    }

    /// Delete every row matching any of the key documents.
    pub async fn delete_rows(&self, table: &str, keys: Vec<Document>) -> Result<(), ClientError> {
        self.perform(
            Action::DeleteRows {
                table: table.to_string(),
                keys,
            },
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn update_items(&self, table: &str, items: Vec<UpdateItem>) -> Result<(), ClientError> {
        self.perform(
            Action::UpdateItems {
                table: table.to_string(),
                items,
            },
            None,
        )
        .await?;
        Ok(())
    }

    /// Run raw SQL text. The reply is the list of result rows.
    pub async fn run_sql_command(
        &self,
        sql: &str,
        options: Option<DecodeOptions>,
    ) -> Result<Bson, ClientError> {
        self.perform(
            Action::RunCommand {
                command: CommandPayload::Sql(sql.to_string()),
            },
            options,
        )
        .await
    }

    /// Run a document-store command, draining any cursor it opens.
    ///
    /// The command and every follow-up batch are decoded strictly so cursor
    /// ids stay exact; relaxed numbers are applied to the final result when
    /// the caller asked for them.
    pub async fn run_document_command(
        &self,
        command: Document,
        options: Option<DecodeOptions>,
    ) -> Result<Bson, ClientError> {
        let strict = Some(DecodeOptions::strict());
        let first = self
            .perform(
                Action::RunCommand {
                    command: CommandPayload::Document(command),
                },
                strict,
            )
            .await?;

        let result = drain_cursor(first, |get_more| {
            let client = self.clone();
            async move {
                client
                    .perform(
                        Action::RunCommand {
                            command: CommandPayload::Document(get_more),
                        },
                        strict,
                    )
                    .await
            }
        })
        .await?;

        if options.unwrap_or_default().relaxed {
            Ok(relax(result))
        } else {
            Ok(result)
        }
    }
}
