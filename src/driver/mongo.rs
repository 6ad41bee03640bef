//! MongoDB handle

use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::results::CollectionType as MongoCollectionType;
use mongodb::{Client, Database};
use url::Url;

use super::{
    CollectionInfo, CollectionType, DatabaseHandle, DatabaseKind, DocumentHandle, DriverResult,
    Filter,
};

/// Database used when the connection URL names none.
const DEFAULT_DATABASE: &str = "test";

pub struct MongoHandle {
    client: Client,
    database: Database,
}

impl MongoHandle {
    /// Connect and ping, so a bad URL or unreachable server fails here
    /// rather than on the first action.
    pub async fn connect(url: &Url) -> DriverResult<Self> {
        let client = Client::with_uri_str(url.as_str()).await?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));
        database.run_command(doc! { "ping": 1 }).await?;

        tracing::debug!("Connected to MongoDB database {}", database.name());
        Ok(Self { client, database })
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.database.collection(name)
    }
}

#[async_trait]
impl DatabaseHandle for MongoHandle {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Document
    }

    async fn databases(&self) -> DriverResult<Vec<String>> {
        Ok(self.client.list_database_names().await?)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> DriverResult<u64> {
        let result = self.collection(table).delete_many(filter.to_document()).await?;
        Ok(result.deleted_count)
    }

    async fn update_one(&self, table: &str, filter: &Filter, update: &Document) -> DriverResult<u64> {
        let result = self
            .collection(table)
            .update_one(filter.to_document(), doc! { "$set": update.clone() })
            .await?;
        Ok(result.modified_count)
    }

    async fn close(&self) -> DriverResult<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }

    fn as_document(&self) -> Option<&dyn DocumentHandle> {
        Some(self)
    }
}

#[async_trait]
impl DocumentHandle for MongoHandle {
    async fn collections(&self) -> DriverResult<Vec<CollectionInfo>> {
        let specs: Vec<_> = self.database.list_collections().await?.try_collect().await?;
        Ok(specs
            .into_iter()
            .map(|spec| CollectionInfo {
                name: spec.name,
                collection_type: match spec.collection_type {
                    MongoCollectionType::Collection => CollectionType::Collection,
                    MongoCollectionType::View => CollectionType::View,
                    _ => CollectionType::Other,
                },
            })
            .collect())
    }

    async fn run_command(&self, command: Document) -> DriverResult<Document> {
        Ok(self.database.run_command(command).await?)
    }
}
