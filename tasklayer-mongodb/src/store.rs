use async_trait::async_trait;
use bson::{Document, doc};
use futures::TryStreamExt;
use mongodb::{Client, Collection, error::Error as MongoError, options::ClientOptions};
use tracing::{debug, warn};

use tasklayer_core::{
    backend::{Backend, BackendBuilder, DocumentDriver},
    error::{StoreError, StoreResult},
    page::Window,
    schema::DOCUMENT_ID_FIELD,
    transaction::{DocumentWrite, TransactionOutcome},
};

fn backend_error(err: MongoError) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Document driver backed by a MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoDbDriver {
    client: Client,
    database: String,
}

impl MongoDbDriver {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    pub fn builder(uri: &str, database: &str) -> MongoDbDriverBuilder {
        MongoDbDriverBuilder::new(uri, database)
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.client
            .database(&self.database)
            .collection(name)
    }
}

#[async_trait]
impl DocumentDriver for MongoDbDriver {
    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<()> {
        self.collection(collection)
            .insert_one(document)
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>> {
        self.collection(collection)
            .find_one(filter)
            .await
            .map_err(backend_error)
    }

    async fn find(&self, collection: &str, filter: Document, window: Window) -> StoreResult<Vec<Document>> {
        self.collection(collection)
            .find(filter)
            .sort(doc! { DOCUMENT_ID_FIELD: 1 })
            .skip(window.skip())
            .limit(i64::try_from(window.limit).unwrap_or(i64::MAX))
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn update_one(&self, collection: &str, filter: Document, update: Document) -> StoreResult<u64> {
        Ok(self
            .collection(collection)
            .update_one(filter, update)
            .await
            .map_err(backend_error)?
            .matched_count)
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> StoreResult<u64> {
        Ok(self
            .collection(collection)
            .delete_one(filter)
            .await
            .map_err(backend_error)?
            .deleted_count)
    }

    async fn execute_transaction(&self, writes: Vec<DocumentWrite>) -> StoreResult<TransactionOutcome> {
        let mut session = self
            .client
            .start_session()
            .await
            .map_err(backend_error)?;
        session
            .start_transaction()
            .await
            .map_err(backend_error)?;

        for (index, write) in writes.into_iter().enumerate() {
            let result = self
                .collection(write.collection)
                .update_one(write.filter, write.update)
                .session(&mut session)
                .await;

            let matched = match result {
                Ok(result) => result.matched_count,
                Err(err) => {
                    // Abort failures are logged; the update error is returned.
                    if let Err(abort) = session.abort_transaction().await {
                        warn!(error = %abort, "failed to abort transaction");
                    }
                    return Err(backend_error(err));
                }
            };

            if matched == 0 {
                debug!(index, collection = write.collection, "aborting transaction");
                session
                    .abort_transaction()
                    .await
                    .map_err(backend_error)?;
                return Ok(TransactionOutcome::Cancelled { index });
            }
        }

        session
            .commit_transaction()
            .await
            .map_err(backend_error)?;

        Ok(TransactionOutcome::Committed)
    }

    async fn shutdown(&self) -> StoreResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }
}

/// Builder connecting a [`MongoDbDriver`].
pub struct MongoDbDriverBuilder {
    uri: String,
    database: String,
}

impl MongoDbDriverBuilder {
    pub fn new(uri: &str, database: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl BackendBuilder for MongoDbDriverBuilder {
    async fn build(self) -> StoreResult<Backend> {
        let options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| StoreError::Initialization(e.to_string()))?;
        let client = Client::with_options(options).map_err(|e| StoreError::Initialization(e.to_string()))?;

        debug!(database = %self.database, "connected MongoDB driver");
        Ok(Backend::document(MongoDbDriver::new(client, self.database)))
    }
}
