//! Newsletter repository

use async_trait::async_trait;
use std::sync::Arc;

use super::{from_document, to_document};
use crate::db::collection::{InsertManySummary, NEWSLETTERS};
use crate::db::{DocumentStore, StoreError, StoreResult};
use crate::models::NewsletterRecord;

/// Newsletter repository trait
#[async_trait]
pub trait NewsletterRepository: Send + Sync {
    /// Number of newsletter records
    async fn count(&self) -> StoreResult<u64>;

    /// Get a record by its `newsletterID`
    async fn find_by_id(&self, newsletter_id: i64) -> StoreResult<NewsletterRecord>;

    /// Insert a batch of records, all or nothing
    async fn insert_many(&self, records: Vec<NewsletterRecord>) -> StoreResult<InsertManySummary>;
}

/// SQLx implementation of NewsletterRepository
pub struct SqlxNewsletterRepository {
    store: DocumentStore,
}

impl SqlxNewsletterRepository {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    pub fn boxed(store: DocumentStore) -> Arc<dyn NewsletterRepository> {
        Arc::new(Self::new(store))
    }
}

#[async_trait]
impl NewsletterRepository for SqlxNewsletterRepository {
    async fn count(&self) -> StoreResult<u64> {
        self.store
            .with_session(&NEWSLETTERS, |collection| async move { collection.count().await })
            .await
    }

    async fn find_by_id(&self, newsletter_id: i64) -> StoreResult<NewsletterRecord> {
        let key = newsletter_id.to_string();
        let document = self
            .store
            .with_session(&NEWSLETTERS, |collection| async move {
                collection.find_one(&key).await
            })
            .await?;

        match document {
            Some(document) => from_document(NEWSLETTERS.name, document),
            None => Err(StoreError::NotFound(format!("newsletter {}", newsletter_id))),
        }
    }

    async fn insert_many(&self, records: Vec<NewsletterRecord>) -> StoreResult<InsertManySummary> {
        let documents = records
            .iter()
            .map(|record| to_document(NEWSLETTERS.name, record))
            .collect::<StoreResult<Vec<_>>>()?;

        self.store
            .with_session(&NEWSLETTERS, |collection| async move {
                collection.insert_many(&documents).await
            })
            .await
    }
}
