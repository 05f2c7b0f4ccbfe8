//! Blog entry repository

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{from_document, to_document};
use crate::db::collection::{InsertManySummary, BLOG_ENTRIES};
use crate::db::{DocumentStore, StoreError, StoreResult};
use crate::models::BlogEntry;

/// Array field holding the comment thread
pub const COMMENTS_FIELD: &str = "comments";

/// Blog entry repository trait
#[async_trait]
pub trait BlogEntryRepository: Send + Sync {
    /// Get an entry by its `entryID`
    async fn find_by_id(&self, entry_id: &str) -> StoreResult<BlogEntry>;

    /// List every entry in insertion order
    async fn find_all(&self) -> StoreResult<Vec<BlogEntry>>;

    /// Insert a batch of entries, all or nothing
    async fn insert_many(&self, entries: Vec<BlogEntry>) -> StoreResult<InsertManySummary>;

    /// Atomically append `value` to an array field and return the updated entry
    async fn append_to_array(&self, entry_id: &str, field: &str, value: Value) -> StoreResult<BlogEntry>;
}

/// SQLx implementation of BlogEntryRepository
pub struct SqlxBlogEntryRepository {
    store: DocumentStore,
}

impl SqlxBlogEntryRepository {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    pub fn boxed(store: DocumentStore) -> Arc<dyn BlogEntryRepository> {
        Arc::new(Self::new(store))
    }
}

fn not_found(entry_id: &str) -> StoreError {
    StoreError::NotFound(format!("blog entry '{}'", entry_id))
}

#[async_trait]
impl BlogEntryRepository for SqlxBlogEntryRepository {
    async fn find_by_id(&self, entry_id: &str) -> StoreResult<BlogEntry> {
        let document = self
            .store
            .with_session(&BLOG_ENTRIES, |collection| async move {
                collection.find_one(entry_id).await
            })
            .await?;

        match document {
            Some(document) => from_document(BLOG_ENTRIES.name, document),
            None => Err(not_found(entry_id)),
        }
    }

    async fn find_all(&self) -> StoreResult<Vec<BlogEntry>> {
        let documents = self
            .store
            .with_session(&BLOG_ENTRIES, |collection| async move { collection.find_all().await })
            .await?;

        documents
            .into_iter()
            .map(|document| from_document(BLOG_ENTRIES.name, document))
            .collect()
    }

    async fn insert_many(&self, entries: Vec<BlogEntry>) -> StoreResult<InsertManySummary> {
        let documents = entries
            .iter()
            .map(|entry| to_document(BLOG_ENTRIES.name, entry))
            .collect::<StoreResult<Vec<_>>>()?;

        let summary = self
            .store
            .with_session(&BLOG_ENTRIES, |collection| async move {
                collection.insert_many(&documents).await
            })
            .await?;

        tracing::info!(count = summary.inserted_count, "Inserted blog entries");
        Ok(summary)
    }

    async fn append_to_array(&self, entry_id: &str, field: &str, value: Value) -> StoreResult<BlogEntry> {
        let document = self
            .store
            .with_session(&BLOG_ENTRIES, |collection| async move {
                collection.push(entry_id, field, &value).await
            })
            .await?;

        match document {
            Some(document) => from_document(BLOG_ENTRIES.name, document),
            None => Err(not_found(entry_id)),
        }
    }
}
