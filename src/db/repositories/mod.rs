//! Database repositories
//!
//! One repository per collection. Each call opens its own store session, so
//! a repository holds nothing but a [`DocumentStore`](crate::db::DocumentStore)
//! handle and is cheap to share.

pub mod blog_entry;
pub mod newsletter;

pub use blog_entry::{BlogEntryRepository, SqlxBlogEntryRepository, COMMENTS_FIELD};
pub use newsletter::{NewsletterRepository, SqlxNewsletterRepository};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::db::StoreError;

/// Decode a stored document into its entity.
pub(crate) fn from_document<T: DeserializeOwned>(collection: &str, document: Value) -> Result<T, StoreError> {
    serde_json::from_value(document)
        .map_err(|e| StoreError::Corrupt(format!("{} document: {}", collection, e)))
}

/// Encode an entity as a document.
pub(crate) fn to_document<T: Serialize>(collection: &str, entity: &T) -> Result<Value, StoreError> {
    serde_json::to_value(entity)
        .map_err(|e| StoreError::InvalidDocument(format!("{} document: {}", collection, e)))
}
