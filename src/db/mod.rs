//! Database layer
//!
//! The document collections live in SQLite (default) or MySQL, selected by
//! configuration. One pool is opened at startup; every request borrows it
//! through a [`DocumentStore`] session.
//!
//! # Usage
//!
//! ```ignore
//! use sitedesk::config::DatabaseConfig;
//! use sitedesk::db::{DocumentStore, collection::BLOG_ENTRIES};
//!
//! let store = DocumentStore::connect(&DatabaseConfig::default()).await?;
//! let count = store
//!     .with_session(&BLOG_ENTRIES, |collection| async move { collection.count().await })
//!     .await?;
//! ```

pub mod collection;
pub mod migrations;
pub mod pool;
pub mod repositories;
pub mod session;

pub use collection::{Collection, CollectionSpec, InsertManySummary};
pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
pub use session::{DocumentStore, StoreError, StoreResult};
