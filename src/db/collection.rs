//! Collection handles
//!
//! A collection is a table of JSON documents keyed by one field of the
//! document (`entryID` for blog entries, `newsletterID` for newsletters).
//! The key is stored as text in `doc_key`; the full document lives in `body`.
//!
//! Array appends are a single store-level statement, so concurrent appends
//! on the same document never overwrite each other.

use serde::Serialize;
use serde_json::Value;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::future::Future;
use std::time::Duration;

use crate::db::session::{classify, StoreError, StoreResult};
use crate::db::DynDatabasePool;

/// Attempts for a write that hits lock contention
const MAX_WRITE_ATTEMPTS: u32 = 3;
const WRITE_RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Static description of a collection
#[derive(Debug)]
pub struct CollectionSpec {
    /// Public collection name
    pub name: &'static str,
    /// Backing table
    pub table: &'static str,
    /// Document field holding the key
    pub key_field: &'static str,
}

pub static BLOG_ENTRIES: CollectionSpec = CollectionSpec {
    name: "blogEntries",
    table: "blog_entries",
    key_field: "entryID",
};

pub static NEWSLETTERS: CollectionSpec = CollectionSpec {
    name: "newsletters",
    table: "newsletters",
    key_field: "newsletterID",
};

/// Result of a bulk insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertManySummary {
    pub acknowledged: bool,
    pub inserted_count: usize,
    pub inserted_ids: Vec<String>,
}

/// Handle to one collection, valid for the session that created it
pub struct Collection {
    pool: DynDatabasePool,
    spec: &'static CollectionSpec,
}

impl Collection {
    pub(crate) fn new(pool: DynDatabasePool, spec: &'static CollectionSpec) -> Self {
        Self { pool, spec }
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// Render the key of `document` the way it is stored.
    pub fn key_of(&self, document: &Value) -> StoreResult<String> {
        match document.get(self.spec.key_field) {
            Some(Value::String(key)) if !key.is_empty() => Ok(key.clone()),
            Some(Value::Number(key)) => Ok(key.to_string()),
            _ => Err(StoreError::InvalidDocument(format!(
                "document in '{}' needs a string or numeric '{}'",
                self.spec.name, self.spec.key_field
            ))),
        }
    }

    pub async fn find_one(&self, key: &str) -> StoreResult<Option<Value>> {
        let body = if let Some(pool) = self.pool.as_sqlite() {
            find_one_sqlite(pool, self.spec, key).await
        } else if let Some(pool) = self.pool.as_mysql() {
            find_one_mysql(pool, self.spec, key).await
        } else {
            Err(unsupported_pool())
        }?;
        body.map(|body| self.decode(&body)).transpose()
    }

    /// Every document, in insertion order.
    pub async fn find_all(&self) -> StoreResult<Vec<Value>> {
        let bodies = if let Some(pool) = self.pool.as_sqlite() {
            find_all_sqlite(pool, self.spec).await
        } else if let Some(pool) = self.pool.as_mysql() {
            find_all_mysql(pool, self.spec).await
        } else {
            Err(unsupported_pool())
        }?;
        bodies.iter().map(|body| self.decode(body)).collect()
    }

    pub async fn count(&self) -> StoreResult<u64> {
        let sql = format!("SELECT COUNT(*) AS count FROM {}", self.spec.table);
        let count: i64 = if let Some(pool) = self.pool.as_sqlite() {
            sqlx::query(&sql)
                .fetch_one(pool)
                .await
                .map_err(|e| classify("count documents", e))?
                .get("count")
        } else if let Some(pool) = self.pool.as_mysql() {
            sqlx::query(&sql)
                .fetch_one(pool)
                .await
                .map_err(|e| classify("count documents", e))?
                .get("count")
        } else {
            return Err(unsupported_pool());
        };
        Ok(count.max(0) as u64)
    }

    /// Insert all documents or none of them.
    pub async fn insert_many(&self, documents: &[Value]) -> StoreResult<InsertManySummary> {
        let mut rows = Vec::with_capacity(documents.len());
        for document in documents {
            if !document.is_object() {
                return Err(StoreError::InvalidDocument(format!(
                    "documents in '{}' must be JSON objects",
                    self.spec.name
                )));
            }
            rows.push((self.key_of(document)?, document.to_string()));
        }

        if rows.is_empty() {
            return Ok(InsertManySummary {
                acknowledged: true,
                inserted_count: 0,
                inserted_ids: Vec::new(),
            });
        }

        if let Some(pool) = self.pool.as_sqlite() {
            insert_many_sqlite(pool, self.spec, &rows).await?;
        } else if let Some(pool) = self.pool.as_mysql() {
            insert_many_mysql(pool, self.spec, &rows).await?;
        } else {
            return Err(unsupported_pool());
        }

        Ok(InsertManySummary {
            acknowledged: true,
            inserted_count: rows.len(),
            inserted_ids: rows.into_iter().map(|(key, _)| key).collect(),
        })
    }

    /// Atomically append `value` to the array `field` of the document `key`
    /// and return the document as it stands after the write.
    ///
    /// A missing array is created. Returns `Ok(None)` when no document has
    /// that key. Lock contention is retried a bounded number of times before
    /// surfacing as [`StoreError::Conflict`].
    pub async fn push(&self, key: &str, field: &str, value: &Value) -> StoreResult<Option<Value>> {
        let path = field_path(field)?;
        let encoded = value.to_string();

        let body = retry_on_conflict(self.spec.name, key, || self.push_once(key, &path, &encoded)).await?;
        body.map(|body| self.decode(&body)).transpose()
    }

    async fn push_once(&self, key: &str, path: &str, encoded: &str) -> StoreResult<Option<String>> {
        if let Some(pool) = self.pool.as_sqlite() {
            push_sqlite(pool, self.spec, key, path, encoded).await
        } else if let Some(pool) = self.pool.as_mysql() {
            push_mysql(pool, self.spec, key, path, encoded).await
        } else {
            Err(unsupported_pool())
        }
    }

    fn decode(&self, body: &str) -> StoreResult<Value> {
        serde_json::from_str(body).map_err(|e| {
            StoreError::Corrupt(format!("document in '{}' is not valid JSON: {}", self.spec.name, e))
        })
    }
}

/// Run `write` until it stops reporting lock contention, at most
/// [`MAX_WRITE_ATTEMPTS`] times, backing off a little longer after each try.
async fn retry_on_conflict<T, F, Fut>(collection: &str, key: &str, mut write: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 1;
    loop {
        match write().await {
            Err(StoreError::Conflict(reason)) if attempt < MAX_WRITE_ATTEMPTS => {
                tracing::debug!(
                    collection,
                    key,
                    attempt,
                    reason = %reason,
                    "Write hit lock contention, retrying"
                );
                tokio::time::sleep(WRITE_RETRY_BACKOFF * attempt).await;
                attempt += 1;
            }
            Err(StoreError::Conflict(reason)) => {
                return Err(StoreError::Conflict(format!(
                    "gave up after {} attempts: {}",
                    attempt, reason
                )));
            }
            other => return other,
        }
    }
}

/// JSON path for a top-level field; only plain identifiers are accepted.
fn field_path(field: &str) -> StoreResult<String> {
    let mut chars = field.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(format!("$.{}", field))
    } else {
        Err(StoreError::InvalidDocument(format!("'{}' is not a valid field name", field)))
    }
}

fn unsupported_pool() -> StoreError {
    StoreError::Unavailable("unsupported database pool".to_string())
}

// SQLite implementations
async fn find_one_sqlite(pool: &SqlitePool, spec: &CollectionSpec, key: &str) -> StoreResult<Option<String>> {
    let sql = format!("SELECT body FROM {} WHERE doc_key = ?", spec.table);
    let row = sqlx::query(&sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(|e| classify("find document", e))?;
    Ok(row.map(|r| r.get("body")))
}

async fn find_all_sqlite(pool: &SqlitePool, spec: &CollectionSpec) -> StoreResult<Vec<String>> {
    let sql = format!("SELECT body FROM {} ORDER BY rowid", spec.table);
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .map_err(|e| classify("list documents", e))?;
    Ok(rows.iter().map(|r| r.get("body")).collect())
}

async fn insert_many_sqlite(pool: &SqlitePool, spec: &CollectionSpec, rows: &[(String, String)]) -> StoreResult<()> {
    let sql = format!("INSERT INTO {} (doc_key, body) VALUES (?, ?)", spec.table);
    let mut tx = pool.begin().await.map_err(|e| classify("begin insert", e))?;
    for (key, body) in rows {
        sqlx::query(&sql)
            .bind(key)
            .bind(body)
            .execute(&mut *tx)
            .await
            .map_err(|e| duplicate_key(classify("insert document", e), key))?;
    }
    tx.commit().await.map_err(|e| classify("commit insert", e))
}

async fn push_sqlite(
    pool: &SqlitePool,
    spec: &CollectionSpec,
    key: &str,
    path: &str,
    value: &str,
) -> StoreResult<Option<String>> {
    let sql = format!(
        "UPDATE {} SET body = json_set(body, ?, json_insert(COALESCE(json_extract(body, ?), '[]'), '$[#]', json(?))) \
         WHERE doc_key = ? RETURNING body",
        spec.table
    );
    let row = sqlx::query(&sql)
        .bind(path)
        .bind(path)
        .bind(value)
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(|e| classify("append to document", e))?;
    Ok(row.map(|r| r.get("body")))
}

// MySQL implementations
async fn find_one_mysql(pool: &MySqlPool, spec: &CollectionSpec, key: &str) -> StoreResult<Option<String>> {
    let sql = format!("SELECT CAST(body AS CHAR) AS body FROM {} WHERE doc_key = ?", spec.table);
    let row = sqlx::query(&sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(|e| classify("find document", e))?;
    Ok(row.map(|r| r.get("body")))
}

async fn find_all_mysql(pool: &MySqlPool, spec: &CollectionSpec) -> StoreResult<Vec<String>> {
    let sql = format!("SELECT CAST(body AS CHAR) AS body FROM {} ORDER BY seq", spec.table);
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .map_err(|e| classify("list documents", e))?;
    Ok(rows.iter().map(|r| r.get("body")).collect())
}

async fn insert_many_mysql(pool: &MySqlPool, spec: &CollectionSpec, rows: &[(String, String)]) -> StoreResult<()> {
    let sql = format!("INSERT INTO {} (doc_key, body) VALUES (?, CAST(? AS JSON))", spec.table);
    let mut tx = pool.begin().await.map_err(|e| classify("begin insert", e))?;
    for (key, body) in rows {
        sqlx::query(&sql)
            .bind(key)
            .bind(body)
            .execute(&mut *tx)
            .await
            .map_err(|e| duplicate_key(classify("insert document", e), key))?;
    }
    tx.commit().await.map_err(|e| classify("commit insert", e))
}

async fn push_mysql(
    pool: &MySqlPool,
    spec: &CollectionSpec,
    key: &str,
    path: &str,
    value: &str,
) -> StoreResult<Option<String>> {
    let update = format!(
        "UPDATE {} SET body = JSON_SET(body, ?, JSON_ARRAY_APPEND(COALESCE(JSON_EXTRACT(body, ?), JSON_ARRAY()), '$', CAST(? AS JSON))) \
         WHERE doc_key = ?",
        spec.table
    );
    let select = format!("SELECT CAST(body AS CHAR) AS body FROM {} WHERE doc_key = ?", spec.table);

    // The row lock taken by the UPDATE is held until commit, so the read-back
    // sees exactly this append.
    let mut tx = pool.begin().await.map_err(|e| classify("begin append", e))?;
    sqlx::query(&update)
        .bind(path)
        .bind(path)
        .bind(value)
        .bind(key)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify("append to document", e))?;
    let row = sqlx::query(&select)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| classify("read appended document", e))?;
    tx.commit().await.map_err(|e| classify("commit append", e))?;
    Ok(row.map(|r| r.get("body")))
}

fn duplicate_key(err: StoreError, key: &str) -> StoreError {
    match err {
        StoreError::Duplicate(_) => StoreError::Duplicate(key.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, DatabaseDriver};
    use crate::db::session::DocumentStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn seeded_store() -> DocumentStore {
        let store = DocumentStore::connect_in_memory().await.unwrap();
        store
            .with_session(&BLOG_ENTRIES, |collection| async move {
                collection
                    .insert_many(&[
                        json!({ "entryID": "first", "title": "First", "comments": [] }),
                        json!({ "entryID": "second", "title": "Second" }),
                    ])
                    .await
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_find_one_and_missing_key() {
        let store = seeded_store().await;

        let (found, missing) = store
            .with_session(&BLOG_ENTRIES, |collection| async move {
                Ok::<_, StoreError>((collection.find_one("first").await?, collection.find_one("nope").await?))
            })
            .await
            .unwrap();

        assert_eq!(found.unwrap()["title"], "First");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_find_all_keeps_insertion_order() {
        let store = seeded_store().await;

        let documents = store
            .with_session(&BLOG_ENTRIES, |collection| async move { collection.find_all().await })
            .await
            .unwrap();

        let keys: Vec<_> = documents.iter().map(|d| d["entryID"].as_str().unwrap()).collect();
        assert_eq!(keys, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_insert_many_is_all_or_nothing() {
        let store = seeded_store().await;

        let result = store
            .with_session(&BLOG_ENTRIES, |collection| async move {
                collection
                    .insert_many(&[
                        json!({ "entryID": "third" }),
                        json!({ "entryID": "first" }),
                    ])
                    .await
            })
            .await;
        assert_eq!(result, Err(StoreError::Duplicate("first".to_string())));

        let count = store
            .with_session(&BLOG_ENTRIES, |collection| async move { collection.count().await })
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_insert_many_rejects_documents_without_key() {
        let store = DocumentStore::connect_in_memory().await.unwrap();

        let result = store
            .with_session(&BLOG_ENTRIES, |collection| async move {
                collection.insert_many(&[json!({ "title": "no key" })]).await
            })
            .await;

        assert!(matches!(result, Err(StoreError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn test_numeric_keys_are_stored_as_text() {
        let store = DocumentStore::connect_in_memory().await.unwrap();

        let summary = store
            .with_session(&NEWSLETTERS, |collection| async move {
                collection.insert_many(&[json!({ "newsletterID": 7, "title": "July" })]).await
            })
            .await
            .unwrap();
        assert_eq!(summary.inserted_ids, vec!["7".to_string()]);

        let found = store
            .with_session(&NEWSLETTERS, |collection| async move { collection.find_one("7").await })
            .await
            .unwrap();
        assert_eq!(found.unwrap()["title"], "July");
    }

    #[tokio::test]
    async fn test_push_appends_and_creates_missing_array() {
        let store = seeded_store().await;

        let (first, second) = store
            .with_session(&BLOG_ENTRIES, |collection| async move {
                let first = collection.push("first", "comments", &json!({ "n": 1 })).await?;
                let second = collection.push("second", "comments", &json!({ "n": 2 })).await?;
                Ok::<_, StoreError>((first, second))
            })
            .await
            .unwrap();

        assert_eq!(first.unwrap()["comments"], json!([{ "n": 1 }]));
        let second = second.unwrap();
        assert_eq!(second["comments"], json!([{ "n": 2 }]));
        assert_eq!(second["title"], "Second");
    }

    #[tokio::test]
    async fn test_push_to_missing_document_returns_none() {
        let store = seeded_store().await;

        let result = store
            .with_session(&BLOG_ENTRIES, |collection| async move {
                collection.push("ghost", "comments", &json!({})).await
            })
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_push_rejects_path_like_field_names() {
        let store = seeded_store().await;

        let result = store
            .with_session(&BLOG_ENTRIES, |collection| async move {
                collection.push("first", "comments[0]", &json!({})).await
            })
            .await;

        assert!(matches!(result, Err(StoreError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn test_keys_match_exactly() {
        let store = seeded_store().await;

        let (upper, summary) = store
            .with_session(&BLOG_ENTRIES, |collection| async move {
                let upper = collection.find_one("First").await?;
                let summary = collection
                    .insert_many(&[json!({ "entryID": "Café" }), json!({ "entryID": "cafe" })])
                    .await?;
                Ok::<_, StoreError>((upper, summary))
            })
            .await
            .unwrap();

        assert!(upper.is_none());
        assert_eq!(summary.inserted_ids, vec!["Café", "cafe"]);
    }

    #[tokio::test]
    #[ignore = "needs a MySQL server in MYSQL_TEST_URL"]
    async fn test_mysql_keys_match_exactly() {
        let Ok(url) = std::env::var("MYSQL_TEST_URL") else {
            return;
        };
        let config = DatabaseConfig {
            driver: DatabaseDriver::Mysql,
            url,
            ..DatabaseConfig::default()
        };
        let store = DocumentStore::connect(&config).await.unwrap();
        let run = std::process::id();

        let (upper, summary) = store
            .with_session(&BLOG_ENTRIES, |collection| async move {
                let summary = collection
                    .insert_many(&[
                        json!({ "entryID": format!("Café-{}", run) }),
                        json!({ "entryID": format!("cafe-{}", run) }),
                    ])
                    .await?;
                let upper = collection.find_one(&format!("CAFE-{}", run)).await?;
                Ok::<_, StoreError>((upper, summary))
            })
            .await
            .unwrap();

        assert_eq!(summary.inserted_count, 2);
        assert!(upper.is_none());
        store.close().await;
    }

    #[tokio::test]
    async fn test_retry_recovers_when_contention_clears() {
        let calls = AtomicU32::new(0);

        let result = retry_on_conflict("blogEntries", "first", || async {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < MAX_WRITE_ATTEMPTS {
                Err(StoreError::Conflict("database is locked".to_string()))
            } else {
                Ok(call)
            }
        })
        .await;

        assert_eq!(result, Ok(MAX_WRITE_ATTEMPTS));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_WRITE_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);

        let result: StoreResult<()> = retry_on_conflict("blogEntries", "first", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Conflict("database is locked".to_string()))
        })
        .await;

        match result {
            Err(StoreError::Conflict(reason)) => {
                assert!(reason.starts_with("gave up after 3 attempts"), "{}", reason);
                assert!(reason.ends_with("database is locked"), "{}", reason);
            }
            other => panic!("expected a conflict, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), MAX_WRITE_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_retry_leaves_other_errors_alone() {
        let calls = AtomicU32::new(0);

        let result: StoreResult<()> = retry_on_conflict("blogEntries", "first", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("connection reset".to_string()))
        })
        .await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_field_path() {
        assert_eq!(field_path("comments").unwrap(), "$.comments");
        assert_eq!(field_path("_meta2").unwrap(), "$._meta2");
        assert!(field_path("").is_err());
        assert!(field_path("2fast").is_err());
        assert!(field_path("a.b").is_err());
    }
}
