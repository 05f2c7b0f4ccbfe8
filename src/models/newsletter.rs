//! Newsletter model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A newsletter issue in the `newsletters` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsletterRecord {
    #[serde(rename = "newsletterID")]
    pub newsletter_id: i64,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl NewsletterRecord {
    pub fn new(newsletter_id: i64) -> Self {
        Self {
            newsletter_id,
            content: Map::new(),
        }
    }
}
