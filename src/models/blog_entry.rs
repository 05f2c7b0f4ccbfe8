//! Blog entry model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A blog entry as stored in the `blogEntries` collection
///
/// Only the key and the comment thread are interpreted; every other field
/// (title, body, dates, ...) is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogEntry {
    #[serde(rename = "entryID")]
    pub entry_id: String,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl BlogEntry {
    pub fn new(entry_id: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            comments: Vec::new(),
            content: Map::new(),
        }
    }

    /// Attach an opaque content field
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.content.insert(name.into(), value);
        self
    }
}

/// A reader comment; position in the thread is its only identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub user_name: String,
    pub comment_content: String,
}

/// Comment submission as received from a reader
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub comment_content: String,
}

impl From<NewComment> for Comment {
    fn from(input: NewComment) -> Self {
        Self {
            user_name: input.user_name,
            comment_content: input.comment_content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_opaque_fields_pass_through() {
        let raw = json!({
            "entryID": "rust-notes",
            "title": "Rust notes",
            "tags": ["rust", "async"],
            "comments": [{ "userName": "ada", "commentContent": "Nice post" }]
        });

        let entry: BlogEntry = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(entry.entry_id, "rust-notes");
        assert_eq!(entry.comments.len(), 1);
        assert_eq!(entry.content["tags"], json!(["rust", "async"]));

        assert_eq!(serde_json::to_value(&entry).unwrap(), raw);
    }

    #[test]
    fn test_missing_comments_default_to_empty() {
        let entry: BlogEntry = serde_json::from_value(json!({ "entryID": "bare" })).unwrap();
        assert!(entry.comments.is_empty());
    }

    #[test]
    fn test_entry_id_is_required() {
        let result = serde_json::from_value::<BlogEntry>(json!({ "title": "orphan" }));
        assert!(result.is_err());
    }
}
