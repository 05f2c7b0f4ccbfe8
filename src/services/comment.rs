//! Comment submission
//!
//! Validate, locate the entry, append atomically, then alert the operator.
//! The alert runs on its own task and never changes the outcome of the
//! submission.

use std::sync::Arc;
use tera::Context;

use super::email::{EmailTemplate, NotificationDispatcher};
use super::error::ServiceError;
use super::validation::{Rule, Validator, MIN_COMMENT_LEN, MIN_USER_NAME_LEN};
use crate::db::repositories::{BlogEntryRepository, COMMENTS_FIELD};
use crate::models::{BlogEntry, Comment, NewComment};

/// Comment service
pub struct CommentService {
    repo: Arc<dyn BlogEntryRepository>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn BlogEntryRepository>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { repo, dispatcher }
    }

    /// Append a comment to entry `entry_id` and return the updated entry.
    pub async fn submit(&self, entry_id: &str, input: NewComment) -> Result<BlogEntry, ServiceError> {
        validate(&input)?;

        // Existence check first so an unknown entry never reaches the write path.
        self.repo.find_by_id(entry_id).await?;

        let comment = Comment::from(input);
        let value = serde_json::to_value(&comment)
            .map_err(|e| ServiceError::StoreUnavailable(format!("Failed to encode comment: {}", e)))?;
        let updated = self.repo.append_to_array(entry_id, COMMENTS_FIELD, value).await?;

        tracing::info!(entry_id = %entry_id, comments = updated.comments.len(), "Comment added");
        self.spawn_alert(entry_id, &comment);

        Ok(updated)
    }

    fn spawn_alert(&self, entry_id: &str, comment: &Comment) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let entry_id = entry_id.to_string();
        let subject = format!("New Comment - {}", entry_id);

        let mut fields = Context::new();
        fields.insert("entry_id", &entry_id);
        fields.insert("user_name", &comment.user_name);
        fields.insert("comment_content", &comment.comment_content);

        tokio::spawn(async move {
            match dispatcher
                .notify_operator(EmailTemplate::NewCommentAlert, &subject, &fields)
                .await
            {
                Ok(receipt) => {
                    tracing::info!(entry_id = %entry_id, message_id = %receipt.message_id, "Comment alert sent")
                }
                Err(e) => {
                    tracing::warn!(entry_id = %entry_id, error = %e, "Failed to send comment alert")
                }
            }
        });
    }
}

fn validate(input: &NewComment) -> Result<(), ServiceError> {
    Validator::new()
        .check("userName", &input.user_name, &[Rule::MinLength(MIN_USER_NAME_LEN)])
        .check("commentContent", &input.comment_content, &[Rule::MinLength(MIN_COMMENT_LEN)])
        .finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxBlogEntryRepository;
    use crate::db::{DocumentStore, InsertManySummary, StoreResult};
    use crate::services::email::test_support::{dispatcher, RecordingMailer};
    use crate::services::email::OutgoingMail;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Counts calls and delegates to a real repository
    struct CountingRepo {
        inner: SqlxBlogEntryRepository,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BlogEntryRepository for CountingRepo {
        async fn find_by_id(&self, entry_id: &str) -> StoreResult<BlogEntry> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_id(entry_id).await
        }

        async fn find_all(&self) -> StoreResult<Vec<BlogEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_all().await
        }

        async fn insert_many(&self, entries: Vec<BlogEntry>) -> StoreResult<InsertManySummary> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.insert_many(entries).await
        }

        async fn append_to_array(&self, entry_id: &str, field: &str, value: Value) -> StoreResult<BlogEntry> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.append_to_array(entry_id, field, value).await
        }
    }

    type Fixture = (
        CommentService,
        Arc<CountingRepo>,
        Arc<RecordingMailer>,
        UnboundedReceiver<OutgoingMail>,
    );

    async fn setup(fail_mail: bool) -> Fixture {
        let store = DocumentStore::connect_in_memory().await.unwrap();
        let inner = SqlxBlogEntryRepository::new(store);
        inner
            .insert_many(vec![BlogEntry::new("hello-world")])
            .await
            .unwrap();

        let repo = Arc::new(CountingRepo {
            inner,
            calls: AtomicUsize::new(0),
        });
        let (mailer, rx) = RecordingMailer::new(fail_mail);
        let service = CommentService::new(repo.clone(), dispatcher(mailer.clone()));
        (service, repo, mailer, rx)
    }

    fn new_comment(user: &str, content: &str) -> NewComment {
        NewComment {
            user_name: user.to_string(),
            comment_content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_submit_appends_exactly_one_comment() {
        let (service, _repo, _mailer, _rx) = setup(false).await;

        let updated = service
            .submit("hello-world", new_comment("reader", "Great article"))
            .await
            .unwrap();

        assert_eq!(updated.comments.len(), 1);
        assert_eq!(
            updated.comments[0],
            Comment {
                user_name: "reader".to_string(),
                comment_content: "Great article".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_short_user_name_never_touches_store() {
        let (service, repo, mailer, _rx) = setup(false).await;

        let result = service.submit("hello-world", new_comment("ab", "Great article")).await;

        match result {
            Err(ServiceError::Validation(errors)) => assert_eq!(errors.fields(), vec!["userName"]),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(repo.calls.load(Ordering::SeqCst), 0);
        assert_eq!(mailer.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_entry_is_not_found() {
        let (service, repo, mailer, _rx) = setup(false).await;

        let result = service.submit("missing", new_comment("reader", "Great article")).await;

        assert!(matches!(result, Err(ServiceError::NotFound(_))));
        // Only the lookup ran; no write.
        assert_eq!(repo.calls.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mailer.calls(), 0);
    }

    #[tokio::test]
    async fn test_failing_mailer_does_not_fail_submission() {
        let (service, _repo, mailer, mut rx) = setup(true).await;

        let updated = service
            .submit("hello-world", new_comment("reader", "Great article"))
            .await
            .unwrap();
        assert_eq!(updated.comments.len(), 1);

        // The alert was still attempted.
        let sent = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent.subject, "New Comment - hello-world");
        assert_eq!(mailer.calls(), 1);
    }

    #[tokio::test]
    async fn test_alert_escapes_comment_markup() {
        let (service, _repo, _mailer, mut rx) = setup(false).await;

        service
            .submit("hello-world", new_comment("reader", "<img src=x onerror=alert(1)>"))
            .await
            .unwrap();

        let sent = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent.to, "site@example.com");
        assert!(!sent.html.contains("<img"));
        assert!(sent.html.contains("&lt;img"));
    }
}
