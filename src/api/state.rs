//! Shared application state

use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{
    BlogEntryRepository, NewsletterRepository, SqlxBlogEntryRepository, SqlxNewsletterRepository,
};
use crate::db::DocumentStore;
use crate::services::{
    CommentService, ContactService, DispatchError, LeadRegistrar, Mailer, NotificationDispatcher,
    RecaptchaVerifier,
};

/// Everything a handler needs; cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub store: DocumentStore,
    pub blog_entries: Arc<dyn BlogEntryRepository>,
    pub newsletters: Arc<dyn NewsletterRepository>,
    pub comments: Arc<CommentService>,
    pub contact: Arc<ContactService>,
    pub captcha: Arc<RecaptchaVerifier>,
    pub leads: Arc<LeadRegistrar>,
}

impl AppState {
    /// Wire repositories and services around an open store, a mailer and
    /// the shared HTTP client.
    pub fn new(
        config: &Config,
        store: DocumentStore,
        mailer: Arc<dyn Mailer>,
        http: reqwest::Client,
    ) -> Result<Self, DispatchError> {
        let dispatcher = Arc::new(NotificationDispatcher::new(mailer, &config.mail)?);
        let blog_entries = SqlxBlogEntryRepository::boxed(store.clone());

        Ok(Self {
            newsletters: SqlxNewsletterRepository::boxed(store.clone()),
            comments: Arc::new(CommentService::new(blog_entries.clone(), dispatcher.clone())),
            contact: Arc::new(ContactService::new(dispatcher)),
            captcha: Arc::new(RecaptchaVerifier::new(http.clone(), config.verifier.clone())),
            leads: Arc::new(LeadRegistrar::new(http, config.crm.clone())),
            blog_entries,
            store,
        })
    }
}
