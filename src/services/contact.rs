//! Contact form relay

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tera::Context;

use super::email::{EmailTemplate, NotificationDispatcher};
use super::error::ServiceError;
use super::validation::{Rule, Validator, MIN_MESSAGE_LEN, MIN_SUBJECT_LEN};

const DEFAULT_SENDER_NAME: &str = "Anonymous";
const DEFAULT_SUBJECT: &str = "[No subject]";
const DEFAULT_MESSAGE: &str = "[No message]";

/// Contact form submission
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

/// Message ready to hand to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMessage {
    pub sender_name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl ContactMessage {
    /// Fill in placeholders for anything the sender left out.
    pub fn compose(request: ContactRequest) -> Self {
        fn or_default(value: Option<String>, default: &str) -> String {
            value
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        }

        Self {
            sender_name: or_default(request.sender_name, DEFAULT_SENDER_NAME),
            email: request.email.unwrap_or_default(),
            subject: or_default(request.subject, DEFAULT_SUBJECT),
            message: or_default(request.msg, DEFAULT_MESSAGE),
        }
    }

    fn fields(&self) -> Context {
        let mut fields = Context::new();
        fields.insert("sender_name", &self.sender_name);
        fields.insert("email", &self.email);
        fields.insert("message", &self.message);
        fields
    }
}

/// Acknowledgement returned to the sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactConfirmation {
    pub msg: String,
}

/// Contact service
pub struct ContactService {
    dispatcher: Arc<NotificationDispatcher>,
}

impl ContactService {
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Validate the form and mail it to the operator. Delivery failure is
    /// reported to the sender.
    pub async fn relay(&self, request: ContactRequest) -> Result<ContactConfirmation, ServiceError> {
        Validator::new()
            .check("email", request.email.as_deref().unwrap_or_default(), &[Rule::Email])
            .check("subject", request.subject.as_deref().unwrap_or_default(), &[Rule::MinLength(MIN_SUBJECT_LEN)])
            .check("msg", request.msg.as_deref().unwrap_or_default(), &[Rule::MinLength(MIN_MESSAGE_LEN)])
            .finish()?;

        let message = ContactMessage::compose(request);

        let receipt = self
            .dispatcher
            .notify_operator(EmailTemplate::ContactRequest, &message.subject, &message.fields())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to relay contact message");
                ServiceError::DispatchFailed(e.to_string())
            })?;

        tracing::info!(message_id = %receipt.message_id, "Contact message relayed");
        Ok(ContactConfirmation {
            msg: format!("{} your contact message has been sent", message.sender_name),
        })
    }
}
