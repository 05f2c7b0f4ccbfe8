//! Outgoing email
//!
//! [`NotificationDispatcher`] renders one of the fixed [`EmailTemplate`]s and
//! hands the result to a [`Mailer`]. The SMTP mailer is built once at startup
//! from [`MailConfig`] and shared; tests swap in their own `Mailer`.
//!
//! Templates are `.html`, so tera escapes every interpolated value and user
//! text cannot inject markup into the message.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use std::time::Duration;
use tera::{Context, Tera};
use thiserror::Error;

use crate::config::MailConfig;

/// Implicit-TLS submission port; every other port upgrades with STARTTLS.
const SMTPS_PORT: u16 = 465;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Mail transport is not configured")]
    NotConfigured,

    #[error("Failed to render email template: {0}")]
    Render(String),

    #[error("Invalid mail address: {0}")]
    Address(String),

    #[error("Mail transport error: {0}")]
    Transport(String),

    #[error("Mail delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Proof of hand-off to the mail server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub message_id: String,
}

/// Mail transport
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `mail`, returning the server's acknowledgement.
    async fn send(&self, mail: OutgoingMail) -> Result<String, DispatchError>;
}

/// SMTP relay with credentials
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, DispatchError> {
        let (username, password) = match (config.username.as_deref(), config.password.as_deref()) {
            (Some(username), Some(password)) if !username.trim().is_empty() => (username, password),
            _ => return Err(DispatchError::NotConfigured),
        };

        let address: Address = username
            .parse()
            .map_err(|e| DispatchError::Address(format!("{}: {}", username, e)))?;
        let from = Mailbox::new(Some(config.from_name.clone()), address);

        let builder = if config.smtp_port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| DispatchError::Transport(format!("Failed to create SMTP transport: {}", e)))?;

        let transport = builder
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .port(config.smtp_port)
            .timeout(Some(config.timeout()))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<String, DispatchError> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| DispatchError::Address(format!("{}: {}", mail.to, e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject)
            .header(ContentType::TEXT_HTML)
            .body(mail.html)
            .map_err(|e| DispatchError::Transport(format!("Failed to build email: {}", e)))?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        Ok(response.message().collect::<Vec<_>>().join(" "))
    }
}

/// Stand-in used when SMTP credentials are missing; every send fails.
pub struct UnconfiguredMailer;

#[async_trait]
impl Mailer for UnconfiguredMailer {
    async fn send(&self, _mail: OutgoingMail) -> Result<String, DispatchError> {
        Err(DispatchError::NotConfigured)
    }
}

/// Build the process-wide mailer. Missing credentials or a bad sender
/// address leave the service running with mail disabled.
pub fn build_mailer(config: &MailConfig) -> Arc<dyn Mailer> {
    match SmtpMailer::from_config(config) {
        Ok(mailer) => {
            tracing::info!(host = %config.smtp_host, port = config.smtp_port, "SMTP mailer ready");
            Arc::new(mailer)
        }
        Err(DispatchError::NotConfigured) => {
            tracing::warn!("SMTP credentials not set; outgoing mail is disabled");
            Arc::new(UnconfiguredMailer)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to set up SMTP mailer; outgoing mail is disabled");
            Arc::new(UnconfiguredMailer)
        }
    }
}

/// The fixed set of message layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    ContactRequest,
    NewCommentAlert,
}

impl EmailTemplate {
    pub fn name(self) -> &'static str {
        match self {
            EmailTemplate::ContactRequest => "contact_request.html",
            EmailTemplate::NewCommentAlert => "new_comment_alert.html",
        }
    }
}

fn load_templates() -> Result<Tera, DispatchError> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        (
            EmailTemplate::ContactRequest.name(),
            include_str!("../../templates/email/contact_request.html"),
        ),
        (
            EmailTemplate::NewCommentAlert.name(),
            include_str!("../../templates/email/new_comment_alert.html"),
        ),
    ])
    .map_err(|e| DispatchError::Render(e.to_string()))?;
    Ok(tera)
}

/// Renders templates and sends them through the shared mailer
pub struct NotificationDispatcher {
    mailer: Arc<dyn Mailer>,
    templates: Tera,
    operator: Option<String>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, config: &MailConfig) -> Result<Self, DispatchError> {
        Ok(Self {
            mailer,
            templates: load_templates()?,
            operator: config.operator().map(str::to_string),
            timeout: config.timeout(),
        })
    }

    pub fn render(&self, template: EmailTemplate, fields: &Context) -> Result<String, DispatchError> {
        self.templates
            .render(template.name(), fields)
            .map_err(|e| DispatchError::Render(format!("{}: {}", template.name(), e)))
    }

    /// Render `template` and deliver it to `recipient` within the mail timeout.
    pub async fn send(
        &self,
        template: EmailTemplate,
        recipient: &str,
        subject: &str,
        fields: &Context,
    ) -> Result<DispatchReceipt, DispatchError> {
        let mail = OutgoingMail {
            to: recipient.to_string(),
            subject: subject.to_string(),
            html: self.render(template, fields)?,
        };

        let message_id = tokio::time::timeout(self.timeout, self.mailer.send(mail))
            .await
            .map_err(|_| DispatchError::Timeout(self.timeout))??;

        tracing::debug!(template = template.name(), message_id = %message_id, "Mail sent");
        Ok(DispatchReceipt { message_id })
    }

    /// Send `template` to the site operator.
    pub async fn notify_operator(
        &self,
        template: EmailTemplate,
        subject: &str,
        fields: &Context,
    ) -> Result<DispatchReceipt, DispatchError> {
        let operator = self.operator.as_deref().ok_or(DispatchError::NotConfigured)?;
        self.send(template, operator, subject, fields).await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_templates_escape_user_input() {
        let (mailer, _rx) = RecordingMailer::new(false);
        let dispatcher = dispatcher(mailer);

        let mut fields = Context::new();
        fields.insert("entry_id", "post-1");
        fields.insert("user_name", "<b>eve</b>");
        fields.insert("comment_content", "<script>alert(1)</script>");

        let html = dispatcher.render(EmailTemplate::NewCommentAlert, &fields).unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&lt;b&gt;eve&lt;&#x2F;b&gt;"));
    }

    #[test]
    fn test_missing_field_is_render_error() {
        let (mailer, _rx) = RecordingMailer::new(false);
        let dispatcher = dispatcher(mailer);

        let result = dispatcher.render(EmailTemplate::ContactRequest, &Context::new());
        assert!(matches!(result, Err(DispatchError::Render(_))));
    }

    #[tokio::test]
    async fn test_notify_operator_uses_configured_address() {
        let (mailer, mut rx) = RecordingMailer::new(false);
        let dispatcher = dispatcher(mailer.clone());

        let mut fields = Context::new();
        fields.insert("sender_name", "Ada");
        fields.insert("email", "ada@example.com");
        fields.insert("message", "Hello there");

        let receipt = dispatcher
            .notify_operator(EmailTemplate::ContactRequest, "Hello", &fields)
            .await
            .unwrap();
        assert_eq!(receipt.message_id, "250 OK");

        let sent = rx.recv().await.unwrap();
        assert_eq!(sent.to, "site@example.com");
        assert_eq!(sent.subject, "Hello");
        assert!(sent.html.contains("Hello there"));
        assert_eq!(mailer.calls(), 1);
    }

    #[tokio::test]
    async fn test_slow_mailer_times_out() {
        struct StalledMailer;

        #[async_trait]
        impl Mailer for StalledMailer {
            async fn send(&self, _mail: OutgoingMail) -> Result<String, DispatchError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("late".to_string())
            }
        }

        let config = MailConfig {
            timeout_secs: 0,
            ..mail_config()
        };
        let dispatcher = NotificationDispatcher::new(Arc::new(StalledMailer), &config).unwrap();

        let mut fields = Context::new();
        fields.insert("entry_id", "p");
        fields.insert("user_name", "abc");
        fields.insert("comment_content", "hello");

        let result = dispatcher
            .send(EmailTemplate::NewCommentAlert, "op@example.com", "New Comment - p", &fields)
            .await;
        assert!(matches!(result, Err(DispatchError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_unconfigured_mailer_always_fails() {
        let result = UnconfiguredMailer
            .send(OutgoingMail {
                to: "a@example.com".into(),
                subject: "s".into(),
                html: "h".into(),
            })
            .await;
        assert!(matches!(result, Err(DispatchError::NotConfigured)));
    }

    #[test]
    fn test_smtp_mailer_requires_credentials() {
        let result = SmtpMailer::from_config(&MailConfig::default());
        assert!(matches!(result, Err(DispatchError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_build_mailer_without_credentials_disables_mail() {
        let mailer = build_mailer(&MailConfig::default());
        let result = mailer
            .send(OutgoingMail {
                to: "a@example.com".into(),
                subject: "s".into(),
                html: "h".into(),
            })
            .await;
        assert!(matches!(result, Err(DispatchError::NotConfigured)));
    }
}
