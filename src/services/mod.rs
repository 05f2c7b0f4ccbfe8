//! Services layer - Business logic
//!
//! Services validate input, drive repository sessions and trigger the
//! dependent side effects (mail, third-party calls). Every operation returns
//! [`ServiceError`] on failure.

pub mod comment;
pub mod contact;
pub mod email;
pub mod error;
pub mod validation;
pub mod verifier;

pub use comment::CommentService;
pub use contact::{ContactConfirmation, ContactMessage, ContactRequest, ContactService};
pub use email::{
    build_mailer, DispatchError, DispatchReceipt, EmailTemplate, Mailer, NotificationDispatcher,
    OutgoingMail, SmtpMailer, UnconfiguredMailer,
};
pub use error::ServiceError;
pub use validation::{is_valid_email, FieldError, Rule, ValidationErrors, Validator};
pub use verifier::{build_http_client, LeadRegistrar, RecaptchaVerifier};
