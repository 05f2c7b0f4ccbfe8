//! Data models
//!
//! Documents stored in the collections and payloads exchanged with
//! third-party services.

mod blog_entry;
mod lead;
mod newsletter;

pub use blog_entry::{BlogEntry, Comment, NewComment};
pub use lead::{Lead, VerificationOutcome};
pub use newsletter::NewsletterRecord;
