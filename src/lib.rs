//! sitedesk - backend service of a personal website
//!
//! Serves blog entries and their comments, newsletter records, a contact
//! form relayed by email, reCAPTCHA verification and newsletter lead
//! registration.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
