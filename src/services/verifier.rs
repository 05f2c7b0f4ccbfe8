//! Third-party verification calls
//!
//! [`RecaptchaVerifier`] checks bot-check tokens and [`LeadRegistrar`]
//! registers newsletter leads with the CRM. Both share one `reqwest::Client`
//! and retry once on transient failures (connect errors, timeouts, 5xx).

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;

use super::error::ServiceError;
use super::validation::{Rule, Validator};
use crate::config::{CrmConfig, VerifierConfig};
use crate::models::{Lead, VerificationOutcome};

const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Build the client shared by every outbound call.
pub fn build_http_client() -> anyhow::Result<Client> {
    let client = Client::builder()
        .user_agent(concat!("sitedesk/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Send a request, retrying transient failures up to `max_retries` times.
///
/// Non-2xx answers that are not retried come back as errors.
async fn send_with_retry<F>(service: &str, max_retries: u32, make_request: F) -> Result<Response, String>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let retries_left = attempt < max_retries;
        match make_request().send().await {
            Ok(response) if response.status().is_server_error() && retries_left => {
                tracing::warn!(service, status = %response.status(), attempt, "Upstream error, retrying");
            }
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => return Err(format!("{} answered HTTP {}", service, response.status())),
            Err(e) if (e.is_connect() || e.is_timeout()) && retries_left => {
                tracing::warn!(service, error = %e, attempt, "Upstream unreachable, retrying");
            }
            Err(e) => return Err(format!("{} request failed: {}", service, e)),
        }
        attempt += 1;
        tokio::time::sleep(RETRY_BACKOFF).await;
    }
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// reCAPTCHA token verification
pub struct RecaptchaVerifier {
    client: Client,
    config: VerifierConfig,
}

impl RecaptchaVerifier {
    pub fn new(client: Client, config: VerifierConfig) -> Self {
        Self { client, config }
    }

    /// Ask the verifier whether `token` is genuine.
    ///
    /// A rejected token is a normal `success: false` outcome; only failing
    /// to get an answer is an error.
    pub async fn verify(&self, token: &str) -> Result<VerificationOutcome, ServiceError> {
        let secret = self
            .config
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServiceError::VerificationFailed("verifier secret is not configured".to_string()))?;

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let response = send_with_retry("recaptcha", self.config.max_retries, || {
            self.client
                .post(&self.config.endpoint)
                .query(&[("secret", secret), ("response", token)])
                .timeout(timeout)
        })
        .await
        .map_err(ServiceError::VerificationFailed)?;

        let answer: SiteVerifyResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::VerificationFailed(format!("unreadable verifier answer: {}", e)))?;

        if !answer.success {
            tracing::debug!(error_codes = ?answer.error_codes, "Token rejected");
        }

        Ok(VerificationOutcome {
            success: answer.success,
        })
    }
}

/// MailBluster lead registration
pub struct LeadRegistrar {
    client: Client,
    config: CrmConfig,
}

impl LeadRegistrar {
    pub fn new(client: Client, config: CrmConfig) -> Self {
        Self { client, config }
    }

    /// Register `email` as an unsubscribed, double-opt-in lead.
    pub async fn register_lead(&self, email: &str) -> Result<VerificationOutcome, ServiceError> {
        Validator::new().check("email", email, &[Rule::Email]).finish()?;

        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServiceError::RegistrationFailed("CRM API key is not configured".to_string()))?;

        let lead = Lead::new(email);
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let response = send_with_retry("mailbluster", self.config.max_retries, || {
            self.client
                .post(&self.config.endpoint)
                .header(AUTHORIZATION, api_key)
                .json(&lead)
                .timeout(timeout)
        })
        .await
        .map_err(ServiceError::RegistrationFailed)?;

        let body = response
            .bytes()
            .await
            .map_err(|e| ServiceError::RegistrationFailed(format!("unreadable CRM answer: {}", e)))?;

        // The CRM answers with the created lead; an explicit flag wins when present.
        let success = serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("success").and_then(|s| s.as_bool()))
            .unwrap_or(true);

        tracing::info!(success, "Newsletter lead registered");
        Ok(VerificationOutcome { success })
    }
}
