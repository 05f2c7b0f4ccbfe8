//! Outbound third-party payloads

use serde::{Deserialize, Serialize};

/// Newsletter lead registered with the CRM; never stored locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub email: String,
    pub subscribed: bool,
    pub double_opt_in: bool,
}

impl Lead {
    /// New leads start unsubscribed and must confirm by email.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            subscribed: false,
            double_opt_in: true,
        }
    }
}

/// Answer of a third-party check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lead_wire_format() {
        let lead = Lead::new("reader@example.com");
        assert_eq!(
            serde_json::to_value(&lead).unwrap(),
            json!({ "email": "reader@example.com", "subscribed": false, "doubleOptIn": true })
        );
    }
}
