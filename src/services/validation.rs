//! Request validation
//!
//! One rule set per form. Validation runs before any store access or
//! outbound call, and collects every failing field instead of stopping at
//! the first.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Longest address accepted (RFC 5321 path limit)
const MAX_EMAIL_LEN: usize = 254;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

/// Comment author name
pub const MIN_USER_NAME_LEN: usize = 3;
/// Comment body
pub const MIN_COMMENT_LEN: usize = 5;
/// Contact subject
pub const MIN_SUBJECT_LEN: usize = 5;
/// Contact message body
pub const MIN_MESSAGE_LEN: usize = 5;

/// A single field constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// At least this many characters once surrounding whitespace is trimmed
    MinLength(usize),
    /// A syntactically valid email address
    Email,
}

impl Rule {
    fn check(&self, value: &str) -> Option<String> {
        match *self {
            Rule::MinLength(min) => {
                let len = value.trim().chars().count();
                (len < min).then(|| format!("must be at least {} characters long", min))
            }
            Rule::Email => (!is_valid_email(value)).then(|| "must be a valid email address".to_string()),
        }
    }
}

/// One failing field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every failing field of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{}", summarize(.errors))]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                field: field.to_string(),
                message: message.into(),
            }],
        }
    }

    pub fn fields(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.field.as_str()).collect()
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{} {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collects rule failures across fields
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `value` against `rules`; only the first failing rule of a field is kept.
    pub fn check(mut self, field: &str, value: &str, rules: &[Rule]) -> Self {
        if let Some(message) = rules.iter().find_map(|rule| rule.check(value)) {
            self.errors.push(FieldError {
                field: field.to_string(),
                message,
            });
        }
        self
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors { errors: self.errors })
        }
    }
}

/// Check an email address: local part, `@`, dotted domain ending in a TLD.
pub fn is_valid_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LEN && EMAIL_REGEX.is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("reader@example.com"));
        assert!(is_valid_email("first.last+news@mail.example.co.uk"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("user@localhost"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user @example.com"));
        assert!(!is_valid_email("user@example."));
    }

    #[test]
    fn test_collects_every_failing_field() {
        let result = Validator::new()
            .check("email", "nope", &[Rule::Email])
            .check("subject", "hey", &[Rule::MinLength(MIN_SUBJECT_LEN)])
            .check("msg", "long enough", &[Rule::MinLength(MIN_MESSAGE_LEN)])
            .finish();

        let errors = result.unwrap_err();
        assert_eq!(errors.fields(), vec!["email", "subject"]);
        assert!(errors.to_string().contains("subject must be at least 5 characters long"));
    }

    #[test]
    fn test_display_joins_fields_in_order() {
        let errors = Validator::new()
            .check("email", "nope", &[Rule::Email])
            .check("subject", "hey", &[Rule::MinLength(MIN_SUBJECT_LEN)])
            .finish()
            .unwrap_err();

        assert_eq!(
            errors.to_string(),
            "email must be a valid email address; subject must be at least 5 characters long"
        );
        let source: &dyn std::error::Error = &errors;
        assert!(source.source().is_none());
    }

    #[test]
    fn test_min_length_ignores_surrounding_whitespace() {
        let result = Validator::new()
            .check("userName", "  ab  ", &[Rule::MinLength(MIN_USER_NAME_LEN)])
            .finish();
        assert!(result.is_err());
    }

    #[test]
    fn test_min_length_counts_characters() {
        let result = Validator::new()
            .check("userName", "héé", &[Rule::MinLength(MIN_USER_NAME_LEN)])
            .finish();
        assert!(result.is_ok());
    }

    proptest! {
        #[test]
        fn prop_min_length_matches_char_count(s in "[a-zA-Z0-9 ]{0,20}", min in 0usize..12) {
            let ok = Validator::new().check("f", &s, &[Rule::MinLength(min)]).finish().is_ok();
            prop_assert_eq!(ok, s.trim().chars().count() >= min);
        }

        #[test]
        fn prop_generated_addresses_are_valid(
            local in "[a-z0-9]{1,16}",
            domain in "[a-z0-9]{1,16}",
            tld in "[a-z]{2,6}",
        ) {
            let email = format!("{}@{}.{}", local, domain, tld);
            prop_assert!(is_valid_email(&email));
        }

        #[test]
        fn prop_addresses_without_at_are_invalid(s in "[a-z0-9.]{0,40}") {
            prop_assert!(!is_valid_email(&s));
        }
    }
}
