//! Lead Gate
//!
//! A lead fills in a short contact form before the chat unlocks. This module
//! holds the form data, its validation rules and the opening message that is
//! synthesized from it once the gate opens.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").unwrap());

/// Accepted phone lengths after stripping everything that is not a digit
/// (area code plus 8 or 9 digit number).
pub const PHONE_DIGITS_MIN: usize = 10;
pub const PHONE_DIGITS_MAX: usize = 11;

/// Contact details captured by the lead form.
///
/// Immutable once the session leaves the lead gate. Serialized in camelCase
/// because the webhook consumes it verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub email: String,
    pub phone: String,
    /// Free-text note the lead typed into the form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A form field that can fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadField {
    Name,
    Email,
    Phone,
}

impl fmt::Display for LeadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeadField::Name => write!(f, "name"),
            LeadField::Email => write!(f, "email"),
            LeadField::Phone => write!(f, "phone"),
        }
    }
}

/// Field-level validation failures for a lead form. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid lead form: {}", describe(&self.errors))]
pub struct LeadErrors {
    errors: BTreeMap<LeadField, String>,
}

fn describe(errors: &BTreeMap<LeadField, String>) -> String {
    errors
        .iter()
        .map(|(field, reason)| format!("{field}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl LeadErrors {
    /// Returns the message recorded for `field`, if it failed.
    pub fn get(&self, field: LeadField) -> Option<&str> {
        self.errors.get(&field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = LeadField> + '_ {
        self.errors.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl LeadInfo {
    /// Checks every field and reports all failures at once.
    pub fn validate(&self) -> Result<(), LeadErrors> {
        let mut errors = BTreeMap::new();

        if self.name.trim().is_empty() {
            errors.insert(LeadField::Name, "Informe seu nome".to_string());
        }
        if !is_valid_email(&self.email) {
            errors.insert(LeadField::Email, "E-mail inválido".to_string());
        }
        let digits = phone_digits(&self.phone).len();
        if !(PHONE_DIGITS_MIN..=PHONE_DIGITS_MAX).contains(&digits) {
            errors.insert(
                LeadField::Phone,
                format!(
                    "Telefone deve ter {PHONE_DIGITS_MIN} ou {PHONE_DIGITS_MAX} dígitos (recebido {digits})"
                ),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LeadErrors { errors })
        }
    }

    /// Returns a trimmed copy with the phone reduced to digits and blank
    /// optional fields dropped.
    pub fn normalized(&self) -> LeadInfo {
        LeadInfo {
            name: self.name.trim().to_string(),
            company: non_blank(self.company.as_deref()),
            email: self.email.trim().to_string(),
            phone: phone_digits(&self.phone),
            message: non_blank(self.message.as_deref()),
        }
    }

    /// Builds the first user message of the chat from the form contents.
    pub fn opening_message(&self) -> String {
        let mut text = format!("Olá! Meu nome é {}", self.name.trim());
        if let Some(company) = non_blank(self.company.as_deref()) {
            text.push_str(" da empresa ");
            text.push_str(&company);
        }
        text.push('.');
        if let Some(note) = non_blank(self.message.as_deref()) {
            text.push_str("\n\n");
            text.push_str(&note);
        }
        text
    }
}

/// Pattern-level e-mail check: one `@`, no whitespace, a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Strips every non-digit character from a phone number.
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> LeadInfo {
        LeadInfo {
            name: "Ana".to_string(),
            company: None,
            email: "a@b.com".to_string(),
            phone: "11999998888".to_string(),
            message: None,
        }
    }

    #[test]
    fn test_valid_lead_passes() {
        assert!(ana().validate().is_ok());
    }

    #[test]
    fn test_email_patterns() {
        for good in ["a@b.com", "joao.silva@empresa.com.br", " x@y.io "] {
            assert!(is_valid_email(good), "{good} should be accepted");
        }
        for bad in [
            "", "ab.com", "a@b", "a @b.com", "a@@b.com", "@b.com", "a@.com",
            "a@b..com", "a@b.com.", "a@.b.com",
        ] {
            assert!(!is_valid_email(bad), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_phone_is_checked_on_digits_only() {
        let mut lead = ana();
        lead.phone = "(11) 9999-8888".to_string();
        assert!(lead.validate().is_ok());

        lead.phone = "+55 (11) 99999-8888".to_string();
        let err = lead.validate().unwrap_err();
        assert!(err.get(LeadField::Phone).is_some());

        lead.phone = "123456789".to_string();
        assert!(lead.validate().is_err());
    }

    #[test]
    fn test_all_failing_fields_are_reported() {
        let lead = LeadInfo {
            name: "   ".to_string(),
            email: "not-an-email".to_string(),
            phone: "12".to_string(),
            ..Default::default()
        };
        let err = lead.validate().unwrap_err();
        assert_eq!(
            err.fields().collect::<Vec<_>>(),
            vec![LeadField::Name, LeadField::Email, LeadField::Phone]
        );
        assert!(err.to_string().contains("email: E-mail inválido"));
    }

    #[test]
    fn test_normalized_drops_blank_optionals() {
        let lead = LeadInfo {
            name: "  Ana ".to_string(),
            company: Some("  ".to_string()),
            email: " a@b.com".to_string(),
            phone: "(11) 99999-8888".to_string(),
            message: Some(" Preciso de um ERP ".to_string()),
        };
        let normalized = lead.normalized();
        assert_eq!(normalized.name, "Ana");
        assert_eq!(normalized.company, None);
        assert_eq!(normalized.email, "a@b.com");
        assert_eq!(normalized.phone, "11999998888");
        assert_eq!(normalized.message.as_deref(), Some("Preciso de um ERP"));
    }

    #[test]
    fn test_opening_message_variants() {
        assert_eq!(ana().opening_message(), "Olá! Meu nome é Ana.");

        let lead = LeadInfo {
            company: Some("Casa das Tintas".to_string()),
            message: Some("Quero conhecer o módulo fiscal".to_string()),
            ..ana()
        };
        assert_eq!(
            lead.opening_message(),
            "Olá! Meu nome é Ana da empresa Casa das Tintas.\n\nQuero conhecer o módulo fiscal"
        );
    }

    #[test]
    fn test_lead_serializes_camel_case_without_empty_optionals() {
        let value = serde_json::to_value(ana()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"name": "Ana", "email": "a@b.com", "phone": "11999998888"})
        );
    }
}
