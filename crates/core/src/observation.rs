//! Incoming identity observations and field normalization.

/// One submitted (email, phone) pair, normalized at construction.
///
/// Construction is the only place input fields are cleaned up:
/// - email: surrounding whitespace trimmed, lowercased; empty or
///   whitespace-only becomes absent. The normalized form is what gets
///   matched, stored, and returned.
/// - phone: kept verbatim; only the empty string becomes absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    email: Option<String>,
    phone_number: Option<String>,
}

impl Observation {
    pub fn new(email: Option<String>, phone_number: Option<String>) -> Self {
        let email = email
            .map(|raw| normalize_email(&raw))
            .filter(|e| !e.is_empty());
        let phone_number = phone_number.filter(|p| !p.is_empty());
        Self {
            email,
            phone_number,
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }

    /// Degenerate observation: nothing to match on.
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone_number.is_none()
    }
}

/// Canonical email form used for matching, deduplication and storage.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}
