//! Contact records: the stored unit of identity.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a stored contact.
///
/// Assigned by the store as a monotonically increasing integer. Creation
/// order is the merge tie-break, so ordering on ids is meaningful.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(i64);

impl ContactId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for ContactId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for ContactId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<ContactId> for i64 {
    fn from(value: ContactId) -> Self {
        value.0
    }
}

/// Whether a contact is its cluster's canonical record or linked to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPrecedence {
    Primary,
    Secondary,
}

impl LinkPrecedence {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkPrecedence::Primary => "primary",
            LinkPrecedence::Secondary => "secondary",
        }
    }
}

impl FromStr for LinkPrecedence {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(LinkPrecedence::Primary),
            "secondary" => Ok(LinkPrecedence::Secondary),
            other => Err(DomainError::validation(format!(
                "unknown link precedence: {other}"
            ))),
        }
    }
}

/// A stored contact record.
///
/// `email`/`phone_number` are immutable once created; a merge only changes
/// `link_precedence`, `linked_id` and `updated_at`. A secondary's
/// `linked_id` always references a contact with a smaller id, so linkage
/// chains strictly decrease and cannot cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub link_precedence: LinkPrecedence,
    pub linked_id: Option<ContactId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }
}

/// Draft of a contact to insert; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub link_precedence: LinkPrecedence,
    pub linked_id: Option<ContactId>,
}

impl NewContact {
    /// Draft for the root of a brand-new cluster.
    pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            link_precedence: LinkPrecedence::Primary,
            linked_id: None,
        }
    }

    /// Draft for a record extending an existing cluster.
    pub fn secondary(
        email: Option<String>,
        phone_number: Option<String>,
        linked_id: ContactId,
    ) -> Self {
        Self {
            email,
            phone_number,
            link_precedence: LinkPrecedence::Secondary,
            linked_id: Some(linked_id),
        }
    }
}
