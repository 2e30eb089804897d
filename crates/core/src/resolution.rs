//! Resolution decisions: which candidate primary survives a merge, whether
//! an observation extends a cluster, and how the consolidated view is built.
//!
//! Everything here is pure. The service layer owns store access and applies
//! these decisions inside a transaction.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::contact::{Contact, ContactId, NewContact};
use crate::error::{DomainError, DomainResult};
use crate::observation::{normalize_email, Observation};

/// Deduplicated, ordered summary of one identity cluster.
///
/// `emails` and `phone_numbers` keep first-occurrence order by ascending
/// contact id, with the primary's values first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedContact {
    pub primary_contact_id: ContactId,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<ContactId>,
}

impl ConsolidatedContact {
    /// View of a cluster that contains only its primary.
    pub fn singleton(primary: &Contact) -> Self {
        Self {
            primary_contact_id: primary.id,
            emails: primary.email.iter().cloned().collect(),
            phone_numbers: primary.phone_number.iter().cloned().collect(),
            secondary_contact_ids: Vec::new(),
        }
    }
}

/// Outcome of candidate selection: the surviving primary and the former
/// primaries to demote under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub primary: Contact,
    pub demoted: Vec<Contact>,
}

impl MergePlan {
    /// Pick the oldest candidate (smallest id) as the cluster primary.
    ///
    /// Candidates must be deduplicated cluster roots; the remainder are
    /// demoted in ascending id order.
    pub fn decide(mut candidates: Vec<Contact>) -> DomainResult<Self> {
        if candidates.is_empty() {
            return Err(DomainError::invariant(
                "merge requires at least one candidate primary",
            ));
        }
        for candidate in &candidates {
            if !candidate.is_primary() {
                return Err(DomainError::invariant(format!(
                    "merge candidate {} is not a primary",
                    candidate.id
                )));
            }
        }

        candidates.sort_by_key(|c| c.id);
        let primary = candidates.remove(0);
        Ok(Self {
            primary,
            demoted: candidates,
        })
    }
}

/// Decide whether an observation adds anything new to a cluster.
///
/// Any present input field that is unknown to the cluster warrants a new
/// secondary carrying the whole observation; when every present field is
/// already known (even across different records) nothing is inserted, which
/// keeps repeat submissions idempotent.
pub fn plan_extension(
    observation: &Observation,
    primary_id: ContactId,
    cluster: &[Contact],
) -> Option<NewContact> {
    let email_known = match observation.email() {
        Some(email) => cluster
            .iter()
            .filter_map(|c| c.email.as_deref())
            .any(|known| known == email),
        None => true,
    };
    let phone_known = match observation.phone_number() {
        Some(phone) => cluster
            .iter()
            .filter_map(|c| c.phone_number.as_deref())
            .any(|known| known == phone),
        None => true,
    };

    if email_known && phone_known {
        return None;
    }

    Some(NewContact::secondary(
        observation.email().map(str::to_owned),
        observation.phone_number().map(str::to_owned),
        primary_id,
    ))
}

/// Build the consolidated view of a cluster.
///
/// `members` is the full cluster in ascending id order and must contain the
/// primary. Emails dedup on the normalized value, phones on the exact
/// value; both keep first-occurrence order with the primary's values first.
pub fn consolidate(
    primary_id: ContactId,
    members: &[Contact],
) -> DomainResult<ConsolidatedContact> {
    let primary = members
        .iter()
        .find(|c| c.id == primary_id)
        .ok_or_else(|| {
            DomainError::invariant(format!("cluster of {primary_id} is missing its primary"))
        })?;
    if !primary.is_primary() {
        return Err(DomainError::invariant(format!(
            "cluster root {primary_id} is not labeled primary"
        )));
    }

    let mut emails = Vec::new();
    let mut seen_emails = HashSet::new();
    let mut phone_numbers = Vec::new();
    let mut seen_phones = HashSet::new();
    let mut secondary_contact_ids = Vec::new();

    let ordered = core::iter::once(primary).chain(members.iter().filter(|c| c.id != primary_id));
    for contact in ordered {
        if let Some(email) = contact.email.as_deref() {
            if seen_emails.insert(normalize_email(email)) {
                emails.push(email.to_owned());
            }
        }
        if let Some(phone) = contact.phone_number.as_deref() {
            if seen_phones.insert(phone.to_owned()) {
                phone_numbers.push(phone.to_owned());
            }
        }
        if contact.id != primary_id {
            secondary_contact_ids.push(contact.id);
        }
    }

    Ok(ConsolidatedContact {
        primary_contact_id: primary_id,
        emails,
        phone_numbers,
        secondary_contact_ids,
    })
}
