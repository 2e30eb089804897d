//! Identity resolution pipeline (application-level orchestration).
//!
//! ```text
//! Observation
//!   1. Match contacts on either identifying field
//!   2. No match -> insert a fresh primary, done
//!   3. Chase each match to its cluster root (chains decrease in id)
//!   4. Oldest root wins; relabel the other roots under it
//!   5. Insert a secondary if the observation adds a new email/phone
//!   6. Consolidate the final cluster into the caller-facing view
//! ```
//!
//! The decisions themselves are pure and live in `coalesce_core::resolution`;
//! this module owns the transaction boundary. Every resolution runs steps
//! 1 through 6 inside one store transaction, so a failure at any step rolls
//! the whole observation back.

use tracing::instrument;

use coalesce_core::{
    consolidate, plan_extension, ConsolidatedContact, Contact, DomainError, MergePlan, NewContact,
    Observation,
};

use crate::contact_store::{ContactStore, ContactTx, StoreError};

/// Failure of a resolution attempt.
#[derive(Debug)]
pub enum ResolveError {
    /// The store failed or was unreachable.
    Store(StoreError),
    /// Stored linkage contradicts the cluster invariants.
    Consistency(String),
}

impl From<StoreError> for ResolveError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Consistency(msg) => ResolveError::Consistency(msg),
            other => ResolveError::Store(other),
        }
    }
}

impl From<DomainError> for ResolveError {
    fn from(value: DomainError) -> Self {
        // Pure decisions only fail when stored state is already inconsistent.
        ResolveError::Consistency(value.to_string())
    }
}

/// Resolves observations against a contact store.
#[derive(Debug, Clone)]
pub struct Resolver<S> {
    store: S,
}

impl<S> Resolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: ContactStore> Resolver<S> {
    /// Reconciles one observation and returns the consolidated cluster.
    ///
    /// Returns `Ok(None)` for a degenerate observation (both fields absent):
    /// nothing is stored and nothing can be reported.
    #[instrument(
        skip(self, observation),
        fields(
            has_email = observation.email().is_some(),
            has_phone = observation.phone_number().is_some(),
        ),
        err(Debug)
    )]
    pub async fn resolve(
        &self,
        observation: Observation,
    ) -> Result<Option<ConsolidatedContact>, ResolveError> {
        if observation.is_empty() {
            return Ok(None);
        }

        let mut tx = self.store.begin().await?;

        // 1) Match on either identifying field.
        let matched = tx
            .find_by_email_or_phone(observation.email(), observation.phone_number())
            .await?;

        // 2) Unknown identity: a fresh cluster of one.
        if matched.is_empty() {
            let draft = NewContact::primary(
                observation.email().map(str::to_owned),
                observation.phone_number().map(str::to_owned),
            );
            let created = tx.insert(draft).await?;
            tx.commit().await?;
            return Ok(Some(ConsolidatedContact::singleton(&created)));
        }

        // 3) Distinct cluster roots implicated by the matches.
        let mut candidates: Vec<Contact> = Vec::new();
        for contact in matched {
            let root = resolve_root(tx.as_mut(), contact).await?;
            if !candidates.iter().any(|c| c.id == root.id) {
                candidates.push(root);
            }
        }

        // 4) Oldest root wins; demote the rest under it.
        let plan = MergePlan::decide(candidates)?;
        let primary_id = plan.primary.id;
        for former in &plan.demoted {
            tx.relabel_to_secondary(former.id, primary_id).await?;
        }

        // 5) Insert a secondary when the observation adds a new value.
        let mut cluster = tx.find_cluster(primary_id).await?;
        if let Some(draft) = plan_extension(&observation, primary_id, &cluster) {
            tx.insert(draft).await?;
            cluster = tx.find_cluster(primary_id).await?;
        }

        // 6) Report the final cluster.
        let view = consolidate(primary_id, &cluster)?;
        tx.commit().await?;
        Ok(Some(view))
    }
}

/// Walks a matched contact up its linkage chain to the cluster primary.
///
/// Links must strictly decrease in id and end at a primary; anything else
/// means the stored linkage is corrupt and the resolution must not proceed.
async fn resolve_root(
    tx: &mut dyn ContactTx,
    start: Contact,
) -> Result<Contact, ResolveError> {
    let mut current = start;
    while !current.is_primary() {
        let linked_id = current.linked_id.ok_or_else(|| {
            ResolveError::Consistency(format!("secondary {} has no linked contact", current.id))
        })?;
        if linked_id >= current.id {
            return Err(ResolveError::Consistency(format!(
                "contact {} links forward to {}",
                current.id, linked_id
            )));
        }
        current = tx.find_by_id(linked_id).await?.ok_or_else(|| {
            ResolveError::Consistency(format!(
                "contact {} links to missing contact {}",
                current.id, linked_id
            ))
        })?;
    }
    Ok(current)
}
