use async_trait::async_trait;
use thiserror::Error;

use coalesce_core::{Contact, ContactId, NewContact};

/// Contact store operation error.
///
/// These are **infrastructure errors** (connectivity, query execution, row
/// decoding) as opposed to domain errors. `Consistency` is the exception:
/// it reports stored data that contradicts the linkage invariants, and the
/// operation observing it must fail rather than proceed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A query failed or returned rows that could not be decoded.
    #[error("query failed: {0}")]
    Query(String),

    /// The backing store is unreachable or its pool is closed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored data violates a linkage invariant.
    #[error("consistency violation: {0}")]
    Consistency(String),
}

/// One resolution's transactional view of the contact store.
///
/// Every read and write of a single resolution goes through one handle:
/// `commit` makes all of its writes visible together, and dropping the
/// handle without committing discards them. Reads observe the handle's own
/// uncommitted writes.
///
/// ## Operations
///
/// - `find_by_email_or_phone`: OR-match on the identifying fields.
/// - `find_by_id`: point lookup, used to walk linkage chains.
/// - `find_cluster`: full transitive cluster rooted at a primary.
/// - `insert`: create a contact; the store assigns id and timestamps.
/// - `relabel_to_secondary`: demote a former primary during a merge.
#[async_trait]
pub trait ContactTx: Send {
    /// All contacts whose email or phone equals a present input field,
    /// ascending by id. An absent field never matches anything.
    async fn find_by_email_or_phone(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<Contact>, StoreError>;

    /// Single contact by id.
    async fn find_by_id(&mut self, id: ContactId) -> Result<Option<Contact>, StoreError>;

    /// The cluster rooted at `primary_id`: the root plus every contact
    /// transitively reachable through `linked_id` references, ascending by
    /// id. Follows chains left behind by merges, not just direct children.
    async fn find_cluster(&mut self, primary_id: ContactId) -> Result<Vec<Contact>, StoreError>;

    /// Insert a draft contact; the store assigns `id`, `created_at` and
    /// `updated_at`.
    async fn insert(&mut self, draft: NewContact) -> Result<Contact, StoreError>;

    /// Demote a contact to secondary under `new_linked_id`, refreshing
    /// `updated_at`. Targeting a missing id is a `Consistency` error.
    async fn relabel_to_secondary(
        &mut self,
        id: ContactId,
        new_linked_id: ContactId,
    ) -> Result<(), StoreError>;

    /// Make the transaction's writes visible.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Transactional contact store.
///
/// Implementations must ensure that two concurrent resolutions sharing an
/// identifying value cannot both win a "no match" race: the in-memory
/// backend serializes whole transactions, the Postgres backend locks the
/// identity keys for the transaction's duration.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Open a transaction for one resolution.
    async fn begin(&self) -> Result<Box<dyn ContactTx>, StoreError>;
}
