use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use coalesce_core::{Contact, ContactId, LinkPrecedence, NewContact};

use super::r#trait::{ContactStore, ContactTx, StoreError};

#[derive(Debug, Clone, Default)]
struct MemState {
    next_id: i64,
    rows: Vec<Contact>,
}

/// In-memory contact store.
///
/// Intended for tests/dev. Not optimized for performance. Whole
/// transactions serialize behind one mutex: `begin` takes the lock and
/// works on a scratch copy of the state, `commit` writes the copy back,
/// and dropping the handle without committing discards it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContactStore {
    state: Arc<Mutex<MemState>>,
}

impl InMemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows, ascending by id.
    pub async fn contacts(&self) -> Vec<Contact> {
        self.state.lock().await.rows.clone()
    }
}

pub struct InMemoryTx {
    guard: OwnedMutexGuard<MemState>,
    scratch: MemState,
}

#[async_trait]
impl ContactStore for InMemoryContactStore {
    async fn begin(&self) -> Result<Box<dyn ContactTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let scratch = guard.clone();
        Ok(Box::new(InMemoryTx { guard, scratch }))
    }
}

#[async_trait]
impl ContactTx for InMemoryTx {
    async fn find_by_email_or_phone(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<Contact>, StoreError> {
        let matches = self
            .scratch
            .rows
            .iter()
            .filter(|c| {
                let email_hit = email.is_some() && c.email.as_deref() == email;
                let phone_hit = phone_number.is_some() && c.phone_number.as_deref() == phone_number;
                email_hit || phone_hit
            })
            .cloned()
            .collect();
        Ok(matches)
    }

    async fn find_by_id(&mut self, id: ContactId) -> Result<Option<Contact>, StoreError> {
        Ok(self.scratch.rows.iter().find(|c| c.id == id).cloned())
    }

    async fn find_cluster(&mut self, primary_id: ContactId) -> Result<Vec<Contact>, StoreError> {
        // Rows are ascending by id and links always point at smaller ids,
        // so a single pass reaches every chained member.
        let mut member_ids: HashSet<ContactId> = HashSet::new();
        let mut members = Vec::new();
        for c in &self.scratch.rows {
            let in_cluster = c.id == primary_id
                || c.linked_id.is_some_and(|linked| member_ids.contains(&linked));
            if in_cluster {
                member_ids.insert(c.id);
                members.push(c.clone());
            }
        }
        Ok(members)
    }

    async fn insert(&mut self, draft: NewContact) -> Result<Contact, StoreError> {
        self.scratch.next_id += 1;
        let now = Utc::now();
        let contact = Contact {
            id: ContactId::new(self.scratch.next_id),
            email: draft.email,
            phone_number: draft.phone_number,
            link_precedence: draft.link_precedence,
            linked_id: draft.linked_id,
            created_at: now,
            updated_at: now,
        };
        self.scratch.rows.push(contact.clone());
        Ok(contact)
    }

    async fn relabel_to_secondary(
        &mut self,
        id: ContactId,
        new_linked_id: ContactId,
    ) -> Result<(), StoreError> {
        let row = self
            .scratch
            .rows
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::Consistency(format!("relabel target {id} does not exist")))?;
        row.link_precedence = LinkPrecedence::Secondary;
        row.linked_id = Some(new_linked_id);
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        *self.guard = std::mem::take(&mut self.scratch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn insert_committed(store: &InMemoryContactStore, draft: NewContact) -> Contact {
        let mut tx = store.begin().await.unwrap();
        let contact = tx.insert(draft).await.unwrap();
        tx.commit().await.unwrap();
        contact
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids_and_timestamps() {
        let store = InMemoryContactStore::new();
        let first = insert_committed(&store, NewContact::primary(Some("a@x.com".into()), None)).await;
        let second =
            insert_committed(&store, NewContact::secondary(None, Some("123".into()), first.id)).await;

        assert_eq!(first.id, ContactId::new(1));
        assert_eq!(second.id, ContactId::new(2));
        assert_eq!(second.linked_id, Some(first.id));
        assert_eq!(store.contacts().await.len(), 2);
    }

    #[tokio::test]
    async fn dropping_a_transaction_discards_its_writes() {
        let store = InMemoryContactStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(NewContact::primary(Some("a@x.com".into()), None))
                .await
                .unwrap();
            // No commit.
        }
        assert!(store.contacts().await.is_empty());
    }

    #[tokio::test]
    async fn reads_observe_uncommitted_writes_in_the_same_transaction() {
        let store = InMemoryContactStore::new();
        let mut tx = store.begin().await.unwrap();
        let created = tx
            .insert(NewContact::primary(Some("a@x.com".into()), None))
            .await
            .unwrap();

        let matched = tx
            .find_by_email_or_phone(Some("a@x.com"), None)
            .await
            .unwrap();
        assert_eq!(matched, vec![created]);
    }

    #[tokio::test]
    async fn match_is_or_semantics_and_absent_fields_never_match() {
        let store = InMemoryContactStore::new();
        insert_committed(
            &store,
            NewContact::primary(Some("a@x.com".into()), Some("123".into())),
        )
        .await;
        insert_committed(&store, NewContact::primary(None, Some("999".into()))).await;

        let mut tx = store.begin().await.unwrap();

        let by_email = tx.find_by_email_or_phone(Some("a@x.com"), None).await.unwrap();
        assert_eq!(by_email.len(), 1);

        let by_either = tx
            .find_by_email_or_phone(Some("a@x.com"), Some("999"))
            .await
            .unwrap();
        assert_eq!(by_either.len(), 2);

        // A record with no email must not match an absent input email.
        let none_given = tx.find_by_email_or_phone(None, None).await.unwrap();
        assert!(none_given.is_empty());
    }

    #[tokio::test]
    async fn find_cluster_follows_linkage_chains() {
        let store = InMemoryContactStore::new();
        let root = insert_committed(&store, NewContact::primary(Some("a@x.com".into()), None)).await;
        let middle =
            insert_committed(&store, NewContact::secondary(Some("b@y.com".into()), None, root.id))
                .await;
        // Chained member: linked to the middle contact, not the root.
        let leaf = insert_committed(
            &store,
            NewContact::secondary(None, Some("123".into()), middle.id),
        )
        .await;
        // Unrelated cluster.
        insert_committed(&store, NewContact::primary(Some("z@z.com".into()), None)).await;

        let mut tx = store.begin().await.unwrap();
        let cluster = tx.find_cluster(root.id).await.unwrap();
        let ids: Vec<ContactId> = cluster.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![root.id, middle.id, leaf.id]);
    }

    #[tokio::test]
    async fn relabel_rewrites_precedence_link_and_updated_at() {
        let store = InMemoryContactStore::new();
        let older = insert_committed(&store, NewContact::primary(Some("a@x.com".into()), None)).await;
        let newer = insert_committed(&store, NewContact::primary(Some("b@y.com".into()), None)).await;

        let mut tx = store.begin().await.unwrap();
        tx.relabel_to_secondary(newer.id, older.id).await.unwrap();
        tx.commit().await.unwrap();

        let rows = store.contacts().await;
        let demoted = rows.iter().find(|c| c.id == newer.id).unwrap();
        assert_eq!(demoted.link_precedence, LinkPrecedence::Secondary);
        assert_eq!(demoted.linked_id, Some(older.id));
        assert!(demoted.updated_at >= newer.updated_at);
        // The email/phone pair stays untouched.
        assert_eq!(demoted.email.as_deref(), Some("b@y.com"));
    }

    #[tokio::test]
    async fn relabel_of_a_missing_contact_is_a_consistency_error() {
        let store = InMemoryContactStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .relabel_to_secondary(ContactId::new(7), ContactId::new(1))
            .await
            .unwrap_err();
        match err {
            StoreError::Consistency(_) => {}
            _ => panic!("Expected Consistency error for missing relabel target"),
        }
    }
}
