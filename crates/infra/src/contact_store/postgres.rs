//! PostgreSQL-backed contact store.
//!
//! All statements are hand-written SQL executed through sqlx. Contacts are
//! append-mostly: `insert` and `relabel_to_secondary` are the only writes,
//! and rows are never deleted.
//!
//! ## Concurrency
//!
//! Every transaction takes advisory xact locks on the identifying values it
//! touches before reading: namespace 1 keyed by the email hash, then
//! namespace 2 keyed by the phone hash. Each transaction holds at most one
//! lock per namespace and always acquires namespace 1 before namespace 2,
//! so two transactions can never wait on each other in a cycle. The locks
//! release with the transaction.
//!
//! ## Error Mapping
//!
//! | sqlx error                  | code  | mapped to                | scenario                                  |
//! |-----------------------------|-------|--------------------------|-------------------------------------------|
//! | `Database`                  | 23503 | `StoreError::Consistency`| `linked_id` references a missing contact   |
//! | `Database`                  | 23514 | `StoreError::Consistency`| `link_precedence` outside the allowed set  |
//! | `Database` (other)          |       | `StoreError::Query`      | constraint or syntax failure               |
//! | `PoolClosed`/`PoolTimedOut` |       | `StoreError::Unavailable`| pool shut down or exhausted                |
//! | `Io`                        |       | `StoreError::Unavailable`| connection lost mid-statement              |
//! | anything else               |       | `StoreError::Query`      | decoding and protocol errors               |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use coalesce_core::{Contact, ContactId, LinkPrecedence, NewContact};

use super::r#trait::{ContactStore, ContactTx, StoreError};

/// Contact store persisted in PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresContactStore {
    pool: Arc<PgPool>,
}

impl PostgresContactStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Creates the `contacts` table and its indexes if they do not exist.
    ///
    /// Safe to run on every startup.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
                id BIGSERIAL PRIMARY KEY,
                email TEXT,
                phone_number TEXT,
                link_precedence TEXT NOT NULL
                    CHECK (link_precedence IN ('primary', 'secondary')),
                linked_id BIGINT REFERENCES contacts(id),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS contacts_email_idx ON contacts (email)")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS contacts_phone_number_idx ON contacts (phone_number)",
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS contacts_linked_id_idx ON contacts (linked_id)")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        Ok(())
    }
}

#[async_trait]
impl ContactStore for PostgresContactStore {
    async fn begin(&self) -> Result<Box<dyn ContactTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PostgresContactTx { tx }))
    }
}

pub struct PostgresContactTx {
    tx: Transaction<'static, Postgres>,
}

impl PostgresContactTx {
    /// Takes advisory xact locks on the identifying values.
    ///
    /// Namespace 1 (email) is always acquired before namespace 2 (phone),
    /// and at most one lock is taken per namespace, so concurrent
    /// transactions cannot form a wait cycle.
    async fn lock_identity(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<(), StoreError> {
        if let Some(email) = email {
            sqlx::query("SELECT pg_advisory_xact_lock(1, hashtext($1))")
                .bind(email)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("lock_identity", e))?;
        }
        if let Some(phone) = phone_number {
            sqlx::query("SELECT pg_advisory_xact_lock(2, hashtext($1))")
                .bind(phone)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("lock_identity", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ContactTx for PostgresContactTx {
    #[instrument(skip(self), err)]
    async fn find_by_email_or_phone(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<Contact>, StoreError> {
        self.lock_identity(email, phone_number).await?;

        let rows = sqlx::query(
            r#"
            SELECT id, email, phone_number, link_precedence, linked_id,
                   created_at, updated_at
            FROM contacts
            WHERE ($1::text IS NOT NULL AND email = $1)
               OR ($2::text IS NOT NULL AND phone_number = $2)
            ORDER BY id ASC
            "#,
        )
        .bind(email)
        .bind(phone_number)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_by_email_or_phone", e))?;

        collect_contacts("find_by_email_or_phone", rows)
    }

    #[instrument(skip(self), err)]
    async fn find_by_id(&mut self, id: ContactId) -> Result<Option<Contact>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, phone_number, link_precedence, linked_id,
                   created_at, updated_at
            FROM contacts
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_by_id", e))?;

        row.map(|r| decode_contact("find_by_id", &r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_cluster(&mut self, primary_id: ContactId) -> Result<Vec<Contact>, StoreError> {
        // Recursive walk over the linkage chains. UNION (not UNION ALL)
        // keeps the walk terminating even on corrupt cyclic data.
        let rows = sqlx::query(
            r#"
            WITH RECURSIVE cluster(id) AS (
                SELECT id FROM contacts WHERE id = $1
                UNION
                SELECT c.id FROM contacts c
                JOIN cluster cl ON c.linked_id = cl.id
            )
            SELECT c.id, c.email, c.phone_number, c.link_precedence,
                   c.linked_id, c.created_at, c.updated_at
            FROM contacts c
            JOIN cluster cl ON cl.id = c.id
            ORDER BY c.id ASC
            "#,
        )
        .bind(primary_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_cluster", e))?;

        collect_contacts("find_cluster", rows)
    }

    #[instrument(skip(self, draft), err)]
    async fn insert(&mut self, draft: NewContact) -> Result<Contact, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO contacts (email, phone_number, link_precedence, linked_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, phone_number, link_precedence, linked_id,
                      created_at, updated_at
            "#,
        )
        .bind(draft.email)
        .bind(draft.phone_number)
        .bind(draft.link_precedence.as_str())
        .bind(draft.linked_id.map(|id| id.as_i64()))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert", e))?;

        decode_contact("insert", &row)
    }

    #[instrument(skip(self), err)]
    async fn relabel_to_secondary(
        &mut self,
        id: ContactId,
        new_linked_id: ContactId,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE contacts
            SET link_precedence = 'secondary', linked_id = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(new_linked_id.as_i64())
        .bind(id.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("relabel_to_secondary", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Consistency(format!(
                "relabel target {id} does not exist"
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }
}

#[derive(Debug)]
struct ContactRow {
    id: i64,
    email: Option<String>,
    phone_number: Option<String>,
    link_precedence: String,
    linked_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ContactRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            phone_number: row.try_get("phone_number")?,
            link_precedence: row.try_get("link_precedence")?,
            linked_id: row.try_get("linked_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<ContactRow> for Contact {
    type Error = StoreError;

    fn try_from(row: ContactRow) -> Result<Self, Self::Error> {
        let link_precedence = row
            .link_precedence
            .parse::<LinkPrecedence>()
            .map_err(|e| StoreError::Consistency(format!("contact {}: {}", row.id, e)))?;
        Ok(Contact {
            id: ContactId::new(row.id),
            email: row.email,
            phone_number: row.phone_number,
            link_precedence,
            linked_id: row.linked_id.map(ContactId::new),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn decode_contact(operation: &str, row: &PgRow) -> Result<Contact, StoreError> {
    let row = ContactRow::from_row(row).map_err(|e| {
        StoreError::Query(format!("failed to decode contact row in {operation}: {e}"))
    })?;
    Contact::try_from(row)
}

fn collect_contacts(operation: &str, rows: Vec<PgRow>) -> Result<Vec<Contact>, StoreError> {
    rows.iter().map(|row| decode_contact(operation, row)).collect()
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23503") | Some("23514") => StoreError::Consistency(msg),
                _ => StoreError::Query(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        other => StoreError::Query(format!("sqlx error in {operation}: {other}")),
    }
}
