//! PostgreSQL implementation of `DirectoryStorage` and `Storage`.
//!
//! Listings and statistics go through [`PoolProvider::read`]. Writes and the
//! single-record lookups that feed an update or a transition go through
//! [`PoolProvider::write`], so a lagging replica never decides a state change.

pub mod pool_provider;

pub use pool_provider::{PoolProvider, TestDbPools};

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use uuid::Uuid;

use super::utils::format_tracking_number;
use super::{DirectoryStorage, Storage};
use crate::directory::{Resident, ResidentFilter, ResidentId, ResidentSnapshot, Role, User, UserId};
use crate::error::{BarangayError, Result};
use crate::request::{
    Amount, AnyDocumentRequest, Approved, DocumentRequest, NewDocumentRequest, Paid,
    PaymentDetails, Pending, Rejected, Released, RequestData, RequestFilter, RequestId,
    RequestState, RequestStatus,
};

/// Advisory lock key serializing tracking-number assignment.
const TRACKING_LOCK_KEY: i64 = 0x4942_4759; // "IBGY"

const USER_COLUMNS: &str = "id, email, name, role, resident_id, created_at";

const RESIDENT_COLUMNS: &str = "id, user_id, first_name, middle_name, last_name, purok, address, \
     birthdate, household_number, contact_number, avatar_url, display_id, created_at";

const REQUEST_COLUMNS: &str = "id, resident_id, resident_name, document_type, purpose, \
     tracking_number, reference_number, amount_centavos, request_date, status, approval_date, \
     resident_snapshot, payment, paid_at, release_date, rejected_at, rejection_reason";

/// PostgreSQL storage adapter.
///
/// # Example
/// ```ignore
/// use barangay::PostgresStorage;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgresql://localhost/barangay").await?;
/// barangay::migrator().run(&pool).await?;
/// let storage = PostgresStorage::new(pool);
/// ```
pub struct PostgresStorage<P: PoolProvider> {
    pools: P,
}

impl<P: PoolProvider> PostgresStorage<P> {
    pub fn new(pools: P) -> Self {
        Self { pools }
    }

    /// Get the pool provider.
    pub fn pools(&self) -> &P {
        &self.pools
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.try_get("role").map_err(decode_err)?;
    Ok(User {
        id: UserId(row.try_get("id").map_err(decode_err)?),
        email: row.try_get("email").map_err(decode_err)?,
        name: row.try_get("name").map_err(decode_err)?,
        role: Role::parse(&role)
            .ok_or_else(|| BarangayError::Other(anyhow!("Unknown role '{}' in database", role)))?,
        resident_id: row
            .try_get::<Option<Uuid>, _>("resident_id")
            .map_err(decode_err)?
            .map(ResidentId),
        created_at: row.try_get("created_at").map_err(decode_err)?,
    })
}

fn resident_from_row(row: &PgRow) -> Result<Resident> {
    Ok(Resident {
        id: ResidentId(row.try_get("id").map_err(decode_err)?),
        user_id: UserId(row.try_get("user_id").map_err(decode_err)?),
        first_name: row.try_get("first_name").map_err(decode_err)?,
        middle_name: row.try_get("middle_name").map_err(decode_err)?,
        last_name: row.try_get("last_name").map_err(decode_err)?,
        purok: row.try_get("purok").map_err(decode_err)?,
        address: row.try_get("address").map_err(decode_err)?,
        birthdate: row.try_get("birthdate").map_err(decode_err)?,
        household_number: row.try_get("household_number").map_err(decode_err)?,
        contact_number: row.try_get("contact_number").map_err(decode_err)?,
        avatar_url: row.try_get("avatar_url").map_err(decode_err)?,
        display_id: row.try_get("display_id").map_err(decode_err)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
    })
}

fn request_from_row(row: &PgRow) -> Result<AnyDocumentRequest> {
    let id = RequestId(row.try_get("id").map_err(decode_err)?);
    let document_type: String = row.try_get("document_type").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;

    let data = RequestData {
        id,
        resident_id: ResidentId(row.try_get("resident_id").map_err(decode_err)?),
        resident_name: row.try_get("resident_name").map_err(decode_err)?,
        document_type: document_type.parse()?,
        purpose: row.try_get("purpose").map_err(decode_err)?,
        tracking_number: row.try_get("tracking_number").map_err(decode_err)?,
        reference_number: row.try_get("reference_number").map_err(decode_err)?,
        amount: Amount::from_centavos(row.try_get("amount_centavos").map_err(decode_err)?),
        request_date: row.try_get("request_date").map_err(decode_err)?,
    };

    let approval_date: Option<chrono::DateTime<chrono::Utc>> =
        row.try_get("approval_date").map_err(decode_err)?;
    let resident_snapshot: Option<ResidentSnapshot> = row
        .try_get::<Option<Json<ResidentSnapshot>>, _>("resident_snapshot")
        .map_err(decode_err)?
        .map(|json| json.0);
    let payment: Option<PaymentDetails> = row
        .try_get::<Option<Json<PaymentDetails>>, _>("payment")
        .map_err(decode_err)?
        .map(|json| json.0);
    let paid_at: Option<chrono::DateTime<chrono::Utc>> =
        row.try_get("paid_at").map_err(decode_err)?;

    let missing = |field: &str| {
        BarangayError::Other(anyhow!(
            "Missing {} for {} request {}",
            field,
            status,
            id
        ))
    };

    let status_value = RequestStatus::parse(&status)
        .ok_or_else(|| BarangayError::Other(anyhow!("Unknown status '{}' in database", status)))?;

    let request = match status_value {
        RequestStatus::Pending => AnyDocumentRequest::Pending(DocumentRequest {
            state: Pending {},
            data,
        }),
        RequestStatus::Approved => AnyDocumentRequest::Approved(DocumentRequest {
            state: Approved {
                approval_date: approval_date.ok_or_else(|| missing("approval_date"))?,
                resident_snapshot: resident_snapshot.ok_or_else(|| missing("resident_snapshot"))?,
                payment,
            },
            data,
        }),
        RequestStatus::Paid => AnyDocumentRequest::Paid(DocumentRequest {
            state: Paid {
                approval_date: approval_date.ok_or_else(|| missing("approval_date"))?,
                resident_snapshot: resident_snapshot.ok_or_else(|| missing("resident_snapshot"))?,
                payment: payment.ok_or_else(|| missing("payment"))?,
                paid_at: paid_at.ok_or_else(|| missing("paid_at"))?,
            },
            data,
        }),
        RequestStatus::Released => AnyDocumentRequest::Released(DocumentRequest {
            state: Released {
                approval_date: approval_date.ok_or_else(|| missing("approval_date"))?,
                resident_snapshot: resident_snapshot.ok_or_else(|| missing("resident_snapshot"))?,
                payment: payment.ok_or_else(|| missing("payment"))?,
                paid_at: paid_at.ok_or_else(|| missing("paid_at"))?,
                release_date: row
                    .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>("release_date")
                    .map_err(decode_err)?
                    .ok_or_else(|| missing("release_date"))?,
            },
            data,
        }),
        RequestStatus::Rejected => AnyDocumentRequest::Rejected(DocumentRequest {
            state: Rejected {
                rejected_at: row
                    .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>("rejected_at")
                    .map_err(decode_err)?
                    .ok_or_else(|| missing("rejected_at"))?,
                reason: row.try_get("rejection_reason").map_err(decode_err)?,
                approval_date,
                resident_snapshot,
                payment,
            },
            data,
        }),
    };
    Ok(request)
}

/// `ILIKE` pattern matching `needle` anywhere, with its wildcards taken
/// literally.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn decode_err(e: sqlx::Error) -> BarangayError {
    BarangayError::Other(anyhow!("Failed to decode row: {}", e))
}

#[async_trait]
impl<P: PoolProvider> DirectoryStorage for PostgresStorage<P> {
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id, role = %user.role))]
    async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, role, resident_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.resident_id.map(|id| *id))
        .bind(user.created_at)
        .execute(self.pools.write())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BarangayError::EmailAlreadyInUse(user.email.clone())
            } else {
                BarangayError::Other(anyhow!("Failed to insert user: {}", e))
            }
        })?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<User> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(*id)
            .fetch_optional(self.pools.write())
            .await
            .map_err(|e| BarangayError::Other(anyhow!("Failed to fetch user: {}", e)))?
            .ok_or(BarangayError::UserNotFound(id))?;
        user_from_row(&row)
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users WHERE ($1::text IS NULL OR role = $1) ORDER BY name",
            USER_COLUMNS
        ))
        .bind(role.map(|r| r.as_str()))
        .fetch_all(self.pools.read())
        .await
        .map_err(|e| BarangayError::Other(anyhow!("Failed to list users: {}", e)))?;
        rows.iter().map(user_from_row).collect()
    }

    async fn persist_user(&self, user: &User) -> Result<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE users SET
                email = $2,
                name = $3,
                role = $4,
                resident_id = $5
            WHERE id = $1
            "#,
        )
        .bind(*user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.resident_id.map(|id| *id))
        .execute(self.pools.write())
        .await
        .map_err(|e| BarangayError::Other(anyhow!("Failed to update user: {}", e)))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(BarangayError::UserNotFound(user.id));
        }
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(*id)
            .execute(self.pools.write())
            .await
            .map_err(|e| BarangayError::Other(anyhow!("Failed to delete user: {}", e)))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, resident), fields(resident_id = %resident.id))]
    async fn insert_resident(&self, resident: &Resident) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO residents ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            RESIDENT_COLUMNS
        ))
        .bind(*resident.id)
        .bind(*resident.user_id)
        .bind(&resident.first_name)
        .bind(&resident.middle_name)
        .bind(&resident.last_name)
        .bind(&resident.purok)
        .bind(&resident.address)
        .bind(resident.birthdate)
        .bind(&resident.household_number)
        .bind(&resident.contact_number)
        .bind(&resident.avatar_url)
        .bind(&resident.display_id)
        .bind(resident.created_at)
        .execute(self.pools.write())
        .await
        .map_err(|e| BarangayError::Other(anyhow!("Failed to insert resident: {}", e)))?;
        Ok(())
    }

    async fn get_resident(&self, id: ResidentId) -> Result<Resident> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM residents WHERE id = $1",
            RESIDENT_COLUMNS
        ))
        .bind(*id)
        .fetch_optional(self.pools.write())
        .await
        .map_err(|e| BarangayError::Other(anyhow!("Failed to fetch resident: {}", e)))?
        .ok_or(BarangayError::ResidentNotFound(id))?;
        resident_from_row(&row)
    }

    async fn list_residents(&self, filter: &ResidentFilter) -> Result<Vec<Resident>> {
        let search = filter.search.as_deref().map(contains_pattern);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM residents
            WHERE ($1::text IS NULL OR LOWER(purok) = LOWER($1))
              AND ($2::text IS NULL
                   OR first_name ILIKE $2 ESCAPE '\'
                   OR last_name ILIKE $2 ESCAPE '\'
                   OR display_id ILIKE $2 ESCAPE '\')
            ORDER BY last_name, first_name
            "#,
            RESIDENT_COLUMNS
        ))
        .bind(filter.purok.as_deref())
        .bind(search)
        .fetch_all(self.pools.read())
        .await
        .map_err(|e| BarangayError::Other(anyhow!("Failed to list residents: {}", e)))?;
        rows.iter().map(resident_from_row).collect()
    }

    async fn persist_resident(&self, resident: &Resident) -> Result<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE residents SET
                first_name = $2,
                middle_name = $3,
                last_name = $4,
                purok = $5,
                address = $6,
                birthdate = $7,
                household_number = $8,
                contact_number = $9,
                avatar_url = $10
            WHERE id = $1
            "#,
        )
        .bind(*resident.id)
        .bind(&resident.first_name)
        .bind(&resident.middle_name)
        .bind(&resident.last_name)
        .bind(&resident.purok)
        .bind(&resident.address)
        .bind(resident.birthdate)
        .bind(&resident.household_number)
        .bind(&resident.contact_number)
        .bind(&resident.avatar_url)
        .execute(self.pools.write())
        .await
        .map_err(|e| BarangayError::Other(anyhow!("Failed to update resident: {}", e)))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(BarangayError::ResidentNotFound(resident.id));
        }
        Ok(())
    }

    async fn delete_resident_record(&self, id: ResidentId) -> Result<()> {
        sqlx::query("DELETE FROM residents WHERE id = $1")
            .bind(*id)
            .execute(self.pools.write())
            .await
            .map_err(|e| BarangayError::Other(anyhow!("Failed to delete resident: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl<P: PoolProvider> Storage for PostgresStorage<P> {
    #[tracing::instrument(skip(self, request), fields(request_id = %request.id, resident_id = %request.resident_id))]
    async fn create_request(&self, request: NewDocumentRequest) -> Result<DocumentRequest<Pending>> {
        let mut tx = self
            .pools
            .write()
            .begin()
            .await
            .map_err(|e| BarangayError::Other(anyhow!("Failed to begin transaction: {}", e)))?;

        // Held until commit, so the count and the insert see the same table.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(TRACKING_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(|e| BarangayError::Other(anyhow!("Failed to take tracking lock: {}", e)))?;

        let resident_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM residents WHERE id = $1)")
                .bind(*request.resident_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| BarangayError::Other(anyhow!("Failed to check resident: {}", e)))?;
        if !resident_exists {
            return Err(BarangayError::ResidentNotFound(request.resident_id));
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_requests")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| BarangayError::Other(anyhow!("Failed to count requests: {}", e)))?;

        let mut sequence = count as u64 + 1;
        let tracking_number = loop {
            let candidate = format_tracking_number(request.tracking_date, sequence);
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM document_requests WHERE tracking_number = $1)",
            )
            .bind(&candidate)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| BarangayError::Other(anyhow!("Failed to check tracking number: {}", e)))?;
            if !taken {
                break candidate;
            }
            sequence += 1;
        };

        let pending = request.into_pending(tracking_number);
        let data = &pending.data;
        sqlx::query(
            r#"
            INSERT INTO document_requests (
                id, resident_id, resident_name, document_type, purpose,
                tracking_number, reference_number, amount_centavos, request_date, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'Pending')
            "#,
        )
        .bind(*data.id)
        .bind(*data.resident_id)
        .bind(&data.resident_name)
        .bind(data.document_type.display_name())
        .bind(&data.purpose)
        .bind(&data.tracking_number)
        .bind(&data.reference_number)
        .bind(data.amount.centavos())
        .bind(data.request_date)
        .execute(&mut *tx)
        .await
        .map_err(|e| BarangayError::Other(anyhow!("Failed to insert request: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| BarangayError::Other(anyhow!("Failed to commit request: {}", e)))?;

        tracing::debug!(tracking_number = %pending.data.tracking_number, "Inserted request");
        Ok(pending)
    }

    async fn get_request(&self, id: RequestId) -> Result<AnyDocumentRequest> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM document_requests WHERE id = $1",
            REQUEST_COLUMNS
        ))
        .bind(*id)
        .fetch_optional(self.pools.write())
        .await
        .map_err(|e| BarangayError::Other(anyhow!("Failed to fetch request: {}", e)))?
        .ok_or(BarangayError::RequestNotFound(id))?;
        request_from_row(&row)
    }

    #[tracing::instrument(skip(self, filter), fields(status = ?filter.status, resident_id = ?filter.resident_id))]
    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<AnyDocumentRequest>> {
        let search = filter.search.as_deref().map(contains_pattern);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM document_requests
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR resident_id = $2)
              AND ($3::text IS NULL OR document_type = $3)
              AND ($4::text IS NULL
                   OR tracking_number ILIKE $4 ESCAPE '\'
                   OR resident_name ILIKE $4 ESCAPE '\')
            ORDER BY request_date DESC, tracking_number DESC
            "#,
            REQUEST_COLUMNS
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.resident_id.map(|id| *id))
        .bind(filter.document_type.map(|d| d.display_name()))
        .bind(search)
        .fetch_all(self.pools.read())
        .await
        .map_err(|e| BarangayError::Other(anyhow!("Failed to list requests: {}", e)))?;
        rows.iter().map(request_from_row).collect()
    }

    async fn persist<T: RequestState + Clone>(
        &self,
        request: &DocumentRequest<T>,
        from: RequestStatus,
    ) -> Result<()>
    where
        AnyDocumentRequest: From<DocumentRequest<T>>,
    {
        let any_request = AnyDocumentRequest::from(request.clone());
        let id = any_request.id();

        let (paid_at, release_date, rejected_at, rejection_reason) = match &any_request {
            AnyDocumentRequest::Pending(_) | AnyDocumentRequest::Approved(_) => {
                (None, None, None, None)
            }
            AnyDocumentRequest::Paid(req) => (Some(req.state.paid_at), None, None, None),
            AnyDocumentRequest::Released(req) => (
                Some(req.state.paid_at),
                Some(req.state.release_date),
                None,
                None,
            ),
            AnyDocumentRequest::Rejected(req) => (
                None,
                None,
                Some(req.state.rejected_at),
                req.state.reason.clone(),
            ),
        };

        let rows_affected = sqlx::query(
            r#"
            UPDATE document_requests SET
                status = $2,
                approval_date = $3,
                resident_snapshot = $4,
                payment = $5,
                paid_at = $6,
                release_date = $7,
                rejected_at = $8,
                rejection_reason = $9
            WHERE id = $1 AND status = $10
            "#,
        )
        .bind(*id)
        .bind(any_request.status().as_str())
        .bind(any_request.approval_date())
        .bind(any_request.resident_snapshot().map(Json))
        .bind(any_request.payment().map(Json))
        .bind(paid_at)
        .bind(release_date)
        .bind(rejected_at)
        .bind(rejection_reason)
        .bind(from.as_str())
        .execute(self.pools.write())
        .await
        .map_err(|e| BarangayError::Other(anyhow!("Failed to update request: {}", e)))?
        .rows_affected();

        if rows_affected == 0 {
            let stored: Option<String> =
                sqlx::query_scalar("SELECT status FROM document_requests WHERE id = $1")
                    .bind(*id)
                    .fetch_optional(self.pools.write())
                    .await
                    .map_err(|e| BarangayError::Other(anyhow!("Failed to fetch request: {}", e)))?;
            let Some(stored) = stored else {
                return Err(BarangayError::RequestNotFound(id));
            };
            let stored = RequestStatus::parse(&stored).ok_or_else(|| {
                BarangayError::Other(anyhow!("Unknown status '{}' in database", stored))
            })?;
            tracing::warn!(
                request_id = %id,
                expected = %from,
                stored = %stored,
                "Refusing write from a stale request"
            );
            return Err(BarangayError::InvalidTransition {
                id,
                from: stored,
                to: any_request.status(),
            });
        }

        tracing::debug!(request_id = %id, from = %from, to = %any_request.status(), "Persisted request");
        Ok(())
    }

    async fn delete_request_record(&self, id: RequestId) -> Result<()> {
        sqlx::query("DELETE FROM document_requests WHERE id = $1")
            .bind(*id)
            .execute(self.pools.write())
            .await
            .map_err(|e| BarangayError::Other(anyhow!("Failed to delete request: {}", e)))?;
        Ok(())
    }
}
