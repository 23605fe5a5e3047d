//! Main traits for the barangay request system.
//!
//! This module defines the `DirectoryStorage` and `Storage` traits. Adapters
//! implement the small set of required methods (insert, fetch, list, persist,
//! delete); the lifecycle and sync rules are provided methods built on top of
//! them, so every adapter enforces the same rules.

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounts::{AccountProvider, normalize_email};
use crate::directory::{
    Resident, ResidentFilter, ResidentId, ResidentProfile, ResidentUpdate, Role, User, UserId,
    UserUpdate, split_full_name,
};
use crate::error::{BarangayError, Result};
use crate::objects::{ObjectStore, avatar_path, content_type_for};
use crate::reports::RequestStats;
use crate::request::{
    AnyDocumentRequest, Approved, DocumentRequest, DocumentRequestInput, FeeSchedule, NewDocumentRequest,
    PaymentSubmission, Pending, RequestFilter, RequestId, RequestState, RequestStatus,
};
use async_trait::async_trait;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod utils;

/// Input for registering a resident together with their account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewResidentAccount {
    pub email: String,
    pub password: String,
    pub profile: ResidentProfile,
}

/// Input for creating a staff account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStaffAccount {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
}

/// Storage for users and residents, plus the rules keeping the two in sync.
#[async_trait]
pub trait DirectoryStorage: Send + Sync {
    /// Insert a new user record.
    async fn insert_user(&self, user: &User) -> Result<()>;

    /// Get a user by ID.
    async fn get_user(&self, id: UserId) -> Result<User>;

    /// List users, optionally only those with the given role.
    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>>;

    /// Overwrite an existing user record.
    async fn persist_user(&self, user: &User) -> Result<()>;

    /// Remove a user record. Removing an unknown user is not an error.
    async fn delete_user(&self, id: UserId) -> Result<()>;

    /// Insert a new resident record.
    async fn insert_resident(&self, resident: &Resident) -> Result<()>;

    /// Get a resident by ID.
    async fn get_resident(&self, id: ResidentId) -> Result<Resident>;

    /// List residents matching a filter, ordered by last then first name.
    async fn list_residents(&self, filter: &ResidentFilter) -> Result<Vec<Resident>>;

    /// Overwrite an existing resident record.
    async fn persist_resident(&self, resident: &Resident) -> Result<()>;

    /// Remove a resident record. Removing an unknown resident is not an error.
    async fn delete_resident_record(&self, id: ResidentId) -> Result<()>;

    /// Register a resident: creates the credential account, the user (role
    /// Resident) and the resident record together.
    ///
    /// The account provider never signs the new account in, so the caller's
    /// own session is untouched. If the records cannot be written, the account
    /// and user are removed again on a best-effort basis.
    #[tracing::instrument(skip(self, accounts, input))]
    async fn register_resident<A: AccountProvider + ?Sized>(
        &self,
        accounts: &A,
        input: NewResidentAccount,
    ) -> Result<(User, Resident)> {
        let email = normalize_email(&input.email)?;
        // Validate the profile before any account exists
        let mut resident = input.profile.into_resident(UserId(Uuid::nil()))?;

        let user_id = accounts.create_account(&email, &input.password).await?;
        resident.user_id = user_id;

        let user = User {
            id: user_id,
            email,
            name: resident.full_name(),
            role: Role::Resident,
            resident_id: Some(resident.id),
            created_at: Utc::now(),
        };

        if let Err(e) = self.insert_user(&user).await {
            rollback_account(accounts, user_id).await;
            return Err(e);
        }
        if let Err(e) = self.insert_resident(&resident).await {
            if let Err(cleanup) = self.delete_user(user_id).await {
                tracing::warn!(user_id = %user_id, error = %cleanup, "Failed to remove orphaned user");
            }
            rollback_account(accounts, user_id).await;
            return Err(e);
        }

        tracing::info!(
            user_id = %user.id,
            resident_id = %resident.id,
            display_id = %resident.display_id,
            "Resident registered"
        );
        Ok((user, resident))
    }

    /// Create a staff account. Only administrators may do this.
    #[tracing::instrument(skip(self, accounts, input), fields(actor = %actor.id))]
    async fn create_staff_user<A: AccountProvider + ?Sized>(
        &self,
        actor: &User,
        accounts: &A,
        input: NewStaffAccount,
    ) -> Result<User> {
        if actor.role != Role::Admin {
            return Err(BarangayError::Forbidden(format!(
                "{} cannot create accounts",
                actor.role
            )));
        }
        if !input.role.is_staff() {
            return Err(BarangayError::Validation(
                "Residents are registered with their profile, not as staff".to_string(),
            ));
        }
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(BarangayError::Validation("name must not be empty".to_string()));
        }
        let email = normalize_email(&input.email)?;

        let user_id = accounts.create_account(&email, &input.password).await?;
        let user = User {
            id: user_id,
            email,
            name,
            role: input.role,
            resident_id: None,
            created_at: Utc::now(),
        };
        if let Err(e) = self.insert_user(&user).await {
            rollback_account(accounts, user_id).await;
            return Err(e);
        }

        tracing::info!(user_id = %user.id, role = %user.role, "Staff account created");
        Ok(user)
    }

    /// Apply a partial update to a resident.
    ///
    /// The address is rebuilt whenever the purok changes. When the first or
    /// last name changes, the paired user's display name is rewritten as
    /// `"{first} {last}"`. Both records are loaded and checked before either
    /// is written.
    #[tracing::instrument(skip(self, update))]
    async fn update_resident(&self, id: ResidentId, update: ResidentUpdate) -> Result<Resident> {
        let mut resident = self.get_resident(id).await?;
        let name_changed = resident.apply(update)?;

        let paired = if name_changed {
            match self.get_user(resident.user_id).await {
                Ok(mut user) => {
                    user.name = resident.full_name();
                    Some(user)
                }
                Err(BarangayError::UserNotFound(user_id)) => {
                    tracing::warn!(resident_id = %id, user_id = %user_id, "Resident has no paired user");
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        self.persist_resident(&resident).await?;
        if let Some(user) = paired {
            if let Err(e) = self.persist_user(&user).await {
                tracing::error!(
                    resident_id = %id,
                    user_id = %user.id,
                    error = %e,
                    "Resident updated but user name left unsynced"
                );
                return Err(e);
            }
            tracing::debug!(user_id = %user.id, name = %user.name, "Synced user name from resident");
        }

        Ok(resident)
    }

    /// Apply a partial update to a user.
    ///
    /// When the name of a Resident-role user changes, it is split on the first
    /// space and written back to the paired resident: `"Maria Clara Santos"`
    /// becomes first name `Maria`, last name `Clara Santos`. A single-word name
    /// only replaces the first name. Both records are loaded and checked before
    /// either is written.
    #[tracing::instrument(skip(self, update))]
    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<User> {
        let mut user = self.get_user(id).await?;

        if let Some(role) = update.role
            && role != user.role
        {
            if !role.is_staff() || !user.role.is_staff() {
                return Err(BarangayError::Validation(format!(
                    "Cannot change role from {} to {}",
                    user.role, role
                )));
            }
            user.role = role;
        }

        let mut name_changed = false;
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(BarangayError::Validation("name must not be empty".to_string()));
            }
            name_changed = name != user.name;
            user.name = name;
        }

        let paired = match user.resident_id {
            Some(resident_id) if name_changed && user.role == Role::Resident => {
                let (first_name, last_name) = split_full_name(&user.name);
                let mut resident = self.get_resident(resident_id).await?;
                resident.apply(ResidentUpdate {
                    first_name: Some(first_name),
                    last_name: (!last_name.is_empty()).then_some(last_name),
                    ..Default::default()
                })?;
                Some(resident)
            }
            _ => None,
        };

        self.persist_user(&user).await?;
        if let Some(resident) = paired {
            if let Err(e) = self.persist_resident(&resident).await {
                tracing::error!(
                    user_id = %id,
                    resident_id = %resident.id,
                    error = %e,
                    "User updated but resident name left unsynced"
                );
                return Err(e);
            }
            tracing::debug!(
                resident_id = %resident.id,
                first_name = %resident.first_name,
                last_name = %resident.last_name,
                "Synced resident name from user"
            );
        }

        Ok(user)
    }

    /// Remove a resident together with their user record and account.
    ///
    /// Requests already filed keep their denormalized resident name.
    #[tracing::instrument(skip(self, accounts))]
    async fn delete_resident<A: AccountProvider + ?Sized>(
        &self,
        accounts: &A,
        id: ResidentId,
    ) -> Result<()> {
        let resident = self.get_resident(id).await?;
        self.delete_resident_record(id).await?;
        self.delete_user(resident.user_id).await?;
        accounts.delete_account(resident.user_id).await?;
        tracing::info!(resident_id = %id, "Resident deleted");
        Ok(())
    }

    /// Store a profile picture under `profile-pictures/{resident_id}/{file_name}`
    /// and record its URL on the resident.
    #[tracing::instrument(skip(self, objects, bytes), fields(size = bytes.len()))]
    async fn upload_avatar<O: ObjectStore + ?Sized>(
        &self,
        objects: &O,
        id: ResidentId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Resident> {
        let path = avatar_path(id, file_name)?;
        let mut resident = self.get_resident(id).await?;
        let url = objects
            .put(&path, bytes, content_type_for(file_name))
            .await?;
        resident.avatar_url = Some(url);
        self.persist_resident(&resident).await?;
        Ok(resident)
    }

    /// Check credentials and return the signed-in user.
    #[tracing::instrument(skip(self, accounts, password))]
    async fn sign_in<A: AccountProvider + ?Sized>(
        &self,
        accounts: &A,
        email: &str,
        password: &str,
    ) -> Result<User> {
        let user_id = accounts.authenticate(email, password).await?;
        let user = self.get_user(user_id).await?;
        tracing::info!(user_id = %user.id, role = %user.role, "Signed in");
        Ok(user)
    }
}

async fn rollback_account<A: AccountProvider + ?Sized>(accounts: &A, user_id: UserId) {
    if let Err(e) = accounts.delete_account(user_id).await {
        tracing::warn!(user_id = %user_id, error = %e, "Failed to roll back account");
    }
}

/// Storage trait for persisting and querying document requests.
///
/// The typestate transitions only build valid edges, but a handle can go stale
/// while another writer moves the stored request on. `persist` is therefore a
/// compare-and-set on the stored status. The provided methods add
/// authorization and the runtime (untyped) entry points.
#[async_trait]
pub trait Storage: DirectoryStorage {
    /// Insert a new pending request, assigning its tracking number.
    ///
    /// The sequence part is the number of stored requests plus one, skipping
    /// numbers already taken. Counting and inserting happen atomically, so
    /// concurrent submissions never share a tracking number.
    async fn create_request(&self, request: NewDocumentRequest) -> Result<DocumentRequest<Pending>>;

    /// Get a request by ID.
    async fn get_request(&self, id: RequestId) -> Result<AnyDocumentRequest>;

    /// List requests matching a filter, newest first.
    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<AnyDocumentRequest>>;

    /// Write a request's new state, provided the stored request is still in
    /// status `from`.
    ///
    /// Fails with `InvalidTransition` (stored status to new status) without
    /// writing anything when another writer got there first, and with
    /// `RequestNotFound` when the request is gone.
    async fn persist<T: RequestState + Clone>(
        &self,
        request: &DocumentRequest<T>,
        from: RequestStatus,
    ) -> Result<()>
    where
        AnyDocumentRequest: From<DocumentRequest<T>>;

    /// Remove a request. Removing an unknown request is not an error.
    async fn delete_request_record(&self, id: RequestId) -> Result<()>;

    /// Submit a request for one document on behalf of a resident.
    ///
    /// Residents may only submit for themselves; staff may submit for anyone
    /// (walk-in requests). The amount comes from the fee schedule.
    #[tracing::instrument(skip(self, actor, input, fees), fields(actor = %actor.id, document_type = %input.document_type))]
    async fn submit_request(
        &self,
        actor: &User,
        resident_id: ResidentId,
        input: DocumentRequestInput,
        fees: &FeeSchedule,
    ) -> Result<DocumentRequest<Pending>> {
        if !actor.can_view_resident_data(resident_id) {
            return Err(BarangayError::Forbidden(
                "Residents can only request documents for themselves".to_string(),
            ));
        }
        let resident = self.get_resident(resident_id).await?;

        let now = Utc::now();
        let date = utils::office_date(now);
        let request = self
            .create_request(NewDocumentRequest {
                id: RequestId(Uuid::new_v4()),
                resident_id,
                resident_name: resident.full_name(),
                document_type: input.document_type,
                purpose: input
                    .purpose
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty()),
                reference_number: utils::generate_reference_number(date),
                amount: fees.fee_for(input.document_type),
                request_date: now,
                tracking_date: date,
            })
            .await?;

        counter!(
            "barangay_requests_submitted_total",
            "document_type" => input.document_type.display_name()
        )
        .increment(1);
        tracing::info!(
            request_id = %request.data.id,
            tracking_number = %request.data.tracking_number,
            amount = %request.data.amount,
            "Document request submitted"
        );
        Ok(request)
    }

    /// Move a request to `target`.
    ///
    /// The actor's role must allow the target status, and the move must be an
    /// edge of the lifecycle. Asking for the status the request already has is
    /// a no-op returning the stored request, so dates are never re-stamped.
    #[tracing::instrument(skip(self, actor, reason), fields(actor = %actor.id))]
    async fn advance_request(
        &self,
        actor: &User,
        id: RequestId,
        target: RequestStatus,
        reason: Option<String>,
    ) -> Result<AnyDocumentRequest> {
        if !actor.role.can_transition_to(target) {
            return Err(BarangayError::Forbidden(format!(
                "{} cannot mark requests as {}",
                actor.role, target
            )));
        }

        let current = self.get_request(id).await?;
        let from = current.status();
        if from == target {
            tracing::debug!(request_id = %id, status = %from, "Request already in target status");
            return Ok(current);
        }

        let advanced: Result<AnyDocumentRequest> = match (current, target) {
            (AnyDocumentRequest::Pending(req), RequestStatus::Approved) => {
                let resident = self.get_resident(req.data.resident_id).await?;
                req.approve(&resident, self).await.map(Into::into)
            }
            (AnyDocumentRequest::Pending(req), RequestStatus::Rejected) => {
                req.reject(reason, self).await.map(Into::into)
            }
            (AnyDocumentRequest::Approved(req), RequestStatus::Paid) => {
                req.mark_paid(self).await.map(Into::into)
            }
            (AnyDocumentRequest::Approved(req), RequestStatus::Rejected) => {
                req.reject(reason, self).await.map(Into::into)
            }
            (AnyDocumentRequest::Paid(req), RequestStatus::Released) => {
                req.release(self).await.map(Into::into)
            }
            (_, to) => {
                tracing::warn!(request_id = %id, from = %from, to = %to, "Rejected invalid transition");
                return Err(BarangayError::InvalidTransition { id, from, to });
            }
        };

        match advanced {
            // A concurrent writer already made the same move.
            Err(BarangayError::InvalidTransition { from: stored, .. }) if stored == target => {
                tracing::debug!(request_id = %id, status = %stored, "Request moved concurrently");
                self.get_request(id).await
            }
            other => other,
        }
    }

    /// Self-report a payment for an approved request.
    #[tracing::instrument(skip(self, actor, submission), fields(actor = %actor.id))]
    async fn submit_payment(
        &self,
        actor: &User,
        id: RequestId,
        submission: PaymentSubmission,
    ) -> Result<DocumentRequest<Approved>> {
        let current = self.get_request_for(actor, id).await?;
        let status = current.status();
        match current.into_approved() {
            Some(req) => req.attach_payment(submission, self).await,
            None => Err(BarangayError::Validation(format!(
                "Payments can only be submitted for approved requests; request {} is {}",
                id, status
            ))),
        }
    }

    /// Get a request if the actor may see it.
    ///
    /// Requests outside a resident's own scope are reported as not found.
    async fn get_request_for(&self, actor: &User, id: RequestId) -> Result<AnyDocumentRequest> {
        let request = self.get_request(id).await?;
        if !actor.can_view_resident_data(request.data().resident_id) {
            return Err(BarangayError::RequestNotFound(id));
        }
        Ok(request)
    }

    /// List the requests visible to the actor: everything for staff, only
    /// their own for residents.
    async fn list_requests_for(
        &self,
        actor: &User,
        filter: RequestFilter,
    ) -> Result<Vec<AnyDocumentRequest>> {
        if actor.role.is_staff() {
            return self.list_requests(&filter).await;
        }
        match actor.resident_id {
            Some(resident_id) => {
                let scoped = RequestFilter {
                    resident_id: Some(resident_id),
                    ..filter
                };
                self.list_requests(&scoped).await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Delete a request. Administrators only.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    async fn delete_request(&self, actor: &User, id: RequestId) -> Result<()> {
        if actor.role != Role::Admin {
            return Err(BarangayError::Forbidden(format!(
                "{} cannot delete requests",
                actor.role
            )));
        }
        self.get_request(id).await?;
        self.delete_request_record(id).await?;
        tracing::info!(request_id = %id, "Request deleted");
        Ok(())
    }

    /// Dashboard statistics over all requests. Staff only.
    async fn request_stats(&self, actor: &User) -> Result<RequestStats> {
        if !actor.role.is_staff() {
            return Err(BarangayError::Forbidden(
                "Residents cannot view office statistics".to_string(),
            ));
        }
        let requests = self.list_requests(&RequestFilter::default()).await?;
        Ok(RequestStats::from_requests(&requests))
    }
}
