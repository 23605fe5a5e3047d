//! In-memory implementation of `DirectoryStorage` and `Storage`.
//!
//! All records live behind a single mutex, which makes tracking-number
//! assignment atomic with the insert. Used in tests and for local runs
//! without a database.

use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;

use super::utils::format_tracking_number;
use super::{DirectoryStorage, Storage};
use crate::directory::{Resident, ResidentFilter, ResidentId, Role, User, UserId};
use crate::error::{BarangayError, Result};
use crate::request::{
    AnyDocumentRequest, DocumentRequest, NewDocumentRequest, Pending, RequestFilter, RequestId,
    RequestState, RequestStatus,
};

#[derive(Default)]
struct Records {
    users: HashMap<UserId, User>,
    residents: HashMap<ResidentId, Resident>,
    requests: HashMap<RequestId, AnyDocumentRequest>,
}

/// Storage adapter keeping every record in process memory.
#[derive(Default)]
pub struct InMemoryStorage {
    records: Mutex<Records>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored requests.
    pub fn request_count(&self) -> usize {
        self.records.lock().requests.len()
    }
}

#[async_trait]
impl DirectoryStorage for InMemoryStorage {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut records = self.records.lock();
        if records.users.contains_key(&user.id) {
            return Err(BarangayError::Other(anyhow!("User {} already exists", user.id)));
        }
        records.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<User> {
        self.records
            .lock()
            .users
            .get(&id)
            .cloned()
            .ok_or(BarangayError::UserNotFound(id))
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        let mut users: Vec<User> = self
            .records
            .lock()
            .users
            .values()
            .filter(|u| role.is_none_or(|r| u.role == r))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn persist_user(&self, user: &User) -> Result<()> {
        match self.records.lock().users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(BarangayError::UserNotFound(user.id)),
        }
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        self.records.lock().users.remove(&id);
        Ok(())
    }

    async fn insert_resident(&self, resident: &Resident) -> Result<()> {
        let mut records = self.records.lock();
        if records.residents.contains_key(&resident.id) {
            return Err(BarangayError::Other(anyhow!(
                "Resident {} already exists",
                resident.id
            )));
        }
        records.residents.insert(resident.id, resident.clone());
        Ok(())
    }

    async fn get_resident(&self, id: ResidentId) -> Result<Resident> {
        self.records
            .lock()
            .residents
            .get(&id)
            .cloned()
            .ok_or(BarangayError::ResidentNotFound(id))
    }

    async fn list_residents(&self, filter: &ResidentFilter) -> Result<Vec<Resident>> {
        let mut residents: Vec<Resident> = self
            .records
            .lock()
            .residents
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        residents.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then_with(|| a.first_name.cmp(&b.first_name))
        });
        Ok(residents)
    }

    async fn persist_resident(&self, resident: &Resident) -> Result<()> {
        match self.records.lock().residents.get_mut(&resident.id) {
            Some(existing) => {
                *existing = resident.clone();
                Ok(())
            }
            None => Err(BarangayError::ResidentNotFound(resident.id)),
        }
    }

    async fn delete_resident_record(&self, id: ResidentId) -> Result<()> {
        self.records.lock().residents.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_request(&self, request: NewDocumentRequest) -> Result<DocumentRequest<Pending>> {
        let mut records = self.records.lock();
        if !records.residents.contains_key(&request.resident_id) {
            return Err(BarangayError::ResidentNotFound(request.resident_id));
        }

        let mut sequence = records.requests.len() as u64 + 1;
        let mut tracking_number = format_tracking_number(request.tracking_date, sequence);
        while records
            .requests
            .values()
            .any(|r| r.data().tracking_number == tracking_number)
        {
            sequence += 1;
            tracking_number = format_tracking_number(request.tracking_date, sequence);
        }

        let pending = request.into_pending(tracking_number);
        records
            .requests
            .insert(pending.data.id, AnyDocumentRequest::from(pending.clone()));
        Ok(pending)
    }

    async fn get_request(&self, id: RequestId) -> Result<AnyDocumentRequest> {
        self.records
            .lock()
            .requests
            .get(&id)
            .cloned()
            .ok_or(BarangayError::RequestNotFound(id))
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<AnyDocumentRequest>> {
        let mut requests: Vec<AnyDocumentRequest> = self
            .records
            .lock()
            .requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        requests.sort_by(|a, b| {
            b.data()
                .request_date
                .cmp(&a.data().request_date)
                .then_with(|| b.data().tracking_number.cmp(&a.data().tracking_number))
        });
        Ok(requests)
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
        match self.records.lock().requests.get_mut(&id) {
            Some(existing) if existing.status() != from => {
                tracing::warn!(
                    request_id = %id,
                    expected = %from,
                    stored = %existing.status(),
                    "Refusing write from a stale request"
                );
                Err(BarangayError::InvalidTransition {
                    id,
                    from: existing.status(),
                    to: any_request.status(),
                })
            }
            Some(existing) => {
                tracing::debug!(
                    request_id = %id,
                    from = %from,
                    to = %any_request.status(),
                    "Persisting request"
                );
                *existing = any_request;
                Ok(())
            }
            None => Err(BarangayError::RequestNotFound(id)),
        }
    }

    async fn delete_request_record(&self, id: RequestId) -> Result<()> {
        self.records.lock().requests.remove(&id);
        Ok(())
    }
}
