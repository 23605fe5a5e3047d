//! State transitions for document requests using the typestate pattern.
//!
//! Each request state is a distinct type parameter on `DocumentRequest<State>`,
//! so only the edges of the lifecycle exist as methods:
//!
//! ```text
//! DocumentRequest<Pending> ──approve()──> DocumentRequest<Approved> ──mark_paid()──> DocumentRequest<Paid>
//!        │                                   │        ▲                                   │
//!        │                                   │        └─attach_payment()                  └──release()──> DocumentRequest<Released>
//!        └──reject()──> DocumentRequest<Rejected> <──reject()──┘
//! ```
//!
//! # Derived fields
//!
//! - **Approve** copies the resident's first name, last name, address and
//!   birthdate into the snapshot and stamps `approval_date`. Both are moved by
//!   value into every later state, so they are written exactly once.
//! - **Attach payment** records the resident's self-reported payment without
//!   changing the status; staff verify it with `mark_paid`.
//! - **Release** stamps `release_date` and carries `approval_date` through
//!   unchanged.
//!
//! Every transition persists the new state before returning it. The write
//! only lands while the stored request is still in the state the handle was
//! read in; a stale handle gets `InvalidTransition` and changes nothing.

use chrono::Utc;
use metrics::counter;

use crate::domain::resident::{Resident, ResidentSnapshot};
use crate::error::{BarangayError, Result};
use crate::manager::Storage;

use super::state::{
    Approved, DocumentRequest, Paid, PaymentDetails, PaymentMethod, PaymentSubmission, Pending,
    Rejected, Released, RequestStatus,
};

fn record_transition(to: RequestStatus) {
    counter!("barangay_request_transitions_total", "to" => to.as_str()).increment(1);
}

impl DocumentRequest<Pending> {
    /// Approve the request, freezing the resident's current details onto it.
    pub async fn approve<S: Storage + ?Sized>(
        self,
        resident: &Resident,
        storage: &S,
    ) -> Result<DocumentRequest<Approved>> {
        if resident.id != self.data.resident_id {
            return Err(BarangayError::Validation(format!(
                "Resident {} does not own request {}",
                resident.id, self.data.id
            )));
        }

        let request = DocumentRequest {
            data: self.data,
            state: Approved {
                approval_date: Utc::now(),
                resident_snapshot: ResidentSnapshot::from(resident),
                payment: None,
            },
        };
        storage.persist(&request, RequestStatus::Pending).await?;
        record_transition(RequestStatus::Approved);
        tracing::info!(
            request_id = %request.data.id,
            tracking_number = %request.data.tracking_number,
            "Request approved"
        );
        Ok(request)
    }

    pub async fn reject<S: Storage + ?Sized>(
        self,
        reason: Option<String>,
        storage: &S,
    ) -> Result<DocumentRequest<Rejected>> {
        let request = DocumentRequest {
            data: self.data,
            state: Rejected {
                rejected_at: Utc::now(),
                reason,
                approval_date: None,
                resident_snapshot: None,
                payment: None,
            },
        };
        storage.persist(&request, RequestStatus::Pending).await?;
        record_transition(RequestStatus::Rejected);
        tracing::info!(request_id = %request.data.id, "Pending request rejected");
        Ok(request)
    }
}

impl DocumentRequest<Approved> {
    /// Attach a self-reported payment. The status stays Approved until staff
    /// verify it.
    ///
    /// The quoted reference number must match the request's, and electronic
    /// payments must carry a transaction id. A later submission replaces an
    /// earlier unverified one.
    pub async fn attach_payment<S: Storage + ?Sized>(
        self,
        submission: PaymentSubmission,
        storage: &S,
    ) -> Result<DocumentRequest<Approved>> {
        if submission.reference_number.trim() != self.data.reference_number {
            return Err(BarangayError::Validation(format!(
                "Reference number '{}' does not match request {}",
                submission.reference_number, self.data.tracking_number
            )));
        }

        let transaction_id = submission
            .transaction_id
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if submission.method.requires_transaction_id() && transaction_id.is_none() {
            return Err(BarangayError::Validation(format!(
                "{} payments need a transaction id",
                submission.method.as_str()
            )));
        }

        let request = DocumentRequest {
            data: self.data,
            state: Approved {
                approval_date: self.state.approval_date,
                resident_snapshot: self.state.resident_snapshot,
                payment: Some(PaymentDetails {
                    method: submission.method,
                    transaction_id,
                    payment_date: submission.payment_date.unwrap_or_else(Utc::now),
                }),
            },
        };
        storage.persist(&request, RequestStatus::Approved).await?;
        counter!(
            "barangay_payments_submitted_total",
            "method" => submission.method.as_str()
        )
        .increment(1);
        tracing::info!(
            request_id = %request.data.id,
            method = submission.method.as_str(),
            "Payment submitted for verification"
        );
        Ok(request)
    }

    /// Staff verification of payment.
    ///
    /// Uses the attached payment when there is one; otherwise the payment was
    /// taken over the counter and is recorded as cash paid now.
    pub async fn mark_paid<S: Storage + ?Sized>(self, storage: &S) -> Result<DocumentRequest<Paid>> {
        let now = Utc::now();
        let payment = self.state.payment.unwrap_or(PaymentDetails {
            method: PaymentMethod::Cash,
            transaction_id: None,
            payment_date: now,
        });

        let request = DocumentRequest {
            data: self.data,
            state: Paid {
                approval_date: self.state.approval_date,
                resident_snapshot: self.state.resident_snapshot,
                payment,
                paid_at: now,
            },
        };
        storage.persist(&request, RequestStatus::Approved).await?;
        record_transition(RequestStatus::Paid);
        tracing::info!(
            request_id = %request.data.id,
            amount = %request.data.amount,
            method = request.state.payment.method.as_str(),
            "Payment verified"
        );
        Ok(request)
    }

    pub async fn reject<S: Storage + ?Sized>(
        self,
        reason: Option<String>,
        storage: &S,
    ) -> Result<DocumentRequest<Rejected>> {
        let request = DocumentRequest {
            data: self.data,
            state: Rejected {
                rejected_at: Utc::now(),
                reason,
                approval_date: Some(self.state.approval_date),
                resident_snapshot: Some(self.state.resident_snapshot),
                payment: self.state.payment,
            },
        };
        storage.persist(&request, RequestStatus::Approved).await?;
        record_transition(RequestStatus::Rejected);
        tracing::info!(request_id = %request.data.id, "Approved request rejected");
        Ok(request)
    }
}

impl DocumentRequest<Paid> {
    /// Hand the document over to the resident.
    pub async fn release<S: Storage + ?Sized>(
        self,
        storage: &S,
    ) -> Result<DocumentRequest<Released>> {
        let request = DocumentRequest {
            data: self.data,
            state: Released {
                approval_date: self.state.approval_date,
                resident_snapshot: self.state.resident_snapshot,
                payment: self.state.payment,
                paid_at: self.state.paid_at,
                release_date: Utc::now(),
            },
        };
        storage.persist(&request, RequestStatus::Paid).await?;
        record_transition(RequestStatus::Released);
        tracing::info!(
            request_id = %request.data.id,
            tracking_number = %request.data.tracking_number,
            "Document released"
        );
        Ok(request)
    }
}
