//! Core types for document requests.
//!
//! This module defines the type-safe request lifecycle using the typestate pattern.
//! Each request progresses through distinct states, enforced at compile time.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::fees::{Amount, DocumentType};
use crate::domain::resident::{ResidentId, ResidentSnapshot};

/// Flat status of a request, as stored and as used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Paid,
    Released,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Approved => "Approved",
            RequestStatus::Paid => "Paid",
            RequestStatus::Released => "Released",
            RequestStatus::Rejected => "Rejected",
        }
    }

    pub fn parse(s: &str) -> Option<RequestStatus> {
        match s {
            "Pending" => Some(RequestStatus::Pending),
            "Approved" => Some(RequestStatus::Approved),
            "Paid" => Some(RequestStatus::Paid),
            "Released" => Some(RequestStatus::Released),
            "Rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }

    /// Edges of the lifecycle:
    ///
    /// ```text
    /// Pending ──> Approved ──> Paid ──> Released
    ///    │            │
    ///    └────────────┴──> Rejected
    /// ```
    pub fn can_transition_to(&self, target: RequestStatus) -> bool {
        matches!(
            (self, target),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
                | (RequestStatus::Approved, RequestStatus::Paid)
                | (RequestStatus::Approved, RequestStatus::Rejected)
                | (RequestStatus::Paid, RequestStatus::Released)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Released | RequestStatus::Rejected)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker trait for valid request states.
///
/// This trait enables the typestate pattern, ensuring that operations
/// are only performed on requests in valid states.
pub trait RequestState: Send + Sync {}

/// A document request.
///
/// Uses the typestate pattern to ensure type-safe state transitions.
/// The generic parameter `T` represents the current state of the request.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRequest<T: RequestState> {
    /// The current state of the request.
    pub state: T,
    /// Data fixed at submission time.
    pub data: RequestData,
}

/// Data captured when the request is submitted. Never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestData {
    pub id: RequestId,

    /// The requesting resident
    pub resident_id: ResidentId,

    /// Denormalized at creation; renaming the resident later does not touch it
    pub resident_name: String,

    pub document_type: DocumentType,

    /// Free-text purpose given by the resident (e.g. "employment")
    pub purpose: Option<String>,

    /// Human-readable identifier, `IBGY-YYMMDD###`
    pub tracking_number: String,

    /// Identifier the resident quotes when self-reporting a payment
    pub reference_number: String,

    /// Fee looked up from the fee schedule at submission
    pub amount: Amount,

    pub request_date: DateTime<Utc>,
}

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    GCash,
    Maya,
    #[serde(rename = "Bank Transfer")]
    BankTransfer,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::GCash => "GCash",
            PaymentMethod::Maya => "Maya",
            PaymentMethod::BankTransfer => "Bank Transfer",
            PaymentMethod::Cash => "Cash",
        }
    }

    /// Electronic methods carry a transaction id that staff verify against.
    pub fn requires_transaction_id(&self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub payment_date: DateTime<Utc>,
}

/// A payment as self-reported by a resident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSubmission {
    pub method: PaymentMethod,
    pub transaction_id: Option<String>,
    /// Must equal the request's reference number
    pub reference_number: String,
    /// Defaults to the submission time
    pub payment_date: Option<DateTime<Utc>>,
}

/// Input for submitting a new request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRequestInput {
    pub document_type: DocumentType,
    pub purpose: Option<String>,
}

/// A request ready to be inserted; the storage assigns the tracking sequence.
#[derive(Debug, Clone)]
pub struct NewDocumentRequest {
    pub id: RequestId,
    pub resident_id: ResidentId,
    pub resident_name: String,
    pub document_type: DocumentType,
    pub purpose: Option<String>,
    pub reference_number: String,
    pub amount: Amount,
    pub request_date: DateTime<Utc>,
    /// Calendar day (Philippine time) used in the tracking number
    pub tracking_date: NaiveDate,
}

impl NewDocumentRequest {
    /// Build the stored pending request once the storage has picked the
    /// tracking number.
    pub fn into_pending(self, tracking_number: String) -> DocumentRequest<Pending> {
        DocumentRequest {
            state: Pending {},
            data: RequestData {
                id: self.id,
                resident_id: self.resident_id,
                resident_name: self.resident_name,
                document_type: self.document_type,
                purpose: self.purpose,
                tracking_number,
                reference_number: self.reference_number,
                amount: self.amount,
                request_date: self.request_date,
            },
        }
    }
}

// ============================================================================
// Request States
// ============================================================================

/// Request is waiting for review. Initial state for all new requests.
#[derive(Debug, Clone, Serialize)]
pub struct Pending {}

impl RequestState for Pending {}

/// Request was approved; waiting for payment.
#[derive(Debug, Clone, Serialize)]
pub struct Approved {
    pub approval_date: DateTime<Utc>,
    pub resident_snapshot: ResidentSnapshot,
    /// Self-reported payment awaiting verification
    pub payment: Option<PaymentDetails>,
}

impl RequestState for Approved {}

/// Payment verified by staff.
#[derive(Debug, Clone, Serialize)]
pub struct Paid {
    pub approval_date: DateTime<Utc>,
    pub resident_snapshot: ResidentSnapshot,
    pub payment: PaymentDetails,
    pub paid_at: DateTime<Utc>,
}

impl RequestState for Paid {}

/// Document handed over to the resident (terminal).
#[derive(Debug, Clone, Serialize)]
pub struct Released {
    pub approval_date: DateTime<Utc>,
    pub resident_snapshot: ResidentSnapshot,
    pub payment: PaymentDetails,
    pub paid_at: DateTime<Utc>,
    pub release_date: DateTime<Utc>,
}

impl RequestState for Released {}

/// Request was turned down (terminal).
///
/// Approval-time fields survive when the request was rejected after approval.
#[derive(Debug, Clone, Serialize)]
pub struct Rejected {
    pub rejected_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub approval_date: Option<DateTime<Utc>>,
    pub resident_snapshot: Option<ResidentSnapshot>,
    pub payment: Option<PaymentDetails>,
}

impl RequestState for Rejected {}

/// Unique identifier for a document request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        RequestId(uuid)
    }
}

impl std::ops::Deref for RequestId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// Unified Request Representation
// ============================================================================

/// Enum that can hold a request in any state.
///
/// This is used for storage and API responses where we need to handle
/// requests uniformly regardless of their current state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "request")]
pub enum AnyDocumentRequest {
    Pending(DocumentRequest<Pending>),
    Approved(DocumentRequest<Approved>),
    Paid(DocumentRequest<Paid>),
    Released(DocumentRequest<Released>),
    Rejected(DocumentRequest<Rejected>),
}

impl AnyDocumentRequest {
    /// Get the request ID regardless of state.
    pub fn id(&self) -> RequestId {
        self.data().id
    }

    /// Get the request data regardless of state.
    pub fn data(&self) -> &RequestData {
        match self {
            AnyDocumentRequest::Pending(r) => &r.data,
            AnyDocumentRequest::Approved(r) => &r.data,
            AnyDocumentRequest::Paid(r) => &r.data,
            AnyDocumentRequest::Released(r) => &r.data,
            AnyDocumentRequest::Rejected(r) => &r.data,
        }
    }

    pub fn status(&self) -> RequestStatus {
        match self {
            AnyDocumentRequest::Pending(_) => RequestStatus::Pending,
            AnyDocumentRequest::Approved(_) => RequestStatus::Approved,
            AnyDocumentRequest::Paid(_) => RequestStatus::Paid,
            AnyDocumentRequest::Released(_) => RequestStatus::Released,
            AnyDocumentRequest::Rejected(_) => RequestStatus::Rejected,
        }
    }

    /// Check if this request is in a terminal state (Released or Rejected).
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn approval_date(&self) -> Option<DateTime<Utc>> {
        match self {
            AnyDocumentRequest::Pending(_) => None,
            AnyDocumentRequest::Approved(r) => Some(r.state.approval_date),
            AnyDocumentRequest::Paid(r) => Some(r.state.approval_date),
            AnyDocumentRequest::Released(r) => Some(r.state.approval_date),
            AnyDocumentRequest::Rejected(r) => r.state.approval_date,
        }
    }

    pub fn release_date(&self) -> Option<DateTime<Utc>> {
        match self {
            AnyDocumentRequest::Released(r) => Some(r.state.release_date),
            _ => None,
        }
    }

    pub fn resident_snapshot(&self) -> Option<&ResidentSnapshot> {
        match self {
            AnyDocumentRequest::Pending(_) => None,
            AnyDocumentRequest::Approved(r) => Some(&r.state.resident_snapshot),
            AnyDocumentRequest::Paid(r) => Some(&r.state.resident_snapshot),
            AnyDocumentRequest::Released(r) => Some(&r.state.resident_snapshot),
            AnyDocumentRequest::Rejected(r) => r.state.resident_snapshot.as_ref(),
        }
    }

    pub fn payment(&self) -> Option<&PaymentDetails> {
        match self {
            AnyDocumentRequest::Pending(_) => None,
            AnyDocumentRequest::Approved(r) => r.state.payment.as_ref(),
            AnyDocumentRequest::Paid(r) => Some(&r.state.payment),
            AnyDocumentRequest::Released(r) => Some(&r.state.payment),
            AnyDocumentRequest::Rejected(r) => r.state.payment.as_ref(),
        }
    }

    /// Try to take as a Pending request, consuming self.
    pub fn into_pending(self) -> Option<DocumentRequest<Pending>> {
        match self {
            AnyDocumentRequest::Pending(r) => Some(r),
            _ => None,
        }
    }

    /// Try to take as an Approved request, consuming self.
    pub fn into_approved(self) -> Option<DocumentRequest<Approved>> {
        match self {
            AnyDocumentRequest::Approved(r) => Some(r),
            _ => None,
        }
    }

    /// Try to take as a Paid request, consuming self.
    pub fn into_paid(self) -> Option<DocumentRequest<Paid>> {
        match self {
            AnyDocumentRequest::Paid(r) => Some(r),
            _ => None,
        }
    }
}

// Conversion traits for going from typed DocumentRequest to AnyDocumentRequest

impl From<DocumentRequest<Pending>> for AnyDocumentRequest {
    fn from(r: DocumentRequest<Pending>) -> Self {
        AnyDocumentRequest::Pending(r)
    }
}

impl From<DocumentRequest<Approved>> for AnyDocumentRequest {
    fn from(r: DocumentRequest<Approved>) -> Self {
        AnyDocumentRequest::Approved(r)
    }
}

impl From<DocumentRequest<Paid>> for AnyDocumentRequest {
    fn from(r: DocumentRequest<Paid>) -> Self {
        AnyDocumentRequest::Paid(r)
    }
}

impl From<DocumentRequest<Released>> for AnyDocumentRequest {
    fn from(r: DocumentRequest<Released>) -> Self {
        AnyDocumentRequest::Released(r)
    }
}

impl From<DocumentRequest<Rejected>> for AnyDocumentRequest {
    fn from(r: DocumentRequest<Rejected>) -> Self {
        AnyDocumentRequest::Rejected(r)
    }
}

/// Filter for listing requests.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub resident_id: Option<ResidentId>,
    pub document_type: Option<DocumentType>,
    /// Case-insensitive match on tracking number or resident name
    pub search: Option<String>,
}

impl RequestFilter {
    pub fn matches(&self, request: &AnyDocumentRequest) -> bool {
        let data = request.data();
        if self.status.is_some_and(|s| s != request.status()) {
            return false;
        }
        if self.resident_id.is_some_and(|id| id != data.resident_id) {
            return false;
        }
        if self.document_type.is_some_and(|d| d != data.document_type) {
            return false;
        }
        match &self.search {
            Some(search) => {
                let needle = search.to_lowercase();
                data.tracking_number.to_lowercase().contains(&needle)
                    || data.resident_name.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_edges() {
        use RequestStatus::*;
        let all = [Pending, Approved, Paid, Released, Rejected];
        let allowed = [
            (Pending, Approved),
            (Pending, Rejected),
            (Approved, Paid),
            (Approved, Rejected),
            (Paid, Released),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_status_parse_matches_display() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Paid,
            RequestStatus::Released,
            RequestStatus::Rejected,
        ] {
            assert_eq!(RequestStatus::parse(&status.to_string()), Some(status));
        }
    }

    #[test]
    fn test_filter_search_on_tracking_number_and_name() {
        let request: AnyDocumentRequest = NewDocumentRequest {
            id: RequestId(Uuid::new_v4()),
            resident_id: ResidentId(Uuid::new_v4()),
            resident_name: "Maria Santos".to_string(),
            document_type: DocumentType::BarangayClearance,
            purpose: None,
            reference_number: "REF-250101-ABCDEF12".to_string(),
            amount: Amount::from_pesos(50),
            request_date: Utc::now(),
            tracking_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        }
        .into_pending("IBGY-250101001".to_string())
        .into();

        let by_tracking = RequestFilter {
            search: Some("ibgy-2501".to_string()),
            ..Default::default()
        };
        assert!(by_tracking.matches(&request));

        let by_name = RequestFilter {
            search: Some("santos".to_string()),
            status: Some(RequestStatus::Pending),
            ..Default::default()
        };
        assert!(by_name.matches(&request));

        let wrong_status = RequestFilter {
            status: Some(RequestStatus::Paid),
            ..Default::default()
        };
        assert!(!wrong_status.matches(&request));
    }
}
