//! Request statistics for the dashboard and reports pages.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::request::{Amount, AnyDocumentRequest, DocumentType, RequestStatus};

/// Counts and totals over a set of requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestStats {
    pub total_requests: i64,
    pub pending_requests: i64,
    pub approved_requests: i64,
    pub paid_requests: i64,
    pub released_requests: i64,
    pub rejected_requests: i64,
    /// Sum of fees of Paid and Released requests
    pub collected: Amount,
    /// Sum of fees of Approved requests still waiting for payment
    pub outstanding: Amount,
    pub by_document_type: BTreeMap<DocumentType, i64>,
}

impl RequestStats {
    pub fn from_requests(requests: &[AnyDocumentRequest]) -> Self {
        let mut stats = RequestStats::default();
        for request in requests {
            let amount = request.data().amount;
            stats.total_requests += 1;
            *stats
                .by_document_type
                .entry(request.data().document_type)
                .or_default() += 1;

            match request.status() {
                RequestStatus::Pending => stats.pending_requests += 1,
                RequestStatus::Approved => {
                    stats.approved_requests += 1;
                    stats.outstanding = Amount(stats.outstanding.0 + amount.0);
                }
                RequestStatus::Paid => {
                    stats.paid_requests += 1;
                    stats.collected = Amount(stats.collected.0 + amount.0);
                }
                RequestStatus::Released => {
                    stats.released_requests += 1;
                    stats.collected = Amount(stats.collected.0 + amount.0);
                }
                RequestStatus::Rejected => stats.rejected_requests += 1,
            }
        }
        stats
    }

    /// Requests that still need action from the office.
    pub fn open_requests(&self) -> i64 {
        self.pending_requests + self.approved_requests + self.paid_requests
    }
}
