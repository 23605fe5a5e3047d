//! Identifier formats shared by the storage adapters.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

/// Prefix of every tracking number.
pub const TRACKING_PREFIX: &str = "IBGY";

/// Philippine Standard Time is UTC+8. Tracking and reference numbers use the
/// office's calendar day, not the UTC one.
pub const OFFICE_UTC_OFFSET_HOURS: i64 = 8;

/// Calendar day in office time for a UTC instant.
pub fn office_date(at: DateTime<Utc>) -> NaiveDate {
    (at + Duration::hours(OFFICE_UTC_OFFSET_HOURS)).date_naive()
}

/// Format a tracking number, `IBGY-YYMMDD###`.
///
/// The sequence is zero-padded to three digits and simply grows wider past
/// 999.
pub fn format_tracking_number(date: NaiveDate, sequence: u64) -> String {
    format!("{}-{}{:03}", TRACKING_PREFIX, date.format("%y%m%d"), sequence)
}

/// Generate a payment reference number, `REF-YYMMDD-XXXXXXXX`.
pub fn generate_reference_number(date: NaiveDate) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "REF-{}-{}",
        date.format("%y%m%d"),
        random[..8].to_uppercase()
    )
}
