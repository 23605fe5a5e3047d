//! Document types and the fees charged for them.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BarangayError, Result};

/// A document a resident can request from the barangay office.
///
/// Serialized by its display name, which is also what the office prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "Barangay Clearance")]
    BarangayClearance,
    #[serde(rename = "Certificate of Residency")]
    CertificateOfResidency,
    #[serde(rename = "Certificate of Indigency")]
    CertificateOfIndigency,
    #[serde(rename = "Business Permit")]
    BusinessPermit,
    #[serde(rename = "Certificate of Good Moral Character")]
    CertificateOfGoodMoral,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::BarangayClearance,
        DocumentType::CertificateOfResidency,
        DocumentType::CertificateOfIndigency,
        DocumentType::BusinessPermit,
        DocumentType::CertificateOfGoodMoral,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            DocumentType::BarangayClearance => "Barangay Clearance",
            DocumentType::CertificateOfResidency => "Certificate of Residency",
            DocumentType::CertificateOfIndigency => "Certificate of Indigency",
            DocumentType::BusinessPermit => "Business Permit",
            DocumentType::CertificateOfGoodMoral => "Certificate of Good Moral Character",
        }
    }

    /// Fee charged when no override is configured.
    pub fn default_fee(&self) -> Amount {
        match self {
            DocumentType::BarangayClearance => Amount::from_pesos(50),
            DocumentType::CertificateOfResidency => Amount::from_pesos(75),
            DocumentType::CertificateOfIndigency => Amount::ZERO,
            DocumentType::BusinessPermit => Amount::from_pesos(150),
            DocumentType::CertificateOfGoodMoral => Amount::from_pesos(60),
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for DocumentType {
    type Err = BarangayError;

    fn from_str(s: &str) -> Result<Self> {
        DocumentType::ALL
            .into_iter()
            .find(|doc| doc.display_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BarangayError::Validation(format!("Unknown document type '{}'", s)))
    }
}

/// A peso amount held as a whole number of centavos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_pesos(pesos: i64) -> Self {
        Amount(pesos * 100)
    }

    pub const fn from_centavos(centavos: i64) -> Self {
        Amount(centavos)
    }

    pub fn centavos(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        Amount(iter.map(|a| a.0).sum())
    }
}

/// Fee table consulted when a request is submitted.
///
/// Overrides are keyed by document type; anything not overridden falls back
/// to [`DocumentType::default_fee`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    #[serde(default)]
    overrides: HashMap<DocumentType, Amount>,
}

impl FeeSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fee for one document type (builder style).
    pub fn with_fee(mut self, document_type: DocumentType, amount: Amount) -> Self {
        self.overrides.insert(document_type, amount);
        self
    }

    /// Parse overrides from a JSON object of display name to peso amount,
    /// e.g. `{"Barangay Clearance": 60, "Business Permit": 250.5}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, f64> = serde_json::from_str(json)?;
        let mut schedule = FeeSchedule::new();
        for (name, pesos) in raw {
            let document_type: DocumentType = name.parse()?;
            if !pesos.is_finite() || pesos < 0.0 {
                return Err(BarangayError::Validation(format!(
                    "Fee for '{}' must be a non-negative amount, got {}",
                    name, pesos
                )));
            }
            let centavos = (pesos * 100.0).round() as i64;
            schedule = schedule.with_fee(document_type, Amount::from_centavos(centavos));
        }
        Ok(schedule)
    }

    pub fn fee_for(&self, document_type: DocumentType) -> Amount {
        self.overrides
            .get(&document_type)
            .copied()
            .unwrap_or_else(|| document_type.default_fee())
    }
}
