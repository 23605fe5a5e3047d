//! Document request lifecycle and resident directory for a barangay office.
//!
//! Residents submit requests for barangay documents (clearances,
//! certificates, permits). Office staff approve or reject them, verify the
//! payment and release the document. Each step is a typed state transition
//! persisted through a [`Storage`] adapter.
//!
//! The resident directory keeps resident records and the user accounts
//! behind them in sync: registration creates both, and renaming one renames
//! the other.
//!
//! In-memory storage is always available; PostgreSQL storage sits behind the
//! `postgres` feature.

pub mod accounts;
pub mod config;
pub mod directory;
pub mod domain;
pub mod error;
pub mod insights;
pub mod manager;
pub mod objects;
pub mod reports;
pub mod request;

// Re-export commonly used types
pub use accounts::{AccountProvider, InMemoryAccountProvider};
pub use config::{BarangayConfig, TextModelConfig};
pub use directory::*;
pub use error::{BarangayError, Result};
pub use insights::{MockTextModel, ReqwestTextModel, TextModel};
pub use manager::memory::InMemoryStorage;
#[cfg(feature = "postgres")]
pub use manager::postgres::{PoolProvider, PostgresStorage, TestDbPools};
pub use manager::{DirectoryStorage, NewResidentAccount, NewStaffAccount, Storage};
pub use objects::{InMemoryObjectStore, ObjectStore};
pub use reports::RequestStats;
pub use request::*;

/// Get the barangay database migrator
///
/// Returns a migrator that can be run against a connection pool.
#[cfg(feature = "postgres")]
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}
