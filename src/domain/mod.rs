//! Core domain types for the barangay office.
//!
//! This module contains pure domain types with no persistence dependencies:
//! - Document request typestate machine
//! - Residents and their snapshots
//! - Users and roles
//! - Document types and fees

pub mod fees;
pub mod request;
pub mod resident;
pub mod user;
