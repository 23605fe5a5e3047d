//! Document request aggregate - domain model and state transitions.
//!
//! This module re-exports types from `domain::request` and `domain::fees`.
//! See those modules for the actual implementations.

pub use crate::domain::fees::{Amount, DocumentType, FeeSchedule};
pub use crate::domain::request::state::*;
