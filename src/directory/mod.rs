//! Residents and users.
//!
//! This module re-exports types from `domain::resident` and `domain::user`.
//! The sync rules between the two records live on
//! [`DirectoryStorage`](crate::manager::DirectoryStorage).

pub use crate::domain::resident::{
    MUNICIPALITY_SUFFIX, Resident, ResidentFilter, ResidentId, ResidentProfile, ResidentSnapshot,
    ResidentUpdate, address_for,
};
pub use crate::domain::user::{
    NavSection, Role, User, UserId, UserUpdate, join_full_name, split_full_name,
};
