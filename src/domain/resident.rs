//! Resident profiles.
//!
//! A resident is owned 1:1 by a user with the Resident role. Its address is
//! never edited directly: it is always rebuilt from the purok (or sitio)
//! plus the fixed municipality suffix.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserId;
use crate::error::{BarangayError, Result};

/// Suffix appended to the purok to form a full address.
pub const MUNICIPALITY_SUFFIX: &str = "Brgy. Mina De Oro, Bongabong, Oriental Mindoro";

/// Unique identifier for a resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResidentId(pub Uuid);

impl From<Uuid> for ResidentId {
    fn from(uuid: Uuid) -> Self {
        ResidentId(uuid)
    }
}

impl std::ops::Deref for ResidentId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ResidentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl ResidentId {
    /// Human-facing identifier printed on documents, e.g. `RES-1A2B3C4D`.
    pub fn display_id(&self) -> String {
        format!("RES-{}", self.0.simple().to_string()[..8].to_uppercase())
    }
}

/// Build the full address for a purok.
pub fn address_for(purok: &str) -> String {
    format!("{}, {}", purok.trim(), MUNICIPALITY_SUFFIX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resident {
    pub id: ResidentId,
    pub user_id: UserId,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub purok: String,
    /// Always `address_for(purok)`
    pub address: String,
    pub birthdate: NaiveDate,
    pub household_number: Option<String>,
    pub contact_number: Option<String>,
    pub avatar_url: Option<String>,
    pub display_id: String,
    pub created_at: DateTime<Utc>,
}

impl Resident {
    pub fn full_name(&self) -> String {
        super::user::join_full_name(&self.first_name, &self.last_name)
    }

    /// Apply a partial update in place.
    ///
    /// Returns whether the first or last name changed, which callers use to
    /// decide whether the paired user needs its display name rewritten.
    pub fn apply(&mut self, update: ResidentUpdate) -> Result<bool> {
        let mut name_changed = false;

        if let Some(first_name) = update.first_name {
            let first_name = non_empty("first name", first_name)?;
            name_changed |= first_name != self.first_name;
            self.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            let last_name = non_empty("last name", last_name)?;
            name_changed |= last_name != self.last_name;
            self.last_name = last_name;
        }
        if let Some(middle_name) = update.middle_name {
            self.middle_name = middle_name;
        }
        if let Some(purok) = update.purok {
            self.purok = non_empty("purok", purok)?;
            self.address = address_for(&self.purok);
        }
        if let Some(birthdate) = update.birthdate {
            self.birthdate = birthdate;
        }
        if let Some(household_number) = update.household_number {
            self.household_number = household_number;
        }
        if let Some(contact_number) = update.contact_number {
            self.contact_number = contact_number;
        }

        Ok(name_changed)
    }
}

/// Demographic fields frozen onto a request when it is approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentSnapshot {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub birthdate: NaiveDate,
}

impl From<&Resident> for ResidentSnapshot {
    fn from(resident: &Resident) -> Self {
        ResidentSnapshot {
            first_name: resident.first_name.clone(),
            last_name: resident.last_name.clone(),
            address: resident.address.clone(),
            birthdate: resident.birthdate,
        }
    }
}

/// Profile fields supplied when registering a resident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidentProfile {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub purok: String,
    pub birthdate: NaiveDate,
    pub household_number: Option<String>,
    pub contact_number: Option<String>,
}

impl ResidentProfile {
    /// Validate and turn the profile into a resident record owned by `user_id`.
    pub fn into_resident(self, user_id: UserId) -> Result<Resident> {
        let id = ResidentId(Uuid::new_v4());
        let purok = non_empty("purok", self.purok)?;
        Ok(Resident {
            id,
            user_id,
            first_name: non_empty("first name", self.first_name)?,
            middle_name: self.middle_name,
            last_name: non_empty("last name", self.last_name)?,
            address: address_for(&purok),
            purok,
            birthdate: self.birthdate,
            household_number: self.household_number,
            contact_number: self.contact_number,
            avatar_url: None,
            display_id: id.display_id(),
            created_at: Utc::now(),
        })
    }
}

/// Partial update of a resident. `None` leaves the field unchanged; for
/// optional fields `Some(None)` clears them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResidentUpdate {
    pub first_name: Option<String>,
    pub middle_name: Option<Option<String>>,
    pub last_name: Option<String>,
    pub purok: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub household_number: Option<Option<String>>,
    pub contact_number: Option<Option<String>>,
}

/// Filter for listing residents.
#[derive(Debug, Clone, Default)]
pub struct ResidentFilter {
    /// Case-insensitive match on first name, last name or display id
    pub search: Option<String>,
    pub purok: Option<String>,
}

impl ResidentFilter {
    pub fn matches(&self, resident: &Resident) -> bool {
        if let Some(purok) = &self.purok
            && !resident.purok.eq_ignore_ascii_case(purok)
        {
            return false;
        }
        match &self.search {
            Some(search) => {
                let needle = search.to_lowercase();
                resident.first_name.to_lowercase().contains(&needle)
                    || resident.last_name.to_lowercase().contains(&needle)
                    || resident.display_id.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }
}

fn non_empty(field: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BarangayError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}
