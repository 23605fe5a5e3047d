//! Users, roles and what each role is allowed to see and do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::request::RequestStatus;
use super::resident::ResidentId;

/// Unique identifier for a user, assigned by the account provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        UserId(uuid)
    }
}

impl std::ops::Deref for UserId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Role of an account. Determines visible navigation and data scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    #[serde(rename = "Barangay Captain")]
    BarangayCaptain,
    Secretary,
    Treasurer,
    Resident,
}

/// A navigation section of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NavSection {
    Dashboard,
    Residents,
    DocumentRequests,
    Payments,
    Reports,
    Insights,
    Users,
    MyRequests,
    Profile,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::BarangayCaptain => "Barangay Captain",
            Role::Secretary => "Secretary",
            Role::Treasurer => "Treasurer",
            Role::Resident => "Resident",
        }
    }

    /// Parse the stored role name.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "Admin" => Some(Role::Admin),
            "Barangay Captain" => Some(Role::BarangayCaptain),
            "Secretary" => Some(Role::Secretary),
            "Treasurer" => Some(Role::Treasurer),
            "Resident" => Some(Role::Resident),
            _ => None,
        }
    }

    /// Barangay office staff, i.e. everyone but residents.
    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::Resident)
    }

    pub fn navigation(&self) -> &'static [NavSection] {
        use NavSection::*;
        match self {
            Role::Admin => &[
                Dashboard,
                Residents,
                DocumentRequests,
                Payments,
                Reports,
                Insights,
                Users,
            ],
            Role::BarangayCaptain => &[
                Dashboard,
                Residents,
                DocumentRequests,
                Payments,
                Reports,
                Insights,
            ],
            Role::Secretary => &[Dashboard, Residents, DocumentRequests, Reports],
            Role::Treasurer => &[Dashboard, DocumentRequests, Payments, Reports],
            Role::Resident => &[Dashboard, MyRequests, Profile],
        }
    }

    pub fn can_see(&self, section: NavSection) -> bool {
        self.navigation().contains(&section)
    }

    /// Whether this role may move a request into `target`.
    pub fn can_transition_to(&self, target: RequestStatus) -> bool {
        match target {
            RequestStatus::Pending => false,
            RequestStatus::Approved | RequestStatus::Rejected | RequestStatus::Released => {
                matches!(self, Role::Admin | Role::BarangayCaptain | Role::Secretary)
            }
            RequestStatus::Paid => matches!(self, Role::Admin | Role::Treasurer),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated account and its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    /// The paired resident record, for users with the Resident role
    pub resident_id: Option<ResidentId>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether this user may see records belonging to `resident_id`.
    pub fn can_view_resident_data(&self, resident_id: ResidentId) -> bool {
        self.role.is_staff() || self.resident_id == Some(resident_id)
    }
}

/// Partial update of a user record. `None` leaves the field unchanged.
///
/// The email is owned by the account provider and cannot be changed here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    /// Only staff roles can be reassigned, and only to other staff roles
    pub role: Option<Role>,
}

/// Split a full name on its first space into first and last name.
///
/// Everything after the first space is kept as the last name, so
/// `"Maria Clara Santos"` becomes `("Maria", "Clara Santos")`. A single word
/// yields an empty last name.
pub fn split_full_name(name: &str) -> (String, String) {
    let trimmed = name.trim();
    match trimmed.split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (trimmed.to_string(), String::new()),
    }
}

/// Inverse of [`split_full_name`] for the common case.
pub fn join_full_name(first_name: &str, last_name: &str) -> String {
    format!("{} {}", first_name.trim(), last_name.trim())
        .trim()
        .to_string()
}
