//! User records, reputation tiers and the per-viewer profile projection

use std::fmt;

use chrono::Utc;

use super::contract::TimeStamp;
use super::error::Error;
use super::state::Role;

/// Named trust tiers derived from the score. Thresholds are scanned from
/// highest to lowest and the first match wins, so keep the slice ordered
/// when editing.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReputationLevel {
    #[n(0)]
    New,
    #[n(1)]
    Rising,
    #[n(2)]
    Trusted,
    #[n(3)]
    Elite,
}

const LEVEL_THRESHOLDS: &[(u64, ReputationLevel)] = &[
    (100, ReputationLevel::Elite),
    (51, ReputationLevel::Trusted),
    (21, ReputationLevel::Rising),
];

impl ReputationLevel {
    pub fn for_score(score: u64) -> Self {
        for (threshold, level) in LEVEL_THRESHOLDS {
            if score >= *threshold {
                return *level;
            }
        }
        ReputationLevel::New
    }
}

impl fmt::Display for ReputationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReputationLevel::New => "New",
            ReputationLevel::Rising => "Rising",
            ReputationLevel::Trusted => "Trusted",
            ReputationLevel::Elite => "Elite",
        };
        write!(f, "{name}")
    }
}

/// Score plus its derived tier. The score is clamped at a floor of zero and
/// unbounded above.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reputation {
    #[n(0)]
    pub score: u64,
    #[n(1)]
    pub level: ReputationLevel,
}

impl Reputation {
    pub fn new() -> Self {
        Self {
            score: 0,
            level: ReputationLevel::New,
        }
    }

    /// Apply a signed adjustment. Negative swings never take the score
    /// below zero; the tier is re-derived from the new score.
    pub fn adjust(&self, points: i64) -> Self {
        let score = if points.is_negative() {
            self.score.saturating_sub(points.unsigned_abs())
        } else {
            self.score.saturating_add(points as u64)
        };
        Self {
            score,
            level: ReputationLevel::for_score(score),
        }
    }
}

impl Default for Reputation {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct User {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded
    #[n(1)]
    pub username: String,
    #[n(2)]
    pub email: String,
    #[n(3)]
    pub role: Role,
    #[n(4)]
    pub reputation: Reputation,
    #[n(5)]
    pub is_suspended: bool,
    #[n(6)]
    pub is_active: bool,
    #[n(7)]
    pub wallet_address: Option<String>,
    #[n(8)]
    pub skills: Vec<String>,
    #[n(9)]
    pub phone: Option<String>,
    #[n(10)]
    pub phone_number: Option<String>,
    #[n(11)]
    pub is_phone_verified: bool,
    #[n(12)]
    pub permissions: Vec<String>, // admin accounts only
    #[n(13)]
    pub department: Option<String>, // admin accounts only
    #[n(14)]
    pub created_at: TimeStamp<Utc>,
    #[n(15)]
    pub updated_at: TimeStamp<Utc>,
}

// Used for constructing a registration before anything is persisted.
#[derive(Debug, Default)]
pub struct UserDraft {
    username: Option<String>,
    email: Option<String>,
    role: Option<Role>,
    wallet_address: Option<String>,
    skills: Vec<String>,
    phone: Option<String>,
    phone_number: Option<String>,
    permissions: Vec<String>,
    department: Option<String>,
}

impl UserDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_owned());
        self
    }
    pub fn set_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_owned());
        self
    }
    pub fn set_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }
    /// Parse and set the role from its textual form, any casing accepted.
    pub fn set_role_str(mut self, role: &str) -> Result<Self, Error> {
        self.role = Some(role.parse()?);
        Ok(self)
    }
    pub fn set_wallet_address(mut self, address: &str) -> Self {
        self.wallet_address = Some(address.to_owned());
        self
    }
    pub fn set_skills(mut self, skills: Vec<String>) -> Self {
        self.skills = skills;
        self
    }
    pub fn set_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_owned());
        self
    }
    pub fn set_phone_number(mut self, phone_number: &str) -> Self {
        self.phone_number = Some(phone_number.to_owned());
        self
    }
    pub fn set_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }
    pub fn set_department(mut self, department: &str) -> Self {
        self.department = Some(department.to_owned());
        self
    }
    /// Checks required fields are present, then builds the record.
    pub fn validate_and_finalise(self, id: String) -> Result<User, Error> {
        let Some(username) = self.username.filter(|u| !u.trim().is_empty()) else {
            return Err(Error::invalid_input("username is not set"));
        };
        let Some(email) = self.email.filter(|e| !e.trim().is_empty()) else {
            return Err(Error::invalid_input("email is not set"));
        };
        let Some(role) = self.role else {
            return Err(Error::invalid_input("role is not set"));
        };

        let now = TimeStamp::now();
        Ok(User {
            id,
            username,
            email,
            role,
            reputation: Reputation::new(),
            is_suspended: false,
            is_active: true,
            wallet_address: self.wallet_address,
            skills: self.skills,
            phone: self.phone,
            phone_number: self.phone_number,
            is_phone_verified: false,
            permissions: self.permissions,
            department: self.department,
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

/// What a viewer gets back from a profile fetch. Phone fields are a derived,
/// per-viewer property: present only for the owner or a user who has shared
/// a non-deleted contract with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub reputation: Reputation,
    pub is_suspended: bool,
    pub wallet_address: Option<String>,
    pub skills: Vec<String>,
    pub phone: Option<String>,
    pub phone_number: Option<String>,
    pub is_phone_verified: Option<bool>,
}

impl Profile {
    pub fn from_user(user: &User, include_phone: bool) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            reputation: user.reputation,
            is_suspended: user.is_suspended,
            wallet_address: user.wallet_address.clone(),
            skills: user.skills.clone(),
            phone: include_phone.then(|| user.phone.clone()).flatten(),
            phone_number: include_phone.then(|| user.phone_number.clone()).flatten(),
            is_phone_verified: include_phone.then_some(user.is_phone_verified),
        }
    }
}
