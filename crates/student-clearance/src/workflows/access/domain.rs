use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::clearance::roles::AccountRole;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnlockRequestId(pub String);

impl fmt::Display for UnlockRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted account lock. Survives sessions until it expires or an admin lifts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLock {
    pub locked_at: DateTime<Utc>,
    pub locked_until: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: AccountId,
    pub name: String,
    /// Lower-cased; the lookup key for login.
    pub email: String,
    #[serde(flatten)]
    pub role: AccountRole,
    /// Per-account credential. `None` falls back to the shared demo password.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub login_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<AccountLock>,
}

impl UserAccount {
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.lock.as_ref().is_some_and(|lock| lock.locked_until > now)
    }

    pub(crate) fn clear_lock(&mut self) {
        self.lock = None;
        self.login_attempts = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockStatus {
    Pending,
    Approved,
    Rejected,
}

impl UnlockStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Appeal against an automatic lock, resolved once by an admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUnlockRequest {
    pub id: UnlockRequestId,
    pub account_id: AccountId,
    pub email: String,
    pub name: String,
    pub requested_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub status: UnlockStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

/// Staff account submitted by an admin. Student logins are created by registration.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    #[serde(flatten)]
    pub role: AccountRole,
    #[serde(default)]
    pub password: Option<String>,
}
