//! Accounts and the login guard: per-email attempt tracking, locks, and admin unlocks.

pub mod accounts;
pub mod domain;
pub mod guard;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use accounts::AccountError;
pub use domain::{
    AccountId, AccountLock, AdminUnlockRequest, NewAccount, UnlockRequestId, UnlockStatus,
    UserAccount,
};
pub use guard::{AttemptDecision, LoginAttemptTracker};
pub use repository::{AccountRepository, UnlockRequestRepository};
pub use router::auth_router;
pub use service::{AuthService, LoginError, LoginSuccess, UnlockError, UnlockQueue};
