use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    AccountId, AccountLock, AdminUnlockRequest, UnlockRequestId, UnlockStatus, UserAccount,
};
use super::guard::LoginAttemptTracker;
use super::repository::{AccountRepository, UnlockRequestRepository};
use crate::config::LoginGuardConfig;
use crate::validation::{normalize_email, require_text, validate_password, ValidationError};
use crate::workflows::clearance::repository::RepositoryError;

const LOCK_REASON: &str = "Too many failed login attempts";

static UNLOCK_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_unlock_id() -> UnlockRequestId {
    let id = UNLOCK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    UnlockRequestId(format!("unlock-{id:06}"))
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginSuccess {
    pub account: UserAccount,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnlockQueue {
    pub pending: Vec<AdminUnlockRequest>,
    pub processed: Vec<AdminUnlockRequest>,
}

/// Login guard: attempt tracking, account locks, and the admin unlock flow.
pub struct AuthService<A, U> {
    pub(super) accounts: Arc<A>,
    requests: Arc<U>,
    tracker: LoginAttemptTracker,
    config: LoginGuardConfig,
    writes: Mutex<()>,
}

impl<A, U> AuthService<A, U>
where
    A: AccountRepository + 'static,
    U: UnlockRequestRepository + 'static,
{
    pub fn new(accounts: Arc<A>, requests: Arc<U>, config: LoginGuardConfig) -> Self {
        let tracker = LoginAttemptTracker::new(config.max_attempts, config.window);
        Self {
            accounts,
            requests,
            tracker,
            config,
            writes: Mutex::new(()),
        }
    }

    pub fn login(&self, email: &str, password: &str) -> Result<LoginSuccess, LoginError> {
        self.login_at(email, password, Utc::now())
    }

    pub fn login_at(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginSuccess, LoginError> {
        let email = normalize_email(email)?;
        validate_password(password)?;

        let decision = self.tracker.record(&email, now);
        if !decision.allowed {
            let retry_after_secs = decision.reset_in.map_or(0, |wait| wait.as_secs());
            warn!(%email, attempts = decision.attempts, "login rate limited");
            return Err(LoginError::RateLimited { retry_after_secs });
        }

        let _writes = self.lock_writes();
        let Some(mut account) = self.accounts.find_by_email(&email)? else {
            warn!(%email, "login for unknown account");
            return Err(LoginError::InvalidCredentials {
                attempts_remaining: decision.remaining,
            });
        };

        if let Some(lock) = account.lock.clone() {
            if lock.locked_until > now {
                let unlock_request = self.pending_request_for(&account.id)?.map(|request| request.id);
                return Err(LoginError::AccountLocked {
                    locked_until: lock.locked_until,
                    unlock_request,
                });
            }
            account.clear_lock();
            info!(account = %account.id, "lock expired");
        }

        if self.password_matches(&account, password) {
            account.login_attempts = 0;
            self.accounts.update(account.clone())?;
            self.tracker.reset(&email);
            info!(account = %account.id, role = account.role.label(), "login succeeded");
            return Ok(LoginSuccess { account });
        }

        account.login_attempts = decision.attempts;
        if account.login_attempts < self.config.max_attempts {
            self.accounts.update(account)?;
            return Err(LoginError::InvalidCredentials {
                attempts_remaining: decision.remaining,
            });
        }

        let locked_until = now + lock_span(&self.config);
        account.lock = Some(AccountLock {
            locked_at: now,
            locked_until,
            reason: LOCK_REASON.to_string(),
        });
        let request = match self.pending_request_for(&account.id)? {
            Some(existing) => existing,
            None => self.requests.insert(AdminUnlockRequest {
                id: next_unlock_id(),
                account_id: account.id.clone(),
                email: account.email.clone(),
                name: account.name.clone(),
                requested_at: now,
                attempt_count: account.login_attempts,
                status: UnlockStatus::Pending,
                message: None,
                notes: None,
                processed_by: None,
                processed_at: None,
            })?,
        };
        warn!(account = %account.id, %locked_until, request = %request.id, "account locked");
        self.accounts.update(account)?;

        Err(LoginError::AccountLocked {
            locked_until,
            unlock_request: Some(request.id),
        })
    }

    pub fn request_unlock(
        &self,
        email: &str,
        message: Option<String>,
    ) -> Result<AdminUnlockRequest, UnlockError> {
        self.request_unlock_at(email, message, Utc::now())
    }

    /// User-initiated appeal. Returns the open request if one already exists.
    pub fn request_unlock_at(
        &self,
        email: &str,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<AdminUnlockRequest, UnlockError> {
        let email = normalize_email(email)?;
        let message = message
            .map(|text| require_text("message", &text))
            .transpose()?;

        let _writes = self.lock_writes();
        let account = self
            .accounts
            .find_by_email(&email)?
            .ok_or(UnlockError::AccountNotFound)?;
        if !account.is_locked_at(now) {
            return Err(UnlockError::NotLocked);
        }

        if let Some(mut existing) = self.pending_request_for(&account.id)? {
            if message.is_some() {
                existing.message = message;
                self.requests.update(existing.clone())?;
            }
            return Ok(existing);
        }

        let request = self.requests.insert(AdminUnlockRequest {
            id: next_unlock_id(),
            account_id: account.id.clone(),
            email: account.email.clone(),
            name: account.name.clone(),
            requested_at: now,
            attempt_count: account.login_attempts,
            status: UnlockStatus::Pending,
            message,
            notes: None,
            processed_by: None,
            processed_at: None,
        })?;
        info!(account = %account.id, request = %request.id, "unlock requested");
        Ok(request)
    }

    /// Unlock the account, zero its attempt counter and clear the rate-limit window.
    pub fn approve_unlock(
        &self,
        admin_id: &AccountId,
        request_id: &UnlockRequestId,
        notes: Option<String>,
    ) -> Result<AdminUnlockRequest, UnlockError> {
        let _writes = self.lock_writes();
        let admin = self.require_admin(admin_id)?;
        let mut request = self.open_request(request_id)?;

        let mut account = self
            .accounts
            .fetch(&request.account_id)?
            .ok_or(UnlockError::AccountNotFound)?;
        account.clear_lock();
        self.accounts.update(account.clone())?;
        self.tracker.reset(&account.email);

        request.status = UnlockStatus::Approved;
        request.notes = notes;
        request.processed_by = Some(admin.name.clone());
        request.processed_at = Some(Utc::now());
        self.requests.update(request.clone())?;
        info!(account = %account.id, admin = %admin.name, request = %request.id, "account unlocked");
        Ok(request)
    }

    /// Close the request without lifting the lock; it still expires on its own.
    pub fn reject_unlock(
        &self,
        admin_id: &AccountId,
        request_id: &UnlockRequestId,
        notes: Option<String>,
    ) -> Result<AdminUnlockRequest, UnlockError> {
        let _writes = self.lock_writes();
        let admin = self.require_admin(admin_id)?;
        let mut request = self.open_request(request_id)?;

        request.status = UnlockStatus::Rejected;
        request.notes = notes;
        request.processed_by = Some(admin.name.clone());
        request.processed_at = Some(Utc::now());
        self.requests.update(request.clone())?;
        info!(admin = %admin.name, request = %request.id, "unlock request rejected");
        Ok(request)
    }

    pub fn unlock_queue(&self, admin_id: &AccountId) -> Result<UnlockQueue, UnlockError> {
        self.require_admin(admin_id)?;
        let (pending, processed): (Vec<_>, Vec<_>) = self
            .requests
            .list()?
            .into_iter()
            .partition(|request| request.status == UnlockStatus::Pending);
        Ok(UnlockQueue { pending, processed })
    }

    pub fn account(&self, id: &AccountId) -> Result<Option<UserAccount>, RepositoryError> {
        self.accounts.fetch(id)
    }

    fn password_matches(&self, account: &UserAccount, password: &str) -> bool {
        let expected = account
            .password
            .as_deref()
            .unwrap_or(self.config.demo_password.as_str());
        expected == password
    }

    fn pending_request_for(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<AdminUnlockRequest>, RepositoryError> {
        Ok(self.requests.list()?.into_iter().find(|request| {
            &request.account_id == account_id && request.status == UnlockStatus::Pending
        }))
    }

    fn open_request(&self, id: &UnlockRequestId) -> Result<AdminUnlockRequest, UnlockError> {
        let request = self
            .requests
            .fetch(id)?
            .ok_or_else(|| UnlockError::RequestNotFound(id.clone()))?;
        if request.status != UnlockStatus::Pending {
            return Err(UnlockError::AlreadyResolved {
                status: request.status.label(),
            });
        }
        Ok(request)
    }

    fn require_admin(&self, admin_id: &AccountId) -> Result<UserAccount, UnlockError> {
        match self.accounts.fetch(admin_id)? {
            Some(account) if account.role.is_admin() => Ok(account),
            _ => Err(UnlockError::NotAdmin(admin_id.clone())),
        }
    }

    pub(super) fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock_span(config: &LoginGuardConfig) -> chrono::Duration {
    chrono::Duration::from_std(config.lock_duration).unwrap_or_else(|_| chrono::Duration::minutes(30))
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("too many login attempts; try again in {} minutes", .retry_after_secs.div_ceil(60))]
    RateLimited { retry_after_secs: u64 },
    #[error("invalid email or password; {attempts_remaining} attempts remaining")]
    InvalidCredentials { attempts_remaining: u32 },
    #[error("account locked until {locked_until}")]
    AccountLocked {
        locked_until: DateTime<Utc>,
        unlock_request: Option<UnlockRequestId>,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, thiserror::Error)]
pub enum UnlockError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("account not found")]
    AccountNotFound,
    #[error("account is not locked")]
    NotLocked,
    #[error("unlock request {0} not found")]
    RequestNotFound(UnlockRequestId),
    #[error("unlock request already {status}")]
    AlreadyResolved { status: &'static str },
    #[error("account {0} is not an administrator")]
    NotAdmin(AccountId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
