use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::config::LoginGuardConfig;
use crate::workflows::access::domain::{
    AccountId, AdminUnlockRequest, UnlockRequestId, UserAccount,
};
use crate::workflows::access::repository::{AccountRepository, UnlockRequestRepository};
use crate::workflows::access::service::AuthService;
use crate::workflows::clearance::domain::StudentId;
use crate::workflows::clearance::repository::RepositoryError;
use crate::workflows::clearance::roles::AccountRole;

pub(super) const PASSWORD: &str = "password";
pub(super) const STUDENT_EMAIL: &str = "aayanlade24@alastudents.org";
pub(super) const ADMIN_ID: &str = "2";
pub(super) const ADVISOR_ID: &str = "8";
pub(super) const ADVISOR_NAME: &str = "Ms. Catherine Delight";

pub(super) fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 16, 9, 0, 0)
        .single()
        .expect("valid timestamp")
        + chrono::Duration::minutes(minute)
}

pub(super) fn guard_config() -> LoginGuardConfig {
    LoginGuardConfig {
        max_attempts: 5,
        window: Duration::from_secs(15 * 60),
        lock_duration: Duration::from_secs(30 * 60),
        demo_password: PASSWORD.to_string(),
    }
}

fn account(id: &str, name: &str, email: &str, role: AccountRole) -> UserAccount {
    UserAccount {
        id: AccountId(id.to_string()),
        name: name.to_string(),
        email: email.to_string(),
        role,
        password: None,
        login_attempts: 0,
        lock: None,
    }
}

pub(super) fn standard_accounts() -> Vec<UserAccount> {
    vec![
        account(
            "1",
            "Ayanfe Ayanlade",
            STUDENT_EMAIL,
            AccountRole::Student {
                student_id: StudentId("1".to_string()),
            },
        ),
        account(
            ADMIN_ID,
            "System Administrator",
            "admin@alastudents.org",
            AccountRole::Admin,
        ),
        account(
            "6",
            "Reception Staff",
            "reception@alastudents.org",
            AccountRole::StationStaff,
        ),
        account(
            ADVISOR_ID,
            ADVISOR_NAME,
            "cdelight@alastudents.org",
            AccountRole::Advisor {
                advisees: vec![StudentId("1".to_string())],
            },
        ),
    ]
}

#[derive(Default)]
pub(super) struct MemoryAccounts {
    accounts: Mutex<HashMap<AccountId, UserAccount>>,
}

impl MemoryAccounts {
    pub(super) fn with(accounts: Vec<UserAccount>) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|account| (account.id.clone(), account))
            .collect();
        Self {
            accounts: Mutex::new(accounts),
        }
    }
}

impl AccountRepository for MemoryAccounts {
    fn insert(&self, account: UserAccount) -> Result<UserAccount, RepositoryError> {
        let mut guard = self.accounts.lock().expect("accounts mutex poisoned");
        if guard.contains_key(&account.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    fn update(&self, account: UserAccount) -> Result<(), RepositoryError> {
        let mut guard = self.accounts.lock().expect("accounts mutex poisoned");
        if !guard.contains_key(&account.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(account.id.clone(), account);
        Ok(())
    }

    fn fetch(&self, id: &AccountId) -> Result<Option<UserAccount>, RepositoryError> {
        let guard = self.accounts.lock().expect("accounts mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, RepositoryError> {
        let guard = self.accounts.lock().expect("accounts mutex poisoned");
        Ok(guard.values().find(|account| account.email == email).cloned())
    }

    fn list(&self) -> Result<Vec<UserAccount>, RepositoryError> {
        let guard = self.accounts.lock().expect("accounts mutex poisoned");
        let mut accounts: Vec<_> = guard.values().cloned().collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }
}

#[derive(Default)]
pub(super) struct MemoryUnlockRequests {
    requests: Mutex<HashMap<UnlockRequestId, AdminUnlockRequest>>,
}

impl UnlockRequestRepository for MemoryUnlockRequests {
    fn insert(&self, request: AdminUnlockRequest) -> Result<AdminUnlockRequest, RepositoryError> {
        let mut guard = self.requests.lock().expect("requests mutex poisoned");
        guard.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn update(&self, request: AdminUnlockRequest) -> Result<(), RepositoryError> {
        let mut guard = self.requests.lock().expect("requests mutex poisoned");
        if !guard.contains_key(&request.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(request.id.clone(), request);
        Ok(())
    }

    fn fetch(&self, id: &UnlockRequestId) -> Result<Option<AdminUnlockRequest>, RepositoryError> {
        let guard = self.requests.lock().expect("requests mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<AdminUnlockRequest>, RepositoryError> {
        let guard = self.requests.lock().expect("requests mutex poisoned");
        let mut requests: Vec<_> = guard.values().cloned().collect();
        requests.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(requests)
    }
}

pub(super) type TestAuth = AuthService<MemoryAccounts, MemoryUnlockRequests>;

pub(super) fn build_auth() -> (TestAuth, Arc<MemoryAccounts>, Arc<MemoryUnlockRequests>) {
    let accounts = Arc::new(MemoryAccounts::with(standard_accounts()));
    let requests = Arc::new(MemoryUnlockRequests::default());
    let service = AuthService::new(accounts.clone(), requests.clone(), guard_config());
    (service, accounts, requests)
}

/// Drive the account into a lock with wrong passwords starting at `start`.
pub(super) fn lock_out(service: &TestAuth, start: i64) -> AdminUnlockRequest {
    use crate::workflows::access::service::LoginError;

    for attempt in 0..4 {
        let result = service.login_at(STUDENT_EMAIL, "wrong-password", at(start + attempt));
        assert!(matches!(result, Err(LoginError::InvalidCredentials { .. })));
    }
    match service.login_at(STUDENT_EMAIL, "wrong-password", at(start + 4)) {
        Err(LoginError::AccountLocked {
            unlock_request: Some(request_id),
            ..
        }) => service
            .unlock_queue(&AccountId(ADMIN_ID.to_string()))
            .expect("admin queue")
            .pending
            .into_iter()
            .find(|request| request.id == request_id)
            .expect("pending request"),
        other => panic!("expected lock, got {other:?}"),
    }
}
