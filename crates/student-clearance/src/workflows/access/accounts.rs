use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

use super::domain::{AccountId, NewAccount, UserAccount};
use super::repository::{AccountRepository, UnlockRequestRepository};
use super::service::AuthService;
use crate::validation::{normalize_email, require_text, validate_password, ValidationError};
use crate::workflows::clearance::domain::Student;
use crate::workflows::clearance::repository::RepositoryError;
use crate::workflows::clearance::roles::{
    AccountRole, Approver, ApproverDirectory, DirectoryError, LedgerClerk,
};

static ACCOUNT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_account_id() -> AccountId {
    let id = ACCOUNT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    AccountId(format!("acct-{id:06}"))
}

impl<A, U> AuthService<A, U>
where
    A: AccountRepository + 'static,
    U: UnlockRequestRepository + 'static,
{
    /// Create a staff account. Only admins may call this, and the role must carry
    /// the scope it approves over.
    pub fn register_account(
        &self,
        admin_id: &AccountId,
        form: NewAccount,
    ) -> Result<UserAccount, AccountError> {
        let name = require_text("name", &form.name)?;
        let email = normalize_email(&form.email)?;
        if let Some(password) = form.password.as_deref() {
            validate_password(password)?;
        }
        let role = validated_role(form.role)?;

        let _writes = self.lock_writes();
        let admin = match self.accounts.fetch(admin_id)? {
            Some(account) if account.role.is_admin() => account,
            _ => return Err(AccountError::NotAdmin(admin_id.clone())),
        };
        if self.accounts.find_by_email(&email)?.is_some() {
            return Err(AccountError::EmailTaken(email));
        }

        let account = self.accounts.insert(UserAccount {
            id: next_account_id(),
            name,
            email,
            role,
            password: form.password,
            login_attempts: 0,
            lock: None,
        })?;
        info!(
            account = %account.id,
            role = account.role.label(),
            admin = %admin.name,
            "account registered"
        );
        Ok(account)
    }

    /// Student login for a freshly registered student. The student is added to
    /// the advisees of whichever advisor account carries their advisor's name.
    pub fn create_student_account(&self, student: &Student) -> Result<UserAccount, AccountError> {
        let email = normalize_email(&student.email)?;

        let _writes = self.lock_writes();
        if self.accounts.find_by_email(&email)?.is_some() {
            return Err(AccountError::EmailTaken(email));
        }
        let account = self.accounts.insert(UserAccount {
            id: next_account_id(),
            name: student.name.clone(),
            email,
            role: AccountRole::Student {
                student_id: student.id.clone(),
            },
            password: None,
            login_attempts: 0,
            lock: None,
        })?;

        if let Some(advisor) = student.advisor.as_deref() {
            let mut linked = false;
            for mut candidate in self.accounts.list()? {
                let AccountRole::Advisor { advisees } = &mut candidate.role else {
                    continue;
                };
                if candidate.name != advisor {
                    continue;
                }
                if !advisees.contains(&student.id) {
                    advisees.push(student.id.clone());
                }
                self.accounts.update(candidate)?;
                linked = true;
            }
            if !linked {
                warn!(student = %student.id, %advisor, "no advisor account matches student");
            }
        }

        info!(account = %account.id, student = %student.id, "student account created");
        Ok(account)
    }

    fn stored_account(&self, account_id: &str) -> Result<UserAccount, DirectoryError> {
        self.accounts
            .fetch(&AccountId(account_id.to_string()))
            .map_err(|error| DirectoryError::Unavailable(error.to_string()))?
            .ok_or_else(|| DirectoryError::UnknownAccount(account_id.to_string()))
    }
}

fn validated_role(role: AccountRole) -> Result<AccountRole, AccountError> {
    match role {
        AccountRole::Student { .. } => Err(AccountError::StudentRole),
        AccountRole::HallHead { halls } => {
            let halls = halls
                .iter()
                .map(|hall| hall.trim())
                .filter(|hall| !hall.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>();
            if halls.is_empty() {
                return Err(ValidationError::Empty { field: "halls" }.into());
            }
            Ok(AccountRole::HallHead { halls })
        }
        AccountRole::Advisor { advisees } if advisees.is_empty() => {
            Err(ValidationError::Empty { field: "advisees" }.into())
        }
        other => Ok(other),
    }
}

/// Accounts double as the approver and clerk directory for the clearance workflow.
impl<A, U> ApproverDirectory for AuthService<A, U>
where
    A: AccountRepository + 'static,
    U: UnlockRequestRepository + 'static,
{
    fn approver(&self, account_id: &str) -> Result<Approver, DirectoryError> {
        let account = self.stored_account(account_id)?;
        Ok(Approver::from_role(account.id.0, account.name, &account.role)?)
    }

    fn clerk(&self, account_id: &str) -> Result<LedgerClerk, DirectoryError> {
        let account = self.stored_account(account_id)?;
        Ok(LedgerClerk::from_role(account.id.0, account.name, &account.role)?)
    }

    fn ensure_email_free(&self, email: &str) -> Result<(), DirectoryError> {
        match self.accounts.find_by_email(email) {
            Ok(None) => Ok(()),
            Ok(Some(_)) => Err(DirectoryError::EmailTaken(email.to_string())),
            Err(error) => Err(DirectoryError::Unavailable(error.to_string())),
        }
    }

    fn enroll_student(&self, student: &Student) -> Result<(), DirectoryError> {
        match self.create_student_account(student) {
            Ok(_) => Ok(()),
            Err(AccountError::EmailTaken(email)) => Err(DirectoryError::EmailTaken(email)),
            Err(error) => Err(DirectoryError::Unavailable(error.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("account {0} is not an administrator")]
    NotAdmin(AccountId),
    #[error("an account already uses {0}")]
    EmailTaken(String),
    #[error("student accounts are created by registering the student")]
    StudentRole,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
