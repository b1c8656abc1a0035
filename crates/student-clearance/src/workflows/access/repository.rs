use super::domain::{AccountId, AdminUnlockRequest, UnlockRequestId, UserAccount};
use crate::workflows::clearance::repository::RepositoryError;

/// Account storage keyed by id, with a lookup on the normalized email.
pub trait AccountRepository: Send + Sync {
    fn insert(&self, account: UserAccount) -> Result<UserAccount, RepositoryError>;
    fn update(&self, account: UserAccount) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &AccountId) -> Result<Option<UserAccount>, RepositoryError>;
    fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, RepositoryError>;
    fn list(&self) -> Result<Vec<UserAccount>, RepositoryError>;
}

pub trait UnlockRequestRepository: Send + Sync {
    fn insert(&self, request: AdminUnlockRequest) -> Result<AdminUnlockRequest, RepositoryError>;
    fn update(&self, request: AdminUnlockRequest) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &UnlockRequestId) -> Result<Option<AdminUnlockRequest>, RepositoryError>;
    fn list(&self) -> Result<Vec<AdminUnlockRequest>, RepositoryError>;
}
