use super::domain::{Student, StudentId};

/// Storage abstraction so the service module can be exercised in isolation.
pub trait StudentRepository: Send + Sync {
    fn insert(&self, student: Student) -> Result<Student, RepositoryError>;
    fn update(&self, student: Student) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError>;
    fn find_by_number(&self, student_number: &str) -> Result<Option<Student>, RepositoryError>;
    fn list(&self) -> Result<Vec<Student>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
