//! Account roles and the scope each approving role holds over students.
//!
//! Scope data lives on the role variant itself so a new role cannot be added without
//! stating which gate it signs and which students it covers.

use serde::{Deserialize, Serialize};

use super::approval::{ApprovalError, ApprovalGate};
use super::domain::{Student, StudentId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum AccountRole {
    Student {
        student_id: StudentId,
    },
    Admin,
    Teacher {
        #[serde(default)]
        classes: Vec<String>,
    },
    HallHead {
        halls: Vec<String>,
    },
    StationStaff,
    Advisor {
        advisees: Vec<StudentId>,
    },
    YearHead,
}

impl AccountRole {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Student { .. } => "student",
            Self::Admin => "admin",
            Self::Teacher { .. } => "teacher",
            Self::HallHead { .. } => "hall_head",
            Self::StationStaff => "station_staff",
            Self::Advisor { .. } => "advisor",
            Self::YearHead => "year_head",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// Which students an approver may sign off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApproverScope {
    /// Front desk sees every student.
    StationStaff,
    /// Students whose `teacher` field names this approver.
    Teacher,
    HallHead { halls: Vec<String> },
    Advisor { advisees: Vec<StudentId> },
    /// Students whose `year_head` field names this approver.
    YearHead,
}

impl ApproverScope {
    pub const fn gate(&self) -> ApprovalGate {
        match self {
            Self::StationStaff => ApprovalGate::StationStaff,
            Self::Teacher => ApprovalGate::Teacher,
            Self::HallHead { .. } => ApprovalGate::HallHead,
            Self::Advisor { .. } => ApprovalGate::Advisor,
            Self::YearHead => ApprovalGate::YearHead,
        }
    }
}

/// Resolved identity of whoever is signing a gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Approver {
    pub account_id: String,
    pub name: String,
    pub scope: ApproverScope,
}

impl Approver {
    pub fn from_role(
        account_id: impl Into<String>,
        name: impl Into<String>,
        role: &AccountRole,
    ) -> Result<Self, ApprovalError> {
        let scope = match role {
            AccountRole::Student { .. } | AccountRole::Admin => {
                return Err(ApprovalError::RoleCannotApprove { role: role.label() })
            }
            AccountRole::Teacher { .. } => ApproverScope::Teacher,
            AccountRole::HallHead { halls } => ApproverScope::HallHead {
                halls: halls.clone(),
            },
            AccountRole::StationStaff => ApproverScope::StationStaff,
            AccountRole::Advisor { advisees } => ApproverScope::Advisor {
                advisees: advisees.clone(),
            },
            AccountRole::YearHead => ApproverScope::YearHead,
        };

        Ok(Self {
            account_id: account_id.into(),
            name: name.into(),
            scope,
        })
    }

    pub fn gate(&self) -> ApprovalGate {
        self.scope.gate()
    }

    pub fn covers(&self, student: &Student) -> bool {
        match &self.scope {
            ApproverScope::StationStaff => true,
            ApproverScope::Teacher => student.teacher.as_deref() == Some(self.name.as_str()),
            ApproverScope::HallHead { halls } => student
                .hall
                .as_ref()
                .is_some_and(|hall| halls.contains(hall)),
            ApproverScope::Advisor { advisees } => advisees.contains(&student.id),
            ApproverScope::YearHead => student.year_head.as_deref() == Some(self.name.as_str()),
        }
    }

    pub fn ensure_covers(&self, student: &Student) -> Result<(), ApprovalError> {
        if self.covers(student) {
            Ok(())
        } else {
            Err(ApprovalError::OutOfScope {
                approver: self.name.clone(),
                student: student.id.to_string(),
            })
        }
    }
}

/// Desk a clerk works from. Decides which ledger writes the account may make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerDesk {
    /// Receives returned items. Never touches finance.
    Station,
    /// Registers students and settles finance.
    Administration,
}

impl LedgerDesk {
    pub const fn role_label(self) -> &'static str {
        match self {
            Self::Station => "station_staff",
            Self::Administration => "admin",
        }
    }
}

/// Resolved identity of whoever edits ledger entries outside the station intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerClerk {
    pub account_id: String,
    pub name: String,
    pub desk: LedgerDesk,
}

impl LedgerClerk {
    pub fn from_role(
        account_id: impl Into<String>,
        name: impl Into<String>,
        role: &AccountRole,
    ) -> Result<Self, ApprovalError> {
        let desk = match role {
            AccountRole::StationStaff => LedgerDesk::Station,
            AccountRole::Admin => LedgerDesk::Administration,
            AccountRole::Student { .. }
            | AccountRole::Teacher { .. }
            | AccountRole::HallHead { .. }
            | AccountRole::Advisor { .. }
            | AccountRole::YearHead => {
                return Err(ApprovalError::ActionNotPermitted {
                    role: role.label(),
                    action: "edit clearance records",
                })
            }
        };

        Ok(Self {
            account_id: account_id.into(),
            name: name.into(),
            desk,
        })
    }

    pub fn ensure_desk(&self, desk: LedgerDesk, action: &'static str) -> Result<(), ApprovalError> {
        if self.desk == desk {
            Ok(())
        } else {
            Err(ApprovalError::ActionNotPermitted {
                role: self.desk.role_label(),
                action,
            })
        }
    }
}

/// Resolves account ids to approvers and clerks, and provisions logins for new
/// students. Requests never carry their own scope.
pub trait ApproverDirectory: Send + Sync {
    fn approver(&self, account_id: &str) -> Result<Approver, DirectoryError>;

    fn clerk(&self, account_id: &str) -> Result<LedgerClerk, DirectoryError>;

    /// Fails with `EmailTaken` when an account already uses the address.
    fn ensure_email_free(&self, email: &str) -> Result<(), DirectoryError>;

    /// Create the student's login and add the student to the advisees of the
    /// advisor named on the record.
    fn enroll_student(&self, student: &Student) -> Result<(), DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("account {0} not found")]
    UnknownAccount(String),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error("email {0} already belongs to an account")]
    EmailTaken(String),
    #[error("account directory unavailable: {0}")]
    Unavailable(String),
}
