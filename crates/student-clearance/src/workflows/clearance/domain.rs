use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::approval::ApprovalStatus;

/// Internal identifier of a student record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudentId(pub String);

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Catalog item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearanceCategory {
    SubjectMaterials,
    OtherRequirements,
    Finance,
    Administrative,
}

impl ClearanceCategory {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SubjectMaterials => "subject_materials",
            Self::OtherRequirements => "other_requirements",
            Self::Finance => "finance",
            Self::Administrative => "administrative",
        }
    }
}

/// Immutable catalog entry describing something a student must return or settle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearanceItem {
    pub id: ItemId,
    pub name: String,
    pub category: ClearanceCategory,
    pub description: String,
    pub is_required: bool,
    /// Physical items handed in at a station, as opposed to settled elsewhere.
    pub requires_submission: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Completed,
    ActionRequired,
}

impl ItemStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::ActionRequired => "action_required",
        }
    }
}

/// Per-student, per-item ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearanceStatus {
    pub item_id: ItemId,
    pub student_id: StudentId,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outstanding_amount: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalClearanceStatus {
    Pending,
    Completed,
}

impl FinalClearanceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

/// Certificate data issued once when the student clears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalClearance {
    pub confirmation_code: String,
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

/// Aggregate root: owns its ledger entries, approvals, assigned items and requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    /// School-issued number, e.g. `ALA2024-101`.
    pub student_number: String,
    pub grade: String,
    pub section: String,
    pub email: String,
    pub hall: Option<String>,
    pub room: Option<String>,
    pub advisor: Option<String>,
    pub teacher: Option<String>,
    pub year_head: Option<String>,
    pub outstanding_balance: f64,
    pub clearance_items: Vec<ClearanceStatus>,
    pub approvals: ApprovalStatus,
    pub final_clearance: Option<FinalClearance>,
    #[serde(default)]
    pub assigned_items: Vec<ItemRegistration>,
    #[serde(default)]
    pub requirements: Vec<StudentRequirement>,
}

impl Student {
    pub fn final_clearance_status(&self) -> FinalClearanceStatus {
        match self.final_clearance {
            Some(_) => FinalClearanceStatus::Completed,
            None => FinalClearanceStatus::Pending,
        }
    }

    pub fn confirmation_code(&self) -> Option<&str> {
        self.final_clearance
            .as_ref()
            .map(|clearance| clearance.confirmation_code.as_str())
    }
}

/// Registration form payload for a new student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStudent {
    pub name: String,
    pub student_number: String,
    pub grade: String,
    #[serde(default)]
    pub section: String,
    pub email: String,
    #[serde(default)]
    pub hall: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub advisor: Option<String>,
    #[serde(default)]
    pub teacher: Option<String>,
    #[serde(default)]
    pub year_head: Option<String>,
    #[serde(default)]
    pub outstanding_balance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignedItemType {
    Calculator,
    Textbook,
    ItEquipment,
    SportsEquipment,
}

impl AssignedItemType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Calculator => "calculator",
            Self::Textbook => "textbook",
            Self::ItEquipment => "it_equipment",
            Self::SportsEquipment => "sports_equipment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Returned,
    Missing,
    Damaged,
}

impl AssignmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Returned => "returned",
            Self::Missing => "missing",
            Self::Damaged => "damaged",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    Good,
    Fair,
    Damaged,
}

impl ItemCondition {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Damaged => "damaged",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Missing,
    Damaged,
}

impl IssueType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Damaged => "damaged",
        }
    }

    pub(crate) const fn as_status(self) -> AssignmentStatus {
        match self {
            Self::Missing => AssignmentStatus::Missing,
            Self::Damaged => AssignmentStatus::Damaged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedIssue {
    pub issue_type: IssueType,
    pub reported_at: DateTime<Utc>,
    pub description: String,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}

/// Serialised item a teacher handed out, tracked until it comes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistration {
    pub id: String,
    pub teacher_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub serial_number: String,
    pub item_type: AssignedItemType,
    pub description: String,
    pub registered_at: DateTime<Utc>,
    pub status: AssignmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ItemCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_issue: Option<ReportedIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItemRegistration {
    pub teacher_name: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub serial_number: String,
    pub item_type: AssignedItemType,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    Pending,
    Completed,
    Overdue,
}

impl RequirementStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Overdue => "overdue",
        }
    }
}

/// Ad-hoc task a teacher assigns outside the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRequirement {
    pub id: String,
    pub teacher_name: String,
    pub requirement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub priority: RequirementPriority,
    pub status: RequirementStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequirement {
    pub teacher_name: String,
    pub requirement: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub priority: RequirementPriority,
    #[serde(default)]
    pub notes: Option<String>,
}
