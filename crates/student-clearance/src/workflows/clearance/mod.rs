//! Student clearance: item ledger, sequential approvals, and the views derived from them.

pub mod approval;
mod assignments;
pub mod catalog;
pub mod domain;
pub mod ledger;
pub mod progress;
mod requirements;
pub mod repository;
pub mod roles;
pub mod router;
pub mod service;
pub mod webhook;

#[cfg(test)]
mod tests;

pub use approval::{
    ApprovalError, ApprovalEvent, ApprovalEventKind, ApprovalGate, ApprovalOutcome,
    ApprovalStatus, ApprovalWorkflow, ConfirmationCodeIssuer, FinalClearancePolicy, GateApproval,
    YearHeadDecision,
};
pub use catalog::{ClearanceCatalog, FINANCE_ITEM_ID};
pub use domain::{
    AssignedItemType, AssignmentStatus, ClearanceCategory, ClearanceItem, ClearanceStatus,
    FinalClearance, FinalClearanceStatus, ItemCondition, ItemId, ItemRegistration, ItemStatus,
    IssueType, NewItemRegistration, NewRequirement, NewStudent, ReportedIssue, RequirementPriority,
    RequirementStatus, Student, StudentId, StudentRequirement,
};
pub use ledger::{Completion, ItemStatusUpdate, LedgerError};
pub use progress::{ClearanceDashboard, GateReadiness, StatusLabel, StudentProgressView};
pub use repository::{RepositoryError, StudentRepository};
pub use roles::{
    AccountRole, Approver, ApproverDirectory, ApproverScope, DirectoryError, LedgerClerk,
    LedgerDesk,
};
pub use router::{clearance_router, ClearanceState};
pub use service::{
    ApprovalReceipt, BulkApprovalResult, ClearanceService, ClearanceServiceError,
    SubmissionReceipt,
};
pub use webhook::{CheckoutCompleted, CheckoutNotifier, NotifyError, WebhookNotifier};
