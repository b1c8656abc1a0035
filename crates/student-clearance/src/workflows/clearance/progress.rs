//! Read-only views derived from student records on every request.

use chrono::NaiveDate;
use serde::Serialize;

use super::approval::{gate_preconditions, ApprovalGate};
use super::catalog::ClearanceCatalog;
use super::domain::{FinalClearanceStatus, Student, StudentId};
use super::ledger::Completion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLabel {
    Completed,
    ActionRequired,
    AwaitingApproval,
    InProgress,
}

impl StatusLabel {
    pub fn for_student(student: &Student, catalog: &ClearanceCatalog) -> Self {
        if student.final_clearance.is_some() {
            Self::Completed
        } else if student.has_action_required() {
            Self::ActionRequired
        } else if student.all_required_completed(catalog) {
            Self::AwaitingApproval
        } else {
            Self::InProgress
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ActionRequired => "action_required",
            Self::AwaitingApproval => "awaiting_approval",
            Self::InProgress => "in_progress",
        }
    }
}

pub fn is_ready_for(student: &Student, gate: ApprovalGate, catalog: &ClearanceCatalog) -> bool {
    gate_preconditions(catalog, student, gate).is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateReadiness {
    pub gate: ApprovalGate,
    pub granted: bool,
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentProgressView {
    pub student_id: StudentId,
    pub name: String,
    pub student_number: String,
    pub completion: Completion,
    pub completion_percentage: u8,
    pub status: StatusLabel,
    pub approval_progress: u8,
    pub year_head_decision: &'static str,
    pub final_clearance: FinalClearanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_code: Option<String>,
    pub gates: Vec<GateReadiness>,
    pub overdue_requirements: usize,
}

impl StudentProgressView {
    pub fn build(student: &Student, catalog: &ClearanceCatalog, today: NaiveDate) -> Self {
        let completion = student.completion(catalog);
        let gates = [
            ApprovalGate::StationStaff,
            ApprovalGate::Teacher,
            ApprovalGate::HallHead,
            ApprovalGate::Advisor,
            ApprovalGate::YearHead,
        ]
        .into_iter()
        .map(|gate| GateReadiness {
            gate,
            granted: student.approvals.is_granted(gate),
            ready: is_ready_for(student, gate, catalog),
        })
        .collect();

        Self {
            student_id: student.id.clone(),
            name: student.name.clone(),
            student_number: student.student_number.clone(),
            completion,
            completion_percentage: completion.percentage(),
            status: StatusLabel::for_student(student, catalog),
            approval_progress: student.approvals.progress_percentage(),
            year_head_decision: student.approvals.year_head.label(),
            final_clearance: student.final_clearance_status(),
            confirmation_code: student.confirmation_code().map(str::to_string),
            gates,
            overdue_requirements: student.overdue_requirements(today),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClearanceDashboard {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub awaiting_approval: usize,
    pub finance_outstanding: usize,
    pub outstanding_balance_total: f64,
    pub unresolved_issues: usize,
}

impl ClearanceDashboard {
    pub fn from_students<'a>(
        students: impl IntoIterator<Item = &'a Student>,
        catalog: &ClearanceCatalog,
    ) -> Self {
        students
            .into_iter()
            .fold(Self::default(), |mut dashboard, student| {
                dashboard.total += 1;
                match student.final_clearance_status() {
                    FinalClearanceStatus::Completed => dashboard.completed += 1,
                    FinalClearanceStatus::Pending => dashboard.pending += 1,
                }
                if StatusLabel::for_student(student, catalog) == StatusLabel::AwaitingApproval {
                    dashboard.awaiting_approval += 1;
                }
                if student.outstanding_balance > 0.0 {
                    dashboard.finance_outstanding += 1;
                    dashboard.outstanding_balance_total += student.outstanding_balance;
                }
                dashboard.unresolved_issues += student.unresolved_issues();
                dashboard
            })
    }
}
