//! Sequential sign-off state machine.
//!
//! Four gates (station staff, teacher, hall head, advisor) flip from open to granted
//! exactly once and never revert. The year head decision sits on top of them and is
//! the only one that can be denied; a denial is kept in state and may later be
//! overturned by an approval. Final clearance is a one-shot transition that issues
//! the confirmation code.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::ClearanceCatalog;
use super::domain::{FinalClearance, Student};

pub const SYSTEM_ACTOR: &str = "System";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalGate {
    StationStaff,
    Teacher,
    HallHead,
    Advisor,
    YearHead,
}

impl ApprovalGate {
    /// Gates that must all be granted before the year head may decide.
    pub const PRECEDING: [Self; 4] = [
        Self::StationStaff,
        Self::Teacher,
        Self::HallHead,
        Self::Advisor,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::StationStaff => "Station Staff",
            Self::Teacher => "Teacher",
            Self::HallHead => "Hall Head",
            Self::Advisor => "Advisor",
            Self::YearHead => "Year Head",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateApproval {
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum YearHeadDecision {
    #[default]
    Pending,
    Approved {
        approved_by: String,
        approved_at: DateTime<Utc>,
    },
    Denied {
        denied_by: String,
        denied_at: DateTime<Utc>,
        reason: String,
    },
}

impl YearHeadDecision {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved { .. } => "approved",
            Self::Denied { .. } => "denied",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApprovalEventKind {
    Approved,
    Denied { reason: String },
    FinalClearanceIssued { confirmation_code: String },
}

/// Audit trail entry appended for every accepted transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub gate: ApprovalGate,
    pub kind: ApprovalEventKind,
    pub actor: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApprovalStatus {
    pub station_staff: Option<GateApproval>,
    pub teacher: Option<GateApproval>,
    pub hall_head: Option<GateApproval>,
    pub advisor: Option<GateApproval>,
    #[serde(default)]
    pub year_head: YearHeadDecision,
    #[serde(default)]
    history: Vec<ApprovalEvent>,
}

impl ApprovalStatus {
    pub fn approval(&self, gate: ApprovalGate) -> Option<GateApproval> {
        match gate {
            ApprovalGate::StationStaff => self.station_staff.clone(),
            ApprovalGate::Teacher => self.teacher.clone(),
            ApprovalGate::HallHead => self.hall_head.clone(),
            ApprovalGate::Advisor => self.advisor.clone(),
            ApprovalGate::YearHead => match &self.year_head {
                YearHeadDecision::Approved {
                    approved_by,
                    approved_at,
                } => Some(GateApproval {
                    approved_by: approved_by.clone(),
                    approved_at: *approved_at,
                }),
                YearHeadDecision::Pending | YearHeadDecision::Denied { .. } => None,
            },
        }
    }

    pub fn is_granted(&self, gate: ApprovalGate) -> bool {
        match gate {
            ApprovalGate::StationStaff => self.station_staff.is_some(),
            ApprovalGate::Teacher => self.teacher.is_some(),
            ApprovalGate::HallHead => self.hall_head.is_some(),
            ApprovalGate::Advisor => self.advisor.is_some(),
            ApprovalGate::YearHead => {
                matches!(self.year_head, YearHeadDecision::Approved { .. })
            }
        }
    }

    pub fn pending_preceding(&self) -> Vec<ApprovalGate> {
        ApprovalGate::PRECEDING
            .into_iter()
            .filter(|gate| !self.is_granted(*gate))
            .collect()
    }

    pub fn preceding_granted(&self) -> bool {
        self.pending_preceding().is_empty()
    }

    /// Share of the four preceding gates already granted, rounded to a whole percent.
    pub fn progress_percentage(&self) -> u8 {
        let granted = ApprovalGate::PRECEDING.len() - self.pending_preceding().len();
        (granted * 100 / ApprovalGate::PRECEDING.len()) as u8
    }

    pub fn history(&self) -> &[ApprovalEvent] {
        &self.history
    }

    fn grant(&mut self, gate: ApprovalGate, actor: &str, at: DateTime<Utc>) {
        let approval = GateApproval {
            approved_by: actor.to_string(),
            approved_at: at,
        };
        match gate {
            ApprovalGate::StationStaff => self.station_staff = Some(approval),
            ApprovalGate::Teacher => self.teacher = Some(approval),
            ApprovalGate::HallHead => self.hall_head = Some(approval),
            ApprovalGate::Advisor => self.advisor = Some(approval),
            ApprovalGate::YearHead => {
                self.year_head = YearHeadDecision::Approved {
                    approved_by: approval.approved_by,
                    approved_at: approval.approved_at,
                }
            }
        }
        self.history.push(ApprovalEvent {
            gate,
            kind: ApprovalEventKind::Approved,
            actor: actor.to_string(),
            at,
        });
    }

    fn deny_year_head(&mut self, actor: &str, reason: &str, at: DateTime<Utc>) {
        self.year_head = YearHeadDecision::Denied {
            denied_by: actor.to_string(),
            denied_at: at,
            reason: reason.to_string(),
        };
        self.history.push(ApprovalEvent {
            gate: ApprovalGate::YearHead,
            kind: ApprovalEventKind::Denied {
                reason: reason.to_string(),
            },
            actor: actor.to_string(),
            at,
        });
    }
}

/// Decides when the terminal transition fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalClearancePolicy {
    pub require_year_head: bool,
}

impl Default for FinalClearancePolicy {
    fn default() -> Self {
        Self {
            require_year_head: true,
        }
    }
}

impl FinalClearancePolicy {
    pub fn is_satisfied(&self, approvals: &ApprovalStatus) -> bool {
        approvals.preceding_granted()
            && (!self.require_year_head || approvals.is_granted(ApprovalGate::YearHead))
    }
}

/// Issues `CLR<year><sequence>` codes, unique per issuer.
#[derive(Debug)]
pub struct ConfirmationCodeIssuer {
    next: AtomicU64,
}

impl Default for ConfirmationCodeIssuer {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl ConfirmationCodeIssuer {
    pub fn starting_at(sequence: u64) -> Self {
        Self {
            next: AtomicU64::new(sequence),
        }
    }

    pub fn issue(&self, at: DateTime<Utc>) -> String {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed);
        format!("CLR{}{sequence:03}", at.year())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    #[error("{role} accounts cannot approve clearances")]
    RoleCannotApprove { role: &'static str },
    #[error("student {student} is outside {approver}'s scope")]
    OutOfScope { approver: String, student: String },
    #[error("required items incomplete ({completed}/{required})")]
    ItemsIncomplete { completed: usize, required: usize },
    #[error("station staff approval is still pending")]
    StationStaffPending,
    #[error("awaiting approvals: {missing}")]
    PrecedingGatesPending { missing: String },
    #[error("{} approval already granted", .0.label())]
    AlreadyApproved(ApprovalGate),
    #[error("student already holds final clearance")]
    AlreadyCleared,
    #[error("{role} accounts cannot {action}")]
    ActionNotPermitted {
        role: &'static str,
        action: &'static str,
    },
    #[error("only the year head decision can be denied")]
    DenialNotSupported(ApprovalGate),
}

/// Result of an accepted approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub gate: ApprovalGate,
    pub final_clearance_issued: bool,
}

/// Binds the catalog, final clearance policy and code issuer for gate transitions.
pub struct ApprovalWorkflow<'a> {
    catalog: &'a ClearanceCatalog,
    policy: FinalClearancePolicy,
    codes: &'a ConfirmationCodeIssuer,
}

impl<'a> ApprovalWorkflow<'a> {
    pub fn new(
        catalog: &'a ClearanceCatalog,
        policy: FinalClearancePolicy,
        codes: &'a ConfirmationCodeIssuer,
    ) -> Self {
        Self {
            catalog,
            policy,
            codes,
        }
    }

    /// State-based preconditions for granting `gate`. Scope is checked by the caller.
    pub fn check(&self, student: &Student, gate: ApprovalGate) -> Result<(), ApprovalError> {
        gate_preconditions(self.catalog, student, gate)
    }

    pub fn approve(
        &self,
        student: &mut Student,
        gate: ApprovalGate,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        self.check(student, gate)?;
        student.approvals.grant(gate, actor, at);
        let final_clearance_issued = self.settle(student, at);
        Ok(ApprovalOutcome {
            gate,
            final_clearance_issued,
        })
    }

    /// Record a year head denial. The four gates stay granted and the student may be
    /// reviewed again.
    pub fn deny(
        &self,
        student: &mut Student,
        gate: ApprovalGate,
        actor: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ApprovalError> {
        if gate != ApprovalGate::YearHead {
            return Err(ApprovalError::DenialNotSupported(gate));
        }
        if student.final_clearance.is_some() {
            return Err(ApprovalError::AlreadyCleared);
        }
        if student.approvals.is_granted(ApprovalGate::YearHead) {
            return Err(ApprovalError::AlreadyApproved(ApprovalGate::YearHead));
        }
        require_all_items(self.catalog, student)?;
        require_preceding(student)?;

        student.approvals.deny_year_head(actor, reason, at);
        Ok(())
    }

    /// Terminal transition. Fires at most once per student; returns whether it fired now.
    pub fn settle(&self, student: &mut Student, at: DateTime<Utc>) -> bool {
        if student.final_clearance.is_some() || !self.policy.is_satisfied(&student.approvals) {
            return false;
        }

        let confirmation_code = self.codes.issue(at);
        student.approvals.history.push(ApprovalEvent {
            gate: ApprovalGate::YearHead,
            kind: ApprovalEventKind::FinalClearanceIssued {
                confirmation_code: confirmation_code.clone(),
            },
            actor: SYSTEM_ACTOR.to_string(),
            at,
        });
        student.final_clearance = Some(FinalClearance {
            confirmation_code,
            approved_by: SYSTEM_ACTOR.to_string(),
            approved_at: at,
        });
        true
    }
}

/// Whether `gate` may be granted for `student` right now, ignoring approver scope.
pub fn gate_preconditions(
    catalog: &ClearanceCatalog,
    student: &Student,
    gate: ApprovalGate,
) -> Result<(), ApprovalError> {
    if student.approvals.is_granted(gate) {
        return Err(ApprovalError::AlreadyApproved(gate));
    }

    match gate {
        ApprovalGate::StationStaff => {
            let submitted = student.submission_completion(catalog);
            if !submitted.is_complete() {
                return Err(ApprovalError::ItemsIncomplete {
                    completed: submitted.completed,
                    required: submitted.required,
                });
            }
        }
        ApprovalGate::Teacher | ApprovalGate::HallHead | ApprovalGate::Advisor => {
            require_all_items(catalog, student)?;
            if !student.approvals.is_granted(ApprovalGate::StationStaff) {
                return Err(ApprovalError::StationStaffPending);
            }
        }
        ApprovalGate::YearHead => {
            require_all_items(catalog, student)?;
            require_preceding(student)?;
        }
    }

    Ok(())
}

fn require_all_items(catalog: &ClearanceCatalog, student: &Student) -> Result<(), ApprovalError> {
    let completion = student.completion(catalog);
    if completion.is_complete() {
        Ok(())
    } else {
        Err(ApprovalError::ItemsIncomplete {
            completed: completion.completed,
            required: completion.required,
        })
    }
}

fn require_preceding(student: &Student) -> Result<(), ApprovalError> {
    let missing = student.approvals.pending_preceding();
    if missing.is_empty() {
        return Ok(());
    }
    let missing = missing
        .iter()
        .map(|gate| gate.label())
        .collect::<Vec<_>>()
        .join(", ");
    Err(ApprovalError::PrecedingGatesPending { missing })
}
