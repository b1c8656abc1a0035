use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::approval::{
    ApprovalError, ApprovalGate, ApprovalOutcome, ApprovalWorkflow, ConfirmationCodeIssuer,
    FinalClearancePolicy,
};
use super::catalog::ClearanceCatalog;
use super::domain::{
    ClearanceCategory, ItemCondition, ItemId, ItemRegistration, ItemStatus, IssueType,
    NewItemRegistration, NewRequirement, NewStudent, Student, StudentId, StudentRequirement,
};
use super::ledger::{ItemStatusUpdate, LedgerError};
use super::progress::{is_ready_for, ClearanceDashboard, StudentProgressView};
use super::repository::{RepositoryError, StudentRepository};
use super::roles::{Approver, ApproverDirectory, DirectoryError, LedgerClerk, LedgerDesk};
use super::webhook::{CheckoutCompleted, CheckoutNotifier};
use crate::validation::{normalize_email, require_text, validate_amount, ValidationError};

/// Service composing the catalog, approval workflow, repository, and checkout notifier.
pub struct ClearanceService<R, N> {
    catalog: Arc<ClearanceCatalog>,
    repository: Arc<R>,
    notifier: Arc<N>,
    policy: FinalClearancePolicy,
    codes: ConfirmationCodeIssuer,
    writes: Mutex<()>,
}

static STUDENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static REGISTRATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static REQUIREMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_student_id() -> StudentId {
    let id = STUDENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    StudentId(format!("stu-{id:06}"))
}

fn next_registration_id() -> String {
    let id = REGISTRATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("itm-{id:06}")
}

fn next_requirement_id() -> String {
    let id = REQUIREMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:06}")
}

/// Result of a station intake.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub student: Student,
    pub recorded: Vec<ItemId>,
    pub station_approved: bool,
    pub final_clearance_issued: bool,
    #[serde(skip)]
    pub checkout: Option<CheckoutCompleted>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalReceipt {
    pub student: Student,
    pub outcome: ApprovalOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkApprovalResult {
    pub student_id: StudentId,
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_clearance_issued: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<R, N> ClearanceService<R, N>
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
{
    pub fn new(
        catalog: Arc<ClearanceCatalog>,
        repository: Arc<R>,
        notifier: Arc<N>,
        policy: FinalClearancePolicy,
    ) -> Self {
        Self {
            catalog,
            repository,
            notifier,
            policy,
            codes: ConfirmationCodeIssuer::default(),
            writes: Mutex::new(()),
        }
    }

    /// Continue confirmation codes from an existing sequence.
    pub fn with_codes(mut self, codes: ConfirmationCodeIssuer) -> Self {
        self.codes = codes;
        self
    }

    pub fn catalog(&self) -> &ClearanceCatalog {
        &self.catalog
    }

    pub fn policy(&self) -> FinalClearancePolicy {
        self.policy
    }

    /// Register a student and provision their login through `accounts`. The
    /// email is checked against existing accounts before anything is stored.
    pub fn register_student<D>(
        &self,
        registrar: &LedgerClerk,
        form: NewStudent,
        accounts: &D,
    ) -> Result<Student, ClearanceServiceError>
    where
        D: ApproverDirectory + ?Sized,
    {
        registrar.ensure_desk(LedgerDesk::Administration, "register students")?;
        let form = NewStudent {
            name: require_text("name", &form.name)?,
            student_number: require_text("student_number", &form.student_number)?,
            grade: require_text("grade", &form.grade)?,
            email: normalize_email(&form.email)?,
            outstanding_balance: validate_amount("outstanding_balance", form.outstanding_balance)?,
            ..form
        };

        let _writes = self.lock_writes();
        if self
            .repository
            .find_by_number(&form.student_number)?
            .is_some()
        {
            return Err(RepositoryError::Conflict.into());
        }
        accounts.ensure_email_free(&form.email)?;

        let student = Student::register(next_student_id(), form, &self.catalog);
        let stored = self.repository.insert(student)?;
        accounts.enroll_student(&stored)?;
        info!(
            student = %stored.id,
            number = %stored.student_number,
            registrar = %registrar.name,
            "registered student"
        );
        Ok(stored)
    }

    pub fn get(&self, student_id: &StudentId) -> Result<Student, ClearanceServiceError> {
        let student = self
            .repository
            .fetch(student_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(student)
    }

    pub fn list(&self) -> Result<Vec<Student>, ClearanceServiceError> {
        Ok(self.repository.list()?)
    }

    /// Overwrite one non-finance ledger entry. Completion is credited to the clerk.
    pub fn set_item_status(
        &self,
        clerk: &LedgerClerk,
        student_id: &StudentId,
        item_id: &ItemId,
        mut update: ItemStatusUpdate,
    ) -> Result<Student, ClearanceServiceError> {
        let item = self
            .catalog
            .item(item_id)
            .ok_or_else(|| LedgerError::ItemNotFound(item_id.clone()))?;
        if item.category == ClearanceCategory::Finance {
            return Err(LedgerError::FinanceSettlementRequired(item_id.clone()).into());
        }
        if let Some(amount) = update.outstanding_amount {
            validate_amount("outstanding_amount", amount)?;
        }
        update.completed_by = (update.status == ItemStatus::Completed).then(|| clerk.name.clone());
        let status = update.status;

        let student = self.mutate(student_id, |student, _| {
            student.set_item_status(item_id, update, Utc::now())?;
            Ok(())
        })?;
        info!(
            student = %student.id,
            item = %item_id,
            clerk = %clerk.name,
            ?status,
            "ledger entry updated"
        );
        Ok(student)
    }

    /// Mark handed-in items completed. Once every submission item is in, the
    /// station gate is granted and a checkout payload is returned for delivery.
    pub fn record_submissions(
        &self,
        staff: &Approver,
        student_id: &StudentId,
        item_ids: &[ItemId],
        notes: &BTreeMap<ItemId, String>,
    ) -> Result<SubmissionReceipt, ClearanceServiceError> {
        if staff.gate() != ApprovalGate::StationStaff {
            return Err(ApprovalError::RoleCannotApprove {
                role: staff.gate().label(),
            }
            .into());
        }
        if item_ids.is_empty() {
            return Err(ValidationError::Empty { field: "items" }.into());
        }
        if let Some(unknown) = item_ids.iter().find(|id| self.catalog.item(id).is_none()) {
            return Err(LedgerError::ItemNotFound(unknown.clone()).into());
        }

        let _writes = self.lock_writes();
        let mut student = self.get(student_id)?;
        let now = Utc::now();
        for item_id in item_ids {
            let mut update = ItemStatusUpdate::completed(staff.name.as_str());
            update.notes = notes.get(item_id).cloned();
            student.set_item_status(item_id, update, now)?;
        }

        let mut receipt = SubmissionReceipt {
            student: student.clone(),
            recorded: item_ids.to_vec(),
            station_approved: false,
            final_clearance_issued: false,
            checkout: None,
        };

        let workflow = self.workflow();
        if !student.approvals.is_granted(ApprovalGate::StationStaff)
            && student.submission_completion(&self.catalog).is_complete()
        {
            let outcome =
                workflow.approve(&mut student, ApprovalGate::StationStaff, &staff.name, now)?;
            receipt.station_approved = true;
            receipt.final_clearance_issued = outcome.final_clearance_issued;
            receipt.checkout = Some(CheckoutCompleted::build(
                &student,
                &self.catalog,
                &staff.name,
                now,
            ));
            info!(student = %student.id, staff = %staff.name, "checkout complete; station approval granted");
        }

        self.repository.update(student.clone())?;
        receipt.student = student;
        Ok(receipt)
    }

    /// Deliver a checkout payload. Failures are logged and returned as a warning;
    /// recorded items are never rolled back.
    pub async fn notify_checkout(&self, payload: &CheckoutCompleted) -> Option<String> {
        match self.notifier.notify(payload).await {
            Ok(()) => None,
            Err(error) => {
                warn!(student = %payload.student.id, %error, "checkout webhook failed");
                Some(format!("items saved but checkout notification failed: {error}"))
            }
        }
    }

    pub fn settle_finance(
        &self,
        clerk: &LedgerClerk,
        student_id: &StudentId,
    ) -> Result<Student, ClearanceServiceError> {
        clerk.ensure_desk(LedgerDesk::Administration, "settle finance")?;
        let student = self.mutate(student_id, |student, catalog| {
            student.settle_finance(catalog, &clerk.name, Utc::now())?;
            Ok(())
        })?;
        info!(student = %student.id, clerk = %clerk.name, "finance settled");
        Ok(student)
    }

    pub fn approve(
        &self,
        approver: &Approver,
        student_id: &StudentId,
    ) -> Result<ApprovalReceipt, ClearanceServiceError> {
        let _writes = self.lock_writes();
        let mut student = self.get(student_id)?;
        let gate = approver.gate();

        let outcome = approver
            .ensure_covers(&student)
            .and_then(|()| {
                self.workflow()
                    .approve(&mut student, gate, &approver.name, Utc::now())
            })
            .map_err(|error| {
                warn!(student = %student_id, approver = %approver.name, gate = gate.label(), %error, "approval rejected");
                error
            })?;

        self.repository.update(student.clone())?;
        info!(
            student = %student.id,
            approver = %approver.name,
            gate = gate.label(),
            final_clearance = outcome.final_clearance_issued,
            "approval recorded"
        );
        if let Some(code) = student.confirmation_code().filter(|_| outcome.final_clearance_issued) {
            info!(student = %student.id, code, "final clearance issued");
        }
        Ok(ApprovalReceipt { student, outcome })
    }

    /// Each student is approved on its own; one failure does not stop the batch.
    pub fn bulk_approve(
        &self,
        approver: &Approver,
        student_ids: &[StudentId],
    ) -> Vec<BulkApprovalResult> {
        student_ids
            .iter()
            .map(|student_id| match self.approve(approver, student_id) {
                Ok(receipt) => BulkApprovalResult {
                    student_id: student_id.clone(),
                    approved: true,
                    final_clearance_issued: Some(receipt.outcome.final_clearance_issued),
                    error: None,
                },
                Err(error) => BulkApprovalResult {
                    student_id: student_id.clone(),
                    approved: false,
                    final_clearance_issued: None,
                    error: Some(error.to_string()),
                },
            })
            .collect()
    }

    /// Persist a year head denial with its reason.
    pub fn deny_final(
        &self,
        approver: &Approver,
        student_id: &StudentId,
        reason: &str,
    ) -> Result<Student, ClearanceServiceError> {
        let reason = require_text("reason", reason)?;
        let _writes = self.lock_writes();
        let mut student = self.get(student_id)?;
        approver.ensure_covers(&student)?;
        self.workflow().deny(
            &mut student,
            approver.gate(),
            &approver.name,
            &reason,
            Utc::now(),
        )?;
        self.repository.update(student.clone())?;
        info!(student = %student.id, approver = %approver.name, %reason, "year head denied clearance");
        Ok(student)
    }

    /// Students in the approver's scope whose gate can be granted now.
    pub fn ready_for(&self, approver: &Approver) -> Result<Vec<Student>, ClearanceServiceError> {
        let gate = approver.gate();
        Ok(self
            .repository
            .list()?
            .into_iter()
            .filter(|student| approver.covers(student) && is_ready_for(student, gate, &self.catalog))
            .collect())
    }

    pub fn dashboard(&self) -> Result<ClearanceDashboard, ClearanceServiceError> {
        let students = self.repository.list()?;
        Ok(ClearanceDashboard::from_students(&students, &self.catalog))
    }

    pub fn progress(
        &self,
        student_id: &StudentId,
        today: NaiveDate,
    ) -> Result<StudentProgressView, ClearanceServiceError> {
        let student = self.get(student_id)?;
        Ok(StudentProgressView::build(&student, &self.catalog, today))
    }

    pub fn progress_all(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<StudentProgressView>, ClearanceServiceError> {
        Ok(self
            .repository
            .list()?
            .iter()
            .map(|student| StudentProgressView::build(student, &self.catalog, today))
            .collect())
    }

    pub fn register_item(
        &self,
        student_id: &StudentId,
        form: NewItemRegistration,
    ) -> Result<ItemRegistration, ClearanceServiceError> {
        let form = NewItemRegistration {
            teacher_name: require_text("teacher_name", &form.teacher_name)?,
            serial_number: require_text("serial_number", &form.serial_number)?,
            description: require_text("description", &form.description)?,
            ..form
        };
        let mut registered = None;
        self.mutate(student_id, |student, _| {
            registered = Some(
                student
                    .register_item(next_registration_id(), form, Utc::now())
                    .clone(),
            );
            Ok(())
        })?;
        registered.ok_or_else(|| RepositoryError::NotFound.into())
    }

    pub fn report_issue(
        &self,
        student_id: &StudentId,
        registration_id: &str,
        issue_type: IssueType,
        description: &str,
    ) -> Result<ItemRegistration, ClearanceServiceError> {
        let description = require_text("description", description)?;
        self.mutate_registration(student_id, |student| {
            student
                .report_issue(registration_id, issue_type, description, Utc::now())
                .cloned()
        })
    }

    pub fn resolve_issue(
        &self,
        student_id: &StudentId,
        registration_id: &str,
        resolved_by: &str,
        notes: Option<String>,
    ) -> Result<ItemRegistration, ClearanceServiceError> {
        let resolved_by = require_text("resolved_by", resolved_by)?;
        self.mutate_registration(student_id, |student| {
            student
                .resolve_issue(registration_id, &resolved_by, notes, Utc::now())
                .cloned()
        })
    }

    pub fn mark_returned(
        &self,
        student_id: &StudentId,
        registration_id: &str,
        condition: ItemCondition,
    ) -> Result<ItemRegistration, ClearanceServiceError> {
        self.mutate_registration(student_id, |student| {
            student
                .mark_returned(registration_id, condition, Utc::now())
                .cloned()
        })
    }

    pub fn assign_requirement(
        &self,
        student_id: &StudentId,
        form: NewRequirement,
    ) -> Result<StudentRequirement, ClearanceServiceError> {
        let form = NewRequirement {
            teacher_name: require_text("teacher_name", &form.teacher_name)?,
            requirement: require_text("requirement", &form.requirement)?,
            ..form
        };
        let mut assigned = None;
        self.mutate(student_id, |student, _| {
            assigned = Some(
                student
                    .assign_requirement(next_requirement_id(), form, Utc::now())
                    .clone(),
            );
            Ok(())
        })?;
        assigned.ok_or_else(|| RepositoryError::NotFound.into())
    }

    pub fn complete_requirement(
        &self,
        student_id: &StudentId,
        requirement_id: &str,
    ) -> Result<StudentRequirement, ClearanceServiceError> {
        let mut completed = None;
        self.mutate(student_id, |student, _| {
            completed = Some(
                student
                    .complete_requirement(requirement_id, Utc::now())?
                    .clone(),
            );
            Ok(())
        })?;
        completed.ok_or_else(|| RepositoryError::NotFound.into())
    }

    fn workflow(&self) -> ApprovalWorkflow<'_> {
        ApprovalWorkflow::new(&self.catalog, self.policy, &self.codes)
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<F>(&self, student_id: &StudentId, change: F) -> Result<Student, ClearanceServiceError>
    where
        F: FnOnce(&mut Student, &ClearanceCatalog) -> Result<(), ClearanceServiceError>,
    {
        let _writes = self.lock_writes();
        let mut student = self.get(student_id)?;
        change(&mut student, &self.catalog)?;
        self.repository.update(student.clone())?;
        Ok(student)
    }

    fn mutate_registration<F>(
        &self,
        student_id: &StudentId,
        change: F,
    ) -> Result<ItemRegistration, ClearanceServiceError>
    where
        F: FnOnce(&mut Student) -> Result<ItemRegistration, LedgerError>,
    {
        let mut changed = None;
        self.mutate(student_id, |student, _| {
            changed = Some(change(student)?);
            Ok(())
        })?;
        changed.ok_or_else(|| RepositoryError::NotFound.into())
    }
}

/// Error raised by the clearance service.
#[derive(Debug, thiserror::Error)]
pub enum ClearanceServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
