use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::clearance::approval::{
    ApprovalGate, ApprovalWorkflow, ConfirmationCodeIssuer, FinalClearancePolicy,
};
use crate::workflows::clearance::catalog::ClearanceCatalog;
use crate::workflows::clearance::domain::{ItemId, NewStudent, Student, StudentId};
use crate::workflows::clearance::ledger::ItemStatusUpdate;
use crate::workflows::clearance::repository::{RepositoryError, StudentRepository};
use crate::workflows::clearance::roles::{
    AccountRole, Approver, ApproverDirectory, ApproverScope, DirectoryError, LedgerClerk,
};
use crate::workflows::clearance::service::ClearanceService;
use crate::workflows::clearance::webhook::{CheckoutCompleted, CheckoutNotifier, NotifyError};

pub(super) const TEACHER: &str = "Ismail Adeleke";
pub(super) const HALL_HEAD: &str = "Dr. Brown";
pub(super) const ADVISOR: &str = "Ms. Catherine Delight";
pub(super) const YEAR_HEAD: &str = "Ms. Sebabatso";
pub(super) const STATION: &str = "Reception Staff";
pub(super) const REGISTRAR: &str = "Admin User";

pub(super) fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 16, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn new_student(number: &str, balance: f64) -> NewStudent {
    NewStudent {
        name: "Ayanfe Ayanlade".to_string(),
        student_number: number.to_string(),
        grade: "Year 2".to_string(),
        section: String::new(),
        email: "aayanlade24@alastudents.org".to_string(),
        hall: Some("West Wing".to_string()),
        room: Some("204".to_string()),
        advisor: Some(ADVISOR.to_string()),
        teacher: Some(TEACHER.to_string()),
        year_head: Some(YEAR_HEAD.to_string()),
        outstanding_balance: balance,
    }
}

pub(super) fn student(id: &str, balance: f64) -> Student {
    Student::register(
        StudentId(id.to_string()),
        new_student(&format!("ALA2024-{id}"), balance),
        &ClearanceCatalog::standard(),
    )
}

/// Every catalog item completed, finance settled, no approvals yet.
pub(super) fn all_items_done(id: &str) -> Student {
    let catalog = ClearanceCatalog::standard();
    let mut student = student(id, 0.0);
    for item in catalog.items() {
        student
            .set_item_status(&item.id, ItemStatusUpdate::completed(STATION), at(9))
            .expect("catalog item");
    }
    student
}

pub(super) fn station_approved(id: &str) -> Student {
    let catalog = ClearanceCatalog::standard();
    let codes = ConfirmationCodeIssuer::default();
    let workflow = ApprovalWorkflow::new(&catalog, FinalClearancePolicy::default(), &codes);
    let mut student = all_items_done(id);
    workflow
        .approve(&mut student, ApprovalGate::StationStaff, STATION, at(10))
        .expect("station approval");
    student
}

pub(super) fn approver(account_id: &str, name: &str, role: AccountRole) -> Approver {
    Approver::from_role(account_id, name, &role).expect("approving role")
}

pub(super) fn station_staff() -> Approver {
    approver("6", STATION, AccountRole::StationStaff)
}

pub(super) fn teacher() -> Approver {
    approver(
        "5",
        TEACHER,
        AccountRole::Teacher {
            classes: vec!["class1".to_string()],
        },
    )
}

pub(super) fn hall_head() -> Approver {
    approver(
        "7",
        HALL_HEAD,
        AccountRole::HallHead {
            halls: vec!["East Wing".to_string(), "West Wing".to_string()],
        },
    )
}

pub(super) fn advisor(advisees: &[&str]) -> Approver {
    approver(
        "8",
        ADVISOR,
        AccountRole::Advisor {
            advisees: advisees
                .iter()
                .map(|id| StudentId(id.to_string()))
                .collect(),
        },
    )
}

pub(super) fn year_head() -> Approver {
    approver("9", YEAR_HEAD, AccountRole::YearHead)
}

pub(super) fn clerk(account_id: &str, name: &str, role: AccountRole) -> LedgerClerk {
    LedgerClerk::from_role(account_id, name, &role).expect("clerk role")
}

pub(super) fn registrar() -> LedgerClerk {
    clerk("4", REGISTRAR, AccountRole::Admin)
}

pub(super) fn station_clerk() -> LedgerClerk {
    clerk("6", STATION, AccountRole::StationStaff)
}

pub(super) fn submission_ids() -> Vec<ItemId> {
    ["1", "2", "3", "4", "5", "6"]
        .into_iter()
        .map(ItemId::new)
        .collect()
}

#[derive(Default, Clone)]
pub(super) struct MemoryStudents {
    pub(super) records: Arc<Mutex<HashMap<StudentId, Student>>>,
}

impl MemoryStudents {
    pub(super) fn with(students: Vec<Student>) -> Self {
        let repository = Self::default();
        for student in students {
            repository.insert(student).expect("unique student");
        }
        repository
    }
}

impl StudentRepository for MemoryStudents {
    fn insert(&self, student: Student) -> Result<Student, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&student.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(student.id.clone(), student.clone());
        Ok(student)
    }

    fn update(&self, student: Student) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.insert(student.id.clone(), student);
        Ok(())
    }

    fn fetch(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_number(&self, student_number: &str) -> Result<Option<Student>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|student| student.student_number == student_number)
            .cloned())
    }

    fn list(&self) -> Result<Vec<Student>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut students: Vec<Student> = guard.values().cloned().collect();
        students.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(students)
    }
}

pub(super) struct UnavailableStudents;

impl StudentRepository for UnavailableStudents {
    fn insert(&self, _student: Student) -> Result<Student, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _student: Student) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &StudentId) -> Result<Option<Student>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_number(&self, _student_number: &str) -> Result<Option<Student>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<Student>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingNotifier {
    payloads: Arc<Mutex<Vec<CheckoutCompleted>>>,
}

impl RecordingNotifier {
    pub(super) fn payloads(&self) -> Vec<CheckoutCompleted> {
        self.payloads.lock().expect("notifier mutex poisoned").clone()
    }
}

impl CheckoutNotifier for RecordingNotifier {
    async fn notify(&self, payload: &CheckoutCompleted) -> Result<(), NotifyError> {
        self.payloads
            .lock()
            .expect("notifier mutex poisoned")
            .push(payload.clone());
        Ok(())
    }
}

pub(super) struct RejectingNotifier;

impl CheckoutNotifier for RejectingNotifier {
    async fn notify(&self, _payload: &CheckoutCompleted) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected(503))
    }
}

/// Accounts known to the clearance tests. Enrolling a student adds them to the
/// advisor's advisees the way the account store does.
#[derive(Default)]
pub(super) struct MemoryDirectory {
    approvers: Mutex<HashMap<String, Approver>>,
    clerks: HashMap<String, LedgerClerk>,
    emails: Mutex<Vec<String>>,
    enrolled: Mutex<Vec<StudentId>>,
}

impl MemoryDirectory {
    pub(super) fn standard(advisees: &[&str]) -> Self {
        let approvers = [
            station_staff(),
            teacher(),
            hall_head(),
            advisor(advisees),
            year_head(),
        ]
        .into_iter()
        .map(|approver| (approver.account_id.clone(), approver))
        .collect();
        let clerks = [registrar(), station_clerk()]
            .into_iter()
            .map(|clerk| (clerk.account_id.clone(), clerk))
            .collect();
        Self {
            approvers: Mutex::new(approvers),
            clerks,
            emails: Mutex::new(Vec::new()),
            enrolled: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn taking(self, email: &str) -> Self {
        self.emails
            .lock()
            .expect("directory mutex poisoned")
            .push(email.to_string());
        self
    }

    pub(super) fn enrolled(&self) -> Vec<StudentId> {
        self.enrolled.lock().expect("directory mutex poisoned").clone()
    }
}

impl ApproverDirectory for MemoryDirectory {
    fn approver(&self, account_id: &str) -> Result<Approver, DirectoryError> {
        self.approvers
            .lock()
            .expect("directory mutex poisoned")
            .get(account_id)
            .cloned()
            .ok_or_else(|| DirectoryError::UnknownAccount(account_id.to_string()))
    }

    fn clerk(&self, account_id: &str) -> Result<LedgerClerk, DirectoryError> {
        if let Some(clerk) = self.clerks.get(account_id) {
            return Ok(clerk.clone());
        }
        if self.approver(account_id).is_ok() {
            return Err(DirectoryError::Approval(
                crate::workflows::clearance::approval::ApprovalError::ActionNotPermitted {
                    role: "approver",
                    action: "edit clearance records",
                },
            ));
        }
        Err(DirectoryError::UnknownAccount(account_id.to_string()))
    }

    fn ensure_email_free(&self, email: &str) -> Result<(), DirectoryError> {
        let emails = self.emails.lock().expect("directory mutex poisoned");
        if emails.iter().any(|taken| taken == email) {
            return Err(DirectoryError::EmailTaken(email.to_string()));
        }
        Ok(())
    }

    fn enroll_student(&self, student: &Student) -> Result<(), DirectoryError> {
        self.ensure_email_free(&student.email)?;
        self.emails
            .lock()
            .expect("directory mutex poisoned")
            .push(student.email.clone());
        self.enrolled
            .lock()
            .expect("directory mutex poisoned")
            .push(student.id.clone());

        let mut approvers = self.approvers.lock().expect("directory mutex poisoned");
        for approver in approvers.values_mut() {
            if let ApproverScope::Advisor { advisees } = &mut approver.scope {
                if student.advisor.as_deref() == Some(approver.name.as_str()) {
                    advisees.push(student.id.clone());
                }
            }
        }
        Ok(())
    }
}

pub(super) type TestService = ClearanceService<MemoryStudents, RecordingNotifier>;

pub(super) fn build_service(
    students: Vec<Student>,
) -> (TestService, Arc<MemoryStudents>, Arc<RecordingNotifier>) {
    build_service_with_policy(students, FinalClearancePolicy::default())
}

pub(super) fn build_service_with_policy(
    students: Vec<Student>,
    policy: FinalClearancePolicy,
) -> (TestService, Arc<MemoryStudents>, Arc<RecordingNotifier>) {
    let repository = Arc::new(MemoryStudents::with(students));
    let notifier = Arc::new(RecordingNotifier::default());
    let service = ClearanceService::new(
        Arc::new(ClearanceCatalog::standard()),
        repository.clone(),
        notifier.clone(),
        policy,
    );
    (service, repository, notifier)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
