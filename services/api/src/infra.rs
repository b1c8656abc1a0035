use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use student_clearance::config::{AppConfig, LoginGuardConfig};
use student_clearance::workflows::access::{
    AccountId, AccountRepository, AdminUnlockRequest, AuthService,
    UnlockRequestId, UnlockRequestRepository, UserAccount,
};
use student_clearance::workflows::clearance::{
    AccountRole, ApprovalGate, ApprovalWorkflow, ClearanceCatalog, ClearanceService,
    ClearanceServiceError, ConfirmationCodeIssuer, FinalClearancePolicy, ItemId,
    ItemStatusUpdate, LedgerError, NewRequirement,
    NewStudent, RepositoryError, RequirementPriority, Student, StudentId, StudentRepository,
    WebhookNotifier,
};
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ApiClearanceService = ClearanceService<InMemoryStudentRepository, WebhookNotifier>;
pub(crate) type ApiAuthService =
    AuthService<InMemoryAccountRepository, InMemoryUnlockRequestRepository>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryStudentRepository {
    records: Arc<Mutex<HashMap<StudentId, Student>>>,
}

impl InMemoryStudentRepository {
    pub(crate) fn seeded(students: Vec<Student>) -> Self {
        let records = students
            .into_iter()
            .map(|student| (student.id.clone(), student))
            .collect();
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }
}

impl StudentRepository for InMemoryStudentRepository {
    fn insert(&self, student: Student) -> Result<Student, RepositoryError> {
        let mut guard = lock(&self.records);
        if guard.contains_key(&student.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(student.id.clone(), student.clone());
        Ok(student)
    }

    fn update(&self, student: Student) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records);
        if guard.contains_key(&student.id) {
            guard.insert(student.id.clone(), student);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError> {
        Ok(lock(&self.records).get(id).cloned())
    }

    fn find_by_number(&self, student_number: &str) -> Result<Option<Student>, RepositoryError> {
        Ok(lock(&self.records)
            .values()
            .find(|student| student.student_number == student_number)
            .cloned())
    }

    fn list(&self) -> Result<Vec<Student>, RepositoryError> {
        let mut students: Vec<_> = lock(&self.records).values().cloned().collect();
        students.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(students)
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryAccountRepository {
    records: Arc<Mutex<HashMap<AccountId, UserAccount>>>,
}

impl InMemoryAccountRepository {
    pub(crate) fn seeded(accounts: Vec<UserAccount>) -> Self {
        let records = accounts
            .into_iter()
            .map(|account| (account.id.clone(), account))
            .collect();
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }
}

impl AccountRepository for InMemoryAccountRepository {
    fn insert(&self, account: UserAccount) -> Result<UserAccount, RepositoryError> {
        let mut guard = lock(&self.records);
        if guard.contains_key(&account.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    fn update(&self, account: UserAccount) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records);
        if guard.contains_key(&account.id) {
            guard.insert(account.id.clone(), account);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &AccountId) -> Result<Option<UserAccount>, RepositoryError> {
        Ok(lock(&self.records).get(id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, RepositoryError> {
        Ok(lock(&self.records)
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    fn list(&self) -> Result<Vec<UserAccount>, RepositoryError> {
        let mut accounts: Vec<_> = lock(&self.records).values().cloned().collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryUnlockRequestRepository {
    records: Arc<Mutex<HashMap<UnlockRequestId, AdminUnlockRequest>>>,
}

impl UnlockRequestRepository for InMemoryUnlockRequestRepository {
    fn insert(&self, request: AdminUnlockRequest) -> Result<AdminUnlockRequest, RepositoryError> {
        let mut guard = lock(&self.records);
        if guard.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn update(&self, request: AdminUnlockRequest) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records);
        if guard.contains_key(&request.id) {
            guard.insert(request.id.clone(), request);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(
        &self,
        id: &UnlockRequestId,
    ) -> Result<Option<AdminUnlockRequest>, RepositoryError> {
        Ok(lock(&self.records).get(id).cloned())
    }

    fn list(&self) -> Result<Vec<AdminUnlockRequest>, RepositoryError> {
        let mut requests: Vec<_> = lock(&self.records).values().cloned().collect();
        requests.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(requests)
    }
}

/// Everything the HTTP layer and CLI commands share.
pub(crate) struct Services {
    pub(crate) clearance: Arc<ApiClearanceService>,
    /// Also the approver and clerk directory for clearance routes.
    pub(crate) auth: Arc<ApiAuthService>,
}

impl Services {
    pub(crate) fn seeded(config: &AppConfig) -> Result<Self, ClearanceServiceError> {
        let notifier = WebhookNotifier::from_config(&config.webhook).unwrap_or_else(|err| {
            warn!(%err, "webhook client unavailable; checkout notifications disabled");
            WebhookNotifier::disabled()
        });
        let policy = FinalClearancePolicy {
            require_year_head: config.clearance.require_year_head,
        };
        Self::build(notifier, policy, config.login.clone())
    }

    pub(crate) fn build(
        notifier: WebhookNotifier,
        policy: FinalClearancePolicy,
        login: LoginGuardConfig,
    ) -> Result<Self, ClearanceServiceError> {
        let catalog = Arc::new(ClearanceCatalog::standard());
        let (students, next_code) = seed_students(&catalog)?;
        let students = Arc::new(InMemoryStudentRepository::seeded(students));
        let clearance = ClearanceService::new(catalog, students, Arc::new(notifier), policy)
            .with_codes(ConfirmationCodeIssuer::starting_at(next_code));

        let accounts = Arc::new(InMemoryAccountRepository::seeded(seed_accounts()));
        let requests = Arc::new(InMemoryUnlockRequestRepository::default());
        let auth = AuthService::new(accounts, requests, login);

        Ok(Self {
            clearance: Arc::new(clearance),
            auth: Arc::new(auth),
        })
    }
}

fn seed_time(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0)
        .single()
        .unwrap_or_default()
}

fn seed_form(
    name: &str,
    number: &str,
    grade: &str,
    email: &str,
    hall: &str,
    room: &str,
    balance: f64,
) -> NewStudent {
    NewStudent {
        name: name.to_string(),
        student_number: number.to_string(),
        grade: grade.to_string(),
        section: String::new(),
        email: email.to_string(),
        hall: Some(hall.to_string()),
        room: Some(room.to_string()),
        advisor: Some("Ms. Catherine Delight".to_string()),
        teacher: Some("Ismail Adeleke".to_string()),
        year_head: Some("Ms. Sebabatso".to_string()),
        outstanding_balance: balance,
    }
}

/// Return every station-handled item and settle finance at the given times.
fn complete_all(
    student: &mut Student,
    catalog: &ClearanceCatalog,
    returned_at: DateTime<Utc>,
    settled_at: DateTime<Utc>,
) -> Result<(), LedgerError> {
    for item in catalog.submission_items() {
        student.set_item_status(
            &item.id,
            ItemStatusUpdate::completed("Reception Staff"),
            returned_at,
        )?;
    }
    student.settle_finance(catalog, "Finance Office", settled_at)
}

/// Three students at different points of the workflow, plus the next free
/// confirmation code sequence.
pub(crate) fn seed_students(
    catalog: &ClearanceCatalog,
) -> Result<(Vec<Student>, u64), ClearanceServiceError> {
    let codes = ConfirmationCodeIssuer::starting_at(3);
    let workflow = ApprovalWorkflow::new(catalog, FinalClearancePolicy::default(), &codes);

    let mut ayanfe = Student::register(
        StudentId("1".to_string()),
        seed_form(
            "Ayanfe Ayanlade",
            "ALA2024-101",
            "Year 2",
            "aayanlade24@alastudents.org",
            "West Wing",
            "204",
            150.0,
        ),
        catalog,
    );
    ayanfe.set_item_status(
        &ItemId::new("1"),
        ItemStatusUpdate::completed("Reception Staff")
            .with_notes("Calculator returned in good condition"),
        seed_time(15, 10, 30),
    )?;
    ayanfe.assign_requirement(
        "seed-req-1".to_string(),
        NewRequirement {
            teacher_name: "Ismail Adeleke".to_string(),
            requirement: "Complete final mathematics project submission".to_string(),
            due_date: NaiveDate::from_ymd_opt(2024, 1, 25),
            priority: RequirementPriority::High,
            notes: Some("Project must include all calculations and diagrams".to_string()),
        },
        seed_time(15, 9, 0),
    );

    let mut yabets = Student::register(
        StudentId("2".to_string()),
        seed_form(
            "Yabets Abebe",
            "ALA2024-102",
            "Year 1",
            "yabebe24@alastudents.org",
            "West Wing",
            "156",
            0.0,
        ),
        catalog,
    );
    complete_all(&mut yabets, catalog, seed_time(14, 9, 30), seed_time(10, 9, 0))?;
    workflow.approve(
        &mut yabets,
        ApprovalGate::StationStaff,
        "Reception Staff",
        seed_time(14, 10, 0),
    )?;
    yabets.assign_requirement(
        "seed-req-2".to_string(),
        NewRequirement {
            teacher_name: "Ismail Adeleke".to_string(),
            requirement: "Submit missing assignment from Chapter 5".to_string(),
            due_date: NaiveDate::from_ymd_opt(2024, 1, 22),
            priority: RequirementPriority::Medium,
            notes: None,
        },
        seed_time(14, 14, 30),
    );

    let mut hassiet = Student::register(
        StudentId("3".to_string()),
        seed_form(
            "Hassiet Fisseha",
            "ALA2024-103",
            "Year 2",
            "hfisseha24@alastudents.org",
            "East Wing",
            "201",
            0.0,
        ),
        catalog,
    );
    complete_all(&mut hassiet, catalog, seed_time(16, 11, 0), seed_time(15, 8, 0))?;
    let chain = [
        (ApprovalGate::StationStaff, "Reception Staff", seed_time(16, 12, 0)),
        (ApprovalGate::Teacher, "Ismail Adeleke", seed_time(16, 14, 0)),
        (ApprovalGate::HallHead, "Dr. Brown", seed_time(16, 15, 30)),
        (ApprovalGate::Advisor, "Ms. Catherine Delight", seed_time(16, 16, 0)),
        (ApprovalGate::YearHead, "Ms. Sebabatso", seed_time(16, 17, 0)),
    ];
    for (gate, actor, at) in chain {
        workflow.approve(&mut hassiet, gate, actor, at)?;
    }

    Ok((vec![ayanfe, yabets, hassiet], 4))
}

fn seed_account(id: &str, name: &str, email: &str, role: AccountRole) -> UserAccount {
    UserAccount {
        id: AccountId(id.to_string()),
        name: name.to_string(),
        email: email.to_ascii_lowercase(),
        role,
        password: None,
        login_attempts: 0,
        lock: None,
    }
}

pub(crate) fn seed_accounts() -> Vec<UserAccount> {
    let student = |id: &str| AccountRole::Student {
        student_id: StudentId(id.to_string()),
    };
    vec![
        seed_account("1", "Ayanfe Ayanlade", "aayanlade24@alastudents.org", student("1")),
        seed_account("2", "Yabets Abebe", "yabebe24@alastudents.org", student("2")),
        seed_account("3", "Hassiet Fisseha", "hfisseha24@alastudents.org", student("3")),
        seed_account(
            "4",
            "Admin User",
            "admin@africanleadershipacademy.org",
            AccountRole::Admin,
        ),
        seed_account(
            "5",
            "Ismail Adeleke",
            "IAdeleke@africanleadershipacademy.org",
            AccountRole::Teacher {
                classes: vec!["Mathematics Year 2".to_string(), "English Year 1".to_string()],
            },
        ),
        seed_account(
            "6",
            "Reception Staff",
            "reception@africanleadershipacademy.org",
            AccountRole::StationStaff,
        ),
        seed_account(
            "7",
            "Dr. Brown",
            "brown@africanleadershipacademy.org",
            AccountRole::HallHead {
                halls: vec!["East Wing".to_string(), "West Wing".to_string()],
            },
        ),
        seed_account(
            "8",
            "Ms. Catherine Delight",
            "CDelight@africanleadershipacademy.org",
            AccountRole::Advisor {
                advisees: ["1", "2", "3"]
                    .into_iter()
                    .map(|id| StudentId(id.to_string()))
                    .collect(),
            },
        ),
        seed_account(
            "9",
            "Ms. Sebabatso",
            "SThulo@africanleadershipacademy.org",
            AccountRole::YearHead,
        ),
    ]
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|err| format!("invalid date '{}': {}", value, err))
}
