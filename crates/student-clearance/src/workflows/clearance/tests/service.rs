use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use super::common::*;
use crate::validation::ValidationError;
use crate::workflows::clearance::approval::{ApprovalError, ApprovalGate, YearHeadDecision};
use crate::workflows::clearance::catalog::ClearanceCatalog;
use crate::workflows::clearance::domain::{
    AssignedItemType, AssignmentStatus, IssueType, ItemCondition, ItemId, ItemStatus,
    NewItemRegistration, NewRequirement, RequirementPriority, RequirementStatus, StudentId,
};
use crate::workflows::clearance::ledger::{ItemStatusUpdate, LedgerError};
use crate::workflows::clearance::progress::StatusLabel;
use crate::workflows::clearance::repository::{RepositoryError, StudentRepository};
use crate::workflows::clearance::service::{ClearanceService, ClearanceServiceError};
use crate::workflows::clearance::roles::{
    AccountRole, ApproverDirectory, DirectoryError, LedgerClerk,
};
use crate::workflows::clearance::{FinalClearancePolicy, FINANCE_ITEM_ID};

#[test]
fn register_student_seeds_ledger_and_rejects_duplicates() {
    let (service, repository, _) = build_service(Vec::new());
    let directory = MemoryDirectory::standard(&[]);

    let mut form = new_student("ALA2024-201", 150.0);
    form.email = "  AAyanlade24@ALAStudents.org ".to_string();
    let student = service
        .register_student(&registrar(), form, &directory)
        .expect("registered");

    assert_eq!(student.email, "aayanlade24@alastudents.org");
    assert_eq!(student.clearance_items.len(), 7);
    assert!(repository
        .fetch(&student.id)
        .expect("fetch succeeds")
        .is_some());
    assert_eq!(directory.enrolled(), vec![student.id.clone()]);

    match service.register_student(&registrar(), new_student("ALA2024-201", 0.0), &directory) {
        Err(ClearanceServiceError::Repository(RepositoryError::Conflict)) => {}
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn register_student_validates_form() {
    let (service, _, _) = build_service(Vec::new());
    let directory = MemoryDirectory::standard(&[]);

    let mut form = new_student("ALA2024-202", 0.0);
    form.email = "not-an-email".to_string();
    assert!(matches!(
        service.register_student(&registrar(), form, &directory),
        Err(ClearanceServiceError::Validation(ValidationError::InvalidEmail))
    ));

    let form = new_student("ALA2024-203", -5.0);
    assert!(matches!(
        service.register_student(&registrar(), form, &directory),
        Err(ClearanceServiceError::Validation(
            ValidationError::InvalidAmount { .. }
        ))
    ));
    assert!(directory.enrolled().is_empty());
}

#[test]
fn registration_is_an_admin_desk_action() {
    let (service, repository, _) = build_service(Vec::new());
    let directory = MemoryDirectory::standard(&[]);

    let result =
        service.register_student(&station_clerk(), new_student("ALA2024-204", 0.0), &directory);
    assert!(matches!(
        result,
        Err(ClearanceServiceError::Approval(ApprovalError::ActionNotPermitted {
            role: "station_staff",
            ..
        }))
    ));
    assert!(repository.list().expect("list").is_empty());
}

#[test]
fn registration_refuses_an_email_already_on_an_account() {
    let (service, repository, _) = build_service(Vec::new());
    let directory = MemoryDirectory::standard(&[]).taking("aayanlade24@alastudents.org");

    let result =
        service.register_student(&registrar(), new_student("ALA2024-205", 0.0), &directory);
    assert!(matches!(
        result,
        Err(ClearanceServiceError::Directory(DirectoryError::EmailTaken(_)))
    ));
    assert!(repository.list().expect("list").is_empty());
}

#[test]
fn registered_student_is_reachable_by_their_advisor() {
    let (service, _, _) = build_service(Vec::new());
    let directory = MemoryDirectory::standard(&["1", "2", "3"]);
    let student = service
        .register_student(&registrar(), new_student("ALA2024-206", 0.0), &directory)
        .expect("registered");

    let advisor = directory.approver("8").expect("advisor");
    assert!(advisor.covers(&student));
}

#[test]
fn submissions_complete_checkout_and_grant_station_gate() {
    let (service, repository, _) = build_service(vec![student("1", 0.0)]);
    let id = StudentId("1".to_string());
    let mut notes = BTreeMap::new();
    notes.insert(ItemId::new("1"), "good condition".to_string());

    let partial = service
        .record_submissions(&station_staff(), &id, &submission_ids()[..4], &notes)
        .expect("first batch");
    assert!(!partial.station_approved);
    assert!(partial.checkout.is_none());

    let receipt = service
        .record_submissions(&station_staff(), &id, &submission_ids()[4..], &BTreeMap::new())
        .expect("second batch");
    assert!(receipt.station_approved);
    let payload = receipt.checkout.expect("checkout payload");
    assert_eq!(payload.completed_items.len(), 6);
    assert!(payload.summary.all_required_items_completed);
    assert_eq!(payload.summary.completion_percentage, 100);
    assert_eq!(payload.metadata.source, "station_staff_interface");
    assert_eq!(
        payload.completed_items[0].notes.as_deref(),
        Some("good condition")
    );

    let stored = repository
        .fetch(&id)
        .expect("fetch succeeds")
        .expect("present");
    assert!(stored.approvals.is_granted(ApprovalGate::StationStaff));

    let again = service
        .record_submissions(&station_staff(), &id, &submission_ids()[..1], &BTreeMap::new())
        .expect("re-recording is allowed");
    assert!(!again.station_approved);
    assert!(again.checkout.is_none());
}

#[test]
fn unknown_items_are_rejected_before_any_change() {
    let (service, repository, _) = build_service(vec![student("1", 0.0)]);
    let id = StudentId("1".to_string());

    let items = vec![ItemId::new("1"), ItemId::new("42")];
    match service.record_submissions(&station_staff(), &id, &items, &BTreeMap::new()) {
        Err(ClearanceServiceError::Ledger(LedgerError::ItemNotFound(item))) => {
            assert_eq!(item, ItemId::new("42"));
        }
        other => panic!("expected unknown item, got {other:?}"),
    }

    let stored = repository
        .fetch(&id)
        .expect("fetch succeeds")
        .expect("present");
    let calculator = stored.item_status(&ItemId::new("1")).expect("entry");
    assert_eq!(calculator.status, ItemStatus::Pending);
}

#[test]
fn only_station_staff_record_submissions() {
    let (service, _, _) = build_service(vec![student("1", 0.0)]);
    let err = service
        .record_submissions(
            &teacher(),
            &StudentId("1".to_string()),
            &submission_ids(),
            &BTreeMap::new(),
        )
        .expect_err("teacher is not station staff");
    assert!(matches!(
        err,
        ClearanceServiceError::Approval(ApprovalError::RoleCannotApprove { .. })
    ));
}

#[tokio::test]
async fn webhook_failure_is_reported_as_warning() {
    let repository = Arc::new(MemoryStudents::with(vec![student("1", 0.0)]));
    let service = ClearanceService::new(
        Arc::new(ClearanceCatalog::standard()),
        repository.clone(),
        Arc::new(RejectingNotifier),
        FinalClearancePolicy::default(),
    );
    let id = StudentId("1".to_string());

    let receipt = service
        .record_submissions(&station_staff(), &id, &submission_ids(), &BTreeMap::new())
        .expect("items recorded");
    let payload = receipt.checkout.expect("checkout payload");
    let warning = service.notify_checkout(&payload).await;

    assert!(warning.expect("warning").contains("503"));
    let stored = repository
        .fetch(&id)
        .expect("fetch succeeds")
        .expect("present");
    assert!(stored.approvals.is_granted(ApprovalGate::StationStaff));
}

#[tokio::test]
async fn delivered_webhook_reaches_notifier() {
    let (service, _, notifier) = build_service(vec![student("1", 0.0)]);
    let receipt = service
        .record_submissions(
            &station_staff(),
            &StudentId("1".to_string()),
            &submission_ids(),
            &BTreeMap::new(),
        )
        .expect("items recorded");
    let payload = receipt.checkout.expect("checkout payload");

    assert!(service.notify_checkout(&payload).await.is_none());
    let sent = notifier.payloads();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].student.student_id, "ALA2024-1");
}

#[test]
fn approve_enforces_scope() {
    let mut outsider = station_approved("2");
    outsider.teacher = Some("Another Teacher".to_string());
    let (service, repository, _) = build_service(vec![outsider]);
    let id = StudentId("2".to_string());

    match service.approve(&teacher(), &id) {
        Err(ClearanceServiceError::Approval(ApprovalError::OutOfScope { .. })) => {}
        other => panic!("expected scope violation, got {other:?}"),
    }
    let stored = repository
        .fetch(&id)
        .expect("fetch succeeds")
        .expect("present");
    assert!(stored.approvals.teacher.is_none());
}

#[test]
fn full_approval_chain_issues_certificate() {
    let (service, _, _) = build_service(vec![station_approved("3")]);
    let id = StudentId("3".to_string());

    for approver in [teacher(), hall_head(), advisor(&["3"])] {
        let receipt = service.approve(&approver, &id).expect("gate approval");
        assert!(!receipt.outcome.final_clearance_issued);
    }
    let receipt = service.approve(&year_head(), &id).expect("year head");
    assert!(receipt.outcome.final_clearance_issued);
    let code = receipt
        .student
        .confirmation_code()
        .expect("code issued")
        .to_string();
    assert!(code.starts_with("CLR"));

    let err = service.approve(&year_head(), &id).expect_err("already approved");
    assert!(matches!(
        err,
        ClearanceServiceError::Approval(ApprovalError::AlreadyApproved(ApprovalGate::YearHead))
    ));
    let stored = service.get(&id).expect("student");
    assert_eq!(stored.confirmation_code(), Some(code.as_str()));
}

#[test]
fn bulk_approval_handles_students_independently() {
    let mut outsider = station_approved("5");
    outsider.teacher = Some("Another Teacher".to_string());
    let (service, _, _) = build_service(vec![station_approved("4"), outsider, student("6", 0.0)]);

    let results = service.bulk_approve(
        &teacher(),
        &[
            StudentId("4".to_string()),
            StudentId("5".to_string()),
            StudentId("6".to_string()),
            StudentId("missing".to_string()),
        ],
    );

    let approved: Vec<bool> = results.iter().map(|result| result.approved).collect();
    assert_eq!(approved, vec![true, false, false, false]);
    assert!(results[1]
        .error
        .as_deref()
        .expect("scope error")
        .contains("scope"));
    assert!(service
        .get(&StudentId("4".to_string()))
        .expect("student")
        .approvals
        .is_granted(ApprovalGate::Teacher));
}

#[test]
fn ready_for_lists_scoped_and_ready_students() {
    let mut other_hall = station_approved("8");
    other_hall.hall = Some("North Wing".to_string());
    let (service, _, _) = build_service(vec![
        station_approved("7"),
        other_hall,
        student("9", 150.0),
    ]);

    let ids = |students: Vec<crate::workflows::clearance::Student>| -> Vec<String> {
        students.into_iter().map(|student| student.id.0).collect()
    };

    assert_eq!(
        ids(service.ready_for(&teacher()).expect("teacher queue")),
        vec!["7".to_string(), "8".to_string()]
    );
    assert_eq!(
        ids(service.ready_for(&hall_head()).expect("hall queue")),
        vec!["7".to_string()]
    );
    assert!(service
        .ready_for(&year_head())
        .expect("year head queue")
        .is_empty());
}

#[test]
fn denied_student_returns_to_year_head_queue() {
    let (service, _, _) = build_service(vec![station_approved("10")]);
    let id = StudentId("10".to_string());
    for approver in [teacher(), hall_head(), advisor(&["10"])] {
        service.approve(&approver, &id).expect("gate approval");
    }

    assert!(matches!(
        service.deny_final(&year_head(), &id, "  "),
        Err(ClearanceServiceError::Validation(_))
    ));
    let denied = service
        .deny_final(&year_head(), &id, "uniform returned torn")
        .expect("denial");
    assert_eq!(denied.approvals.year_head.label(), "denied");
    assert!(denied.final_clearance.is_none());

    let queue = service.ready_for(&year_head()).expect("queue");
    assert_eq!(queue.len(), 1);

    let cleared = service.approve(&year_head(), &id).expect("second review");
    assert!(matches!(
        cleared.student.approvals.year_head,
        YearHeadDecision::Approved { .. }
    ));
    assert!(cleared.outcome.final_clearance_issued);
}

#[test]
fn settle_finance_and_dashboard_counts() {
    let (service, _, _) = build_service(vec![
        student("11", 150.0),
        student("12", 75.5),
        station_approved("13"),
    ]);

    let before = service.dashboard().expect("dashboard");
    assert_eq!(before.total, 3);
    assert_eq!(before.pending, 3);
    assert_eq!(before.finance_outstanding, 2);
    assert!((before.outstanding_balance_total - 225.5).abs() < f64::EPSILON);
    assert_eq!(before.awaiting_approval, 1);

    let settled = service
        .settle_finance(&registrar(), &StudentId("11".to_string()))
        .expect("settled");
    assert_eq!(settled.outstanding_balance, 0.0);
    let finance = settled
        .item_status(&ItemId::new(FINANCE_ITEM_ID))
        .expect("finance entry");
    assert_eq!(finance.status, ItemStatus::Completed);
    assert_eq!(finance.completed_by.as_deref(), Some(REGISTRAR));

    let after = service.dashboard().expect("dashboard");
    assert_eq!(after.finance_outstanding, 1);
}

#[test]
fn assigned_item_issue_lifecycle() {
    let (service, _, _) = build_service(vec![student("14", 0.0)]);
    let id = StudentId("14".to_string());

    let registration = service
        .register_item(
            &id,
            NewItemRegistration {
                teacher_name: TEACHER.to_string(),
                subject: Some("Mathematics".to_string()),
                serial_number: "CALC-0042".to_string(),
                item_type: AssignedItemType::Calculator,
                description: "Casio fx-991".to_string(),
            },
        )
        .expect("registered");
    assert_eq!(registration.status, AssignmentStatus::Assigned);

    let reported = service
        .report_issue(&id, &registration.id, IssueType::Damaged, "cracked screen")
        .expect("reported");
    assert_eq!(reported.status, AssignmentStatus::Damaged);
    assert!(matches!(
        service.report_issue(&id, &registration.id, IssueType::Missing, "lost"),
        Err(ClearanceServiceError::Ledger(
            LedgerError::IssueAlreadyReported { .. }
        ))
    ));
    assert_eq!(service.dashboard().expect("dashboard").unresolved_issues, 1);

    let resolved = service
        .resolve_issue(&id, &registration.id, "Admin User", Some("replaced".to_string()))
        .expect("resolved");
    let issue = resolved.reported_issue.expect("issue kept");
    assert!(issue.resolved);
    assert_eq!(issue.resolved_by.as_deref(), Some("Admin User"));
    assert_eq!(resolved.status, AssignmentStatus::Damaged);

    let returned = service
        .mark_returned(&id, &registration.id, ItemCondition::Fair)
        .expect("returned");
    assert_eq!(returned.status, AssignmentStatus::Returned);
    assert!(matches!(
        service.report_issue(&id, &registration.id, IssueType::Missing, "lost again"),
        Err(ClearanceServiceError::Ledger(LedgerError::NotAssigned { .. }))
    ));
}

#[test]
fn requirements_turn_overdue_on_read_only() {
    let (service, _, _) = build_service(vec![student("15", 0.0)]);
    let id = StudentId("15".to_string());
    let due = NaiveDate::from_ymd_opt(2024, 1, 25).expect("valid");

    let requirement = service
        .assign_requirement(
            &id,
            NewRequirement {
                teacher_name: TEACHER.to_string(),
                requirement: "Complete final mathematics project submission".to_string(),
                due_date: Some(due),
                priority: RequirementPriority::High,
                notes: None,
            },
        )
        .expect("assigned");

    let later = NaiveDate::from_ymd_opt(2024, 2, 1).expect("valid");
    assert_eq!(requirement.effective_status(later), RequirementStatus::Overdue);
    assert_eq!(requirement.effective_status(due), RequirementStatus::Pending);
    let view = service.progress(&id, later).expect("progress");
    assert_eq!(view.overdue_requirements, 1);
    let stored = service.get(&id).expect("student");
    assert_eq!(stored.requirements[0].status, RequirementStatus::Pending);

    let done = service
        .complete_requirement(&id, &requirement.id)
        .expect("completed");
    assert_eq!(done.effective_status(later), RequirementStatus::Completed);
    assert!(done.completed_at.is_some());
}

#[test]
fn repository_failures_surface() {
    let service = ClearanceService::new(
        Arc::new(ClearanceCatalog::standard()),
        Arc::new(UnavailableStudents),
        Arc::new(RecordingNotifier::default()),
        FinalClearancePolicy::default(),
    );
    assert!(matches!(
        service.dashboard(),
        Err(ClearanceServiceError::Repository(RepositoryError::Unavailable(_)))
    ));
}

#[test]
fn station_clerk_cannot_settle_finance() {
    let (service, repository, _) = build_service(vec![student("15", 150.0)]);
    let id = StudentId("15".to_string());

    let result = service.settle_finance(&station_clerk(), &id);
    assert!(matches!(
        result,
        Err(ClearanceServiceError::Approval(ApprovalError::ActionNotPermitted { .. }))
    ));
    let stored = repository.fetch(&id).expect("fetch").expect("present");
    assert_eq!(stored.outstanding_balance, 150.0);
}

#[test]
fn finance_entry_only_moves_with_the_balance() {
    let (service, repository, _) = build_service(vec![student("16", 150.0)]);
    let id = StudentId("16".to_string());

    let result = service.set_item_status(
        &registrar(),
        &id,
        &ItemId::new(FINANCE_ITEM_ID),
        ItemStatusUpdate::completed("Anyone"),
    );
    assert!(matches!(
        result,
        Err(ClearanceServiceError::Ledger(LedgerError::FinanceSettlementRequired(_)))
    ));
    let stored = repository.fetch(&id).expect("fetch").expect("present");
    assert_eq!(stored.outstanding_balance, 150.0);
    assert_ne!(
        stored.item_status(&ItemId::new(FINANCE_ITEM_ID)).expect("entry").status,
        ItemStatus::Completed
    );

    let settled = service.settle_finance(&registrar(), &id).expect("settled");
    assert_eq!(settled.outstanding_balance, 0.0);
    assert_eq!(
        settled.item_status(&ItemId::new(FINANCE_ITEM_ID)).expect("entry").status,
        ItemStatus::Completed
    );
}

#[test]
fn completion_is_credited_to_the_clerk_not_the_request() {
    let (service, _, _) = build_service(vec![student("17", 0.0)]);
    let id = StudentId("17".to_string());

    let updated = service
        .set_item_status(
            &station_clerk(),
            &id,
            &ItemId::new("2"),
            ItemStatusUpdate::completed("Somebody Else").with_notes("returned late"),
        )
        .expect("station clerk edits items");
    let entry = updated.item_status(&ItemId::new("2")).expect("entry");
    assert_eq!(entry.status, ItemStatus::Completed);
    assert_eq!(entry.completed_by.as_deref(), Some(STATION));

    let reopened = service
        .set_item_status(
            &station_clerk(),
            &id,
            &ItemId::new("2"),
            ItemStatusUpdate {
                status: ItemStatus::ActionRequired,
                completed_by: Some("Somebody Else".to_string()),
                notes: Some("screen cracked".to_string()),
                outstanding_amount: None,
            },
        )
        .expect("station clerk edits items");
    let entry = reopened.item_status(&ItemId::new("2")).expect("entry");
    assert_eq!(entry.status, ItemStatus::ActionRequired);
    assert_eq!(entry.completed_by, None);

    assert!(matches!(
        LedgerClerk::from_role("9", YEAR_HEAD, &AccountRole::YearHead),
        Err(ApprovalError::ActionNotPermitted {
            role: "year_head",
            ..
        })
    ));
}

#[test]
fn reverted_item_blocks_the_year_head_and_reopens_progress() {
    let (service, _, _) = build_service(vec![station_approved("18")]);
    let id = StudentId("18".to_string());
    for approver in [teacher(), hall_head(), advisor(&["18"])] {
        service.approve(&approver, &id).expect("gate approval");
    }
    let queue = service.ready_for(&year_head()).expect("queue");
    assert!(queue.iter().any(|ready| ready.id == id));

    service
        .set_item_status(
            &station_clerk(),
            &id,
            &ItemId::new("2"),
            ItemStatusUpdate {
                status: ItemStatus::Pending,
                completed_by: None,
                notes: Some("textbook missing pages".to_string()),
                outstanding_amount: None,
            },
        )
        .expect("item reverted");

    match service.approve(&year_head(), &id) {
        Err(ClearanceServiceError::Approval(ApprovalError::ItemsIncomplete {
            completed: 6,
            required: 7,
        })) => {}
        other => panic!("expected incomplete items, got {other:?}"),
    }
    let view = service
        .progress(&id, Utc::now().date_naive())
        .expect("progress view");
    assert_eq!(view.status, StatusLabel::InProgress);
    assert_eq!(view.status.label(), "in_progress");
    assert!(service.get(&id).expect("student").final_clearance.is_none());
}
