use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::approval::{ApprovalError, ApprovalGate};
use super::domain::{
    ItemCondition, ItemId, IssueType, NewItemRegistration, NewRequirement, NewStudent, StudentId,
};
use super::ledger::{ItemStatusUpdate, LedgerError};
use super::progress::StudentProgressView;
use super::repository::{RepositoryError, StudentRepository};
use super::roles::{Approver, ApproverDirectory, DirectoryError};
use super::service::{ClearanceService, ClearanceServiceError};
use super::webhook::CheckoutNotifier;

/// Shared handler state: the service plus the account directory used to resolve approvers.
pub struct ClearanceState<R, N, D> {
    pub service: Arc<ClearanceService<R, N>>,
    pub directory: Arc<D>,
}

impl<R, N, D> Clone for ClearanceState<R, N, D> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            directory: Arc::clone(&self.directory),
        }
    }
}

/// Router builder exposing student, approval, and dashboard endpoints.
pub fn clearance_router<R, N, D>(
    service: Arc<ClearanceService<R, N>>,
    directory: Arc<D>,
) -> Router
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    Router::new()
        .route("/api/v1/students", post(register_handler::<R, N, D>))
        .route("/api/v1/students/:student_id", get(student_handler::<R, N, D>))
        .route(
            "/api/v1/students/:student_id/submissions",
            post(submissions_handler::<R, N, D>),
        )
        .route(
            "/api/v1/students/:student_id/items/:item_id",
            post(item_status_handler::<R, N, D>),
        )
        .route(
            "/api/v1/students/:student_id/finance/settle",
            post(settle_finance_handler::<R, N, D>),
        )
        .route(
            "/api/v1/students/:student_id/approvals",
            post(approve_handler::<R, N, D>),
        )
        .route(
            "/api/v1/students/:student_id/year-head-review",
            post(year_head_review_handler::<R, N, D>),
        )
        .route(
            "/api/v1/students/:student_id/assigned-items",
            post(register_item_handler::<R, N, D>),
        )
        .route(
            "/api/v1/students/:student_id/assigned-items/:registration_id/issue",
            post(report_issue_handler::<R, N, D>),
        )
        .route(
            "/api/v1/students/:student_id/assigned-items/:registration_id/resolve",
            post(resolve_issue_handler::<R, N, D>),
        )
        .route(
            "/api/v1/students/:student_id/assigned-items/:registration_id/return",
            post(return_item_handler::<R, N, D>),
        )
        .route(
            "/api/v1/students/:student_id/requirements",
            post(assign_requirement_handler::<R, N, D>),
        )
        .route(
            "/api/v1/students/:student_id/requirements/:requirement_id/complete",
            post(complete_requirement_handler::<R, N, D>),
        )
        .route("/api/v1/approvals/bulk", post(bulk_approve_handler::<R, N, D>))
        .route("/api/v1/approvals/ready", get(ready_handler::<R, N, D>))
        .route("/api/v1/dashboard", get(dashboard_handler::<R, N, D>))
        .with_state(ClearanceState { service, directory })
}

#[derive(Debug, Deserialize)]
pub struct SubmissionRequest {
    pub staff_account_id: String,
    pub items: Vec<ItemId>,
    #[serde(default)]
    pub notes: BTreeMap<ItemId, String>,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub approver: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkApprovalRequest {
    pub approver: String,
    pub student_ids: Vec<StudentId>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum YearHeadReviewRequest {
    Approve { approver: String },
    Deny { approver: String, reason: String },
}

#[derive(Debug, Deserialize)]
pub struct RegisterStudentRequest {
    pub registrar: String,
    pub student: NewStudent,
}

#[derive(Debug, Deserialize)]
pub struct ItemStatusRequest {
    pub clerk: String,
    #[serde(flatten)]
    pub update: ItemStatusUpdate,
}

#[derive(Debug, Deserialize)]
pub struct SettleFinanceRequest {
    pub clerk: String,
}

#[derive(Debug, Deserialize)]
pub struct ReadyQuery {
    pub approver: String,
}

#[derive(Debug, Deserialize)]
pub struct IssueReportRequest {
    pub issue_type: IssueType,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct IssueResolutionRequest {
    pub resolved_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnRequest {
    pub condition: ItemCondition,
}

pub(crate) async fn register_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    axum::Json(request): axum::Json<RegisterStudentRequest>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    let registrar = match state.directory.clerk(&request.registrar) {
        Ok(clerk) => clerk,
        Err(error) => return directory_error(error),
    };
    match state
        .service
        .register_student(&registrar, request.student, state.directory.as_ref())
    {
        Ok(student) => (StatusCode::CREATED, axum::Json(student)).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn student_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    Path(student_id): Path<String>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    let id = StudentId(student_id);
    match state.service.get(&id) {
        Ok(student) => {
            let progress =
                StudentProgressView::build(&student, state.service.catalog(), Utc::now().date_naive());
            let payload = json!({
                "student": student,
                "progress": progress,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => service_error(error),
    }
}

pub(crate) async fn submissions_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    Path(student_id): Path<String>,
    axum::Json(request): axum::Json<SubmissionRequest>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    let staff = match state.directory.approver(&request.staff_account_id) {
        Ok(staff) => staff,
        Err(error) => return directory_error(error),
    };

    let receipt = match state.service.record_submissions(
        &staff,
        &StudentId(student_id),
        &request.items,
        &request.notes,
    ) {
        Ok(receipt) => receipt,
        Err(error) => return service_error(error),
    };

    let warning = match &receipt.checkout {
        Some(payload) => state.service.notify_checkout(payload).await,
        None => None,
    };

    let payload = json!({
        "student": receipt.student,
        "recorded": receipt.recorded,
        "station_approved": receipt.station_approved,
        "final_clearance_issued": receipt.final_clearance_issued,
        "warning": warning,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn item_status_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    Path((student_id, item_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<ItemStatusRequest>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    let clerk = match state.directory.clerk(&request.clerk) {
        Ok(clerk) => clerk,
        Err(error) => return directory_error(error),
    };
    match state.service.set_item_status(
        &clerk,
        &StudentId(student_id),
        &ItemId(item_id),
        request.update,
    )
    {
        Ok(student) => (StatusCode::OK, axum::Json(student)).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn settle_finance_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    Path(student_id): Path<String>,
    axum::Json(request): axum::Json<SettleFinanceRequest>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    let clerk = match state.directory.clerk(&request.clerk) {
        Ok(clerk) => clerk,
        Err(error) => return directory_error(error),
    };
    match state.service.settle_finance(&clerk, &StudentId(student_id))
    {
        Ok(student) => (StatusCode::OK, axum::Json(student)).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn approve_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    Path(student_id): Path<String>,
    axum::Json(request): axum::Json<ApprovalRequest>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    let approver = match state.directory.approver(&request.approver) {
        Ok(approver) => approver,
        Err(error) => return directory_error(error),
    };
    match state.service.approve(&approver, &StudentId(student_id)) {
        Ok(receipt) => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn year_head_review_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    Path(student_id): Path<String>,
    axum::Json(request): axum::Json<YearHeadReviewRequest>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    let account_id = match &request {
        YearHeadReviewRequest::Approve { approver } | YearHeadReviewRequest::Deny { approver, .. } => {
            approver
        }
    };
    let approver = match state.directory.approver(account_id) {
        Ok(approver) => approver,
        Err(error) => return directory_error(error),
    };
    if approver.gate() != ApprovalGate::YearHead {
        return error_payload(
            StatusCode::FORBIDDEN,
            format!("{} cannot review final clearance", approver.name),
        );
    }
    let student_id = StudentId(student_id);

    let result = match &request {
        YearHeadReviewRequest::Approve { .. } => state
            .service
            .approve(&approver, &student_id)
            .map(|receipt| receipt.student),
        YearHeadReviewRequest::Deny { reason, .. } => {
            state.service.deny_final(&approver, &student_id, reason)
        }
    };

    match result {
        Ok(student) => (StatusCode::OK, axum::Json(student)).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn bulk_approve_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    axum::Json(request): axum::Json<BulkApprovalRequest>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    let approver = match state.directory.approver(&request.approver) {
        Ok(approver) => approver,
        Err(error) => return directory_error(error),
    };
    let results = state.service.bulk_approve(&approver, &request.student_ids);
    let approved = results.iter().filter(|result| result.approved).count();
    let payload = json!({
        "approved": approved,
        "failed": results.len() - approved,
        "results": results,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn ready_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    Query(query): Query<ReadyQuery>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    let approver: Approver = match state.directory.approver(&query.approver) {
        Ok(approver) => approver,
        Err(error) => return directory_error(error),
    };
    match state.service.ready_for(&approver) {
        Ok(students) => {
            let payload = json!({
                "gate": approver.gate(),
                "students": students,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => service_error(error),
    }
}

pub(crate) async fn dashboard_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    match state.service.dashboard() {
        Ok(dashboard) => (StatusCode::OK, axum::Json(dashboard)).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn register_item_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    Path(student_id): Path<String>,
    axum::Json(form): axum::Json<NewItemRegistration>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    match state.service.register_item(&StudentId(student_id), form) {
        Ok(registration) => (StatusCode::CREATED, axum::Json(registration)).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn report_issue_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    Path((student_id, registration_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<IssueReportRequest>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    match state.service.report_issue(
        &StudentId(student_id),
        &registration_id,
        request.issue_type,
        &request.description,
    ) {
        Ok(registration) => (StatusCode::OK, axum::Json(registration)).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn resolve_issue_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    Path((student_id, registration_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<IssueResolutionRequest>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    match state.service.resolve_issue(
        &StudentId(student_id),
        &registration_id,
        &request.resolved_by,
        request.notes,
    ) {
        Ok(registration) => (StatusCode::OK, axum::Json(registration)).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn return_item_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    Path((student_id, registration_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<ReturnRequest>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    match state
        .service
        .mark_returned(&StudentId(student_id), &registration_id, request.condition)
    {
        Ok(registration) => (StatusCode::OK, axum::Json(registration)).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn assign_requirement_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    Path(student_id): Path<String>,
    axum::Json(form): axum::Json<NewRequirement>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    match state.service.assign_requirement(&StudentId(student_id), form) {
        Ok(requirement) => (StatusCode::CREATED, axum::Json(requirement)).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn complete_requirement_handler<R, N, D>(
    State(state): State<ClearanceState<R, N, D>>,
    Path((student_id, requirement_id)): Path<(String, String)>,
) -> Response
where
    R: StudentRepository + 'static,
    N: CheckoutNotifier + 'static,
    D: ApproverDirectory + 'static,
{
    match state
        .service
        .complete_requirement(&StudentId(student_id), &requirement_id)
    {
        Ok(requirement) => (StatusCode::OK, axum::Json(requirement)).into_response(),
        Err(error) => service_error(error),
    }
}

fn error_payload(status: StatusCode, message: String) -> Response {
    let payload = json!({
        "error": message,
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) fn approval_status(error: &ApprovalError) -> StatusCode {
    match error {
        ApprovalError::RoleCannotApprove { .. }
        | ApprovalError::OutOfScope { .. }
        | ApprovalError::ActionNotPermitted { .. } => StatusCode::FORBIDDEN,
        ApprovalError::DenialNotSupported(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ApprovalError::ItemsIncomplete { .. }
        | ApprovalError::StationStaffPending
        | ApprovalError::PrecedingGatesPending { .. }
        | ApprovalError::AlreadyApproved(_)
        | ApprovalError::AlreadyCleared => StatusCode::CONFLICT,
    }
}

fn service_error(error: ClearanceServiceError) -> Response {
    let status = match &error {
        ClearanceServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ClearanceServiceError::Ledger(
            LedgerError::ItemNotFound(_)
            | LedgerError::RegistrationNotFound(_)
            | LedgerError::RequirementNotFound(_),
        ) => StatusCode::NOT_FOUND,
        ClearanceServiceError::Ledger(_) => StatusCode::CONFLICT,
        ClearanceServiceError::Approval(approval) => approval_status(approval),
        ClearanceServiceError::Directory(directory) => directory_status(directory),
        ClearanceServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        ClearanceServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        ClearanceServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_payload(status, error.to_string())
}

fn directory_status(error: &DirectoryError) -> StatusCode {
    match error {
        DirectoryError::UnknownAccount(_) => StatusCode::FORBIDDEN,
        DirectoryError::Approval(approval) => approval_status(approval),
        DirectoryError::EmailTaken(_) => StatusCode::CONFLICT,
        DirectoryError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn directory_error(error: DirectoryError) -> Response {
    error_payload(directory_status(&error), error.to_string())
}
