use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::accounts::AccountError;
use super::domain::{AccountId, NewAccount, UnlockRequestId};
use super::repository::{AccountRepository, UnlockRequestRepository};
use super::service::{AuthService, LoginError, UnlockError};

/// Router builder exposing login, account, and admin unlock endpoints.
pub fn auth_router<A, U>(service: Arc<AuthService<A, U>>) -> Router
where
    A: AccountRepository + 'static,
    U: UnlockRequestRepository + 'static,
{
    Router::new()
        .route("/api/v1/auth/login", post(login_handler::<A, U>))
        .route("/api/v1/auth/accounts", post(register_account_handler::<A, U>))
        .route(
            "/api/v1/auth/unlock-requests",
            get(unlock_queue_handler::<A, U>).post(request_unlock_handler::<A, U>),
        )
        .route(
            "/api/v1/auth/unlock-requests/:request_id/approve",
            post(approve_unlock_handler::<A, U>),
        )
        .route(
            "/api/v1/auth/unlock-requests/:request_id/reject",
            post(reject_unlock_handler::<A, U>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AccountRegistration {
    pub admin: String,
    pub account: NewAccount,
}

#[derive(Debug, Deserialize)]
pub struct UnlockAppeal {
    pub email: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    pub admin: String,
}

#[derive(Debug, Deserialize)]
pub struct UnlockDecision {
    pub admin: String,
    #[serde(default)]
    pub notes: Option<String>,
}

pub(crate) async fn login_handler<A, U>(
    State(service): State<Arc<AuthService<A, U>>>,
    axum::Json(request): axum::Json<LoginRequest>,
) -> Response
where
    A: AccountRepository + 'static,
    U: UnlockRequestRepository + 'static,
{
    match service.login(&request.email, &request.password) {
        Ok(success) => (StatusCode::OK, axum::Json(success)).into_response(),
        Err(error) => login_error(error),
    }
}

pub(crate) async fn register_account_handler<A, U>(
    State(service): State<Arc<AuthService<A, U>>>,
    axum::Json(request): axum::Json<AccountRegistration>,
) -> Response
where
    A: AccountRepository + 'static,
    U: UnlockRequestRepository + 'static,
{
    match service.register_account(&AccountId(request.admin), request.account) {
        Ok(account) => (StatusCode::CREATED, axum::Json(account)).into_response(),
        Err(error) => account_error(error),
    }
}

pub(crate) async fn request_unlock_handler<A, U>(
    State(service): State<Arc<AuthService<A, U>>>,
    axum::Json(appeal): axum::Json<UnlockAppeal>,
) -> Response
where
    A: AccountRepository + 'static,
    U: UnlockRequestRepository + 'static,
{
    match service.request_unlock(&appeal.email, appeal.message) {
        Ok(request) => (StatusCode::CREATED, axum::Json(request)).into_response(),
        Err(error) => unlock_error(error),
    }
}

pub(crate) async fn unlock_queue_handler<A, U>(
    State(service): State<Arc<AuthService<A, U>>>,
    Query(query): Query<AdminQuery>,
) -> Response
where
    A: AccountRepository + 'static,
    U: UnlockRequestRepository + 'static,
{
    match service.unlock_queue(&AccountId(query.admin)) {
        Ok(queue) => (StatusCode::OK, axum::Json(queue)).into_response(),
        Err(error) => unlock_error(error),
    }
}

pub(crate) async fn approve_unlock_handler<A, U>(
    State(service): State<Arc<AuthService<A, U>>>,
    Path(request_id): Path<String>,
    axum::Json(decision): axum::Json<UnlockDecision>,
) -> Response
where
    A: AccountRepository + 'static,
    U: UnlockRequestRepository + 'static,
{
    match service.approve_unlock(
        &AccountId(decision.admin),
        &UnlockRequestId(request_id),
        decision.notes,
    ) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(error) => unlock_error(error),
    }
}

pub(crate) async fn reject_unlock_handler<A, U>(
    State(service): State<Arc<AuthService<A, U>>>,
    Path(request_id): Path<String>,
    axum::Json(decision): axum::Json<UnlockDecision>,
) -> Response
where
    A: AccountRepository + 'static,
    U: UnlockRequestRepository + 'static,
{
    match service.reject_unlock(
        &AccountId(decision.admin),
        &UnlockRequestId(request_id),
        decision.notes,
    ) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(error) => unlock_error(error),
    }
}

fn login_error(error: LoginError) -> Response {
    let message = error.to_string();
    match error {
        LoginError::Validation(_) => {
            let payload = json!({ "error": message });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        LoginError::RateLimited { retry_after_secs } => {
            let payload = json!({
                "error": message,
                "retry_after_secs": retry_after_secs,
            });
            let mut response =
                (StatusCode::TOO_MANY_REQUESTS, axum::Json(payload)).into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            response
        }
        LoginError::InvalidCredentials { attempts_remaining } => {
            let payload = json!({
                "error": message,
                "attempts_remaining": attempts_remaining,
            });
            (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
        }
        LoginError::AccountLocked {
            locked_until,
            unlock_request,
        } => {
            let payload = json!({
                "error": message,
                "locked_until": locked_until,
                "unlock_request_id": unlock_request,
            });
            (StatusCode::LOCKED, axum::Json(payload)).into_response()
        }
        LoginError::Repository(_) => {
            let payload = json!({ "error": message });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

fn unlock_error(error: UnlockError) -> Response {
    let status = match &error {
        UnlockError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        UnlockError::AccountNotFound | UnlockError::RequestNotFound(_) => StatusCode::NOT_FOUND,
        UnlockError::NotLocked | UnlockError::AlreadyResolved { .. } => StatusCode::CONFLICT,
        UnlockError::NotAdmin(_) => StatusCode::FORBIDDEN,
        UnlockError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

fn account_error(error: AccountError) -> Response {
    let status = match &error {
        AccountError::Validation(_) | AccountError::StudentRole => StatusCode::UNPROCESSABLE_ENTITY,
        AccountError::NotAdmin(_) => StatusCode::FORBIDDEN,
        AccountError::EmailTaken(_) => StatusCode::CONFLICT,
        AccountError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
