//! REST API handlers for sessions, accounts, users, messaging and audit.
//!
//! Each handler authenticates through [`AuthUser`], calls one `Board`
//! service, and wraps the result in the `{success, data, error}` envelope.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use pmboard_access::{
    AccountUpdate, AuditFilter, MessageInput, NewUser, PageRequest, UserUpdate, page::DEFAULT_LIMIT,
};

use crate::ApiState;
use crate::error::ApiError;
use crate::extract::AuthUser;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }

    pub(crate) fn err(msg: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg),
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Raw pagination query. Values stay strings so junk input falls back to
/// defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    pub(crate) fn request(&self, default_limit: usize) -> PageRequest {
        PageRequest::from_query(self.page.as_deref(), self.limit.as_deref(), default_limit)
    }
}

// ── Health / Sessions ──────────────────────────────────────────

/// GET /api/v1/health
pub async fn health() -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<ApiState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<pmboard_access::LoginOutcome> {
    Ok(ApiResponse::ok(state.board.accounts.login(&req.email, &req.password)?))
}

/// POST /api/v1/auth/logout
pub async fn logout(State(state): State<ApiState>, user: AuthUser) -> ApiResult<&'static str> {
    state.board.accounts.logout(&user.token)?;
    Ok(ApiResponse::ok("logged out"))
}

// ── Account ────────────────────────────────────────────────────

/// GET /api/v1/account
pub async fn get_account(
    State(state): State<ApiState>,
    user: AuthUser,
) -> ApiResult<pmboard_access::AccountView> {
    Ok(ApiResponse::ok(state.board.accounts.account(&user.actor)?))
}

/// PATCH /api/v1/account
pub async fn update_account(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(req): Json<AccountUpdate>,
) -> ApiResult<pmboard_access::AccountView> {
    Ok(ApiResponse::ok(state.board.accounts.update_account(&user.actor, &req)?))
}

// ── Users ──────────────────────────────────────────────────────

/// GET /api/v1/users
pub async fn list_users(
    State(state): State<ApiState>,
    user: AuthUser,
) -> ApiResult<Vec<pmboard_access::UserSummary>> {
    Ok(ApiResponse::ok(state.board.accounts.list_users(&user.actor)?))
}

/// POST /api/v1/users
pub async fn create_user(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(req): Json<NewUser>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.board.accounts.create_user(&user.actor, &req)?;
    Ok((StatusCode::CREATED, ApiResponse::ok(created)))
}

/// GET /api/v1/users/{id}
pub async fn get_user(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<pmboard_access::UserSummary> {
    Ok(ApiResponse::ok(state.board.accounts.get_user(&user.actor, &id)?))
}

/// PATCH /api/v1/users/{id}
pub async fn update_user(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UserUpdate>,
) -> ApiResult<pmboard_access::UserSummary> {
    Ok(ApiResponse::ok(state.board.accounts.update_user(&user.actor, &id, &req)?))
}

/// DELETE /api/v1/users/{id}
pub async fn delete_user(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<&'static str> {
    state.board.accounts.delete_user(&user.actor, &id)?;
    Ok(ApiResponse::ok("deleted"))
}

// ── Messages / Notifications ───────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub priority: Option<String>,
}

/// GET /api/v1/messages
pub async fn list_messages(
    State(state): State<ApiState>,
    _user: AuthUser,
    Query(q): Query<MessageQuery>,
) -> ApiResult<pmboard_access::Page<pmboard_access::MessageView>> {
    let req = PageRequest::from_query(q.page.as_deref(), q.limit.as_deref(), DEFAULT_LIMIT);
    Ok(ApiResponse::ok(state.board.messages.list(req, q.priority.as_deref())?))
}

/// POST /api/v1/messages
pub async fn post_message(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(req): Json<MessageInput>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state.board.messages.post(&user.actor, &req)?;
    Ok((StatusCode::CREATED, ApiResponse::ok(message)))
}

/// GET /api/v1/messages/{id}
pub async fn get_message(
    State(state): State<ApiState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<pmboard_access::MessageView> {
    Ok(ApiResponse::ok(state.board.messages.get(&id)?))
}

/// GET /api/v1/notifications
pub async fn list_notifications(
    State(state): State<ApiState>,
    user: AuthUser,
) -> ApiResult<Vec<pmboard_access::NotificationView>> {
    Ok(ApiResponse::ok(state.board.messages.notifications(&user.actor)?))
}

/// PATCH /api/v1/notifications/{id}
pub async fn mark_notification_read(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<&'static str> {
    state.board.messages.mark_read(&user.actor, &id)?;
    Ok(ApiResponse::ok("read"))
}

// ── Audit ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub project_id: Option<String>,
    pub entity: Option<String>,
    pub actor_id: Option<String>,
}

/// GET /api/v1/audit
pub async fn list_audit(
    State(state): State<ApiState>,
    user: AuthUser,
    Query(q): Query<AuditQuery>,
) -> ApiResult<pmboard_access::Page<pmboard_access::AuditView>> {
    let req = PageRequest::from_query(q.page.as_deref(), q.limit.as_deref(), DEFAULT_LIMIT);
    let filter = AuditFilter {
        project_id: q.project_id,
        entity: q.entity,
        actor_id: q.actor_id,
    };
    Ok(ApiResponse::ok(state.board.audit.list(&user.actor, &filter, req)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmboard_access::Board;

    fn test_state() -> ApiState {
        let board = Board::in_memory().unwrap();
        board.accounts.seed_admin("admin@example.com", "secret1", None).unwrap();
        ApiState { board }
    }

    fn admin(state: &ApiState) -> AuthUser {
        let outcome = state.board.accounts.login("admin@example.com", "secret1").unwrap();
        let actor = state.board.accounts.authenticate(&outcome.token).unwrap();
        AuthUser {
            actor,
            token: outcome.token,
        }
    }

    #[tokio::test]
    async fn health_is_ok() {
        let resp = health().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn login_with_bad_password_is_unauthorized() {
        let state = test_state();
        let req = LoginRequest {
            email: "admin@example.com".into(),
            password: "wrong".into(),
        };
        let resp = login(State(state), Json(req)).await.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_user_returns_created() {
        let state = test_state();
        let user = admin(&state);
        let req = NewUser {
            email: Some("staff@example.com".into()),
            password: Some("secret1".into()),
            ..Default::default()
        };
        let resp = create_user(State(state), user, Json(req)).await.into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn delete_self_is_bad_request() {
        let state = test_state();
        let user = admin(&state);
        let id = user.actor.user_id.clone();
        let resp = delete_user(State(state), user, Path(id)).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_message_is_not_found() {
        let state = test_state();
        let user = admin(&state);
        let resp = get_message(State(state), user, Path("nope".into())).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn logout_invalidates_session() {
        let state = test_state();
        let user = admin(&state);
        let token = user.token.clone();
        let resp = logout(State(state.clone()), user).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(state.board.accounts.authenticate(&token).is_err());
    }
}
