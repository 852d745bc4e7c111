//! Handlers for the dynamic project model: parameters, field permissions,
//! projects and confidential notes.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::{Map, Value};

use pmboard_access::{
    Page, ParameterInput, ParameterPatch, PermissionInput, PermissionView, ProjectPatch, ProjectView,
    page::DEFAULT_LIMIT,
};
use pmboard_state::{AttributeValue, Parameter};

use crate::ApiState;
use crate::error::ApiError;
use crate::extract::AuthUser;
use crate::handlers::{ApiResponse, ApiResult, PageQuery};

/// Default page size for project listings.
pub const PROJECT_PAGE_LIMIT: usize = 10;

fn to_patch(body: Map<String, Value>) -> ProjectPatch {
    body.iter()
        .map(|(k, v)| (k.clone(), AttributeValue::from_json(v)))
        .collect()
}

// ── Parameters ─────────────────────────────────────────────────

/// GET /api/v1/parameters
///
/// Descriptors the caller's role may view.
pub async fn viewable_parameters(State(state): State<ApiState>, user: AuthUser) -> ApiResult<Vec<Parameter>> {
    Ok(ApiResponse::ok(state.board.projects.viewable_parameters(user.actor.role)?))
}

/// GET /api/v1/admin/parameters
pub async fn list_parameters(
    State(state): State<ApiState>,
    user: AuthUser,
    Query(q): Query<PageQuery>,
) -> ApiResult<Page<Parameter>> {
    let req = q.request(DEFAULT_LIMIT);
    Ok(ApiResponse::ok(state.board.parameters.list_page(&user.actor, req)?))
}

/// POST /api/v1/admin/parameters
pub async fn create_parameter(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(req): Json<ParameterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let param = state.board.parameters.create(&user.actor, &req)?;
    Ok((StatusCode::CREATED, ApiResponse::ok(param)))
}

/// GET /api/v1/admin/parameters/{id}
pub async fn get_parameter(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Parameter> {
    Ok(ApiResponse::ok(state.board.parameters.get(&user.actor, &id)?))
}

/// PATCH /api/v1/admin/parameters/{id}
pub async fn update_parameter(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<ParameterPatch>,
) -> ApiResult<Parameter> {
    Ok(ApiResponse::ok(state.board.parameters.update(&user.actor, &id, &req)?))
}

/// DELETE /api/v1/admin/parameters/{id}
pub async fn delete_parameter(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<&'static str> {
    state.board.parameters.delete(&user.actor, &id)?;
    Ok(ApiResponse::ok("deleted"))
}

// ── Permissions ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PermissionsBody {
    pub permissions: Vec<PermissionInput>,
}

/// GET /api/v1/admin/permissions
pub async fn list_permissions(State(state): State<ApiState>, user: AuthUser) -> ApiResult<Vec<PermissionView>> {
    Ok(ApiResponse::ok(state.board.permissions.list_permissions(&user.actor)?))
}

/// PATCH /api/v1/admin/permissions
pub async fn set_permissions(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(body): Json<PermissionsBody>,
) -> ApiResult<Vec<PermissionView>> {
    Ok(ApiResponse::ok(
        state.board.permissions.set_permissions(&user.actor, &body.permissions)?,
    ))
}

// ── Projects ───────────────────────────────────────────────────

/// GET /api/v1/projects
///
/// `page` and `limit` paginate; every other query key is a filter.
pub async fn list_projects(
    State(state): State<ApiState>,
    user: AuthUser,
    Query(mut query): Query<BTreeMap<String, String>>,
) -> ApiResult<Page<ProjectView>> {
    let page = query.remove("page");
    let limit = query.remove("limit");
    let req = pmboard_access::PageRequest::from_query(page.as_deref(), limit.as_deref(), PROJECT_PAGE_LIMIT);
    Ok(ApiResponse::ok(state.board.projects.list_projects(&user.actor, req, &query)?))
}

/// POST /api/v1/projects
pub async fn create_project(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(body): Json<Map<String, Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state.board.projects.create_project(&user.actor, &to_patch(body))?;
    Ok((StatusCode::CREATED, ApiResponse::ok(project)))
}

/// GET /api/v1/projects/{id}
pub async fn get_project(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<ProjectView> {
    Ok(ApiResponse::ok(state.board.projects.get_project(&user.actor, &id, true)?))
}

/// PATCH /api/v1/projects/{id}
pub async fn update_project(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> ApiResult<ProjectView> {
    Ok(ApiResponse::ok(
        state.board.projects.update_project(&user.actor, &id, &to_patch(body))?,
    ))
}

/// GET /api/v1/projects/{id}/confidential
pub async fn get_confidential(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let notes = state.board.projects.confidential(&user.actor, &id)?;
    Ok(ApiResponse::ok(serde_json::json!({ "confidentialNotes": notes })))
}

/// PATCH /api/v1/projects/{id}/confidential
///
/// A missing or non-string `confidentialNotes` clears the notes.
pub async fn set_confidential(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> ApiResult<Value> {
    let notes = body.get("confidentialNotes").and_then(Value::as_str).unwrap_or_default();
    let notes = state.board.projects.set_confidential(&user.actor, &id, notes)?;
    Ok(ApiResponse::ok(serde_json::json!({ "confidentialNotes": notes })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmboard_access::{Board, FieldAccess};
    use pmboard_state::Role;

    fn test_state() -> (ApiState, AuthUser) {
        let board = Board::in_memory().unwrap();
        board.accounts.seed_admin("admin@example.com", "secret1", None).unwrap();
        let outcome = board.accounts.login("admin@example.com", "secret1").unwrap();
        let actor = board.accounts.authenticate(&outcome.token).unwrap();
        (
            ApiState { board },
            AuthUser {
                actor,
                token: outcome.token,
            },
        )
    }

    fn staff() -> AuthUser {
        AuthUser {
            actor: pmboard_access::Actor::new("staff-1", Role::Staff),
            token: String::new(),
        }
    }

    fn body(value: Value) -> Json<Map<String, Value>> {
        match value {
            Value::Object(map) => Json(map),
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn create_project_without_name_is_bad_request() {
        let (state, admin) = test_state();
        let resp = create_project(State(state), admin, body(serde_json::json!({ "status": "x" })))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_project_returns_created() {
        let (state, admin) = test_state();
        let resp = create_project(State(state), admin, body(serde_json::json!({ "name": "Apollo" })))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn staff_cannot_manage_parameters() {
        let (state, _) = test_state();
        let req = ParameterInput {
            key: Some("owner".into()),
            label: Some("Owner".into()),
            ..Default::default()
        };
        let resp = create_parameter(State(state), staff(), Json(req)).await.into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn duplicate_parameter_key_is_bad_request() {
        let (state, admin) = test_state();
        let req = || ParameterInput {
            key: Some("owner".into()),
            label: Some("Owner".into()),
            ..Default::default()
        };
        let first = create_parameter(State(state.clone()), admin.clone(), Json(req()))
            .await
            .into_response();
        assert_eq!(first.status(), StatusCode::CREATED);
        let second = create_parameter(State(state), admin, Json(req())).await.into_response();
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn set_permissions_skips_unknown_entries() {
        let (state, admin) = test_state();
        let body = PermissionsBody {
            permissions: vec![PermissionInput::new("missing", Role::Staff, FieldAccess::ALL)],
        };
        let resp = set_permissions(State(state), admin, Json(body)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn confidential_requires_admin() {
        let (state, _) = test_state();
        let resp = get_confidential(State(state), staff(), Path("any".into())).await.into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_project_is_not_found() {
        let (state, admin) = test_state();
        let resp = get_project(State(state), admin, Path("nope".into())).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
