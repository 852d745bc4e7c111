//! pmboard-api: REST API for pmboard.
//!
//! Provides axum route handlers over the role-aware services in
//! `pmboard-access`. Every route except login and health requires
//! `Authorization: Bearer <token>`.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/health` | Liveness |
//! | POST | `/api/v1/auth/login` | Exchange credentials for a session token |
//! | POST | `/api/v1/auth/logout` | Revoke the current session |
//! | GET/PATCH | `/api/v1/account` | Own profile, password and dashboard columns |
//! | GET/POST | `/api/v1/users` | List or create users (admin) |
//! | GET/PATCH/DELETE | `/api/v1/users/{id}` | Manage one user (admin) |
//! | GET | `/api/v1/parameters` | Parameters the caller's role may view |
//! | GET/POST | `/api/v1/admin/parameters` | Parameter registry (admin) |
//! | GET/PATCH/DELETE | `/api/v1/admin/parameters/{id}` | One parameter (admin) |
//! | GET/PATCH | `/api/v1/admin/permissions` | Field permission table (admin) |
//! | GET/POST | `/api/v1/projects` | Projected project list, create |
//! | GET/PATCH | `/api/v1/projects/{id}` | Projected project, field-checked update |
//! | GET/PATCH | `/api/v1/projects/{id}/confidential` | Confidential notes (admin) |
//! | GET/POST | `/api/v1/messages` | Message board |
//! | GET | `/api/v1/messages/{id}` | One message |
//! | GET | `/api/v1/notifications` | Own notifications |
//! | PATCH | `/api/v1/notifications/{id}` | Mark a notification read |
//! | GET | `/api/v1/audit` | Audit trail (admin) |

pub mod error;
pub mod extract;
pub mod handlers;
pub mod project_handlers;

use axum::Router;
use axum::routing::{get, patch, post};
use pmboard_access::Board;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub board: Board,
}

/// Build the complete API router.
pub fn build_router(board: Board) -> Router {
    let api_state = ApiState { board };

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/account", get(handlers::get_account).patch(handlers::update_account))
        .route("/users", get(handlers::list_users).post(handlers::create_user))
        .route(
            "/users/{id}",
            get(handlers::get_user)
                .patch(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route("/parameters", get(project_handlers::viewable_parameters))
        .route(
            "/admin/parameters",
            get(project_handlers::list_parameters).post(project_handlers::create_parameter),
        )
        .route(
            "/admin/parameters/{id}",
            get(project_handlers::get_parameter)
                .patch(project_handlers::update_parameter)
                .delete(project_handlers::delete_parameter),
        )
        .route(
            "/admin/permissions",
            get(project_handlers::list_permissions).patch(project_handlers::set_permissions),
        )
        .route(
            "/projects",
            get(project_handlers::list_projects).post(project_handlers::create_project),
        )
        .route(
            "/projects/{id}",
            get(project_handlers::get_project).patch(project_handlers::update_project),
        )
        .route(
            "/projects/{id}/confidential",
            get(project_handlers::get_confidential).patch(project_handlers::set_confidential),
        )
        .route("/messages", get(handlers::list_messages).post(handlers::post_message))
        .route("/messages/{id}", get(handlers::get_message))
        .route("/notifications", get(handlers::list_notifications))
        .route("/notifications/{id}", patch(handlers::mark_notification_read))
        .route("/audit", get(handlers::list_audit))
        .with_state(api_state);

    Router::new().nest("/api/v1", api_routes)
}
