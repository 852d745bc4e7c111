//! Bearer-session extractor.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, HeaderMap};
use axum::http::request::Parts;
use pmboard_access::Actor;

use crate::ApiState;
use crate::error::ApiError;

/// The authenticated caller behind `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub actor: Actor,
    pub token: String,
}

impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(ApiError::MissingToken)?;
        let actor = state.board.accounts.authenticate(&token)?;
        Ok(AuthUser { actor, token })
    }
}

/// Case-insensitive `Bearer` scheme, surrounding whitespace ignored.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let scheme = auth.get(..7)?;
    if !scheme.eq_ignore_ascii_case("bearer ") {
        return None;
    }
    let token = auth[7..].trim();
    (!token.is_empty()).then(|| token.to_string())
}
