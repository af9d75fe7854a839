//! Profile of the caller.
//!
//! The access gate attaches an [`Identity`] for authenticated requests. In
//! bootstrap mode no identity exists and the name is empty.

use axum::{extract::Extension, response::IntoResponse, Json};
use serde::Serialize;
use utoipa::ToSchema;

use super::auth::Identity;

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub name: String,
}

#[utoipa::path(
    get,
    path = "/control/profile",
    responses(
        (status = 200, description = "Return the current user; empty name when no users exist.", body = ProfileResponse),
        (status = 403, description = "Missing or invalid credentials."),
    ),
    tag = "control"
)]
pub async fn profile(identity: Option<Extension<Identity>>) -> impl IntoResponse {
    let name = identity.map(|Extension(identity)| identity.login).unwrap_or_default();
    Json(ProfileResponse { name })
}
