//! Identity handler

use axum::{Extension, Json};
use serde::Serialize;

use crate::{AuthMethod, Caller};

#[derive(Serialize)]
pub struct MeResponse {
    /// Acting user; absent for a service caller that named none
    pub user: Option<String>,
    pub auth_method: AuthMethod,
}

/// GET /api/me - Who the server thinks the caller is
pub async fn get_me(Extension(caller): Extension<Caller>) -> Json<MeResponse> {
    Json(MeResponse {
        user: caller.user,
        auth_method: caller.auth_method,
    })
}
