use axum::extract::{Json, State};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::access::{self, Role};
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Document, DocumentShare, User};
use crate::routes::to_iso;
use crate::schema::{documents, users};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareRequest {
    pub document_id: Uuid,
    pub email: String,
    pub role: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: String,
}

impl From<DocumentShare> for ShareResponse {
    fn from(share: DocumentShare) -> Self {
        Self {
            document_id: share.document_id,
            user_id: share.user_id,
            role: share.role,
            created_at: to_iso(share.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct CreateShareResponse {
    pub share: ShareResponse,
}

pub async fn create_share(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateShareRequest>,
) -> AppResult<Json<CreateShareResponse>> {
    // The OWNER role is established once at upload time and is never
    // assignable through this endpoint.
    let role = match Role::parse(payload.role.trim()) {
        Some(role @ (Role::Editor | Role::Viewer)) => role,
        _ => return Err(AppError::bad_request("role must be EDITOR or VIEWER")),
    };

    let mut conn = state.db()?;

    let document: Option<Document> = documents::table
        .find(payload.document_id)
        .first(&mut conn)
        .optional()?;
    let document = document.ok_or_else(AppError::not_found)?;

    access::require_owner(&mut conn, user.user_id, document.id)?;

    let email = payload.email.trim().to_lowercase();
    let target: User = match users::table
        .filter(users::email.eq(&email))
        .first(&mut conn)
    {
        Ok(target) => target,
        Err(diesel::result::Error::NotFound) => {
            return Err(AppError::new(
                axum::http::StatusCode::NOT_FOUND,
                "no user with that email",
            ));
        }
        Err(err) => return Err(AppError::from(err)),
    };

    let share = access::upsert_share(&mut conn, document.id, target.id, role)?;

    info!(
        document_id = %document.id,
        granter = %user.user_id,
        target = %target.id,
        role = role.as_str(),
        "share granted"
    );

    Ok(Json(CreateShareResponse {
        share: share.into(),
    }))
}
