use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::access;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Comment, Document, NewComment, User};
use crate::routes::to_iso;
use crate::schema::{comments, documents, users};
use crate::state::AppState;

pub const MAX_MESSAGE_LENGTH: usize = 1000;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub document_id: Uuid,
    pub page_number: i32,
    pub x: f64,
    pub y: f64,
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAuthor {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub page_number: i32,
    pub x: f64,
    pub y: f64,
    pub message: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<CommentAuthor>,
}

fn to_comment_response(comment: Comment, author: Option<CommentAuthor>) -> CommentResponse {
    CommentResponse {
        id: comment.id,
        document_id: comment.document_id,
        user_id: comment.user_id,
        page_number: comment.page_number,
        x: comment.x,
        y: comment.y,
        message: comment.message,
        created_at: to_iso(comment.created_at),
        user: author,
    }
}

#[derive(Serialize)]
pub struct CreateCommentResponse {
    pub comment: CommentResponse,
}

#[derive(Serialize)]
pub struct CommentListResponse {
    pub comments: Vec<CommentResponse>,
}

/// Page number must be positive and the message non-empty and bounded.
/// The x/y pin coordinates are page-relative fractions but are stored as
/// given; out-of-range values are the client's problem.
fn validate_comment(page_number: i32, message: &str) -> AppResult<()> {
    if page_number < 1 {
        return Err(AppError::bad_request("pageNumber must be at least 1"));
    }
    if message.is_empty() {
        return Err(AppError::bad_request("message must not be empty"));
    }
    if message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(AppError::bad_request(format!(
            "message must be at most {MAX_MESSAGE_LENGTH} characters"
        )));
    }
    Ok(())
}

pub async fn create_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<CreateCommentResponse>)> {
    validate_comment(payload.page_number, &payload.message)?;

    let mut conn = state.db()?;

    let document: Option<Document> = documents::table
        .find(payload.document_id)
        .first(&mut conn)
        .optional()?;
    let document = document.ok_or_else(AppError::not_found)?;

    access::require_edit(&mut conn, user.user_id, document.id)?;

    let new_comment = NewComment {
        id: Uuid::new_v4(),
        document_id: document.id,
        user_id: user.user_id,
        page_number: payload.page_number,
        x: payload.x,
        y: payload.y,
        message: payload.message,
    };
    diesel::insert_into(comments::table)
        .values(&new_comment)
        .execute(&mut conn)?;

    let comment: Comment = comments::table.find(new_comment.id).first(&mut conn)?;

    info!(
        comment_id = %comment.id,
        document_id = %document.id,
        page = comment.page_number,
        "comment pinned"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateCommentResponse {
            comment: to_comment_response(comment, None),
        }),
    ))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<CommentListResponse>> {
    let mut conn = state.db()?;

    let document: Option<Document> = documents::table
        .find(document_id)
        .first(&mut conn)
        .optional()?;
    let document = document.ok_or_else(AppError::not_found)?;

    access::require_view(&mut conn, user.user_id, document.id)?;

    let rows: Vec<(Comment, User)> = comments::table
        .inner_join(users::table)
        .filter(comments::document_id.eq(document.id))
        .order(comments::created_at.asc())
        .load(&mut conn)?;

    let comments = rows
        .into_iter()
        .map(|(comment, author)| {
            let author = CommentAuthor {
                id: author.id,
                name: author.name,
                email: author.email,
            };
            to_comment_response(comment, Some(author))
        })
        .collect();

    Ok(Json(CommentListResponse { comments }))
}
