use axum::extract::{Json, Multipart, Path, State};
use axum::http::StatusCode;
use diesel::prelude::*;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::access::{self, Role};
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Document, NewDocument};
use crate::routes::to_iso;
use crate::schema::{document_shares, documents};
use crate::state::AppState;

/// Uploaded bytes are exposed back to clients under this fixed prefix.
pub const FILE_URL_PREFIX: &str = "/files";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub file_url: String,
    pub file_name: String,
    pub file_size: i64,
    pub created_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            owner_id: doc.owner_id,
            title: doc.title,
            file_url: doc.file_url,
            file_name: doc.file_name,
            file_size: doc.file_size,
            created_at: to_iso(doc.created_at),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentListItem {
    #[serde(flatten)]
    pub document: DocumentResponse,
    pub my_role: &'static str,
}

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentListItem>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetailResponse {
    pub document: DocumentResponse,
    pub my_role: &'static str,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub document: DocumentResponse,
}

struct UploadRequest {
    bytes: Vec<u8>,
    file_name: String,
    content_type: Option<String>,
    title: Option<String>,
}

fn inline_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    ))
}

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                file_name = field.file_name().map(|n| n.to_string());
                content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("title") => {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid title field: {err}"))
                })?;
                if !value.trim().is_empty() {
                    title = Some(value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| AppError::bad_request("file field is required"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("file field must not be empty"));
    }
    let file_name = file_name.ok_or_else(|| AppError::bad_request("filename is required"))?;

    let request = UploadRequest {
        bytes,
        file_name,
        content_type,
        title,
    };

    let document = process_upload(&state, request, user.user_id).await?;
    info!(
        document_id = %document.id,
        owner_id = %user.user_id,
        file_name = %document.file_name,
        "document uploaded"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            document: document.into(),
        }),
    ))
}

async fn process_upload(
    state: &AppState,
    request: UploadRequest,
    user_id: Uuid,
) -> AppResult<Document> {
    let UploadRequest {
        bytes,
        file_name,
        content_type,
        title,
    } = request;

    let doc_id = Uuid::new_v4();
    let storage_key = format!("documents/{doc_id}/{file_name}");
    let file_url = format!("{FILE_URL_PREFIX}/{storage_key}");
    let file_size = bytes.len() as i64;
    let title = title.unwrap_or_else(|| file_name.clone());
    let content_disposition = inline_content_disposition(&file_name);

    // Bytes land in object storage first; the metadata row and its OWNER
    // share then commit together. A storage failure leaves no orphaned
    // document, and a database failure leaves only an unreferenced object.
    state
        .storage
        .put_object(&storage_key, bytes, content_type, content_disposition)
        .await
        .map_err(|err| {
            error!(error = %err, key = %storage_key, "failed to store document");
            AppError::internal(format!("failed to store document: {err}"))
        })?;

    let mut conn = state.db()?;
    let document = conn.transaction(|conn| {
        let new_document = NewDocument {
            id: doc_id,
            owner_id: user_id,
            title,
            file_url,
            file_name,
            file_size,
        };
        diesel::insert_into(documents::table)
            .values(&new_document)
            .execute(conn)?;

        access::create_owner_share(conn, doc_id, user_id)?;

        documents::table.find(doc_id).first::<Document>(conn)
    })?;

    Ok(document)
}

pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentListResponse>> {
    let mut conn = state.db()?;

    // The dashboard is driven by the share registry: one row per document
    // the user can see, most recently shared first.
    let rows: Vec<(Document, String)> = document_shares::table
        .inner_join(documents::table)
        .filter(document_shares::user_id.eq(user.user_id))
        .order(document_shares::created_at.desc())
        .select((documents::all_columns, document_shares::role))
        .load(&mut conn)?;

    let documents = rows
        .into_iter()
        .filter_map(|(doc, role)| {
            Role::parse(&role).map(|role| DocumentListItem {
                document: doc.into(),
                my_role: role.as_str(),
            })
        })
        .collect();

    Ok(Json(DocumentListResponse { documents }))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentDetailResponse>> {
    let mut conn = state.db()?;

    let doc: Option<Document> = documents::table
        .find(document_id)
        .first(&mut conn)
        .optional()?;
    let doc = doc.ok_or_else(AppError::not_found)?;

    let role = access::require_view(&mut conn, user.user_id, document_id)?;

    Ok(Json(DocumentDetailResponse {
        document: doc.into(),
        my_role: role.as_str(),
    }))
}
