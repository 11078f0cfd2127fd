use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::IntoResponse;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Serves uploaded bytes by storage key under the fixed `/files` prefix.
/// The key doubles as the public path, so this stays a plain pass-through
/// with a guessed content type.
pub async fn serve_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let key = key.trim_start_matches('/');
    if key.is_empty() || key.split('/').any(|segment| segment == "..") {
        return Err(AppError::bad_request("invalid file path"));
    }

    let bytes = state
        .storage
        .get_object(key)
        .await
        .map_err(|err| AppError::internal(format!("failed to read stored file: {err}")))?
        .ok_or_else(AppError::not_found)?;

    let mime = mime_guess::from_path(key).first_or_octet_stream();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.as_ref())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    Ok((headers, bytes))
}
