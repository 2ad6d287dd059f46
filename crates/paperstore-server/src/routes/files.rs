use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::error::ApiError;
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new().route("/files/{file_id}", get(serve_file))
}

/// Serves PDFs of the local storage backend.
async fn serve_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.serves_files {
        return Err(ApiError::NotFound(file_id));
    }
    let bytes = state.store.download(&file_id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", file_id.replace('"', "")),
            ),
        ],
        bytes,
    ))
}
