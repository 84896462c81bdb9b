pub mod preview;
pub mod services;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::state::AppState;
use services::ext_from_mime;

pub fn router() -> Router<AppState> {
    Router::new().route("/previews/:id", get(get_preview))
}

/// Serves the photo attached to the open review. Gone once the review is saved or cancelled.
#[instrument(skip(state))]
pub async fn get_preview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let Some(preview) = state.previews.get(id) else {
        debug!(%id, "preview not found");
        return Err((StatusCode::NOT_FOUND, "Preview not found".into()));
    };
    let filename = match ext_from_mime(&preview.content_type) {
        Some(ext) => format!("inline; filename=\"meal-{id}.{ext}\""),
        None => "inline".to_string(),
    };
    Ok((
        [
            (header::CONTENT_TYPE, preview.content_type),
            (header::CACHE_CONTROL, "no-store".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        preview.body,
    ))
}
