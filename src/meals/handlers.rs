use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{error, instrument, warn};

use super::{
    dto::{DeletedResponse, MealLogView, MealsResponse, PendingView, SavedMealResponse},
    review::{ItemPatch, ReviewError},
    services::{self, MealError},
};
use crate::ai::{
    request::{ImageInput, InputError, MealInput},
    AnalyzeError,
};
use crate::state::AppState;

// Room for the text field and multipart framing on top of the image itself.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals).delete(clear_meals))
        .route("/meals/:id", axum::routing::delete(delete_meal))
        .route("/meals/pending", get(get_pending))
}

pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/meals/pending/items", post(add_item))
        .route("/meals/pending/items/:index", put(edit_item).delete(remove_item))
        .route("/meals/pending/save", post(save_pending))
        .route("/meals/pending/cancel", post(cancel_pending))
}

pub fn analyze_routes(max_image_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/meals/analyze", post(analyze_meal))
        .route("/meals/quick", post(quick_log))
        .layer(DefaultBodyLimit::max(max_image_bytes + FORM_OVERHEAD_BYTES))
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn list_meals(State(state): State<AppState>) -> Json<MealsResponse> {
    let logs = state.logs.lock().await;
    Json(MealsResponse::new(logs.logs()))
}

#[instrument(skip(state))]
pub async fn clear_meals(State(state): State<AppState>) -> Json<MealsResponse> {
    let mut logs = state.logs.lock().await;
    logs.clear_all().await;
    Json(MealsResponse::new(logs.logs()))
}

#[instrument(skip(state))]
pub async fn delete_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Json<DeletedResponse> {
    let mut logs = state.logs.lock().await;
    let deleted = logs.delete(id).await;
    Json(DeletedResponse {
        deleted,
        count: logs.logs().len(),
    })
}

/// POST /meals/analyze (multipart)
/// Fields: `text` (optional), `image` (optional file). At least one must be present.
#[instrument(skip(state, mp))]
pub async fn analyze_meal(
    State(state): State<AppState>,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<PendingView>), (StatusCode, String)> {
    let input = read_meal_input(&mut mp, state.config.max_image_bytes)
        .await
        .map_err(reject)?;
    let view = services::analyze(&state, input).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// POST /meals/quick (multipart): analyze and save without review.
#[instrument(skip(state, mp))]
pub async fn quick_log(
    State(state): State<AppState>,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<MealLogView>), (StatusCode, String)> {
    let input = read_meal_input(&mut mp, state.config.max_image_bytes)
        .await
        .map_err(reject)?;
    let log = services::quick_log(&state, input).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(MealLogView::from(&log))))
}

#[instrument(skip(state))]
pub async fn get_pending(State(state): State<AppState>) -> Json<PendingView> {
    let review = state.review.lock().await;
    Json(PendingView::from(&*review))
}

#[instrument(skip(state))]
pub async fn add_item(
    State(state): State<AppState>,
) -> Result<Json<PendingView>, (StatusCode, String)> {
    let mut review = state.review.lock().await;
    review.add_item().map_err(|e| reject(e.into()))?;
    Ok(Json(PendingView::from(&*review)))
}

#[instrument(skip(state))]
pub async fn edit_item(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(patch): Json<ItemPatch>,
) -> Result<Json<PendingView>, (StatusCode, String)> {
    let mut review = state.review.lock().await;
    review.edit_item(index, patch).map_err(|e| reject(e.into()))?;
    Ok(Json(PendingView::from(&*review)))
}

#[instrument(skip(state))]
pub async fn remove_item(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<PendingView>, (StatusCode, String)> {
    let mut review = state.review.lock().await;
    review.remove_item(index).map_err(|e| reject(e.into()))?;
    Ok(Json(PendingView::from(&*review)))
}

#[instrument(skip(state))]
pub async fn save_pending(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SavedMealResponse>), (StatusCode, String)> {
    let log = services::save_pending(&state).await.map_err(reject)?;
    let totals = state.logs.lock().await.totals();
    Ok((
        StatusCode::CREATED,
        Json(SavedMealResponse {
            log: MealLogView::from(&log),
            totals,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn cancel_pending(
    State(state): State<AppState>,
) -> Result<Json<PendingView>, (StatusCode, String)> {
    services::cancel_pending(&state).await.map_err(reject)?;
    let review = state.review.lock().await;
    Ok(Json(PendingView::from(&*review)))
}

// --- helpers ---

async fn read_meal_input(mp: &mut Multipart, max_image_bytes: usize) -> Result<MealInput, MealError> {
    let mut text = None;
    let mut image = None;

    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_image_bytes, InputError::MalformedForm))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("text") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, max_image_bytes, InputError::UnreadableText))?;
                text = Some(value);
            }
            Some("image") | Some("file") => {
                let has_file_name = field.file_name().is_some_and(|n| !n.is_empty());
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, max_image_bytes, InputError::UnreadableImage))?;
                // an empty, unnamed file part is what a form sends when no photo was picked
                if data.is_empty() && !has_file_name {
                    continue;
                }
                image = Some(ImageInput::new(content_type, data, max_image_bytes)?);
            }
            _ => {}
        }
    }

    Ok(MealInput::new(text, image)?)
}

fn multipart_error(
    e: MultipartError,
    max_image_bytes: usize,
    unreadable: fn(String) -> InputError,
) -> InputError {
    warn!(error = %e, "unreadable multipart body");
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        // the body limit tripped before the part could be measured
        InputError::TooLarge {
            size: max_image_bytes + 1,
            max: max_image_bytes,
        }
    } else {
        unreadable(e.body_text())
    }
}

fn input_status(e: &InputError) -> StatusCode {
    match e {
        InputError::Empty
        | InputError::UnreadableImage(_)
        | InputError::UnreadableText(_)
        | InputError::MalformedForm(_) => StatusCode::BAD_REQUEST,
        InputError::NotAnImage(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        InputError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
    }
}

fn reject(e: MealError) -> (StatusCode, String) {
    match &e {
        MealError::Analyze(AnalyzeError::Input(input)) => (input_status(input), input.to_string()),
        MealError::Analyze(analyze) => {
            error!(error = %analyze, "meal analysis failed");
            let status = match analyze {
                AnalyzeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            };
            (status, analyze.user_message())
        }
        MealError::NothingFound => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        MealError::Interrupted(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "processing failed: please try again".into(),
        ),
        MealError::Review(review) => {
            let status = match review {
                ReviewError::AnalysisInProgress
                | ReviewError::ReviewOpen
                | ReviewError::StaleAnalysis => StatusCode::CONFLICT,
                ReviewError::NothingToReview | ReviewError::NoSuchItem(_) => StatusCode::NOT_FOUND,
                ReviewError::NoItems => StatusCode::UNPROCESSABLE_ENTITY,
            };
            (status, review.to_string())
        }
    }
}
