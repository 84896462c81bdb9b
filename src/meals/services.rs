use std::future::Future;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::MutexGuard;
use tracing::{error, info, instrument, Instrument};

use super::{
    dto::PendingView,
    model::MealLog,
    review::{AnalysisOutcome, Phase, ReviewError, ReviewWorkflow},
};
use crate::ai::{analyze_meal, request::InputError, request::MealInput, AnalyzeError};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum MealError {
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Analyze(#[from] AnalyzeError),
    #[error("no food could be identified, please try again with more detail")]
    NothingFound,
    #[error("analysis task stopped unexpectedly: {0}")]
    Interrupted(String),
}

impl From<InputError> for MealError {
    fn from(e: InputError) -> Self {
        Self::Analyze(AnalyzeError::Input(e))
    }
}

/// Runs Idle → Analyzing → Reviewing and hands back the locked workflow on success.
///
/// The review lock is released while the provider is called, so other requests see
/// the `Analyzing` phase (and may cancel it) in the meantime.
async fn run_analysis<'a>(
    state: &'a AppState,
    input: &MealInput,
) -> Result<MutexGuard<'a, ReviewWorkflow>, MealError> {
    if input.is_empty() {
        return Err(InputError::Empty.into());
    }
    let ticket = state.review.lock().await.begin_analysis(input)?;

    let result = analyze_meal(state.provider.as_ref(), input, state.config.ai_timeout).await;

    let mut review = state.review.lock().await;
    match review.finish_analysis(ticket, result, &state.previews)? {
        AnalysisOutcome::Reviewing => Ok(review),
        AnalysisOutcome::NothingFound => Err(MealError::NothingFound),
        AnalysisOutcome::Failed(e) => Err(e.into()),
    }
}

/// Drives `task` on its own tokio task, so the workflow still leaves `Analyzing` when
/// the request that started it is dropped.
async fn detach<T, F>(task: F) -> Result<T, MealError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, MealError>> + Send + 'static,
{
    tokio::spawn(task.in_current_span()).await.map_err(|e| {
        error!(error = %e, "analysis task failed");
        MealError::Interrupted(e.to_string())
    })?
}

#[instrument(skip(state, input))]
pub async fn analyze(state: &AppState, input: MealInput) -> Result<PendingView, MealError> {
    let state = state.clone();
    detach(async move {
        let review = run_analysis(&state, &input).await?;
        Ok(PendingView::from(&*review))
    })
    .await
}

/// Analyzes and commits in one step, skipping the review.
#[instrument(skip(state, input))]
pub async fn quick_log(state: &AppState, input: MealInput) -> Result<MealLog, MealError> {
    let state = state.clone();
    detach(async move {
        let mut review = run_analysis(&state, &input).await?;
        let mut logs = state.logs.lock().await;
        match review.save(&mut logs, OffsetDateTime::now_utc()).await {
            Ok(log) => Ok(log),
            Err(ReviewError::NoItems) => {
                review.cancel()?;
                Err(MealError::NothingFound)
            }
            Err(e) => Err(e.into()),
        }
    })
    .await
}

#[instrument(skip(state))]
pub async fn save_pending(state: &AppState) -> Result<MealLog, MealError> {
    let mut review = state.review.lock().await;
    let mut logs = state.logs.lock().await;
    Ok(review.save(&mut logs, OffsetDateTime::now_utc()).await?)
}

#[instrument(skip(state))]
pub async fn cancel_pending(state: &AppState) -> Result<Phase, MealError> {
    let phase = state.review.lock().await.cancel()?;
    info!(?phase, "pending meal discarded");
    Ok(phase)
}
