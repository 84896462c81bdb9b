use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::{
    model::{clamp_nutrient, lenient_patch_number, FoodItem, MealLog},
    repo::LogStore,
};
use crate::ai::{request::MealInput, AnalyzeError};
use crate::images::preview::{ImagePreview, PreviewRegistry};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error("a meal is already being analyzed")]
    AnalysisInProgress,
    #[error("a meal is awaiting review; save or cancel it first")]
    ReviewOpen,
    #[error("no meal is awaiting review")]
    NothingToReview,
    #[error("analysis result is no longer expected")]
    StaleAnalysis,
    #[error("no food item at position {0}")]
    NoSuchItem(usize),
    #[error("please add at least one food item")]
    NoItems,
}

/// Identifies one analysis run. Only the current ticket may complete it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Analyzing,
    Reviewing,
}

/// An analyzed meal the user has not saved yet.
#[derive(Debug)]
pub struct PendingMeal {
    input: MealInput,
    items: Vec<FoodItem>,
    preview: Option<ImagePreview>,
}

impl PendingMeal {
    pub fn input(&self) -> &MealInput {
        &self.input
    }

    pub fn items(&self) -> &[FoodItem] {
        &self.items
    }

    pub fn preview(&self) -> Option<&ImagePreview> {
        self.preview.as_ref()
    }
}

/// Partial edit of one draft item. Numbers that are negative, non-finite or unparsable become 0.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemPatch {
    pub item: Option<String>,
    #[serde(default, deserialize_with = "lenient_patch_number")]
    pub calories: Option<f64>,
    #[serde(default, deserialize_with = "lenient_patch_number")]
    pub protein: Option<f64>,
}

#[derive(Debug)]
pub enum AnalysisOutcome {
    /// A pending meal is open for review.
    Reviewing,
    /// The provider answered but found no food.
    NothingFound,
    Failed(AnalyzeError),
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Analyzing {
        ticket: AnalysisTicket,
        input: MealInput,
    },
    Reviewing(PendingMeal),
}

/// Single-slot review workflow: Idle → Analyzing → Reviewing → (save | cancel) → Idle.
#[derive(Debug, Default)]
pub struct ReviewWorkflow {
    state: State,
    next_ticket: u64,
}

impl ReviewWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Idle => Phase::Idle,
            State::Analyzing { .. } => Phase::Analyzing,
            State::Reviewing(_) => Phase::Reviewing,
        }
    }

    pub fn pending(&self) -> Option<&PendingMeal> {
        match &self.state {
            State::Reviewing(p) => Some(p),
            _ => None,
        }
    }

    fn busy_error(&self) -> Option<ReviewError> {
        match self.state {
            State::Idle => None,
            State::Analyzing { .. } => Some(ReviewError::AnalysisInProgress),
            State::Reviewing(_) => Some(ReviewError::ReviewOpen),
        }
    }

    /// Idle → Analyzing. Rejected while another analysis or review is open.
    pub fn begin_analysis(&mut self, input: &MealInput) -> Result<AnalysisTicket, ReviewError> {
        if let Some(err) = self.busy_error() {
            warn!(phase = ?self.phase(), "analysis rejected: workflow busy");
            return Err(err);
        }
        self.next_ticket += 1;
        let ticket = AnalysisTicket(self.next_ticket);
        self.state = State::Analyzing {
            ticket,
            input: input.clone(),
        };
        debug!(?ticket, "analysis started");
        Ok(ticket)
    }

    /// Analyzing → Reviewing on a non-empty result, otherwise back to Idle.
    pub fn finish_analysis(
        &mut self,
        ticket: AnalysisTicket,
        result: Result<Vec<FoodItem>, AnalyzeError>,
        previews: &PreviewRegistry,
    ) -> Result<AnalysisOutcome, ReviewError> {
        let input = match std::mem::take(&mut self.state) {
            State::Analyzing { ticket: t, input } if t == ticket => input,
            other => {
                self.state = other;
                return Err(ReviewError::StaleAnalysis);
            }
        };

        match result {
            Ok(items) if items.is_empty() => {
                info!("analysis found no food items");
                Ok(AnalysisOutcome::NothingFound)
            }
            Ok(items) => {
                let preview = input.image.as_ref().map(|img| previews.create(img));
                info!(count = items.len(), "meal ready for review");
                self.state = State::Reviewing(PendingMeal {
                    input,
                    items,
                    preview,
                });
                Ok(AnalysisOutcome::Reviewing)
            }
            Err(e) => {
                warn!(error = %e, "analysis failed");
                Ok(AnalysisOutcome::Failed(e))
            }
        }
    }

    fn draft_mut(&mut self) -> Result<&mut Vec<FoodItem>, ReviewError> {
        match &mut self.state {
            State::Reviewing(p) => Ok(&mut p.items),
            State::Analyzing { .. } => Err(ReviewError::AnalysisInProgress),
            State::Idle => Err(ReviewError::NothingToReview),
        }
    }

    pub fn edit_item(&mut self, index: usize, patch: ItemPatch) -> Result<&FoodItem, ReviewError> {
        let items = self.draft_mut()?;
        let item = items.get_mut(index).ok_or(ReviewError::NoSuchItem(index))?;
        if let Some(name) = patch.item {
            item.item = name;
        }
        if let Some(calories) = patch.calories {
            item.calories = clamp_nutrient(calories);
        }
        if let Some(protein) = patch.protein {
            item.protein = clamp_nutrient(protein);
        }
        Ok(item)
    }

    /// Appends a blank item and returns its position.
    pub fn add_item(&mut self) -> Result<usize, ReviewError> {
        let items = self.draft_mut()?;
        items.push(FoodItem::default());
        Ok(items.len() - 1)
    }

    pub fn remove_item(&mut self, index: usize) -> Result<FoodItem, ReviewError> {
        let items = self.draft_mut()?;
        if index >= items.len() {
            return Err(ReviewError::NoSuchItem(index));
        }
        Ok(items.remove(index))
    }

    /// Reviewing → Idle, committing the draft to `store`.
    ///
    /// Items with blank names are dropped. With nothing left the save is rejected and
    /// the review stays open.
    pub async fn save(
        &mut self,
        store: &mut LogStore,
        now: OffsetDateTime,
    ) -> Result<MealLog, ReviewError> {
        let items: Vec<FoodItem> = self
            .draft_mut()?
            .iter()
            .filter(|i| !i.is_blank())
            .map(|i| FoodItem::new(i.item.trim(), i.calories, i.protein))
            .collect();
        if items.is_empty() {
            warn!("save rejected: no named food items");
            return Err(ReviewError::NoItems);
        }

        let pending = match std::mem::take(&mut self.state) {
            State::Reviewing(pending) => pending,
            other => {
                self.state = other;
                return Err(ReviewError::NothingToReview);
            }
        };
        let log = MealLog {
            id: store.next_id(now),
            timestamp: now,
            original_text: pending.input.original_text(),
            items,
        };
        store.add(log.clone()).await;
        if let Some(preview) = pending.preview {
            preview.release();
        }
        info!(id = log.id, count = log.items.len(), "meal saved");
        Ok(log)
    }

    /// Leaves Reviewing (discarding the draft) or Analyzing (abandoning the run).
    pub fn cancel(&mut self) -> Result<Phase, ReviewError> {
        let previous = self.phase();
        match std::mem::take(&mut self.state) {
            State::Idle => Err(ReviewError::NothingToReview),
            State::Analyzing { ticket, .. } => {
                info!(?ticket, "analysis abandoned");
                Ok(previous)
            }
            State::Reviewing(pending) => {
                if let Some(preview) = pending.preview {
                    preview.release();
                }
                info!("review cancelled");
                Ok(previous)
            }
        }
    }
}

#[cfg(test)]
mod review_tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use time::macros::datetime;

    use super::*;
    use crate::ai::request::ImageInput;
    use crate::storage::MemoryStorage;

    fn apple() -> Vec<FoodItem> {
        vec![FoodItem::new("Apple", 95.0, 0.5)]
    }

    fn photo_input() -> MealInput {
        let image = ImageInput::new("image/jpeg", Bytes::from_static(b"jpeg"), 1024).unwrap();
        MealInput::new(None, Some(image)).unwrap()
    }

    async fn store() -> LogStore {
        LogStore::load(Arc::new(MemoryStorage::new()), "mealLogs").await
    }

    fn reviewing(items: Vec<FoodItem>, input: MealInput, previews: &PreviewRegistry) -> ReviewWorkflow {
        let mut wf = ReviewWorkflow::new();
        let ticket = wf.begin_analysis(&input).unwrap();
        let outcome = wf.finish_analysis(ticket, Ok(items), previews).unwrap();
        assert!(matches!(outcome, AnalysisOutcome::Reviewing));
        wf
    }

    #[test]
    fn second_submission_is_rejected_while_busy() {
        let previews = PreviewRegistry::new();
        let mut wf = ReviewWorkflow::new();
        let input = MealInput::text("apple").unwrap();
        let ticket = wf.begin_analysis(&input).unwrap();
        assert_eq!(wf.phase(), Phase::Analyzing);
        assert_eq!(
            wf.begin_analysis(&input).unwrap_err(),
            ReviewError::AnalysisInProgress
        );

        wf.finish_analysis(ticket, Ok(apple()), &previews).unwrap();
        assert_eq!(wf.phase(), Phase::Reviewing);
        assert_eq!(wf.begin_analysis(&input).unwrap_err(), ReviewError::ReviewOpen);
        assert_eq!(wf.pending().unwrap().items(), apple().as_slice());
    }

    #[test]
    fn empty_or_failed_analysis_returns_to_idle() {
        let previews = PreviewRegistry::new();
        let mut wf = ReviewWorkflow::new();
        let input = photo_input();

        let ticket = wf.begin_analysis(&input).unwrap();
        let outcome = wf.finish_analysis(ticket, Ok(vec![]), &previews).unwrap();
        assert!(matches!(outcome, AnalysisOutcome::NothingFound));
        assert_eq!(wf.phase(), Phase::Idle);

        let ticket = wf.begin_analysis(&input).unwrap();
        let outcome = wf
            .finish_analysis(ticket, Err(AnalyzeError::NoContent), &previews)
            .unwrap();
        assert!(matches!(outcome, AnalysisOutcome::Failed(AnalyzeError::NoContent)));
        assert_eq!(wf.phase(), Phase::Idle);
        assert!(wf.pending().is_none());
        assert!(previews.is_empty());
    }

    #[test]
    fn cancelled_analysis_cannot_complete() {
        let previews = PreviewRegistry::new();
        let mut wf = ReviewWorkflow::new();
        let input = MealInput::text("apple").unwrap();
        let old = wf.begin_analysis(&input).unwrap();
        assert_eq!(wf.cancel().unwrap(), Phase::Analyzing);

        let new = wf.begin_analysis(&input).unwrap();
        assert_eq!(
            wf.finish_analysis(old, Ok(apple()), &previews).unwrap_err(),
            ReviewError::StaleAnalysis
        );
        assert_eq!(wf.phase(), Phase::Analyzing);
        wf.finish_analysis(new, Ok(apple()), &previews).unwrap();
        assert_eq!(wf.phase(), Phase::Reviewing);
    }

    #[test]
    fn draft_edits_stay_in_memory() {
        let previews = PreviewRegistry::new();
        let mut wf = reviewing(apple(), MealInput::text("apple").unwrap(), &previews);

        let edited = wf
            .edit_item(
                0,
                ItemPatch {
                    item: Some("Green apple".into()),
                    calories: Some(-3.0),
                    protein: None,
                },
            )
            .unwrap();
        assert_eq!(edited, &FoodItem::new("Green apple", 0.0, 0.5));

        assert_eq!(wf.add_item().unwrap(), 1);
        assert_eq!(wf.pending().unwrap().items()[1], FoodItem::default());
        assert_eq!(wf.remove_item(1).unwrap(), FoodItem::default());
        assert_eq!(wf.remove_item(5).unwrap_err(), ReviewError::NoSuchItem(5));
        assert_eq!(
            wf.edit_item(3, ItemPatch::default()).unwrap_err(),
            ReviewError::NoSuchItem(3)
        );
    }

    #[test]
    fn patch_numbers_are_coerced() {
        let patch: ItemPatch =
            serde_json::from_str(r#"{"calories":"abc","protein":"12.5"}"#).unwrap();
        assert_eq!(patch.item, None);
        assert_eq!(patch.calories, Some(0.0));
        assert_eq!(patch.protein, Some(12.5));

        let patch: ItemPatch = serde_json::from_str(r#"{"item":"Tea","protein":null}"#).unwrap();
        assert_eq!(patch.item.as_deref(), Some("Tea"));
        assert_eq!(patch.calories, None);
        assert_eq!(patch.protein, None);
    }

    #[test]
    fn edits_need_an_open_review() {
        let mut wf = ReviewWorkflow::new();
        assert_eq!(wf.add_item().unwrap_err(), ReviewError::NothingToReview);
        assert_eq!(wf.cancel().unwrap_err(), ReviewError::NothingToReview);
    }

    #[tokio::test]
    async fn save_rejects_blank_only_drafts() {
        let previews = PreviewRegistry::new();
        let mut store = store().await;
        let mut wf = reviewing(
            vec![FoodItem::new("  ", 10.0, 1.0)],
            MealInput::text("mystery").unwrap(),
            &previews,
        );
        let now = datetime!(2024-05-01 12:00:00 UTC);
        assert_eq!(wf.save(&mut store, now).await.unwrap_err(), ReviewError::NoItems);
        assert_eq!(wf.phase(), Phase::Reviewing);

        wf.remove_item(0).unwrap();
        assert_eq!(wf.save(&mut store, now).await.unwrap_err(), ReviewError::NoItems);
        assert!(store.logs().is_empty());
    }

    #[tokio::test]
    async fn save_commits_named_items_and_releases_preview() {
        let previews = PreviewRegistry::new();
        let mut store = store().await;
        let mut wf = reviewing(
            vec![FoodItem::new(" Rice ", 200.0, 4.0), FoodItem::new("", 50.0, 1.0)],
            photo_input(),
            &previews,
        );
        assert_eq!(previews.len(), 1);

        let now = datetime!(2024-05-01 12:00:00.5 UTC);
        let log = wf.save(&mut store, now).await.unwrap();
        assert_eq!(log.items, vec![FoodItem::new("Rice", 200.0, 4.0)]);
        assert_eq!(log.original_text, "Photo upload");
        assert_eq!(log.id, 1714564800500);
        assert_eq!(log.timestamp, now);
        assert_eq!(store.logs(), &[log]);
        assert_eq!(wf.phase(), Phase::Idle);
        assert!(previews.is_empty());
    }

    #[tokio::test]
    async fn cancel_discards_draft_and_releases_preview() {
        let previews = PreviewRegistry::new();
        let store = store().await;
        let mut wf = reviewing(apple(), photo_input(), &previews);
        assert_eq!(previews.len(), 1);

        assert_eq!(wf.cancel().unwrap(), Phase::Reviewing);
        assert_eq!(wf.phase(), Phase::Idle);
        assert!(previews.is_empty());
        assert!(store.logs().is_empty());
    }
}
