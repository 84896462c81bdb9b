use std::sync::Arc;

use anyhow::Context;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use super::{model::MealLog, totals::NutritionTotals};
use crate::storage::SlotStorage;

/// Newest-first meal log persisted as one JSON array in a storage slot.
///
/// The only constructor is [`LogStore::load`], so nothing can be saved before the
/// existing slot has been read.
pub struct LogStore {
    storage: Arc<dyn SlotStorage>,
    key: String,
    logs: Vec<MealLog>,
    last_id: i64,
}

impl LogStore {
    /// Reads the slot. Missing or unreadable data yields an empty store, never an error.
    pub async fn load(storage: Arc<dyn SlotStorage>, key: impl Into<String>) -> Self {
        let key = key.into();
        let logs = match storage.get(&key).await {
            Ok(None) => {
                debug!(%key, "no persisted meal logs");
                Vec::new()
            }
            Ok(Some(raw)) => match decode(&raw) {
                Ok(logs) => {
                    info!(%key, count = logs.len(), "loaded meal logs");
                    logs
                }
                Err(e) => {
                    warn!(%key, error = %e, "persisted meal logs are malformed; starting empty");
                    Vec::new()
                }
            },
            Err(e) => {
                error!(%key, error = %e, "failed to read meal logs; starting empty");
                Vec::new()
            }
        };
        let last_id = logs.iter().map(|l| l.id).max().unwrap_or(0);
        Self {
            storage,
            key,
            logs,
            last_id,
        }
    }

    /// Writes the whole sequence. Failures are logged and in-memory state is kept.
    pub async fn save(&self) {
        if let Err(e) = self.persist().await {
            error!(key = %self.key, error = %e, "failed to save meal logs");
        } else {
            debug!(key = %self.key, count = self.logs.len(), "saved meal logs");
        }
    }

    async fn persist(&self) -> anyhow::Result<()> {
        let raw = serde_json::to_string(&self.logs).context("serialize meal logs")?;
        self.storage.set(&self.key, &raw).await
    }

    /// Prepends a committed log. Callers hand in non-empty items and a fresh id from
    /// [`LogStore::next_id`].
    pub(crate) async fn add(&mut self, log: MealLog) {
        debug_assert!(!log.items.is_empty(), "meal log {} has no items", log.id);
        debug_assert!(
            self.logs.iter().all(|l| l.id != log.id),
            "meal log id {} already in use",
            log.id
        );
        self.last_id = self.last_id.max(log.id);
        self.logs.insert(0, log);
        self.save().await;
    }

    /// Removes the log with `id`. Returns whether one was removed.
    pub async fn delete(&mut self, id: i64) -> bool {
        let before = self.logs.len();
        self.logs.retain(|l| l.id != id);
        let removed = self.logs.len() != before;
        self.save().await;
        removed
    }

    pub async fn clear_all(&mut self) {
        self.logs.clear();
        self.save().await;
    }

    pub fn logs(&self) -> &[MealLog] {
        &self.logs
    }

    pub fn totals(&self) -> NutritionTotals {
        NutritionTotals::of_logs(&self.logs)
    }

    /// Millisecond timestamp id, bumped past the last issued id so two meals created in
    /// the same millisecond (or after the clock stepped back) never share one.
    pub fn next_id(&mut self, now: OffsetDateTime) -> i64 {
        let millis = (now.unix_timestamp_nanos() / 1_000_000) as i64;
        let id = millis.max(self.last_id.saturating_add(1));
        self.last_id = id;
        id
    }
}

fn decode(raw: &str) -> anyhow::Result<Vec<MealLog>> {
    let logs: Vec<MealLog> = serde_json::from_str(raw).context("parse meal logs")?;
    let total = logs.len();
    let logs: Vec<MealLog> = logs
        .into_iter()
        // i64::MAX has no successor id, so nothing newer could sort after it
        .filter(|l| !l.items.is_empty() && l.id < i64::MAX)
        .map(|mut l| {
            l.items = l.items.into_iter().map(|i| i.sanitized()).collect();
            l
        })
        .collect();
    if logs.len() != total {
        warn!(dropped = total - logs.len(), "skipped persisted meal logs without items or with an unusable id");
    }
    Ok(logs)
}
