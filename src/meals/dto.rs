use serde::Serialize;

use super::{
    model::{FoodItem, MealLog},
    review::{Phase, ReviewWorkflow},
    totals::NutritionTotals,
};

#[derive(Debug, Serialize)]
pub struct MealLogView {
    #[serde(flatten)]
    pub log: MealLog,
    pub subtotal: NutritionTotals,
}

impl From<&MealLog> for MealLogView {
    fn from(log: &MealLog) -> Self {
        Self {
            subtotal: log.subtotal(),
            log: log.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MealsResponse {
    pub logs: Vec<MealLogView>,
    pub totals: NutritionTotals,
    pub count: usize,
}

impl MealsResponse {
    pub fn new(logs: &[MealLog]) -> Self {
        Self {
            logs: logs.iter().map(MealLogView::from).collect(),
            totals: NutritionTotals::of_logs(logs),
            count: logs.len(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingView {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    pub items: Vec<FoodItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    pub totals: NutritionTotals,
}

impl From<&ReviewWorkflow> for PendingView {
    fn from(wf: &ReviewWorkflow) -> Self {
        match wf.pending() {
            Some(p) => Self {
                phase: wf.phase(),
                original_text: Some(p.input().original_text()),
                items: p.items().to_vec(),
                preview_url: p.preview().map(|pr| pr.url()),
                totals: NutritionTotals::of_items(p.items()),
            },
            None => Self {
                phase: wf.phase(),
                original_text: None,
                items: Vec::new(),
                preview_url: None,
                totals: NutritionTotals::default(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedMealResponse {
    pub log: MealLogView,
    pub totals: NutritionTotals,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
    pub count: usize,
}
