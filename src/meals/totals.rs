use serde::Serialize;

use super::model::{FoodItem, MealLog};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NutritionTotals {
    pub calories: f64,
    pub protein: f64,
}

impl NutritionTotals {
    pub fn of_items<'a>(items: impl IntoIterator<Item = &'a FoodItem>) -> Self {
        items.into_iter().fold(Self::default(), |acc, it| Self {
            calories: acc.calories + it.calories,
            protein: acc.protein + it.protein,
        })
    }

    pub fn of_logs(logs: &[MealLog]) -> Self {
        Self::of_items(logs.iter().flat_map(|log| log.items.iter()))
    }
}

pub fn total_calories(logs: &[MealLog]) -> f64 {
    NutritionTotals::of_logs(logs).calories
}

pub fn total_protein(logs: &[MealLog]) -> f64 {
    NutritionTotals::of_logs(logs).protein
}
