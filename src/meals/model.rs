use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use super::totals::NutritionTotals;

/// Shown as a log's original text when the meal was submitted as a photo only.
pub const PHOTO_PLACEHOLDER: &str = "Photo upload";

/// One food with its estimated nutrition.
///
/// Deserialization is lenient: model output and old persisted data may omit fields or
/// carry them as strings, so a missing name becomes empty and a missing or unparsable
/// number becomes 0.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FoodItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub item: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub calories: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub protein: f64,
}

impl FoodItem {
    pub fn new(item: impl Into<String>, calories: f64, protein: f64) -> Self {
        Self {
            item: item.into(),
            calories: clamp_nutrient(calories),
            protein: clamp_nutrient(protein),
        }
    }

    /// Same item with negative or non-finite numbers forced to 0.
    pub fn sanitized(self) -> Self {
        Self::new(self.item, self.calories, self.protein)
    }

    pub fn is_blank(&self) -> bool {
        self.item.trim().is_empty()
    }
}

pub(crate) fn clamp_nutrient(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let n = match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(clamp_nutrient(n))
}

/// For partial edits: absent or null stays `None`, anything else is read like
/// [`FoodItem`] numbers.
pub(crate) fn lenient_patch_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(clamp_nutrient(n.as_f64().unwrap_or(0.0))),
        Some(Value::String(s)) => Some(clamp_nutrient(s.trim().parse::<f64>().unwrap_or(0.0))),
        Some(_) => Some(0.0),
    })
}

/// A committed meal. `items` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealLog {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub original_text: String,
    pub items: Vec<FoodItem>,
}

impl MealLog {
    pub fn subtotal(&self) -> NutritionTotals {
        NutritionTotals::of_items(&self.items)
    }
}

#[cfg(test)]
mod model_tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn food_item_tolerates_missing_and_stringly_fields() {
        let items: Vec<FoodItem> = serde_json::from_str(
            r#"[{"item":"Toast"},{"calories":"120","protein":null},{"item":"Egg","calories":-5,"protein":6.5}]"#,
        )
        .unwrap();
        assert_eq!(items[0], FoodItem::new("Toast", 0.0, 0.0));
        assert_eq!(items[1], FoodItem::new("", 120.0, 0.0));
        assert_eq!(items[2], FoodItem::new("Egg", 0.0, 6.5));
        assert!(items[1].is_blank());
    }

    #[test]
    fn sanitized_clamps_non_finite() {
        let item = FoodItem {
            item: "Soup".into(),
            calories: f64::NAN,
            protein: f64::INFINITY,
        }
        .sanitized();
        assert_eq!(item, FoodItem::new("Soup", 0.0, 0.0));
    }

    #[test]
    fn meal_log_serializes_camel_case_with_iso_timestamp() {
        let log = MealLog {
            id: 1714564800123,
            timestamp: datetime!(2024-05-01 12:00:00.123 UTC),
            original_text: "Oats".into(),
            items: vec![FoodItem::new("Oats", 150.0, 5.0)],
        };
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["originalText"], "Oats");
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00.123Z");
        assert_eq!(json["items"][0]["calories"], 150.0);
    }

    #[test]
    fn meal_log_reads_browser_style_timestamps() {
        let log: MealLog = serde_json::from_str(
            r#"{"id":1,"timestamp":"2024-05-01T12:00:00.123Z","originalText":"x","items":[{"item":"a","calories":1,"protein":2}]}"#,
        )
        .unwrap();
        assert_eq!(log.timestamp, datetime!(2024-05-01 12:00:00.123 UTC));
    }
}
