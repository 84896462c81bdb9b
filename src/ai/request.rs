use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::images::services::validate_image;
use crate::meals::model::PHOTO_PLACEHOLDER;

const BASE_INSTRUCTION: &str = "Analyze this meal and return a JSON array of food items with \
estimated calories and protein (g). Each element must have the fields \"item\" (string), \
\"calories\" (number) and \"protein\" (number).";
const IMAGE_INSTRUCTION: &str = " Analyze the food in the image.";

/// Rejections that happen before anything is sent to the provider.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("add a meal description or upload a photo")]
    Empty,
    #[error("please upload an image file (got {0})")]
    NotAnImage(String),
    #[error("image must be smaller than {max} bytes (got {size})")]
    TooLarge { size: usize, max: usize },
    #[error("could not read the uploaded image: {0}")]
    UnreadableImage(String),
    #[error("could not read the meal description: {0}")]
    UnreadableText(String),
    #[error("could not read the submitted form: {0}")]
    MalformedForm(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub mime_type: String,
    pub data: Bytes,
}

impl ImageInput {
    /// Accepts `data` only if it is an `image/*` type no larger than `max_bytes`.
    pub fn new(
        mime_type: impl Into<String>,
        data: Bytes,
        max_bytes: usize,
    ) -> Result<Self, InputError> {
        let mime_type = mime_type.into().trim().to_ascii_lowercase();
        validate_image(&mime_type, data.len(), max_bytes)?;
        Ok(Self { mime_type, data })
    }
}

/// What the user submitted for one analysis. Holds text, an image, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MealInput {
    pub text: Option<String>,
    pub image: Option<ImageInput>,
}

impl MealInput {
    pub fn new(text: Option<String>, image: Option<ImageInput>) -> Result<Self, InputError> {
        let text = text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let input = Self { text, image };
        if input.is_empty() {
            return Err(InputError::Empty);
        }
        Ok(input)
    }

    pub fn text(text: impl Into<String>) -> Result<Self, InputError> {
        Self::new(Some(text.into()), None)
    }

    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, |t| t.trim().is_empty()) && self.image.is_none()
    }

    /// Text recorded on the committed log.
    pub fn original_text(&self) -> String {
        match &self.text {
            Some(t) => t.clone(),
            None => PHOTO_PLACEHOLDER.to_string(),
        }
    }
}

// Gemini `generateContent` request body.

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Part {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    pub response_schema: Value,
}

/// Array of `{item: string, calories: number, protein: number}`, all fields required.
pub fn food_items_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "item": { "type": "STRING" },
                "calories": { "type": "NUMBER" },
                "protein": { "type": "NUMBER" }
            },
            "required": ["item", "calories", "protein"]
        }
    })
}

pub fn instruction_for(input: &MealInput) -> String {
    let mut prompt = String::from(BASE_INSTRUCTION);
    if input.image.is_some() {
        prompt.push_str(IMAGE_INSTRUCTION);
    }
    if let Some(text) = &input.text {
        prompt.push_str(&format!(" Additional context from the user: \"{text}\""));
    }
    prompt
}

/// Builds the provider payload: inline image first (if any), then the instruction.
pub fn build_request(input: &MealInput) -> Result<GenerateRequest, InputError> {
    if input.is_empty() {
        return Err(InputError::Empty);
    }

    let mut parts = Vec::with_capacity(2);
    if let Some(image) = &input.image {
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: STANDARD.encode(&image.data),
            },
        });
    }
    parts.push(Part::Text {
        text: instruction_for(input),
    });

    Ok(GenerateRequest {
        contents: vec![Content {
            role: "user".into(),
            parts,
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json".into(),
            response_schema: food_items_schema(),
        },
    })
}
