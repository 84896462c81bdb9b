use serde::Deserialize;
use tracing::debug;

use super::AnalyzeError;
use crate::meals::model::FoodItem;

/// Provider response envelope. Depending on the client or API version the payload is
/// either a top-level `text` field or nested under `candidates[0].content.parts[0].text`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default, rename = "finishReason")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidatePart {
    #[serde(default)]
    pub text: Option<String>,
}

/// Where the payload text was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseEncoding<'a> {
    TopLevelText(&'a str),
    CandidatePart(&'a str),
}

impl<'a> ResponseEncoding<'a> {
    pub fn text(self) -> &'a str {
        match self {
            Self::TopLevelText(t) | Self::CandidatePart(t) => t,
        }
    }
}

impl ResponseEnvelope {
    /// Convenience constructor for the top-level form.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            candidates: None,
        }
    }

    /// Constructor for the nested `candidates[0].content.parts[0].text` form.
    pub fn with_candidate_text(text: impl Into<String>) -> Self {
        Self {
            text: None,
            candidates: Some(vec![Candidate {
                content: Some(CandidateContent {
                    parts: vec![CandidatePart {
                        text: Some(text.into()),
                    }],
                }),
                finish_reason: Some("STOP".into()),
            }]),
        }
    }

    fn top_level_text(&self) -> Option<ResponseEncoding<'_>> {
        self.text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(ResponseEncoding::TopLevelText)
    }

    fn first_candidate_text(&self) -> Option<ResponseEncoding<'_>> {
        self.candidates
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.as_deref())
            .filter(|t| !t.trim().is_empty())
            .map(ResponseEncoding::CandidatePart)
    }

    /// Tries each known encoding in order and returns the first that carries text.
    pub fn extract_text(&self) -> Result<ResponseEncoding<'_>, AnalyzeError> {
        self.top_level_text()
            .or_else(|| self.first_candidate_text())
            .ok_or(AnalyzeError::NoContent)
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.finish_reason.as_deref())
    }
}

/// Turns a provider envelope into food items.
///
/// Missing text and unparsable text are reported as different errors. Items are not
/// re-validated beyond number sanitizing; blank names are left for the review step.
pub fn reconcile(envelope: &ResponseEnvelope) -> Result<Vec<FoodItem>, AnalyzeError> {
    let encoding = envelope.extract_text()?;
    debug!(?encoding, finish_reason = ?envelope.finish_reason(), "extracted response text");
    let items: Vec<FoodItem> = serde_json::from_str(encoding.text().trim())
        .map_err(|e| AnalyzeError::MalformedContent(e.to_string()))?;
    Ok(items.into_iter().map(FoodItem::sanitized).collect())
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn top_level_text_is_preferred() {
        let env = ResponseEnvelope::with_text(r#"[{"item":"Apple","calories":95,"protein":0.5}]"#);
        assert_eq!(
            reconcile(&env).unwrap(),
            vec![FoodItem::new("Apple", 95.0, 0.5)]
        );
    }

    #[test]
    fn falls_back_to_first_candidate_part() {
        let env =
            ResponseEnvelope::with_candidate_text(r#"[{"item":"Rice","calories":200,"protein":4}]"#);
        assert!(matches!(
            env.extract_text(),
            Ok(ResponseEncoding::CandidatePart(_))
        ));
        assert_eq!(
            reconcile(&env).unwrap(),
            vec![FoodItem::new("Rice", 200.0, 4.0)]
        );
    }

    #[test]
    fn empty_top_level_text_falls_back() {
        let mut env = ResponseEnvelope::with_candidate_text(r#"[]"#);
        env.text = Some("  ".into());
        assert_eq!(env.extract_text().unwrap(), ResponseEncoding::CandidatePart("[]"));
    }

    #[test]
    fn raw_gemini_json_deserializes() {
        let raw = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "[{\"item\":\"Egg\",\"calories\":78,\"protein\":6}]"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10}
        }"#;
        let env: ResponseEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.finish_reason(), Some("STOP"));
        assert_eq!(reconcile(&env).unwrap(), vec![FoodItem::new("Egg", 78.0, 6.0)]);
    }

    #[test]
    fn no_text_anywhere_is_no_content() {
        assert!(matches!(
            reconcile(&ResponseEnvelope::default()),
            Err(AnalyzeError::NoContent)
        ));
        let env: ResponseEnvelope =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[]}}]}"#).unwrap();
        assert!(matches!(reconcile(&env), Err(AnalyzeError::NoContent)));
        let env: ResponseEnvelope = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(reconcile(&env), Err(AnalyzeError::NoContent)));
    }

    #[test]
    fn unparsable_text_is_malformed_content() {
        let env = ResponseEnvelope::with_text("not json");
        assert!(matches!(
            reconcile(&env),
            Err(AnalyzeError::MalformedContent(_))
        ));
        let env = ResponseEnvelope::with_text(r#"{"item":"Apple"}"#);
        assert!(matches!(
            reconcile(&env),
            Err(AnalyzeError::MalformedContent(_))
        ));
    }

    #[test]
    fn empty_array_is_not_an_error() {
        let env = ResponseEnvelope::with_text("[]");
        assert!(reconcile(&env).unwrap().is_empty());
    }
}
