pub mod fake;
pub mod gemini;
pub mod request;
pub mod response;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::meals::model::FoodItem;
use request::{build_request, GenerateRequest, InputError, MealInput};
use response::{reconcile, ResponseEnvelope};

pub use gemini::GeminiClient;

/// Everything that can go wrong between a submitted meal and a list of food items.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("request to provider failed: {0}")]
    Transport(String),
    #[error("provider returned status {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),
    #[error("provider response could not be decoded: {0}")]
    InvalidEnvelope(String),
    #[error("no extractable content in provider response")]
    NoContent,
    #[error("malformed content in provider response: {0}")]
    MalformedContent(String),
}

impl AnalyzeError {
    fn short_reason(&self) -> String {
        match self {
            Self::Input(e) => e.to_string(),
            Self::Transport(_) => "could not reach the nutrition service".into(),
            Self::Provider { status: 429, .. } => "the nutrition service is busy, try again shortly".into(),
            Self::Provider { .. } | Self::InvalidEnvelope(_) => "the nutrition service returned an error".into(),
            Self::Timeout(_) => "the nutrition service took too long to answer".into(),
            Self::NoContent => "the nutrition service returned no result".into(),
            Self::MalformedContent(_) => "the nutrition service returned an unreadable result".into(),
        }
    }

    /// Message safe to show to the user; diagnostic detail stays in the logs.
    pub fn user_message(&self) -> String {
        format!("processing failed: {}", self.short_reason())
    }
}

/// A model endpoint that answers a `generateContent` request.
#[async_trait]
pub trait NutritionProvider: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<ResponseEnvelope, AnalyzeError>;
}

/// Builds the request, calls the provider with a deadline and reconciles the answer.
#[instrument(skip(provider, input), fields(has_text = input.text.is_some(), has_image = input.image.is_some()))]
pub async fn analyze_meal(
    provider: &dyn NutritionProvider,
    input: &MealInput,
    timeout: Duration,
) -> Result<Vec<FoodItem>, AnalyzeError> {
    let request = build_request(input)?;
    let envelope = tokio::time::timeout(timeout, provider.generate(&request))
        .await
        .map_err(|_| AnalyzeError::Timeout(timeout))??;
    let items = reconcile(&envelope)?;
    debug!(count = items.len(), "meal analyzed");
    Ok(items)
}

#[cfg(test)]
mod analyze_tests {
    use super::fake::ScriptedProvider;
    use super::*;

    #[tokio::test]
    async fn empty_input_never_reaches_provider() {
        let provider = ScriptedProvider::text("[]");
        let err = analyze_meal(&provider, &MealInput::default(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::Input(InputError::Empty)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn successful_analysis_yields_items() {
        let provider =
            ScriptedProvider::text(r#"[{"item":"Apple","calories":95,"protein":0.5}]"#);
        let input = MealInput::text("an apple").unwrap();
        let items = analyze_meal(&provider, &input, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(items, vec![FoodItem::new("Apple", 95.0, 0.5)]);
        assert_eq!(provider.calls(), 1);
        let sent = provider.last_request().unwrap();
        assert!(serde_json::to_string(&sent).unwrap().contains("an apple"));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let provider = ScriptedProvider::text("[]").with_delay(Duration::from_secs(10));
        let input = MealInput::text("soup").unwrap();
        let err = analyze_meal(&provider, &input, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::Timeout(_)));
    }

    #[test]
    fn user_message_hides_diagnostics() {
        let err = AnalyzeError::MalformedContent("expected value at line 1 column 1".into());
        let msg = err.user_message();
        assert!(msg.starts_with("processing failed: "));
        assert!(!msg.contains("line 1"));

        let err = AnalyzeError::Provider {
            status: 500,
            message: "internal stack trace".into(),
        };
        assert!(!err.user_message().contains("stack"));
        assert_ne!(
            AnalyzeError::NoContent.user_message(),
            AnalyzeError::MalformedContent(String::new()).user_message()
        );
    }
}
