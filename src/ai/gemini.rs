//! Google Gemini `generateContent` client.
//!
//! Requests are constrained to `application/json` output with the food-item schema built
//! in [`super::request`], so the returned text is expected to be a JSON array.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, instrument};

use super::{request::GenerateRequest, response::ResponseEnvelope, AnalyzeError, NutritionProvider};
use crate::config::GeminiConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct GeminiClient {
    api_key: String,
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key: config.api_key.clone(),
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn map_api_error(status: u16, response_text: &str) -> AnalyzeError {
        let message = serde_json::from_str::<ErrorBody>(response_text)
            .ok()
            .and_then(|b| b.error)
            .map_or_else(|| response_text.to_owned(), |e| e.message);
        AnalyzeError::Provider { status, message }
    }
}

#[async_trait]
impl NutritionProvider for GeminiClient {
    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn generate(&self, request: &GenerateRequest) -> Result<ResponseEnvelope, AnalyzeError> {
        debug!("sending request to Gemini");
        let response = self
            .client
            .post(self.build_url())
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalyzeError::Timeout(self.timeout)
                } else {
                    AnalyzeError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AnalyzeError::Transport(format!("read response: {e}")))?;

        if !status.is_success() {
            error!(%status, "Gemini API error");
            return Err(Self::map_api_error(status.as_u16(), &text));
        }

        serde_json::from_str::<ResponseEnvelope>(&text).map_err(|e| {
            error!(error = %e, "failed to decode Gemini response");
            AnalyzeError::InvalidEnvelope(e.to_string())
        })
    }
}

impl Debug for GeminiClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}
