use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use super::{
    request::GenerateRequest,
    response::ResponseEnvelope,
    AnalyzeError, NutritionProvider,
};

#[derive(Debug, Clone)]
enum Reply {
    Envelope(ResponseEnvelope),
    Status(u16, String),
    Transport(String),
}

/// Provider that answers every request with a fixed reply. Used by `AppState::fake`.
#[derive(Debug)]
pub struct ScriptedProvider {
    reply: Reply,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_request: Mutex<Option<GenerateRequest>>,
}

impl ScriptedProvider {
    fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            delay: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Replies with `text` in the top-level text field.
    pub fn text(text: impl Into<String>) -> Self {
        Self::with_reply(Reply::Envelope(ResponseEnvelope::with_text(text)))
    }

    pub fn envelope(envelope: ResponseEnvelope) -> Self {
        Self::with_reply(Reply::Envelope(envelope))
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::with_reply(Reply::Status(status, message.into()))
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::with_reply(Reply::Transport(message.into()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl NutritionProvider for ScriptedProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<ResponseEnvelope, AnalyzeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            Reply::Envelope(env) => Ok(env.clone()),
            Reply::Status(status, message) => Err(AnalyzeError::Provider {
                status: *status,
                message: message.clone(),
            }),
            Reply::Transport(message) => Err(AnalyzeError::Transport(message.clone())),
        }
    }
}
