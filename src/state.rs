use crate::ai::{fake::ScriptedProvider, GeminiClient, NutritionProvider};
use crate::config::AppConfig;
use crate::images::preview::PreviewRegistry;
use crate::meals::{repo::LogStore, review::ReviewWorkflow};
use crate::storage::{FileStorage, MemoryStorage, SlotStorage};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Shared handles for every request.
///
/// When both locks are needed, `review` is taken before `logs`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub logs: Arc<Mutex<LogStore>>,
    pub review: Arc<Mutex<ReviewWorkflow>>,
    pub provider: Arc<dyn NutritionProvider>,
    pub previews: PreviewRegistry,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let storage = Arc::new(FileStorage::new(&config.data_dir).await?) as Arc<dyn SlotStorage>;
        let gemini = GeminiClient::new(&config.gemini, config.ai_timeout)?;
        info!(model = gemini.model(), timeout = ?config.ai_timeout, "Gemini provider configured");
        let provider = Arc::new(gemini) as Arc<dyn NutritionProvider>;

        Ok(Self::from_parts(config, storage, provider).await)
    }

    pub async fn from_parts(
        config: Arc<AppConfig>,
        storage: Arc<dyn SlotStorage>,
        provider: Arc<dyn NutritionProvider>,
    ) -> Self {
        let logs = LogStore::load(storage, config.storage_key.clone()).await;
        Self {
            config,
            logs: Arc::new(Mutex::new(logs)),
            review: Arc::new(Mutex::new(ReviewWorkflow::new())),
            provider,
            previews: PreviewRegistry::new(),
        }
    }

    /// In-memory storage and a provider that always recognises one apple.
    pub async fn fake() -> Self {
        Self::fake_with_provider(Arc::new(ScriptedProvider::text(
            r#"[{"item":"Apple","calories":95,"protein":0.5}]"#,
        )))
        .await
    }

    pub async fn fake_with_provider(provider: Arc<dyn NutritionProvider>) -> Self {
        let config = Arc::new(AppConfig::for_tests());
        let storage = Arc::new(MemoryStorage::new()) as Arc<dyn SlotStorage>;
        Self::from_parts(config, storage, provider).await
    }
}
