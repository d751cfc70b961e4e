//! Runtime provider selection.
//!
//! Provider settings are re-read from the settings store on every call, so the
//! backend can be switched without restarting the engine.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

use crate::infrastructure::app_settings::{ProviderKind, ProviderSettings};
use crate::infrastructure::dryrun::DryrunProvider;
use crate::infrastructure::gemini::GeminiClient;
use crate::infrastructure::ports::{
    ConsistencyRequest, GeneratedImage, ImageGenerationRequest, OperationHandle, ProviderError,
    ProviderPort, SettingsRepo, VideoGenerationRequest, VideoOperation,
};

/// A concrete backend resolved for one call.
pub enum Backend {
    Gemini(GeminiClient),
    Dryrun(DryrunProvider),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Gemini(_) => crate::infrastructure::gemini::BACKEND,
            Backend::Dryrun(_) => crate::infrastructure::dryrun::BACKEND,
        }
    }

    fn port(&self) -> &dyn ProviderPort {
        match self {
            Backend::Gemini(client) => client,
            Backend::Dryrun(provider) => provider,
        }
    }
}

pub struct ProviderGateway {
    settings: Arc<dyn SettingsRepo>,
    defaults: ProviderSettings,
    http: Client,
}

impl ProviderGateway {
    pub fn new(settings: Arc<dyn SettingsRepo>, defaults: ProviderSettings) -> Self {
        Self {
            settings,
            defaults,
            http: GeminiClient::http_client(),
        }
    }

    /// Stored settings, or the environment defaults when none are stored or
    /// the store cannot be read.
    pub async fn current_settings(&self) -> ProviderSettings {
        match self.settings.get_provider_settings().await {
            Ok(Some(settings)) => settings,
            Ok(None) => self.defaults.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read provider settings, using defaults");
                self.defaults.clone()
            }
        }
    }

    pub async fn backend(&self) -> Result<Backend, ProviderError> {
        let settings = self.current_settings().await;
        let backend = match settings.provider {
            ProviderKind::Gemini => {
                Backend::Gemini(GeminiClient::new(self.http.clone(), &settings)?)
            }
            ProviderKind::Dryrun => Backend::Dryrun(DryrunProvider::new()),
        };
        tracing::debug!(backend = backend.name(), "Resolved provider backend");
        Ok(backend)
    }
}

#[async_trait]
impl ProviderPort for ProviderGateway {
    async fn enrich_prompt(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        let backend = self.backend().await?;
        backend.port().enrich_prompt(system_prompt, user_prompt).await
    }

    async fn generate_image(
        &self,
        request: ImageGenerationRequest,
    ) -> Result<GeneratedImage, ProviderError> {
        let backend = self.backend().await?;
        backend.port().generate_image(request).await
    }

    async fn generate_video_from_image(
        &self,
        request: VideoGenerationRequest,
    ) -> Result<OperationHandle, ProviderError> {
        let backend = self.backend().await?;
        backend.port().generate_video_from_image(request).await
    }

    async fn poll_operation(
        &self,
        handle: &OperationHandle,
    ) -> Result<VideoOperation, ProviderError> {
        let backend = self.backend().await?;
        backend.port().poll_operation(handle).await
    }

    async fn download_video(&self, operation: &VideoOperation) -> Result<Vec<u8>, ProviderError> {
        let backend = self.backend().await?;
        backend.port().download_video(operation).await
    }

    async fn analyze_image_consistency(
        &self,
        request: ConsistencyRequest,
    ) -> Result<String, ProviderError> {
        let backend = self.backend().await?;
        backend.port().analyze_image_consistency(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{MockSettingsRepo, RepoError};

    fn gateway(repo: MockSettingsRepo) -> ProviderGateway {
        ProviderGateway::new(Arc::new(repo), ProviderSettings::default())
    }

    #[tokio::test]
    async fn stored_dryrun_settings_select_dryrun() {
        let mut repo = MockSettingsRepo::new();
        repo.expect_get_provider_settings()
            .returning(|| Ok(Some(ProviderSettings::default())));

        let gateway = gateway(repo);
        assert_eq!(gateway.backend().await.unwrap().name(), "dryrun");

        let enriched = gateway.enrich_prompt("system", "  a chair  ").await.unwrap();
        assert_eq!(enriched, "a chair");
    }

    #[tokio::test]
    async fn gemini_without_key_fails_per_call() {
        let mut repo = MockSettingsRepo::new();
        repo.expect_get_provider_settings().returning(|| {
            Ok(Some(ProviderSettings {
                provider: ProviderKind::Gemini,
                api_key: None,
                ..Default::default()
            }))
        });

        let err = gateway(repo)
            .generate_image(ImageGenerationRequest::new("x"))
            .await
            .unwrap_err();
        assert_eq!(err.status, 401);
        assert_eq!(err.backend, "gemini");
    }

    #[tokio::test]
    async fn settings_are_reread_on_every_call() {
        let mut repo = MockSettingsRepo::new();
        repo.expect_get_provider_settings()
            .times(2)
            .returning(|| Ok(None));

        let gateway = gateway(repo);
        gateway.enrich_prompt("s", "one").await.unwrap();
        gateway.enrich_prompt("s", "two").await.unwrap();
    }

    #[tokio::test]
    async fn unreadable_store_falls_back_to_defaults() {
        let mut repo = MockSettingsRepo::new();
        repo.expect_get_provider_settings()
            .returning(|| Err(RepoError::database("settings", "locked")));

        let settings = gateway(repo).current_settings().await;
        assert_eq!(settings, ProviderSettings::default());
    }
}
