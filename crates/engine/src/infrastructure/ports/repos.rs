//! Store port traits for persistence and files.

use async_trait::async_trait;
use vitrine_domain::{
    ArtifactStatus, CategoryScore, GenerationJob, JobId, JobKind, Scene, SceneId,
    SuccessfulPattern, VerificationRecord,
};

use super::error::{RepoError, StorageError};
use crate::infrastructure::app_settings::ProviderSettings;

// =============================================================================
// Settings Storage
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsRepo: Send + Sync {
    async fn get_provider_settings(&self) -> Result<Option<ProviderSettings>, RepoError>;
    async fn save_provider_settings(&self, settings: &ProviderSettings) -> Result<(), RepoError>;
}

// =============================================================================
// Database Ports
// =============================================================================

/// Scene generation state. Every update touches a single row.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SceneRepo: Send + Sync {
    async fn get(&self, id: SceneId) -> Result<Option<Scene>, RepoError>;
    async fn save(&self, scene: &Scene) -> Result<(), RepoError>;
    async fn update_image_state(
        &self,
        id: SceneId,
        status: ArtifactStatus,
        image_path: Option<String>,
    ) -> Result<(), RepoError>;
    async fn update_video_state(
        &self,
        id: SceneId,
        status: ArtifactStatus,
        video_path: Option<String>,
    ) -> Result<(), RepoError>;
    async fn set_enriched_prompt(&self, id: SceneId, prompt: &str) -> Result<(), RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRepo: Send + Sync {
    async fn create(&self, job: &GenerationJob) -> Result<(), RepoError>;
    async fn get(&self, id: JobId) -> Result<Option<GenerationJob>, RepoError>;
    /// Most recently started job of `kind` for the scene.
    async fn find_latest_for_scene(
        &self,
        scene_id: SceneId,
        kind: JobKind,
    ) -> Result<Option<GenerationJob>, RepoError>;
    async fn update(&self, job: &GenerationJob) -> Result<(), RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatternRepo: Send + Sync {
    /// Insert the pattern, or bump the usage count of the stored
    /// (category, snippet) match. Returns the resulting usage count.
    async fn upsert(&self, pattern: &SuccessfulPattern) -> Result<u32, RepoError>;
    /// Patterns of a category ordered by score desc, then usage desc.
    async fn top_for_category(
        &self,
        category: &str,
        limit: usize,
    ) -> Result<Vec<SuccessfulPattern>, RepoError>;
    /// Delete patterns with usage < `min_usage_count` AND score < `min_score`.
    async fn delete_prunable(&self, min_usage_count: u32, min_score: u8)
        -> Result<u64, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VerificationRepo: Send + Sync {
    async fn record(&self, record: &VerificationRecord) -> Result<(), RepoError>;
    async fn category_averages(&self) -> Result<Vec<CategoryScore>, RepoError>;
}

// =============================================================================
// File Storage
// =============================================================================

/// Byte storage addressed by paths relative to a public root.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError>;
}
