//! In-memory store for tests and ephemeral runs.
//!
//! Implements every persistence port, plus the file store, over
//! `RwLock`-guarded maps. Nothing is written to disk.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use vitrine_domain::{
    ArtifactStatus, CategoryScore, GenerationJob, JobId, JobKind, PatternId, Scene, SceneId,
    SuccessfulPattern, VerificationRecord,
};

use crate::infrastructure::app_settings::ProviderSettings;
use crate::infrastructure::ports::{
    FileStore, JobRepo, PatternRepo, RepoError, SceneRepo, SettingsRepo, StorageError,
    VerificationRepo,
};

#[derive(Default)]
pub struct InMemoryStore {
    scenes: RwLock<HashMap<SceneId, Scene>>,
    jobs: RwLock<Vec<GenerationJob>>,
    patterns: RwLock<HashMap<PatternId, SuccessfulPattern>>,
    verifications: RwLock<Vec<VerificationRecord>>,
    settings: RwLock<Option<ProviderSettings>>,
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SceneRepo for InMemoryStore {
    async fn get(&self, id: SceneId) -> Result<Option<Scene>, RepoError> {
        Ok(self.scenes.read().await.get(&id).cloned())
    }

    async fn save(&self, scene: &Scene) -> Result<(), RepoError> {
        self.scenes.write().await.insert(scene.id, scene.clone());
        Ok(())
    }

    async fn update_image_state(
        &self,
        id: SceneId,
        status: ArtifactStatus,
        image_path: Option<String>,
    ) -> Result<(), RepoError> {
        let mut scenes = self.scenes.write().await;
        let scene = scenes
            .get_mut(&id)
            .ok_or_else(|| RepoError::not_found("Scene", id))?;
        scene.image_status = status;
        if image_path.is_some() {
            scene.image_path = image_path;
        }
        Ok(())
    }

    async fn update_video_state(
        &self,
        id: SceneId,
        status: ArtifactStatus,
        video_path: Option<String>,
    ) -> Result<(), RepoError> {
        let mut scenes = self.scenes.write().await;
        let scene = scenes
            .get_mut(&id)
            .ok_or_else(|| RepoError::not_found("Scene", id))?;
        scene.video_status = status;
        if video_path.is_some() {
            scene.video_path = video_path;
        }
        Ok(())
    }

    async fn set_enriched_prompt(&self, id: SceneId, prompt: &str) -> Result<(), RepoError> {
        let mut scenes = self.scenes.write().await;
        let scene = scenes
            .get_mut(&id)
            .ok_or_else(|| RepoError::not_found("Scene", id))?;
        scene.enriched_prompt = Some(prompt.to_string());
        Ok(())
    }
}

#[async_trait]
impl JobRepo for InMemoryStore {
    async fn create(&self, job: &GenerationJob) -> Result<(), RepoError> {
        let mut jobs = self.jobs.write().await;
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(RepoError::constraint(format!("Job {} already exists", job.id)));
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<GenerationJob>, RepoError> {
        Ok(self.jobs.read().await.iter().find(|j| j.id == id).cloned())
    }

    async fn find_latest_for_scene(
        &self,
        scene_id: SceneId,
        kind: JobKind,
    ) -> Result<Option<GenerationJob>, RepoError> {
        // Later insertions win ties on started_at.
        let jobs = self.jobs.read().await;
        Ok(jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.scene_id == scene_id && j.kind == kind)
            .max_by_key(|(idx, j)| (j.started_at, *idx))
            .map(|(_, j)| j.clone()))
    }

    async fn update(&self, job: &GenerationJob) -> Result<(), RepoError> {
        let mut jobs = self.jobs.write().await;
        let slot = jobs
            .iter_mut()
            .find(|j| j.id == job.id)
            .ok_or_else(|| RepoError::not_found("GenerationJob", job.id))?;
        *slot = job.clone();
        Ok(())
    }
}

#[async_trait]
impl PatternRepo for InMemoryStore {
    async fn upsert(&self, pattern: &SuccessfulPattern) -> Result<u32, RepoError> {
        let mut patterns = self.patterns.write().await;
        if let Some(existing) = patterns
            .values_mut()
            .find(|p| p.category == pattern.category && p.snippet == pattern.snippet)
        {
            existing.usage_count = existing.usage_count.saturating_add(1);
            return Ok(existing.usage_count);
        }
        patterns.insert(pattern.id, pattern.clone());
        Ok(pattern.usage_count)
    }

    async fn top_for_category(
        &self,
        category: &str,
        limit: usize,
    ) -> Result<Vec<SuccessfulPattern>, RepoError> {
        let patterns = self.patterns.read().await;
        let mut matching: Vec<SuccessfulPattern> = patterns
            .values()
            .filter(|p| p.category == category)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(b.usage_count.cmp(&a.usage_count))
                .then(a.created_at.cmp(&b.created_at))
        });
        matching.truncate(limit);
        Ok(matching)
    }

    async fn delete_prunable(&self, min_usage_count: u32, min_score: u8) -> Result<u64, RepoError> {
        let mut patterns = self.patterns.write().await;
        let before = patterns.len();
        patterns.retain(|_, p| !p.is_prunable(min_usage_count, min_score));
        Ok((before - patterns.len()) as u64)
    }
}

#[async_trait]
impl VerificationRepo for InMemoryStore {
    async fn record(&self, record: &VerificationRecord) -> Result<(), RepoError> {
        self.verifications.write().await.push(record.clone());
        Ok(())
    }

    async fn category_averages(&self) -> Result<Vec<CategoryScore>, RepoError> {
        let records = self.verifications.read().await;
        let mut totals: HashMap<&str, (u64, u32)> = HashMap::new();
        for record in records.iter() {
            let entry = totals.entry(record.category.as_str()).or_default();
            entry.0 += u64::from(record.score.value());
            entry.1 += 1;
        }

        let mut scores: Vec<CategoryScore> = totals
            .into_iter()
            .map(|(category, (sum, samples))| CategoryScore {
                category: category.to_string(),
                average_score: sum as f64 / f64::from(samples),
                samples,
            })
            .collect();
        scores.sort_by(|a, b| a.category.cmp(&b.category));
        Ok(scores)
    }
}

#[async_trait]
impl SettingsRepo for InMemoryStore {
    async fn get_provider_settings(&self) -> Result<Option<ProviderSettings>, RepoError> {
        Ok(self.settings.read().await.clone())
    }

    async fn save_provider_settings(&self, settings: &ProviderSettings) -> Result<(), RepoError> {
        *self.settings.write().await = Some(settings.clone());
        Ok(())
    }
}

/// Paths are keyed without the leading `/` or `/public/` prefix, matching
/// how the local file store resolves them.
fn file_key(path: &str) -> String {
    let trimmed = path.strip_prefix("/public/").unwrap_or(path);
    trimmed.trim_start_matches('/').to_string()
}

#[async_trait]
impl FileStore for InMemoryStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.files
            .read()
            .await
            .get(&file_key(path))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let key = file_key(path);
        if key.is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        self.files.write().await.insert(key, bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vitrine_domain::VerificationScore;

    #[tokio::test]
    async fn latest_job_prefers_later_insert_on_equal_timestamps() {
        let store = InMemoryStore::new();
        let scene_id = SceneId::new();
        let now = Utc::now();
        let first = GenerationJob::video(scene_id, 4, now);
        let second = GenerationJob::video(scene_id, 8, now);
        store.create(&first).await.unwrap();
        store.create(&second).await.unwrap();

        let latest = store
            .find_latest_for_scene(scene_id, JobKind::Video)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[tokio::test]
    async fn averages_group_by_category() {
        let store = InMemoryStore::new();
        for (category, value) in [("wood", 80), ("wood", 90), ("metal", 40)] {
            store
                .record(&VerificationRecord {
                    category: category.into(),
                    score: VerificationScore::new(value).unwrap(),
                    recorded_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let averages = store.category_averages().await.unwrap();
        assert_eq!(averages[0].category, "metal");
        assert_eq!(averages[1].average_score, 85.0);
    }

    #[tokio::test]
    async fn files_resolve_public_prefix() {
        let store = InMemoryStore::new();
        FileStore::write(&store, "/public/images/a.png", b"png").await.unwrap();

        assert_eq!(FileStore::read(&store, "images/a.png").await.unwrap(), b"png");
        assert!(matches!(
            FileStore::read(&store, "images/missing.png").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
