//! SQLite persistence for scenes, jobs, patterns and verification history.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use vitrine_domain::{
    ArtifactStatus, CategoryScore, GenerationJob, JobId, JobKind, Material, PatternId, Scene,
    SceneId, SuccessfulPattern, VerificationRecord, VerificationScore,
};

use crate::infrastructure::ports::{JobRepo, PatternRepo, RepoError, SceneRepo, VerificationRepo};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS scenes (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        image_status TEXT NOT NULL DEFAULT 'none',
        video_status TEXT NOT NULL DEFAULT 'none',
        image_path TEXT,
        video_path TEXT,
        enriched_prompt TEXT,
        materials_json TEXT NOT NULL DEFAULT '[]'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS generation_jobs (
        id TEXT PRIMARY KEY NOT NULL,
        scene_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        status TEXT NOT NULL,
        operation_handle TEXT,
        cost_estimate REAL NOT NULL,
        error_message TEXT,
        started_at TEXT NOT NULL,
        completed_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_generation_jobs_scene ON generation_jobs (scene_id, kind, started_at)",
    r#"
    CREATE TABLE IF NOT EXISTS successful_patterns (
        id TEXT PRIMARY KEY NOT NULL,
        category TEXT NOT NULL,
        snippet TEXT NOT NULL,
        score INTEGER NOT NULL,
        usage_count INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        UNIQUE (category, snippet)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS verification_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        category TEXT NOT NULL,
        score INTEGER NOT NULL,
        recorded_at TEXT NOT NULL
    )
    "#,
];

/// SQLite implementation of the scene, job, pattern and verification stores.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and apply the schema.
    pub async fn open(db_path: &str) -> Result<Self, RepoError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| RepoError::database("connect", e))?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database, one connection so every query sees it.
    pub async fn in_memory() -> Result<Self, RepoError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| RepoError::database("connect", e))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, RepoError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| RepoError::database("migrate", e))?;
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// =============================================================================
// Row conversion
// =============================================================================

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepoError::serialization(format!("Invalid timestamp '{value}': {e}")))
}

fn parse_uuid(value: &str) -> Result<Uuid, RepoError> {
    Uuid::parse_str(value)
        .map_err(|e| RepoError::serialization(format!("Invalid id '{value}': {e}")))
}

fn parse_field<T>(value: &str) -> Result<T, RepoError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| RepoError::serialization(e))
}

fn row_to_scene(row: &SqliteRow) -> Result<Scene, RepoError> {
    let id: String = row.get("id");
    let image_status: String = row.get("image_status");
    let video_status: String = row.get("video_status");
    let materials_json: String = row.get("materials_json");
    let materials: Vec<Material> =
        serde_json::from_str(&materials_json).map_err(RepoError::serialization)?;

    Ok(Scene {
        id: SceneId::from_uuid(parse_uuid(&id)?),
        name: row.get("name"),
        image_status: parse_field(&image_status)?,
        video_status: parse_field(&video_status)?,
        image_path: row.get("image_path"),
        video_path: row.get("video_path"),
        enriched_prompt: row.get("enriched_prompt"),
        materials,
    })
}

fn row_to_job(row: &SqliteRow) -> Result<GenerationJob, RepoError> {
    let id: String = row.get("id");
    let scene_id: String = row.get("scene_id");
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    let started_at: String = row.get("started_at");
    let completed_at: Option<String> = row.get("completed_at");

    Ok(GenerationJob {
        id: JobId::from_uuid(parse_uuid(&id)?),
        scene_id: SceneId::from_uuid(parse_uuid(&scene_id)?),
        kind: parse_field(&kind)?,
        status: parse_field(&status)?,
        operation_handle: row.get("operation_handle"),
        cost_estimate: row.get("cost_estimate"),
        error_message: row.get("error_message"),
        started_at: parse_timestamp(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn row_to_pattern(row: &SqliteRow) -> Result<SuccessfulPattern, RepoError> {
    let id: String = row.get("id");
    let score: i64 = row.get("score");
    let usage_count: i64 = row.get("usage_count");
    let created_at: String = row.get("created_at");

    let score = u8::try_from(score)
        .map_err(|_| RepoError::serialization(format!("Score out of range: {score}")))
        .and_then(|s| VerificationScore::new(s).map_err(RepoError::serialization))?;

    Ok(SuccessfulPattern {
        id: PatternId::from_uuid(parse_uuid(&id)?),
        category: row.get("category"),
        snippet: row.get("snippet"),
        score,
        usage_count: u32::try_from(usage_count).unwrap_or(u32::MAX),
        created_at: parse_timestamp(&created_at)?,
    })
}

// =============================================================================
// Scene store
// =============================================================================

#[async_trait]
impl SceneRepo for SqliteStore {
    async fn get(&self, id: SceneId) -> Result<Option<Scene>, RepoError> {
        let row = sqlx::query("SELECT * FROM scenes WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("scene_get", e))?;
        row.as_ref().map(row_to_scene).transpose()
    }

    async fn save(&self, scene: &Scene) -> Result<(), RepoError> {
        let materials = serde_json::to_string(&scene.materials).map_err(RepoError::serialization)?;
        sqlx::query(
            r#"
            INSERT INTO scenes (id, name, image_status, video_status, image_path, video_path, enriched_prompt, materials_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                image_status = excluded.image_status,
                video_status = excluded.video_status,
                image_path = excluded.image_path,
                video_path = excluded.video_path,
                enriched_prompt = excluded.enriched_prompt,
                materials_json = excluded.materials_json
            "#,
        )
        .bind(scene.id.to_string())
        .bind(&scene.name)
        .bind(scene.image_status.to_string())
        .bind(scene.video_status.to_string())
        .bind(&scene.image_path)
        .bind(&scene.video_path)
        .bind(&scene.enriched_prompt)
        .bind(materials)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("scene_save", e))?;
        Ok(())
    }

    async fn update_image_state(
        &self,
        id: SceneId,
        status: ArtifactStatus,
        image_path: Option<String>,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE scenes SET image_status = ?, image_path = COALESCE(?, image_path) WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(image_path)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("scene_update_image", e))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Scene", id));
        }
        Ok(())
    }

    async fn update_video_state(
        &self,
        id: SceneId,
        status: ArtifactStatus,
        video_path: Option<String>,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE scenes SET video_status = ?, video_path = COALESCE(?, video_path) WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(video_path)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("scene_update_video", e))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Scene", id));
        }
        Ok(())
    }

    async fn set_enriched_prompt(&self, id: SceneId, prompt: &str) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE scenes SET enriched_prompt = ? WHERE id = ?")
            .bind(prompt)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::database("scene_set_prompt", e))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Scene", id));
        }
        Ok(())
    }
}

// =============================================================================
// Job store
// =============================================================================

#[async_trait]
impl JobRepo for SqliteStore {
    async fn create(&self, job: &GenerationJob) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO generation_jobs
                (id, scene_id, kind, status, operation_handle, cost_estimate, error_message, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.scene_id.to_string())
        .bind(job.kind.to_string())
        .bind(job.status.to_string())
        .bind(&job.operation_handle)
        .bind(job.cost_estimate)
        .bind(&job.error_message)
        .bind(timestamp(job.started_at))
        .bind(job.completed_at.map(timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("job_create", e))?;
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<GenerationJob>, RepoError> {
        let row = sqlx::query("SELECT * FROM generation_jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("job_get", e))?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn find_latest_for_scene(
        &self,
        scene_id: SceneId,
        kind: JobKind,
    ) -> Result<Option<GenerationJob>, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM generation_jobs
            WHERE scene_id = ? AND kind = ?
            ORDER BY started_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(scene_id.to_string())
        .bind(kind.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::database("job_find_latest", e))?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn update(&self, job: &GenerationJob) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE generation_jobs SET
                status = ?,
                operation_handle = ?,
                cost_estimate = ?,
                error_message = ?,
                completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.to_string())
        .bind(&job.operation_handle)
        .bind(job.cost_estimate)
        .bind(&job.error_message)
        .bind(job.completed_at.map(timestamp))
        .bind(job.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("job_update", e))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("GenerationJob", job.id));
        }
        Ok(())
    }
}

// =============================================================================
// Pattern store
// =============================================================================

#[async_trait]
impl PatternRepo for SqliteStore {
    async fn upsert(&self, pattern: &SuccessfulPattern) -> Result<u32, RepoError> {
        let row = sqlx::query(
            r#"
            INSERT INTO successful_patterns (id, category, snippet, score, usage_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(category, snippet) DO UPDATE SET
                usage_count = successful_patterns.usage_count + 1
            RETURNING usage_count
            "#,
        )
        .bind(pattern.id.to_string())
        .bind(&pattern.category)
        .bind(&pattern.snippet)
        .bind(i64::from(pattern.score.value()))
        .bind(i64::from(pattern.usage_count))
        .bind(timestamp(pattern.created_at))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::database("pattern_upsert", e))?;

        let usage: i64 = row.get("usage_count");
        Ok(u32::try_from(usage).unwrap_or(u32::MAX))
    }

    async fn top_for_category(
        &self,
        category: &str,
        limit: usize,
    ) -> Result<Vec<SuccessfulPattern>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM successful_patterns
            WHERE category = ?
            ORDER BY score DESC, usage_count DESC, created_at ASC
            LIMIT ?
            "#,
        )
        .bind(category)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("pattern_top", e))?;

        rows.iter().map(row_to_pattern).collect()
    }

    async fn delete_prunable(&self, min_usage_count: u32, min_score: u8) -> Result<u64, RepoError> {
        let result =
            sqlx::query("DELETE FROM successful_patterns WHERE usage_count < ? AND score < ?")
                .bind(i64::from(min_usage_count))
                .bind(i64::from(min_score))
                .execute(&self.pool)
                .await
                .map_err(|e| RepoError::database("pattern_cleanup", e))?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Verification history
// =============================================================================

#[async_trait]
impl VerificationRepo for SqliteStore {
    async fn record(&self, record: &VerificationRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO verification_history (category, score, recorded_at) VALUES (?, ?, ?)",
        )
        .bind(&record.category)
        .bind(i64::from(record.score.value()))
        .bind(timestamp(record.recorded_at))
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("verification_record", e))?;
        Ok(())
    }

    async fn category_averages(&self) -> Result<Vec<CategoryScore>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT category, AVG(score) AS average_score, COUNT(*) AS samples
            FROM verification_history
            GROUP BY category
            ORDER BY category
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("verification_averages", e))?;

        Ok(rows
            .iter()
            .map(|row| {
                let samples: i64 = row.get("samples");
                CategoryScore {
                    category: row.get("category"),
                    average_score: row.get("average_score"),
                    samples: u32::try_from(samples).unwrap_or(u32::MAX),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vitrine_domain::JobStatus;

    fn score(value: u8) -> VerificationScore {
        VerificationScore::new(value).unwrap()
    }

    #[tokio::test]
    async fn scene_state_updates_touch_only_their_columns() {
        let store = SqliteStore::in_memory().await.unwrap();
        let scene = Scene::new("Loft").with_material(Material::new("Sofa", "furniture"));
        store.save(&scene).await.unwrap();

        store
            .update_video_state(scene.id, ArtifactStatus::Generating, None)
            .await
            .unwrap();
        store
            .update_video_state(scene.id, ArtifactStatus::Done, Some("videos/x.mp4".into()))
            .await
            .unwrap();

        let loaded = SceneRepo::get(&store, scene.id).await.unwrap().unwrap();
        assert_eq!(loaded.video_status, ArtifactStatus::Done);
        assert_eq!(loaded.video_path.as_deref(), Some("videos/x.mp4"));
        assert_eq!(loaded.image_status, ArtifactStatus::None);
        assert_eq!(loaded.materials.len(), 1);
    }

    #[tokio::test]
    async fn updating_missing_scene_is_not_found() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = store
            .update_image_state(SceneId::new(), ArtifactStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound { .. }));
    }

    #[tokio::test]
    async fn latest_job_for_scene_wins() {
        let store = SqliteStore::in_memory().await.unwrap();
        let scene_id = SceneId::new();
        let now = Utc::now();

        let older = GenerationJob::video(scene_id, 4, now - Duration::seconds(30));
        let mut newer = GenerationJob::video(scene_id, 8, now);
        store.create(&older).await.unwrap();
        store.create(&newer).await.unwrap();

        newer.start_processing().unwrap();
        newer.attach_operation("op-1").unwrap();
        store.update(&newer).await.unwrap();

        let found = store
            .find_latest_for_scene(scene_id, JobKind::Video)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, newer.id);
        assert_eq!(found.status, JobStatus::Processing);
        assert_eq!(found.operation_handle.as_deref(), Some("op-1"));
        assert_eq!(found.cost_estimate, 6.0);
    }

    #[tokio::test]
    async fn pattern_upsert_increments_usage() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = Utc::now();

        let first = SuccessfulPattern::new("textile", "linen drape", score(92), now);
        assert_eq!(store.upsert(&first).await.unwrap(), 1);
        let again = SuccessfulPattern::new("textile", "linen drape", score(95), now);
        assert_eq!(store.upsert(&again).await.unwrap(), 2);

        let top = store.top_for_category("textile", 10).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].usage_count, 2);
    }

    #[tokio::test]
    async fn top_patterns_order_by_score_then_usage() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = Utc::now();
        store
            .upsert(&SuccessfulPattern::new("wood", "a", score(91), now))
            .await
            .unwrap();
        store
            .upsert(&SuccessfulPattern::new("wood", "b", score(97), now))
            .await
            .unwrap();
        store
            .upsert(&SuccessfulPattern::new("wood", "c", score(91), now))
            .await
            .unwrap();
        store
            .upsert(&SuccessfulPattern::new("wood", "c", score(91), now))
            .await
            .unwrap();

        let top = store.top_for_category("wood", 3).await.unwrap();
        let snippets: Vec<&str> = top.iter().map(|p| p.snippet.as_str()).collect();
        assert_eq!(snippets, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn cleanup_and_averages() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = Utc::now();
        store
            .upsert(&SuccessfulPattern::new("wood", "keep", score(98), now))
            .await
            .unwrap();
        store
            .upsert(&SuccessfulPattern::new("wood", "drop", score(91), now))
            .await
            .unwrap();

        assert_eq!(store.delete_prunable(2, 95).await.unwrap(), 1);

        for value in [60, 80] {
            store
                .record(&VerificationRecord {
                    category: "wood".into(),
                    score: score(value),
                    recorded_at: now,
                })
                .await
                .unwrap();
        }
        let averages = store.category_averages().await.unwrap();
        assert_eq!(averages.len(), 1);
        assert_eq!(averages[0].average_score, 70.0);
        assert_eq!(averages[0].samples, 2);
    }
}
