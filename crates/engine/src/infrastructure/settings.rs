//! SQLite-backed settings storage.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::infrastructure::app_settings::ProviderSettings;
use crate::infrastructure::ports::{ClockPort, RepoError, SettingsRepo};

const PROVIDER_SCOPE: &str = "provider";

/// SQLite implementation for application settings storage.
///
/// Settings are JSON documents keyed by scope.
pub struct SqliteSettingsRepo {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteSettingsRepo {
    pub async fn new(pool: SqlitePool, clock: Arc<dyn ClockPort>) -> Result<Self, RepoError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS app_settings (
                scope TEXT PRIMARY KEY NOT NULL,
                settings_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("settings", e))?;

        Ok(Self { pool, clock })
    }

    async fn get_by_scope(&self, scope: &str) -> Result<Option<ProviderSettings>, RepoError> {
        let row = sqlx::query("SELECT settings_json FROM app_settings WHERE scope = ?")
            .bind(scope)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("settings", e))?;

        match row {
            Some(row) => {
                let json: String = row.get("settings_json");
                let settings = serde_json::from_str(&json)
                    .map_err(|e| RepoError::Serialization(e.to_string()))?;
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    async fn save_by_scope(
        &self,
        scope: &str,
        settings: &ProviderSettings,
    ) -> Result<(), RepoError> {
        let json =
            serde_json::to_string(settings).map_err(|e| RepoError::Serialization(e.to_string()))?;
        let now = self.clock.now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO app_settings (scope, settings_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(scope) DO UPDATE SET
                settings_json = excluded.settings_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(scope)
        .bind(json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("settings", e))?;

        Ok(())
    }
}

#[async_trait]
impl SettingsRepo for SqliteSettingsRepo {
    async fn get_provider_settings(&self) -> Result<Option<ProviderSettings>, RepoError> {
        self.get_by_scope(PROVIDER_SCOPE).await
    }

    async fn save_provider_settings(&self, settings: &ProviderSettings) -> Result<(), RepoError> {
        self.save_by_scope(PROVIDER_SCOPE, settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::app_settings::ProviderKind;
    use crate::infrastructure::clock::SystemClock;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn repo() -> SqliteSettingsRepo {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteSettingsRepo::new(pool, Arc::new(SystemClock::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn empty_store_has_no_settings() {
        let repo = repo().await;
        assert!(repo.get_provider_settings().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_previous_settings() {
        let repo = repo().await;
        let mut settings = ProviderSettings::default();
        repo.save_provider_settings(&settings).await.unwrap();

        settings.provider = ProviderKind::Gemini;
        settings.api_key = Some("k".into());
        repo.save_provider_settings(&settings).await.unwrap();

        assert_eq!(repo.get_provider_settings().await.unwrap(), Some(settings));
    }
}
