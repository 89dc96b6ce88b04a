//! Repository for the `feature_flags` table.

use sqlx::PgPool;

use crate::models::feature_flag::FeatureFlag;

const COLUMNS: &str = "name, is_enabled, updated_at";

pub struct FeatureFlagRepo;

impl FeatureFlagRepo {
    pub async fn find(pool: &PgPool, name: &str) -> Result<Option<FeatureFlag>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM feature_flags WHERE name = $1");
        sqlx::query_as::<_, FeatureFlag>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// Unknown flags read as disabled.
    pub async fn is_enabled(pool: &PgPool, name: &str) -> Result<bool, sqlx::Error> {
        Ok(Self::find(pool, name).await?.is_some_and(|f| f.is_enabled))
    }

    pub async fn set(pool: &PgPool, name: &str, is_enabled: bool) -> Result<FeatureFlag, sqlx::Error> {
        let query = format!(
            "INSERT INTO feature_flags (name, is_enabled) VALUES ($1, $2) \
             ON CONFLICT (name) DO UPDATE SET \
                is_enabled = EXCLUDED.is_enabled, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FeatureFlag>(&query)
            .bind(name)
            .bind(is_enabled)
            .fetch_one(pool)
            .await
    }
}
