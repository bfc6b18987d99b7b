use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::{debug, instrument};

use crate::activity::ActivityEntry;
use crate::error::StoreError;
use crate::gamification::{level_for_points, ActivityKind, Badge, BadgeType, RewardsRecord};
use crate::store::{BadgeWrite, PointsWrite, RewardsStore, Versioned};

/// SQLite-backed rewards store.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` gets its own database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Database { pool };
        db.create_tables().await?;
        Ok(db)
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::new("sqlite::memory:").await
    }

    async fn create_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rewards (
                user_id TEXT PRIMARY KEY,
                total_points INTEGER NOT NULL,
                avatar_level INTEGER NOT NULL,
                last_updated DATETIME NOT NULL,
                version INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS badges (
                user_id TEXT NOT NULL,
                badge_type TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                earned_at DATETIME NOT NULL,
                PRIMARY KEY (user_id, badge_type)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS award_keys (
                user_id TEXT NOT NULL,
                idempotency_key TEXT NOT NULL,
                PRIMARY KEY (user_id, idempotency_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                counted BOOLEAN NOT NULL,
                payload TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                PRIMARY KEY (user_id, kind, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{value} does not fit in a row")))
}

fn to_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative stored value {value}")))
}

fn badge_from_row(row: &SqliteRow) -> Result<Badge, StoreError> {
    let badge_type: String = row.try_get("badge_type")?;
    Ok(Badge {
        badge_type: BadgeType::from_str(&badge_type).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        earned_at: row.try_get("earned_at")?,
    })
}

#[async_trait]
impl RewardsStore for Database {
    #[instrument(skip(self))]
    async fn fetch(&self, user_id: &str) -> Result<Option<Versioned<RewardsRecord>>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            r#"
            SELECT total_points, avatar_level, last_updated, version
            FROM rewards
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let badge_rows = sqlx::query(
            r#"
            SELECT badge_type, name, description, earned_at
            FROM badges
            WHERE user_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let badges = badge_rows
            .iter()
            .map(badge_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let total_points = to_u64(row.try_get("total_points")?)?;
        let avatar_level: i64 = row.try_get("avatar_level")?;
        let last_updated: DateTime<Utc> = row.try_get("last_updated")?;
        let version = to_u64(row.try_get("version")?)?;

        Ok(Some(Versioned {
            value: RewardsRecord {
                user_id: user_id.to_string(),
                total_points,
                avatar_level: u8::try_from(avatar_level)
                    .map_err(|_| StoreError::Corrupt(format!("avatar level {avatar_level}")))?,
                badges,
                last_updated,
            },
            version,
        }))
    }

    #[instrument(skip(self, write), fields(user_id = write.user_id))]
    async fn write_points(&self, write: PointsWrite<'_>) -> Result<u64, StoreError> {
        if write.avatar_level != level_for_points(write.total_points) {
            return Err(StoreError::Corrupt(format!(
                "level {} does not match {} points",
                write.avatar_level, write.total_points
            )));
        }
        let total_points = to_i64(write.total_points)?;
        let mut tx = self.pool.begin().await?;

        if let Some(key) = write.idempotency_key {
            let inserted = sqlx::query(
                "INSERT OR IGNORE INTO award_keys (user_id, idempotency_key) VALUES (?, ?)",
            )
            .bind(write.user_id)
            .bind(key)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 0 {
                tx.rollback().await?;
                return Err(StoreError::DuplicateKey {
                    user_id: write.user_id.to_string(),
                    key: key.to_string(),
                });
            }
        }

        let changed = match write.expected_version {
            None => sqlx::query(
                r#"
                INSERT OR IGNORE INTO rewards (user_id, total_points, avatar_level, last_updated, version)
                VALUES (?, ?, ?, ?, 1)
                "#,
            )
            .bind(write.user_id)
            .bind(total_points)
            .bind(write.avatar_level as i64)
            .bind(write.last_updated)
            .execute(&mut *tx)
            .await?
            .rows_affected(),
            Some(version) => sqlx::query(
                r#"
                UPDATE rewards
                SET total_points = ?, avatar_level = ?, last_updated = ?, version = version + 1
                WHERE user_id = ? AND version = ?
                "#,
            )
            .bind(total_points)
            .bind(write.avatar_level as i64)
            .bind(write.last_updated)
            .bind(write.user_id)
            .bind(to_i64(version)?)
            .execute(&mut *tx)
            .await?
            .rows_affected(),
        };

        if changed == 0 {
            tx.rollback().await?;
            debug!("stale points write");
            return Err(StoreError::Conflict(write.user_id.to_string()));
        }

        tx.commit().await?;
        Ok(write.expected_version.unwrap_or(0) + 1)
    }

    #[instrument(skip(self, write), fields(user_id = write.user_id))]
    async fn append_badges(&self, write: BadgeWrite<'_>) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let changed = match write.expected_version {
            None => sqlx::query(
                r#"
                INSERT OR IGNORE INTO rewards (user_id, total_points, avatar_level, last_updated, version)
                VALUES (?, 0, 1, ?, 1)
                "#,
            )
            .bind(write.user_id)
            .bind(write.last_updated)
            .execute(&mut *tx)
            .await?
            .rows_affected(),
            Some(version) => sqlx::query(
                r#"
                UPDATE rewards
                SET last_updated = ?, version = version + 1
                WHERE user_id = ? AND version = ?
                "#,
            )
            .bind(write.last_updated)
            .bind(write.user_id)
            .bind(to_i64(version)?)
            .execute(&mut *tx)
            .await?
            .rows_affected(),
        };

        if changed == 0 {
            tx.rollback().await?;
            debug!("stale badge write");
            return Err(StoreError::Conflict(write.user_id.to_string()));
        }

        for badge in write.badges {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO badges (user_id, badge_type, name, description, earned_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(write.user_id)
            .bind(badge.badge_type.as_str())
            .bind(&badge.name)
            .bind(&badge.description)
            .bind(badge.earned_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(write.expected_version.unwrap_or(0) + 1)
    }

    #[instrument(skip(self, entry), fields(id = %entry.id))]
    async fn record_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError> {
        let payload =
            serde_json::to_string(&entry.payload).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO activities (id, user_id, kind, counted, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(entry.kind.as_str())
        .bind(entry.counted)
        .bind(payload)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_activity(&self, user_id: &str, kind: ActivityKind) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM activities
            WHERE user_id = ? AND kind = ? AND counted = 1
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        to_u64(count)
    }
}
