use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, StoreError};
use crate::gamification::{ActivityCounts, ActivityKind, Badge, GamificationEngine, RewardsRecord};
use crate::store::{BadgeWrite, PointsWrite, RewardsStore};

/// Result of one keyed award: the record after it, and whether this call
/// was the one that applied the points.
#[derive(Debug, Clone)]
pub struct Award {
    pub record: RewardsRecord,
    pub previous_level: u8,
    pub applied: bool,
}

impl Award {
    /// True only when this call's own write crossed a level boundary.
    pub fn level_up(&self) -> bool {
        self.applied && self.record.avatar_level > self.previous_level
    }
}

/// Owner of every user's points, level and badges.
///
/// All writes go through version-conditioned store writes. A conflicting
/// write is re-read and retried up to `max_write_attempts` times; after that
/// the caller gets [`LedgerError::Conflict`].
pub struct RewardsLedger<S: RewardsStore> {
    store: Arc<S>,
    engine: Arc<GamificationEngine>,
    config: LedgerConfig,
}

impl<S: RewardsStore> Clone for RewardsLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            engine: Arc::clone(&self.engine),
            config: self.config,
        }
    }
}

impl<S: RewardsStore> RewardsLedger<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self::with_store(Arc::new(store), config)
    }

    pub fn with_store(store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            store,
            engine: Arc::new(GamificationEngine::new()),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &GamificationEngine {
        &self.engine
    }

    /// Adds `points` to the user's total, creating the record if needed.
    #[instrument(skip(self))]
    pub async fn award(&self, user_id: &str, points: u64) -> Result<RewardsRecord, LedgerError> {
        Ok(self.apply_award(user_id, points, None).await?.record)
    }

    /// Like [`award`](Self::award), but applied at most once per `key`.
    /// A repeated key returns the current record unchanged.
    #[instrument(skip(self))]
    pub async fn award_once(
        &self,
        user_id: &str,
        points: u64,
        key: &str,
    ) -> Result<RewardsRecord, LedgerError> {
        Ok(self.award_keyed(user_id, points, key).await?.record)
    }

    /// [`award_once`](Self::award_once) that also reports the level the
    /// winning write started from.
    pub async fn award_keyed(
        &self,
        user_id: &str,
        points: u64,
        key: &str,
    ) -> Result<Award, LedgerError> {
        if key.trim().is_empty() {
            return Err(LedgerError::invalid("idempotency key must not be empty"));
        }
        self.apply_award(user_id, points, Some(key)).await
    }

    async fn apply_award(
        &self,
        user_id: &str,
        points: u64,
        key: Option<&str>,
    ) -> Result<Award, LedgerError> {
        validate_user_id(user_id)?;
        if points == 0 {
            return Err(LedgerError::invalid("points must be positive"));
        }

        for attempt in 1..=self.config.max_write_attempts {
            let (current, version) = match self.store.fetch(user_id).await? {
                Some(stored) => (stored.value, Some(stored.version)),
                None => (RewardsRecord::new(user_id, Utc::now()), None),
            };

            let updated = current.with_points_added(points, Utc::now())?;
            let write = PointsWrite {
                user_id,
                expected_version: version,
                total_points: updated.total_points,
                avatar_level: updated.avatar_level,
                last_updated: updated.last_updated,
                idempotency_key: key,
            };

            match self.store.write_points(write).await {
                Ok(_) => {
                    info!(
                        "rewards updated: {} -> {} points, level {} -> {}",
                        current.total_points,
                        updated.total_points,
                        current.avatar_level,
                        updated.avatar_level
                    );
                    return Ok(Award {
                        previous_level: current.avatar_level,
                        record: updated,
                        applied: true,
                    });
                }
                Err(StoreError::Conflict(_)) => {
                    debug!(attempt, "award conflicted, retrying");
                    self.backoff(attempt).await;
                }
                Err(StoreError::DuplicateKey { key, .. }) => {
                    debug!(%key, "award already applied");
                    let record = self.require_record(user_id).await?;
                    return Ok(Award {
                        previous_level: record.avatar_level,
                        record,
                        applied: false,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(
            attempts = self.config.max_write_attempts,
            "award abandoned after repeated conflicts"
        );
        Err(LedgerError::Conflict {
            user_id: user_id.to_string(),
            attempts: self.config.max_write_attempts,
        })
    }

    /// Unlocks every badge whose predicate now holds and the user lacks.
    /// Returns only the badges unlocked by this call.
    #[instrument(skip(self))]
    pub async fn evaluate_badges(&self, user_id: &str) -> Result<Vec<Badge>, LedgerError> {
        validate_user_id(user_id)?;

        for attempt in 1..=self.config.max_write_attempts {
            let (current, version) = match self.store.fetch(user_id).await? {
                Some(stored) => (stored.value, Some(stored.version)),
                None => (RewardsRecord::new(user_id, Utc::now()), None),
            };

            let counters = self.engine.pending_counters(&current);
            let counts = self.count(user_id, &counters).await?;
            let now = Utc::now();
            let unlocked = self.engine.check_badges(&current, &counts, now);

            if unlocked.is_empty() && version.is_some() {
                return Ok(unlocked);
            }

            let write = BadgeWrite {
                user_id,
                expected_version: version,
                badges: &unlocked,
                last_updated: now,
            };
            match self.store.append_badges(write).await {
                Ok(_) => {
                    for badge in &unlocked {
                        info!(badge = %badge.badge_type, "badge unlocked");
                    }
                    return Ok(unlocked);
                }
                Err(StoreError::Conflict(_)) => {
                    debug!(attempt, "badge append conflicted, retrying");
                    self.backoff(attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(
            attempts = self.config.max_write_attempts,
            "badge evaluation abandoned after repeated conflicts"
        );
        Err(LedgerError::Conflict {
            user_id: user_id.to_string(),
            attempts: self.config.max_write_attempts,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_record(&self, user_id: &str) -> Result<Option<RewardsRecord>, LedgerError> {
        validate_user_id(user_id)?;
        Ok(self.store.fetch(user_id).await?.map(|stored| stored.value))
    }

    /// Every activity counter for the user.
    pub async fn activity_counts(&self, user_id: &str) -> Result<ActivityCounts, LedgerError> {
        validate_user_id(user_id)?;
        self.count(user_id, &ActivityKind::ALL).await
    }

    async fn count(
        &self,
        user_id: &str,
        kinds: &[ActivityKind],
    ) -> Result<ActivityCounts, LedgerError> {
        let mut counts = ActivityCounts::default();
        for kind in kinds {
            counts.set(*kind, self.store.count_activity(user_id, *kind).await?);
        }
        Ok(counts)
    }

    async fn require_record(&self, user_id: &str) -> Result<RewardsRecord, LedgerError> {
        self.get_record(user_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(user_id.to_string()))
    }

    async fn backoff(&self, attempt: u32) {
        if attempt < self.config.max_write_attempts {
            tokio::time::sleep(self.config.retry_backoff * attempt).await;
        }
    }
}

fn validate_user_id(user_id: &str) -> Result<(), LedgerError> {
    if user_id.trim().is_empty() {
        return Err(LedgerError::invalid("user id must not be empty"));
    }
    Ok(())
}
