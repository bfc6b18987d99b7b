use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::instrument;

use crate::activity::ActivityEntry;
use crate::error::StoreError;
use crate::gamification::{level_for_points, ActivityKind, Badge, RewardsRecord};

/// A stored value together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Conditional merge-write of the point fields of a rewards record.
#[derive(Debug, Clone)]
pub struct PointsWrite<'a> {
    pub user_id: &'a str,
    /// `None` means the record must not exist yet.
    pub expected_version: Option<u64>,
    pub total_points: u64,
    pub avatar_level: u8,
    pub last_updated: DateTime<Utc>,
    pub idempotency_key: Option<&'a str>,
}

/// Conditional append to the badge list of a rewards record.
#[derive(Debug, Clone)]
pub struct BadgeWrite<'a> {
    pub user_id: &'a str,
    pub expected_version: Option<u64>,
    pub badges: &'a [Badge],
    pub last_updated: DateTime<Utc>,
}

/// Document store the ledger persists through.
///
/// Writes are conditional on the version the caller read. A write that finds
/// a different version (or finds a record when it expected none) must leave
/// the record untouched and return [`StoreError::Conflict`].
#[async_trait]
pub trait RewardsStore: Send + Sync {
    async fn fetch(&self, user_id: &str) -> Result<Option<Versioned<RewardsRecord>>, StoreError>;

    /// Sets points, level and timestamp in one write, never touching badges.
    /// Returns the new version.
    async fn write_points(&self, write: PointsWrite<'_>) -> Result<u64, StoreError>;

    /// Appends badges, never touching points. Creates the zero record when
    /// `expected_version` is `None`. Returns the new version.
    async fn append_badges(&self, write: BadgeWrite<'_>) -> Result<u64, StoreError>;

    /// Records an activity. Ids are scoped to the user and kind, and
    /// re-recording an existing `(user_id, kind, id)` is a no-op.
    async fn record_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError>;

    /// Number of counted entries of `kind` for the user.
    async fn count_activity(&self, user_id: &str, kind: ActivityKind) -> Result<u64, StoreError>;
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<String, Versioned<RewardsRecord>>,
    award_keys: HashSet<(String, String)>,
    activities: Vec<ActivityEntry>,
    activity_ids: HashSet<(String, ActivityKind, String)>,
}

/// In-process store. Every operation takes the lock once, so a
/// read-then-write from the ledger can interleave with other writers.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

fn version_matches(
    current: Option<&Versioned<RewardsRecord>>,
    expected: Option<u64>,
) -> bool {
    current.map(|r| r.version) == expected
}

#[async_trait]
impl RewardsStore for MemoryStore {
    async fn fetch(&self, user_id: &str) -> Result<Option<Versioned<RewardsRecord>>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.records.get(user_id).cloned())
    }

    #[instrument(skip(self, write), fields(user_id = write.user_id))]
    async fn write_points(&self, write: PointsWrite<'_>) -> Result<u64, StoreError> {
        self.check_available()?;
        if write.avatar_level != level_for_points(write.total_points) {
            return Err(StoreError::Corrupt(format!(
                "level {} does not match {} points",
                write.avatar_level, write.total_points
            )));
        }

        let mut state = self.state.write().await;
        let key = write
            .idempotency_key
            .map(|k| (write.user_id.to_string(), k.to_string()));
        if let Some(key) = &key {
            if state.award_keys.contains(key) {
                return Err(StoreError::DuplicateKey {
                    user_id: key.0.clone(),
                    key: key.1.clone(),
                });
            }
        }
        if !version_matches(state.records.get(write.user_id), write.expected_version) {
            return Err(StoreError::Conflict(write.user_id.to_string()));
        }

        let entry = state
            .records
            .entry(write.user_id.to_string())
            .or_insert_with(|| Versioned {
                value: RewardsRecord::new(write.user_id, write.last_updated),
                version: 0,
            });
        entry.value.total_points = write.total_points;
        entry.value.avatar_level = write.avatar_level;
        entry.value.last_updated = write.last_updated;
        entry.version += 1;
        let version = entry.version;

        if let Some(key) = key {
            state.award_keys.insert(key);
        }
        Ok(version)
    }

    #[instrument(skip(self, write), fields(user_id = write.user_id))]
    async fn append_badges(&self, write: BadgeWrite<'_>) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if !version_matches(state.records.get(write.user_id), write.expected_version) {
            return Err(StoreError::Conflict(write.user_id.to_string()));
        }

        let entry = state
            .records
            .entry(write.user_id.to_string())
            .or_insert_with(|| Versioned {
                value: RewardsRecord::new(write.user_id, write.last_updated),
                version: 0,
            });
        for badge in write.badges {
            if !entry.value.has_badge(badge.badge_type) {
                entry.value.badges.push(badge.clone());
            }
        }
        entry.value.last_updated = write.last_updated;
        entry.version += 1;
        Ok(entry.version)
    }

    async fn record_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let scoped = (entry.user_id.clone(), entry.kind, entry.id.clone());
        if state.activity_ids.insert(scoped) {
            state.activities.push(entry.clone());
        }
        Ok(())
    }

    async fn count_activity(&self, user_id: &str, kind: ActivityKind) -> Result<u64, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        let count = state
            .activities
            .iter()
            .filter(|a| a.user_id == user_id && a.kind == kind && a.counted)
            .count();
        Ok(count as u64)
    }
}
