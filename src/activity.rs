use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::error::LedgerError;
use crate::focus::FOCUS_SESSION_MINUTES;
use crate::gamification::{Action, ActivityKind, Badge, RewardsRecord};
use crate::ledger::RewardsLedger;
use crate::store::RewardsStore;

/// Something a student did that may earn points or count toward a badge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Activity {
    Mood {
        mood: String,
        level: u8,
    },
    Journal {
        entry: String,
        mood: Option<String>,
    },
    Feedback {
        message: String,
        rating: Option<u8>,
    },
    /// `focused_seconds` excludes paused time; completion is derived from it.
    FocusSession {
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        focused_seconds: u64,
    },
    MaterialApproved {
        material_id: String,
    },
}

impl Activity {
    pub fn kind(&self) -> ActivityKind {
        match self {
            Activity::Mood { .. } => ActivityKind::Mood,
            Activity::Journal { .. } => ActivityKind::Journal,
            Activity::Feedback { .. } => ActivityKind::Feedback,
            Activity::FocusSession { .. } => ActivityKind::FocusSession,
            Activity::MaterialApproved { .. } => ActivityKind::MaterialUpload,
        }
    }

    /// The point-earning action, if this activity earns anything.
    pub fn action(&self) -> Option<Action> {
        match self {
            Activity::Mood { .. } => Some(Action::MoodLog),
            Activity::Journal { .. } => Some(Action::JournalEntry),
            Activity::Feedback { .. } => Some(Action::Feedback),
            Activity::FocusSession { .. } if self.is_counted() => Some(Action::FocusSession),
            Activity::FocusSession { .. } => None,
            Activity::MaterialApproved { .. } => Some(Action::MaterialApproval),
        }
    }

    /// Whether the activity counts toward its badge counter.
    pub fn is_counted(&self) -> bool {
        match self {
            Activity::FocusSession {
                focused_seconds, ..
            } => *focused_seconds >= focus_target_seconds(),
            _ => true,
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        match self {
            Activity::Mood { mood, level } => {
                if mood.trim().is_empty() {
                    return Err(LedgerError::invalid("mood must not be empty"));
                }
                if !(1..=5).contains(level) {
                    return Err(LedgerError::invalid(format!("mood level {level} outside 1..=5")));
                }
            }
            Activity::Journal { entry, .. } => {
                if entry.trim().is_empty() {
                    return Err(LedgerError::invalid("journal entry must not be empty"));
                }
            }
            Activity::Feedback { message, rating } => {
                if message.trim().is_empty() {
                    return Err(LedgerError::invalid("feedback message must not be empty"));
                }
                if let Some(rating) = rating {
                    if !(1..=5).contains(rating) {
                        return Err(LedgerError::invalid(format!("rating {rating} outside 1..=5")));
                    }
                }
            }
            Activity::FocusSession {
                started_at,
                ended_at,
                focused_seconds,
            } => {
                if ended_at < started_at {
                    return Err(LedgerError::invalid("focus session ends before it starts"));
                }
                let span = (*ended_at - *started_at).num_seconds().max(0) as u64;
                if *focused_seconds > span {
                    return Err(LedgerError::invalid(format!(
                        "focused for {focused_seconds}s in a {span}s session"
                    )));
                }
            }
            Activity::MaterialApproved { material_id } => {
                if material_id.trim().is_empty() {
                    return Err(LedgerError::invalid("material id must not be empty"));
                }
            }
        }
        Ok(())
    }
}

fn focus_target_seconds() -> u64 {
    Duration::minutes(FOCUS_SESSION_MINUTES).num_seconds() as u64
}

/// Stored form of an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub user_id: String,
    pub kind: ActivityKind,
    pub counted: bool,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(id: &str, user_id: &str, activity: &Activity, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            user_id: user_id.to_string(),
            kind: activity.kind(),
            counted: activity.is_counted(),
            payload: json!(activity),
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub record: RewardsRecord,
    pub points_earned: u64,
    pub new_badges: Vec<Badge>,
    pub level_up: bool,
}

/// Records `activity`, awards its points and checks for new badges.
///
/// `activity_id` keys both the stored activity and the award, so calling this
/// again with the same id after an ambiguous failure does not double-count.
#[instrument(skip(ledger, activity), fields(kind = %activity.kind()))]
pub async fn perform<S: RewardsStore>(
    ledger: &RewardsLedger<S>,
    user_id: &str,
    activity_id: &str,
    activity: Activity,
) -> Result<ActionOutcome, LedgerError> {
    activity.validate()?;
    if activity_id.trim().is_empty() {
        return Err(LedgerError::invalid("activity id must not be empty"));
    }

    let entry = ActivityEntry::new(activity_id, user_id, &activity, Utc::now());
    ledger.store().record_activity(&entry).await?;

    let points_earned = activity.action().map(|a| a.points()).unwrap_or(0);
    let mut level_up = false;
    if points_earned > 0 {
        let key = format!("{}:{}", entry.kind, activity_id);
        level_up = ledger.award_keyed(user_id, points_earned, &key).await?.level_up();
    }

    let new_badges = ledger.evaluate_badges(user_id).await?;
    let record = ledger
        .get_record(user_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(user_id.to_string()))?;

    info!(
        points_earned,
        badges = new_badges.len(),
        total = record.total_points,
        "activity recorded"
    );

    Ok(ActionOutcome {
        level_up,
        record,
        points_earned,
        new_badges,
    })
}
