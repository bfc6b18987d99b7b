use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 5;

/// Minimum points for each level, index 0 is level 1.
pub const LEVEL_THRESHOLDS: [u64; 5] = [0, 50, 150, 300, 500];

/// Avatar level for a point total. Checked from the top threshold down.
pub fn level_for_points(points: u64) -> u8 {
    if points >= 500 {
        5
    } else if points >= 300 {
        4
    } else if points >= 150 {
        3
    } else if points >= 50 {
        2
    } else {
        1
    }
}

/// Per-user aggregate of points, level and earned badges.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RewardsRecord {
    pub user_id: String,
    pub total_points: u64,
    pub avatar_level: u8,
    pub badges: Vec<Badge>,
    pub last_updated: DateTime<Utc>,
}

impl RewardsRecord {
    /// The zero record a user starts from before their first write.
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_points: 0,
            avatar_level: MIN_LEVEL,
            badges: Vec::new(),
            last_updated: now,
        }
    }

    pub fn has_badge(&self, badge_type: BadgeType) -> bool {
        self.badges.iter().any(|b| b.badge_type == badge_type)
    }

    /// Copy of this record with `points` added and the level re-derived.
    /// Badges are carried over untouched.
    pub fn with_points_added(&self, points: u64, now: DateTime<Utc>) -> Result<Self, LedgerError> {
        let total_points = self
            .total_points
            .checked_add(points)
            .ok_or_else(|| LedgerError::invalid(format!("point total overflow for {}", self.user_id)))?;

        Ok(Self {
            user_id: self.user_id.clone(),
            total_points,
            avatar_level: level_for_points(total_points),
            badges: self.badges.clone(),
            last_updated: now,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeType {
    FirstMood,
    FocusMaster,
    StudySharer,
    Consistent,
    ReflectiveWriter,
}

impl BadgeType {
    pub const ALL: [BadgeType; 5] = [
        BadgeType::FirstMood,
        BadgeType::FocusMaster,
        BadgeType::StudySharer,
        BadgeType::Consistent,
        BadgeType::ReflectiveWriter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeType::FirstMood => "first_mood",
            BadgeType::FocusMaster => "focus_master",
            BadgeType::StudySharer => "study_sharer",
            BadgeType::Consistent => "consistent",
            BadgeType::ReflectiveWriter => "reflective_writer",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            BadgeType::FirstMood => "😊",
            BadgeType::FocusMaster => "🎯",
            BadgeType::StudySharer => "📚",
            BadgeType::Consistent => "⭐",
            BadgeType::ReflectiveWriter => "📝",
        }
    }
}

impl fmt::Display for BadgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BadgeType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BadgeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| LedgerError::invalid(format!("unknown badge type: {s}")))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    #[serde(rename = "type")]
    pub badge_type: BadgeType,
    pub name: String,
    pub description: String,
    pub earned_at: DateTime<Utc>,
}

/// Point-earning actions and their fixed award.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    MoodLog,
    Feedback,
    FocusSession,
    JournalEntry,
    MaterialApproval,
}

impl Action {
    pub const fn points(&self) -> u64 {
        match self {
            Action::MoodLog => 2,
            Action::Feedback => 1,
            Action::FocusSession => 5,
            Action::JournalEntry => 3,
            Action::MaterialApproval => 10,
        }
    }
}

/// Activity counters the badge predicates read. Owned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Mood,
    FocusSession,
    Feedback,
    Journal,
    MaterialUpload,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 5] = [
        ActivityKind::Mood,
        ActivityKind::FocusSession,
        ActivityKind::Feedback,
        ActivityKind::Journal,
        ActivityKind::MaterialUpload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Mood => "mood",
            ActivityKind::FocusSession => "focus_session",
            ActivityKind::Feedback => "feedback",
            ActivityKind::Journal => "journal",
            ActivityKind::MaterialUpload => "material_upload",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counted activity per kind: mood entries, *completed* focus sessions,
/// *approved* uploads, journal entries and feedback submissions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCounts {
    pub mood_entries: u64,
    pub focus_sessions: u64,
    pub feedback: u64,
    pub journal_entries: u64,
    pub approved_uploads: u64,
}

impl ActivityCounts {
    pub fn get(&self, kind: ActivityKind) -> u64 {
        match kind {
            ActivityKind::Mood => self.mood_entries,
            ActivityKind::FocusSession => self.focus_sessions,
            ActivityKind::Feedback => self.feedback,
            ActivityKind::Journal => self.journal_entries,
            ActivityKind::MaterialUpload => self.approved_uploads,
        }
    }

    pub fn set(&mut self, kind: ActivityKind, count: u64) {
        match kind {
            ActivityKind::Mood => self.mood_entries = count,
            ActivityKind::FocusSession => self.focus_sessions = count,
            ActivityKind::Feedback => self.feedback = count,
            ActivityKind::Journal => self.journal_entries = count,
            ActivityKind::MaterialUpload => self.approved_uploads = count,
        }
    }
}

#[derive(Clone)]
struct BadgeTemplate {
    badge_type: BadgeType,
    name: String,
    description: String,
    condition: BadgeCondition,
}

/// Every badge unlocks on a monotonic counter reaching a threshold.
#[derive(Clone, Copy)]
struct BadgeCondition {
    counter: ActivityKind,
    threshold: u64,
}

impl BadgeCondition {
    fn is_met(&self, counts: &ActivityCounts) -> bool {
        counts.get(self.counter) >= self.threshold
    }
}

/// Badge unlock table.
pub struct GamificationEngine {
    badges: Vec<BadgeTemplate>,
}

impl Default for GamificationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GamificationEngine {
    pub fn new() -> Self {
        let mut engine = Self { badges: Vec::new() };

        engine.define(
            BadgeType::FirstMood,
            "Mood Tracker",
            "Logged your first mood",
            ActivityKind::Mood,
            1,
        );
        engine.define(
            BadgeType::FocusMaster,
            "Focus Master",
            "Completed 5 focus sessions",
            ActivityKind::FocusSession,
            5,
        );
        engine.define(
            BadgeType::StudySharer,
            "Study Sharer",
            "Shared approved study material",
            ActivityKind::MaterialUpload,
            1,
        );
        engine.define(
            BadgeType::Consistent,
            "Consistent",
            "Logged your mood 7 times",
            ActivityKind::Mood,
            7,
        );
        engine.define(
            BadgeType::ReflectiveWriter,
            "Reflective Writer",
            "Saved 5 journal entries",
            ActivityKind::Journal,
            5,
        );

        engine
    }

    fn define(
        &mut self,
        badge_type: BadgeType,
        name: &str,
        description: &str,
        counter: ActivityKind,
        threshold: u64,
    ) {
        self.badges.push(BadgeTemplate {
            badge_type,
            name: name.to_string(),
            description: description.to_string(),
            condition: BadgeCondition { counter, threshold },
        });
    }

    /// Counters that still matter for the badges `record` does not hold yet.
    pub fn pending_counters(&self, record: &RewardsRecord) -> Vec<ActivityKind> {
        let mut kinds = Vec::new();
        for template in &self.badges {
            if record.has_badge(template.badge_type) {
                continue;
            }
            if !kinds.contains(&template.condition.counter) {
                kinds.push(template.condition.counter);
            }
        }
        kinds
    }

    /// Badges whose predicate holds for `counts` and which `record` lacks.
    pub fn check_badges(
        &self,
        record: &RewardsRecord,
        counts: &ActivityCounts,
        now: DateTime<Utc>,
    ) -> Vec<Badge> {
        self.badges
            .iter()
            .filter(|t| !record.has_badge(t.badge_type) && t.condition.is_met(counts))
            .map(|t| Badge {
                badge_type: t.badge_type,
                name: t.name.clone(),
                description: t.description.clone(),
                earned_at: now,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_boundaries() {
        let cases = [
            (0, 1),
            (49, 1),
            (50, 2),
            (149, 2),
            (150, 3),
            (299, 3),
            (300, 4),
            (499, 4),
            (500, 5),
            (100_000, 5),
        ];
        for (points, level) in cases {
            assert_eq!(level_for_points(points), level, "points = {points}");
        }
    }

    #[test]
    fn thresholds_match_level_curve() {
        for (idx, threshold) in LEVEL_THRESHOLDS.iter().enumerate() {
            assert_eq!(level_for_points(*threshold) as usize, idx + 1);
        }
    }

    #[test]
    fn points_added_keeps_badges() {
        let now = Utc::now();
        let mut record = RewardsRecord::new("u1", now);
        record.badges.push(Badge {
            badge_type: BadgeType::FirstMood,
            name: "Mood Tracker".to_string(),
            description: "Logged your first mood".to_string(),
            earned_at: now,
        });

        let updated = record.with_points_added(55, now).unwrap();
        assert_eq!(updated.total_points, 55);
        assert_eq!(updated.avatar_level, 2);
        assert_eq!(updated.badges, record.badges);
    }

    #[test]
    fn point_overflow_is_rejected() {
        let mut record = RewardsRecord::new("u1", Utc::now());
        record.total_points = u64::MAX;
        assert!(matches!(
            record.with_points_added(1, Utc::now()),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn action_points_policy() {
        assert_eq!(Action::MoodLog.points(), 2);
        assert_eq!(Action::Feedback.points(), 1);
        assert_eq!(Action::FocusSession.points(), 5);
        assert_eq!(Action::JournalEntry.points(), 3);
        assert_eq!(Action::MaterialApproval.points(), 10);
    }

    #[test]
    fn badge_type_parsing() {
        assert_eq!("focus_master".parse::<BadgeType>().unwrap(), BadgeType::FocusMaster);
        assert!(matches!(
            "night_owl".parse::<BadgeType>(),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn badge_serializes_with_type_field() {
        let badge = Badge {
            badge_type: BadgeType::StudySharer,
            name: "Study Sharer".to_string(),
            description: "Shared approved study material".to_string(),
            earned_at: Utc::now(),
        };
        let json = serde_json::to_value(&badge).unwrap();
        assert_eq!(json["type"], "study_sharer");
        assert!(json.get("earnedAt").is_some());
    }

    #[test]
    fn focus_master_needs_five_sessions() {
        let engine = GamificationEngine::new();
        let record = RewardsRecord::new("u1", Utc::now());
        let mut counts = ActivityCounts::default();

        counts.focus_sessions = 4;
        assert!(engine.check_badges(&record, &counts, Utc::now()).is_empty());

        counts.focus_sessions = 5;
        let badges = engine.check_badges(&record, &counts, Utc::now());
        assert_eq!(badges.len(), 1);
        assert_eq!(badges[0].badge_type, BadgeType::FocusMaster);
        assert_eq!(badges[0].name, "Focus Master");
    }

    #[test]
    fn held_badges_are_not_reissued() {
        let engine = GamificationEngine::new();
        let now = Utc::now();
        let mut record = RewardsRecord::new("u1", now);
        let counts = ActivityCounts {
            mood_entries: 1,
            ..Default::default()
        };

        record.badges = engine.check_badges(&record, &counts, now);
        assert_eq!(record.badges.len(), 1);
        assert!(engine.check_badges(&record, &counts, now).is_empty());
        assert!(!engine.pending_counters(&record).is_empty());
    }

    #[test]
    fn pending_counters_skip_satisfied_kinds() {
        let engine = GamificationEngine::new();
        let now = Utc::now();
        let mut record = RewardsRecord::new("u1", now);
        assert_eq!(engine.pending_counters(&record).len(), 4);

        let counts = ActivityCounts {
            approved_uploads: 1,
            ..Default::default()
        };
        record.badges = engine.check_badges(&record, &counts, now);
        assert!(!engine.pending_counters(&record).contains(&ActivityKind::MaterialUpload));
    }
}
