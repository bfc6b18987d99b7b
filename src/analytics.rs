use serde::Serialize;

use crate::gamification::{
    level_for_points, ActivityCounts, Badge, RewardsRecord, LEVEL_THRESHOLDS, MAX_LEVEL,
};

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RewardsDashboard {
    pub user_id: String,
    pub total_points: u64,
    pub avatar_level: u8,
    pub level_progress: LevelProgress,
    pub badges: Vec<BadgeView>,
    pub stats: DashboardStats,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub percent: f64,
    pub next_level: Option<u8>,
    pub points_to_next_level: u64,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BadgeView {
    #[serde(flatten)]
    pub badge: Badge,
    pub icon: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub mood_entries: u64,
    pub focus_sessions: u64,
    pub materials_shared: u64,
}

pub struct DashboardAnalyzer;

impl Default for DashboardAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardAnalyzer {
    pub fn new() -> Self {
        DashboardAnalyzer
    }

    /// Builds the rewards view. A user without a record sees the defaults.
    pub fn generate_dashboard(
        &self,
        user_id: &str,
        record: Option<&RewardsRecord>,
        counts: &ActivityCounts,
    ) -> RewardsDashboard {
        let total_points = record.map(|r| r.total_points).unwrap_or(0);
        let avatar_level = level_for_points(total_points);

        let badges = record
            .map(|r| {
                r.badges
                    .iter()
                    .map(|badge| BadgeView {
                        icon: badge.badge_type.icon().to_string(),
                        badge: badge.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        RewardsDashboard {
            user_id: user_id.to_string(),
            total_points,
            avatar_level,
            level_progress: self.calculate_level_progress(total_points),
            badges,
            stats: DashboardStats {
                mood_entries: counts.mood_entries,
                focus_sessions: counts.focus_sessions,
                materials_shared: counts.approved_uploads,
            },
        }
    }

    pub fn calculate_level_progress(&self, total_points: u64) -> LevelProgress {
        let level = level_for_points(total_points);
        if level >= MAX_LEVEL {
            return LevelProgress {
                percent: 100.0,
                next_level: None,
                points_to_next_level: 0,
            };
        }

        let current = LEVEL_THRESHOLDS[(level - 1) as usize];
        let next = LEVEL_THRESHOLDS[level as usize];
        let percent = (total_points - current) as f64 / (next - current) as f64 * 100.0;

        LevelProgress {
            percent: percent.clamp(0.0, 100.0),
            next_level: Some(level + 1),
            points_to_next_level: next - total_points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gamification::BadgeType;
    use chrono::Utc;

    #[test]
    fn missing_record_shows_defaults() {
        let dashboard =
            DashboardAnalyzer::new().generate_dashboard("u1", None, &ActivityCounts::default());
        assert_eq!(dashboard.total_points, 0);
        assert_eq!(dashboard.avatar_level, 1);
        assert_eq!(dashboard.level_progress.percent, 0.0);
        assert_eq!(dashboard.level_progress.next_level, Some(2));
        assert!(dashboard.badges.is_empty());
    }

    #[test]
    fn progress_within_level() {
        let analyzer = DashboardAnalyzer::new();
        let progress = analyzer.calculate_level_progress(100);
        assert_eq!(progress.next_level, Some(3));
        assert_eq!(progress.percent, 50.0);
        assert_eq!(progress.points_to_next_level, 50);

        let progress = analyzer.calculate_level_progress(50);
        assert_eq!(progress.percent, 0.0);
        assert_eq!(progress.next_level, Some(3));
    }

    #[test]
    fn top_level_is_full() {
        let progress = DashboardAnalyzer::new().calculate_level_progress(720);
        assert_eq!(progress.percent, 100.0);
        assert_eq!(progress.next_level, None);
        assert_eq!(progress.points_to_next_level, 0);
    }

    #[test]
    fn badges_carry_icons_and_stats_map() {
        let now = Utc::now();
        let mut record = RewardsRecord::new("u1", now);
        record.total_points = 12;
        record.badges.push(Badge {
            badge_type: BadgeType::FocusMaster,
            name: "Focus Master".to_string(),
            description: "Completed 5 focus sessions".to_string(),
            earned_at: now,
        });
        let counts = ActivityCounts {
            focus_sessions: 5,
            approved_uploads: 2,
            ..Default::default()
        };

        let dashboard = DashboardAnalyzer::new().generate_dashboard("u1", Some(&record), &counts);
        assert_eq!(dashboard.badges[0].icon, "🎯");
        assert_eq!(dashboard.stats.focus_sessions, 5);
        assert_eq!(dashboard.stats.materials_shared, 2);

        let json = serde_json::to_value(&dashboard).unwrap();
        assert_eq!(json["badges"][0]["type"], "focus_master");
        assert_eq!(json["levelProgress"]["pointsToNextLevel"], 38);
    }
}
