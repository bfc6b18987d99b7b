use chrono::{DateTime, Duration, Utc};

use crate::activity::Activity;

/// Length of a standard focus session.
pub const FOCUS_SESSION_MINUTES: i64 = 25;

/// One running focus timer. Each session is its own value; handlers pass it
/// around instead of sharing timer state.
#[derive(Debug, Clone)]
pub struct FocusSession {
    started_at: DateTime<Utc>,
    target: Duration,
    accumulated: Duration,
    running_since: Option<DateTime<Utc>>,
}

impl FocusSession {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self::with_target(now, Duration::minutes(FOCUS_SESSION_MINUTES))
    }

    pub fn with_target(now: DateTime<Utc>, target: Duration) -> Self {
        Self {
            started_at: now,
            target,
            accumulated: Duration::zero(),
            running_since: Some(now),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += (now - since).max(Duration::zero());
        }
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    /// Time spent running, paused stretches excluded.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let running = self
            .running_since
            .map(|since| (now - since).max(Duration::zero()))
            .unwrap_or_else(Duration::zero);
        self.accumulated + running
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.target - self.elapsed(now)).max(Duration::zero())
    }

    pub fn progress_percent(&self, now: DateTime<Utc>) -> f64 {
        let target = self.target.num_seconds();
        if target <= 0 {
            return 100.0;
        }
        let elapsed = self.elapsed(now).num_seconds() as f64;
        (elapsed / target as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn is_complete(&self, now: DateTime<Utc>) -> bool {
        self.elapsed(now) >= self.target
    }

    /// `mm:ss` countdown as shown on the timer.
    pub fn display(&self, now: DateTime<Utc>) -> String {
        let remaining = self.remaining(now).num_seconds();
        format!("{:02}:{:02}", remaining / 60, remaining % 60)
    }

    /// Ends the session, completed only if the full target ran.
    pub fn finish(mut self, now: DateTime<Utc>) -> Activity {
        self.pause(now);
        Activity::FocusSession {
            started_at: self.started_at,
            ended_at: now,
            focused_seconds: self.accumulated.num_seconds().max(0) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_session_completes() {
        let t0 = Utc::now();
        let session = FocusSession::start(t0);
        assert_eq!(session.display(t0), "25:00");

        let end = t0 + Duration::minutes(25);
        assert!(session.is_complete(end));
        assert_eq!(session.progress_percent(end), 100.0);
        match session.finish(end) {
            Activity::FocusSession {
                focused_seconds, ..
            } => assert_eq!(focused_seconds, 25 * 60),
            other => panic!("unexpected activity {other:?}"),
        }
    }

    #[test]
    fn paused_time_does_not_count() {
        let t0 = Utc::now();
        let mut session = FocusSession::start(t0);
        session.pause(t0 + Duration::minutes(10));
        assert!(!session.is_running());

        session.resume(t0 + Duration::minutes(30));
        let now = t0 + Duration::minutes(35);
        assert_eq!(session.elapsed(now), Duration::minutes(15));
        assert_eq!(session.display(now), "10:00");
        assert!(!session.is_complete(now));
    }

    #[test]
    fn early_finish_is_incomplete() {
        let t0 = Utc::now();
        let session = FocusSession::start(t0);
        let activity = session.finish(t0 + Duration::minutes(12));
        assert_eq!(activity.action(), None);
        assert!(!activity.is_counted());
    }
}
