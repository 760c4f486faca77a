//! Task timer model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityId, EntityKind};
use crate::util::next_timestamp;

/// A timer tracking time spent on one task.
///
/// `end_time == None` means the timer is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTimer {
    pub id: EntityId,
    /// Name of the task being timed
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskTimer {
    /// Create a timer that starts running now
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            name: name.into(),
            start_time: now,
            end_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.end_time.is_none()
    }

    /// Stop a running timer at `now`. Returns `false` if it was already stopped.
    pub fn stop(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_running() {
            return false;
        }
        self.end_time = Some(now.max(self.start_time));
        self.updated_at = next_timestamp(self.updated_at);
        true
    }

    /// Start the timer over from `now`, discarding any previous end time
    pub fn restart(&mut self, now: DateTime<Utc>) {
        self.start_time = now;
        self.end_time = None;
        self.updated_at = next_timestamp(self.updated_at);
    }

    /// Stop if running, otherwise restart
    pub fn toggle(&mut self, now: DateTime<Utc>) {
        if !self.stop(now) {
            self.restart(now);
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.updated_at = next_timestamp(self.updated_at);
    }

    /// Time spent so far; running timers measure up to `now`
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let end = self.end_time.unwrap_or(now);
        (end - self.start_time).max(Duration::zero())
    }
}

impl Entity for TaskTimer {
    const KIND: EntityKind = EntityKind::Timer;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // Placeholders are stopped so they never show up as running work.
    fn placeholder(id: EntityId) -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            id,
            name: "Unreadable timer".to_string(),
            start_time: epoch,
            end_time: Some(epoch),
            created_at: epoch,
            updated_at: epoch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_timer_is_running() {
        let timer = TaskTimer::new("Write report");
        assert!(timer.is_running());
        assert_eq!(timer.start_time, timer.created_at);
    }

    #[test]
    fn test_stop_then_toggle_restarts() {
        let mut timer = TaskTimer::new("Write report");
        let stop_at = timer.start_time + Duration::minutes(25);
        assert!(timer.stop(stop_at));
        assert!(!timer.is_running());
        assert_eq!(timer.elapsed(Utc::now()), Duration::minutes(25));
        assert!(!timer.stop(stop_at));

        let restart_at = stop_at + Duration::minutes(5);
        timer.toggle(restart_at);
        assert!(timer.is_running());
        assert_eq!(timer.start_time, restart_at);
    }

    #[test]
    fn test_running_timer_serializes_null_end_time() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let timer = TaskTimer {
            id: EntityId::from("t1"),
            name: "Focus".to_string(),
            start_time: start,
            end_time: None,
            created_at: start,
            updated_at: start,
        };
        let value = serde_json::to_value(&timer).unwrap();
        assert_eq!(value["endTime"], serde_json::Value::Null);
        assert_eq!(value["startTime"], "2024-05-01T09:30:00Z");

        let decoded: TaskTimer = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, timer);
        assert!(decoded.is_running());
    }

    #[test]
    fn test_placeholder_is_not_running() {
        let placeholder = TaskTimer::placeholder(EntityId::from("x"));
        assert!(!placeholder.is_running());
        assert!(placeholder.is_placeholder());
    }
}
