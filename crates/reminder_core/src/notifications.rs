use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{permission::PermissionState, task::Task};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    TaskReminder,
    IncompleteNudge,
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// A notification the registry holds for a single key until it fires or is cancelled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledNotification {
    pub key: String,
    pub fire_at: DateTime<Utc>,
    pub payload: NotificationPayload,
    pub kind: NotificationKind,
}

/// Opaque token returned by the platform for a scheduled notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlatformHandle(pub u64);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("notifications are not supported in this environment")]
    Unavailable,
    #[error("platform refused the call: {0}")]
    Transient(String),
}

/// Platform-specific notification adapters will implement this trait.
pub trait NotificationPlatform: Send + Sync {
    fn schedule(
        &self,
        key: &str,
        fire_at: DateTime<Utc>,
        payload: &NotificationPayload,
    ) -> Result<PlatformHandle, PlatformError>;
    fn cancel(&self, handle: PlatformHandle) -> Result<(), PlatformError>;
    fn deliver_now(&self, notification: &ScheduledNotification) -> Result<(), PlatformError>;
    /// Shows the permission prompt and blocks until the user answers.
    fn request_permission(&self) -> Result<PermissionState, PlatformError>;
    fn current_permission(&self) -> Result<PermissionState, PlatformError>;
}

pub fn task_key(task_id: &str) -> String {
    format!("task:{task_id}")
}

pub fn nudge_key(date: NaiveDate) -> String {
    format!("nudge:{}", date.format("%Y-%m-%d"))
}

pub(crate) fn task_payload(task: &Task) -> NotificationPayload {
    let body = match task.time {
        Some(time) => format!("Scheduled for {}", time.format("%H:%M")),
        None => "Scheduled for today".to_string(),
    };
    NotificationPayload::new(task.title.clone(), body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn keys_are_derived_from_source_identity() {
        assert_eq!(task_key("42"), "task:42");
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(nudge_key(date), "nudge:2024-06-01");
    }

    #[test]
    fn task_payload_mentions_time_of_day() {
        let task = Task::new("1", "Write report").scheduled_at(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveTime::from_hms_opt(14, 5, 0).unwrap(),
        );
        let payload = task_payload(&task);
        assert_eq!(payload.title, "Write report");
        assert_eq!(payload.body, "Scheduled for 14:05");
    }
}
