use std::sync::Arc;

use chrono::NaiveDate;

use crate::{
    config::NudgeConfig,
    notifications::{nudge_key, NotificationKind, NotificationPayload, ScheduledNotification},
    scheduler::{NotificationScheduler, ScheduleOutcome},
    task::Task,
};

/// Schedules one end-of-day reminder per date summarising unfinished tasks.
///
/// Works only through [`NotificationScheduler`]; the registry is never touched
/// directly.
pub struct NudgeEngine {
    scheduler: Arc<NotificationScheduler>,
    config: NudgeConfig,
}

impl NudgeEngine {
    pub fn new(scheduler: Arc<NotificationScheduler>) -> Self {
        let config = scheduler.config().nudge.clone();
        Self { scheduler, config }
    }

    pub fn with_config(mut self, config: NudgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces whatever nudge state exists for `date`. A day with nothing left
    /// to do cancels a previously scheduled nudge.
    pub fn schedule_incomplete_nudge(&self, tasks: &[Task], date: NaiveDate) -> ScheduleOutcome {
        let key = nudge_key(date);
        let incomplete: Vec<&Task> = tasks.iter().filter(|task| !task.completed).collect();
        if incomplete.is_empty() {
            if self.scheduler.cancel_key(&key) {
                tracing::debug!(%key, "all tasks done; nudge cancelled");
            }
            return ScheduleOutcome::Cleared;
        }

        let fire_at = self
            .scheduler
            .config()
            .resolve(date, self.config.anchor);
        self.scheduler.schedule_notification(ScheduledNotification {
            key,
            fire_at,
            payload: summarize(&incomplete, self.config.max_titles),
            kind: NotificationKind::IncompleteNudge,
        })
    }
}

fn summarize(incomplete: &[&Task], max_titles: usize) -> NotificationPayload {
    let count = incomplete.len();
    let title = if count == 1 {
        "1 task still open today".to_string()
    } else {
        format!("{count} tasks still open today")
    };

    let shown: Vec<&str> = incomplete
        .iter()
        .take(max_titles)
        .map(|task| task.title.as_str())
        .collect();
    let body = if shown.is_empty() {
        "Take a minute to review your list before the day ends.".to_string()
    } else {
        let remaining = count - shown.len();
        let mut body = shown.join(", ");
        if remaining > 0 {
            body.push_str(&format!(" and {remaining} more"));
        }
        body
    };
    NotificationPayload::new(title, body)
}
