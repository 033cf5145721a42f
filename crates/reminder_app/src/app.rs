use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, Utc};
use reminder_core::{
    config::SchedulerConfig,
    permission::PermissionState,
    scheduler::{ScheduleOutcome, TestNotificationOutcome},
    settings::{JsonFileSettingsStore, MemorySettingsStore, SettingsStore},
    task::Task,
    NotificationScheduler, NotificationSession, NudgeEngine,
};
use tracing::{debug, info, warn};

use crate::platform::LogPlatform;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) user_id: Option<String>,
    pub(crate) tasks_file: Option<PathBuf>,
    pub(crate) settings_file: Option<PathBuf>,
    pub(crate) date: Option<NaiveDate>,
    pub(crate) grant_permission: bool,
    pub(crate) scheduler: SchedulerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable source. Unparseable values are logged
    /// and the default kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(user) = lookup("REMINDER_USER_ID") {
            let user = user.trim();
            if !user.is_empty() {
                config.user_id = Some(user.to_string());
            }
        }
        if let Some(path) = lookup("REMINDER_TASKS_FILE") {
            config.tasks_file = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("REMINDER_SETTINGS_FILE") {
            config.settings_file = Some(PathBuf::from(path));
        }
        if let Some(offset) = lookup("REMINDER_UTC_OFFSET_MINUTES") {
            match offset.trim().parse::<i32>() {
                Ok(value) => config.scheduler.utc_offset_minutes = value,
                Err(err) => warn!(%offset, %err, "ignoring REMINDER_UTC_OFFSET_MINUTES"),
            }
        }
        if let Some(anchor) = lookup("REMINDER_NUDGE_TIME") {
            match NaiveTime::parse_from_str(anchor.trim(), "%H:%M") {
                Ok(value) => config.scheduler.nudge.anchor = value,
                Err(err) => warn!(%anchor, %err, "ignoring REMINDER_NUDGE_TIME"),
            }
        }
        if let Some(limit) = lookup("REMINDER_NUDGE_MAX_TITLES") {
            match limit.trim().parse::<usize>() {
                Ok(value) => config.scheduler.nudge.max_titles = value,
                Err(err) => warn!(%limit, %err, "ignoring REMINDER_NUDGE_MAX_TITLES"),
            }
        }
        if let Some(date) = lookup("REMINDER_DATE") {
            match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
                Ok(value) => config.date = Some(value),
                Err(err) => warn!(%date, %err, "ignoring REMINDER_DATE"),
            }
        }
        if let Some(grant) = lookup("REMINDER_GRANT_PERMISSION") {
            config.grant_permission = !matches!(
                grant.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "deny"
            );
        }
        Ok(config)
    }

    fn settings_store(&self) -> Arc<dyn SettingsStore> {
        match &self.settings_file {
            Some(path) => {
                debug!(path = %path.display(), "reading settings from file");
                Arc::new(JsonFileSettingsStore::new(path))
            }
            None => {
                let store = MemorySettingsStore::new();
                if let Some(user) = &self.user_id {
                    store.set(
                        user.clone(),
                        reminder_core::settings::UserNotificationSettings {
                            notifications_enabled: true,
                        },
                    );
                }
                Arc::new(store)
            }
        }
    }

    fn target_date(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| {
            Utc::now()
                .with_timezone(&self.scheduler.time_zone())
                .date_naive()
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            tasks_file: None,
            settings_file: None,
            date: None,
            grant_permission: true,
            scheduler: SchedulerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub initialized: bool,
    pub permission: PermissionState,
    pub scheduled: usize,
    pub deferred: usize,
    pub skipped: usize,
    pub failed: usize,
    pub nudge: Option<ScheduleOutcome>,
    pub test_notification: Option<TestNotificationOutcome>,
    pub pending_keys: Vec<String>,
    pub cancelled_at_teardown: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &ScheduleOutcome) {
        match outcome {
            ScheduleOutcome::Scheduled(_) => self.scheduled += 1,
            ScheduleOutcome::Deferred => self.deferred += 1,
            ScheduleOutcome::Failed(_) => self.failed += 1,
            ScheduleOutcome::Cleared
            | ScheduleOutcome::NotSchedulable
            | ScheduleOutcome::Expired
            | ScheduleOutcome::Inactive => self.skipped += 1,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "permission: {:?}", self.permission)?;
        writeln!(
            f,
            "tasks: {} scheduled, {} deferred, {} skipped, {} failed",
            self.scheduled, self.deferred, self.skipped, self.failed
        )?;
        if let Some(nudge) = &self.nudge {
            writeln!(f, "nudge: {nudge:?}")?;
        }
        if let Some(test) = &self.test_notification {
            writeln!(f, "test notification: {test:?}")?;
        }
        writeln!(f, "pending: {}", self.pending_keys.join(", "))?;
        write!(f, "cancelled at teardown: {}", self.cancelled_at_teardown)
    }
}

pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("unable to read tasks from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of tasks", path.display()))
}

/// Runs one session: schedules reminders for every task plus the day's nudge,
/// then tears the session down.
pub fn run(config: AppConfig) -> Result<RunSummary> {
    let tasks = match &config.tasks_file {
        Some(path) => load_tasks(path)?,
        None => Vec::new(),
    };
    let prompt_answer = if config.grant_permission {
        PermissionState::Granted
    } else {
        PermissionState::Denied
    };
    let platform = Arc::new(LogPlatform::new(prompt_answer));
    let scheduler = Arc::new(
        NotificationScheduler::builder(platform, config.settings_store())
            .with_config(config.scheduler.clone())
            .build(),
    );
    let session = NotificationSession::new(scheduler.clone());
    let nudges = NudgeEngine::new(scheduler.clone());

    let mut summary = RunSummary {
        initialized: session.initialize(config.user_id.as_deref()),
        ..RunSummary::default()
    };
    if !summary.initialized {
        info!("no user configured; nothing to schedule");
        return Ok(summary);
    }

    for task in &tasks {
        let outcome = scheduler.schedule_task_notification(task);
        debug!(task = %task.id, ?outcome, "task processed");
        summary.record(&outcome);
    }
    let date = config.target_date();
    let day: Vec<Task> = tasks
        .iter()
        .filter(|task| task.scheduled_date.map_or(true, |scheduled| scheduled == date))
        .cloned()
        .collect();
    summary.nudge = Some(nudges.schedule_incomplete_nudge(&day, date));
    summary.test_notification = Some(scheduler.show_test_notification());
    summary.permission = scheduler.get_permission_status();
    summary.pending_keys = scheduler.pending_keys();
    info!(
        pending = scheduler.get_scheduled_count(),
        deferred = scheduler.deferred_count(),
        "session scheduled"
    );

    summary.cancelled_at_teardown = session.teardown().cancelled;
    Ok(summary)
}
