use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    clock::{Clock, SystemClock},
    config::SchedulerConfig,
    error::SchedulerError,
    notifications::{
        task_key, task_payload, NotificationKind, NotificationPayload, NotificationPlatform,
        PlatformHandle, ScheduledNotification,
    },
    permission::{PermissionGate, PermissionState},
    registry::{CancelReport, ScheduleRegistry},
    settings::{SettingsError, SettingsStore},
    task::Task,
};

pub const TEST_NOTIFICATION_KEY: &str = "test";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled(DateTime<Utc>),
    /// Gate closed; the entry is kept as intent until permission or settings change.
    Deferred,
    /// Any reminder or intent under the key was removed instead.
    Cleared,
    /// Task has no explicit date and time.
    NotSchedulable,
    /// Fire time already passed.
    Expired,
    Failed(SchedulerError),
    /// No session is active, or everything was cancelled while the call was
    /// in flight. Nothing was scheduled or kept.
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestNotificationOutcome {
    Delivered,
    Blocked {
        permission: PermissionState,
        enabled: bool,
    },
    Failed(SchedulerError),
}

pub struct NotificationScheduler {
    config: SchedulerConfig,
    platform: Arc<dyn NotificationPlatform>,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    gate: PermissionGate,
    registry: ScheduleRegistry,
    enabled: AtomicBool,
    active: AtomicBool,
    /// Bumped by every cancel-all. Calls that started under an older value
    /// must not leave anything behind.
    epoch: AtomicU64,
    deferred: Mutex<HashMap<String, ScheduledNotification>>,
}

pub struct NotificationSchedulerBuilder {
    platform: Arc<dyn NotificationPlatform>,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl NotificationSchedulerBuilder {
    pub fn new(platform: Arc<dyn NotificationPlatform>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            platform,
            settings,
            clock: Arc::new(SystemClock),
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> NotificationScheduler {
        NotificationScheduler {
            gate: PermissionGate::new(self.platform.clone()),
            registry: ScheduleRegistry::new(self.platform.clone()),
            config: self.config,
            platform: self.platform,
            settings: self.settings,
            clock: self.clock,
            enabled: AtomicBool::new(false),
            active: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            deferred: Mutex::new(HashMap::new()),
        }
    }
}

impl NotificationScheduler {
    pub fn builder(
        platform: Arc<dyn NotificationPlatform>,
        settings: Arc<dyn SettingsStore>,
    ) -> NotificationSchedulerBuilder {
        NotificationSchedulerBuilder::new(platform, settings)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    /// Fetches the user's settings, caches the enabled flag for this session and
    /// re-reads the platform permission. Returns the effective enabled flag.
    pub fn load_settings(&self, user_id: &str) -> bool {
        let enabled = match self.settings.get_settings(user_id) {
            Ok(settings) => settings.notifications_enabled,
            Err(SettingsError::NotFound) => {
                tracing::debug!(%user_id, "no notification settings; treating as disabled");
                false
            }
            Err(SettingsError::Unavailable(reason)) => {
                let err = SchedulerError::SettingsUnavailable(reason);
                tracing::warn!(%user_id, %err, "treating notifications as disabled");
                false
            }
        };
        self.enabled.store(enabled, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        let permission = self.gate.refresh();
        tracing::debug!(%user_id, enabled, ?permission, "notification settings loaded");
        self.resume_deferred();
        enabled
    }

    pub fn notifications_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Shows the permission prompt. Deferred intents are replayed when the
    /// answer opens the gate.
    pub fn request_permission(&self) -> PermissionState {
        match self.gate.request() {
            Ok(state) => {
                self.resume_deferred();
                state
            }
            Err(err) => {
                tracing::warn!(%err, "permission request failed");
                self.gate.current_state()
            }
        }
    }

    pub fn schedule_task_notification(&self, task: &Task) -> ScheduleOutcome {
        let key = task_key(&task.id);
        if task.completed {
            self.clear(&key);
            return ScheduleOutcome::Cleared;
        }
        let (Some(date), Some(time)) = (task.scheduled_date, task.time) else {
            return ScheduleOutcome::NotSchedulable;
        };
        self.schedule_notification(ScheduledNotification {
            key,
            fire_at: self.config.resolve(date, time),
            payload: task_payload(task),
            kind: NotificationKind::TaskReminder,
        })
    }

    /// Gated path shared by task reminders and nudges.
    pub fn schedule_notification(&self, entry: ScheduledNotification) -> ScheduleOutcome {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.schedule_in(entry, epoch)
    }

    fn schedule_in(&self, entry: ScheduledNotification, epoch: u64) -> ScheduleOutcome {
        if !self.is_current(epoch) {
            tracing::debug!(key = %entry.key, "no active session; not scheduling");
            return ScheduleOutcome::Inactive;
        }
        if entry.fire_at <= self.clock.now() {
            self.clear(&entry.key);
            tracing::debug!(key = %entry.key, fire_at = %entry.fire_at, "fire time already passed");
            return ScheduleOutcome::Expired;
        }
        if !self.can_show_notifications() {
            let mut deferred = self.deferred.lock();
            if !self.is_current(epoch) {
                return ScheduleOutcome::Inactive;
            }
            tracing::debug!(key = %entry.key, "delivery not allowed; deferring");
            deferred.insert(entry.key.clone(), entry);
            return ScheduleOutcome::Deferred;
        }

        self.deferred.lock().remove(&entry.key);
        let key = entry.key.clone();
        let fire_at = entry.fire_at;
        match self.registry.upsert_if(entry, || self.is_current(epoch)) {
            Ok(true) => ScheduleOutcome::Scheduled(fire_at),
            Ok(false) => ScheduleOutcome::Inactive,
            Err(err) => {
                if err == SchedulerError::PlatformUnavailable {
                    self.gate.mark_unavailable();
                }
                tracing::warn!(%key, %err, "unable to schedule notification");
                ScheduleOutcome::Failed(err)
            }
        }
    }

    pub fn cancel_notification(&self, task_id: &str) -> bool {
        self.clear(&task_key(task_id))
    }

    /// Cancels whatever is pending or deferred under `key`.
    pub fn cancel_key(&self, key: &str) -> bool {
        self.clear(key)
    }

    /// Cancels every pending notification and drops every deferred intent.
    /// Scheduling calls already in flight end as [`ScheduleOutcome::Inactive`].
    pub fn cancel_all_notifications(&self) -> CancelReport {
        let dropped = {
            let mut deferred = self.deferred.lock();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            let dropped = deferred.len();
            deferred.clear();
            dropped
        };
        let report = self.registry.cancel_all();
        tracing::debug!(
            cancelled = report.cancelled,
            failures = report.failures.len(),
            dropped,
            "cancelled all notifications"
        );
        report
    }

    /// Closes the session: nothing is scheduled or deferred until the next
    /// [`NotificationScheduler::load_settings`].
    pub fn end_session(&self) -> CancelReport {
        self.enabled.store(false, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        self.cancel_all_notifications()
    }

    /// Replays deferred intents once the gate is open. Intents whose fire time
    /// already passed are dropped. Returns how many were scheduled.
    pub fn resume_deferred(&self) -> usize {
        if !self.can_show_notifications() {
            return 0;
        }
        let (epoch, pending) = {
            let mut deferred = self.deferred.lock();
            let pending: Vec<ScheduledNotification> =
                deferred.drain().map(|(_, entry)| entry).collect();
            (self.epoch.load(Ordering::SeqCst), pending)
        };
        pending
            .into_iter()
            .map(|entry| self.schedule_in(entry, epoch))
            .filter(|outcome| matches!(outcome, ScheduleOutcome::Scheduled(_)))
            .count()
    }

    /// Called by the platform adapter when a scheduled notification is shown.
    pub fn notification_fired(&self, key: &str, handle: PlatformHandle) -> bool {
        self.registry.mark_fired(key, handle)
    }

    pub fn show_test_notification(&self) -> TestNotificationOutcome {
        let enabled = self.notifications_enabled();
        if !self.gate.can_deliver(enabled) {
            return TestNotificationOutcome::Blocked {
                permission: self.gate.current_state(),
                enabled,
            };
        }
        let notification = ScheduledNotification {
            key: TEST_NOTIFICATION_KEY.to_string(),
            fire_at: self.clock.now(),
            payload: NotificationPayload::new(
                "Notifications are working",
                "You will be reminded about scheduled tasks.",
            ),
            kind: NotificationKind::Test,
        };
        match self.platform.deliver_now(&notification) {
            Ok(()) => TestNotificationOutcome::Delivered,
            Err(err) => {
                let err = SchedulerError::from_platform(TEST_NOTIFICATION_KEY, err);
                if err == SchedulerError::PlatformUnavailable {
                    self.gate.mark_unavailable();
                }
                tracing::warn!(%err, "test notification failed");
                TestNotificationOutcome::Failed(err)
            }
        }
    }

    pub fn get_permission_status(&self) -> PermissionState {
        self.gate.current_state()
    }

    pub fn can_show_notifications(&self) -> bool {
        self.gate.can_deliver(self.notifications_enabled())
    }

    pub fn get_scheduled_count(&self) -> usize {
        self.registry.count()
    }

    pub fn is_scheduled(&self, key: &str) -> bool {
        self.registry.has(key)
    }

    pub fn notification(&self, key: &str) -> Option<ScheduledNotification> {
        self.registry.get(key)
    }

    pub fn pending_keys(&self) -> Vec<String> {
        self.registry.pending_keys()
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.lock().len()
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.active.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn clear(&self, key: &str) -> bool {
        let had_intent = self.deferred.lock().remove(key).is_some();
        let cancelled = self.registry.cancel(key);
        had_intent || cancelled
    }
}
