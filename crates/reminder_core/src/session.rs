use std::sync::Arc;

use parking_lot::Mutex;
use tracing::instrument;

use crate::{
    permission::PermissionState, registry::CancelReport, scheduler::NotificationScheduler,
};

#[derive(Debug, Default)]
struct SessionState {
    user_id: Option<String>,
    initialized: bool,
}

/// Per-session bootstrap around a [`NotificationScheduler`].
///
/// Initialization runs once per session, as soon as a user is known; teardown
/// cancels everything and allows the next session to initialize again.
pub struct NotificationSession {
    scheduler: Arc<NotificationScheduler>,
    state: Mutex<SessionState>,
}

impl NotificationSession {
    pub fn new(scheduler: Arc<NotificationScheduler>) -> Self {
        Self {
            scheduler,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn scheduler(&self) -> &Arc<NotificationScheduler> {
        &self.scheduler
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn user_id(&self) -> Option<String> {
        self.state.lock().user_id.clone()
    }

    /// Returns true when this call performed the one-time initialization.
    #[instrument(skip(self))]
    pub fn initialize(&self, user_id: Option<&str>) -> bool {
        let Some(user_id) = user_id else {
            tracing::debug!("no user in session; notifications idle");
            return false;
        };

        let mut state = self.state.lock();
        if state.initialized {
            if state.user_id.as_deref() != Some(user_id) {
                tracing::warn!(
                    current = ?state.user_id,
                    "session already initialized for another user; tear down first"
                );
            }
            return false;
        }

        let enabled = self.scheduler.load_settings(user_id);
        if enabled && self.scheduler.get_permission_status() == PermissionState::Unknown {
            let answer = self.scheduler.request_permission();
            tracing::info!(?answer, "notification permission requested");
        }

        state.user_id = Some(user_id.to_string());
        state.initialized = true;
        true
    }

    #[instrument(skip(self))]
    pub fn teardown(&self) -> CancelReport {
        let mut state = self.state.lock();
        let report = self.scheduler.end_session();
        if !report.is_clean() {
            tracing::warn!(
                failures = report.failures.len(),
                "some notifications could not be cancelled at teardown"
            );
        }
        state.user_id = None;
        state.initialized = false;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::HeldClock, recording::RecordingPlatform, scheduler::ScheduleOutcome,
        settings::MemorySettingsStore, task::Task,
    };
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use std::thread;

    fn session(platform: &Arc<RecordingPlatform>, enabled: bool) -> NotificationSession {
        let settings = Arc::new(MemorySettingsStore::new().with_user("ada", enabled));
        let scheduler = NotificationScheduler::builder(platform.clone(), settings).build();
        NotificationSession::new(Arc::new(scheduler))
    }

    fn held_session(platform: &Arc<RecordingPlatform>) -> (Arc<HeldClock>, Arc<NotificationSession>) {
        let settings = Arc::new(MemorySettingsStore::new().with_user("ada", true));
        let clock = Arc::new(HeldClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap(),
        ));
        let scheduler = NotificationScheduler::builder(platform.clone(), settings)
            .with_clock(clock.clone())
            .build();
        (clock, Arc::new(NotificationSession::new(Arc::new(scheduler))))
    }

    fn morning_task(id: &str) -> Task {
        Task::new(id, "Stand-up").scheduled_at(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        )
    }

    #[test]
    fn idle_without_user() {
        let platform = Arc::new(RecordingPlatform::new());
        let session = session(&platform, true);
        assert!(!session.initialize(None));
        assert!(!session.is_initialized());
        assert_eq!(platform.prompt_count(), 0);
    }

    #[test]
    fn initializes_once_and_prompts_once() {
        let platform =
            Arc::new(RecordingPlatform::new().with_prompt_answer(PermissionState::Granted));
        let session = session(&platform, true);

        assert!(session.initialize(Some("ada")));
        assert!(!session.initialize(Some("ada")));
        assert_eq!(platform.prompt_count(), 1);
        assert_eq!(session.user_id().as_deref(), Some("ada"));
        assert!(session.scheduler().can_show_notifications());
    }

    #[test]
    fn disabled_settings_skip_prompt() {
        let platform = Arc::new(RecordingPlatform::new());
        let session = session(&platform, false);
        assert!(session.initialize(Some("ada")));
        assert_eq!(platform.prompt_count(), 0);
    }

    #[test]
    fn known_permission_is_not_prompted_again() {
        let platform = Arc::new(RecordingPlatform::new().with_permission(PermissionState::Denied));
        let session = session(&platform, true);
        assert!(session.initialize(Some("ada")));
        assert_eq!(platform.prompt_count(), 0);
    }

    #[test]
    fn teardown_allows_reinitialization() {
        let platform = Arc::new(RecordingPlatform::granted());
        let session = session(&platform, true);
        assert!(session.initialize(Some("ada")));
        assert!(session.teardown().is_clean());
        assert!(!session.is_initialized());
        assert!(session.initialize(Some("ada")));
    }

    #[test]
    fn scheduling_after_teardown_does_not_reach_platform() {
        let platform = Arc::new(RecordingPlatform::granted());
        let (_, session) = held_session(&platform);
        assert!(session.initialize(Some("ada")));
        session.scheduler().schedule_task_notification(&morning_task("A"));
        assert_eq!(session.teardown().cancelled, 1);

        let scheduler = session.scheduler();
        assert!(!scheduler.notifications_enabled());
        assert_eq!(
            scheduler.schedule_task_notification(&morning_task("B")),
            ScheduleOutcome::Inactive
        );
        assert_eq!(platform.live_count(), 0);
        assert_eq!(scheduler.deferred_count(), 0);
    }

    #[test]
    fn schedule_in_flight_during_teardown_is_dropped() {
        let platform = Arc::new(RecordingPlatform::granted());
        let (clock, session) = held_session(&platform);
        assert!(session.initialize(Some("ada")));

        clock.hold();
        let pending = {
            let session = session.clone();
            thread::spawn(move || {
                session
                    .scheduler()
                    .schedule_task_notification(&morning_task("T"))
            })
        };
        clock.wait_for_readers(1);
        assert!(session.teardown().is_clean());
        clock.release();

        assert_eq!(pending.join().unwrap(), ScheduleOutcome::Inactive);
        assert_eq!(platform.live_count(), 0);
        assert_eq!(session.scheduler().get_scheduled_count(), 0);
    }

    #[test]
    fn intent_deferred_during_teardown_is_not_replayed_next_session() {
        let platform = Arc::new(RecordingPlatform::new().with_permission(PermissionState::Denied));
        let (clock, session) = held_session(&platform);
        assert!(session.initialize(Some("ada")));

        clock.hold();
        let pending = {
            let session = session.clone();
            thread::spawn(move || {
                session
                    .scheduler()
                    .schedule_task_notification(&morning_task("T"))
            })
        };
        clock.wait_for_readers(1);
        session.teardown();
        clock.release();

        assert_eq!(pending.join().unwrap(), ScheduleOutcome::Inactive);
        assert_eq!(session.scheduler().deferred_count(), 0);

        platform.set_permission(PermissionState::Granted);
        assert!(session.initialize(Some("ada")));
        assert_eq!(platform.live_count(), 0);
    }
}
