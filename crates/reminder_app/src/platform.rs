use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reminder_core::{
    notifications::{
        NotificationPayload, NotificationPlatform, PlatformError, PlatformHandle,
        ScheduledNotification,
    },
    permission::PermissionState,
};
use tracing::info;

/// Platform adapter for headless hosts: every call is written to the log.
#[derive(Debug)]
pub struct LogPlatform {
    prompt_answer: PermissionState,
    state: Mutex<LogState>,
}

#[derive(Debug, Default)]
struct LogState {
    permission: PermissionState,
    next_handle: u64,
    scheduled: HashMap<PlatformHandle, String>,
}

impl LogPlatform {
    pub fn new(prompt_answer: PermissionState) -> Self {
        Self {
            prompt_answer,
            state: Mutex::new(LogState::default()),
        }
    }
}

impl NotificationPlatform for LogPlatform {
    fn schedule(
        &self,
        key: &str,
        fire_at: DateTime<Utc>,
        payload: &NotificationPayload,
    ) -> Result<PlatformHandle, PlatformError> {
        let mut state = self.state.lock();
        state.next_handle += 1;
        let handle = PlatformHandle(state.next_handle);
        state.scheduled.insert(handle, key.to_string());
        info!(%key, %fire_at, title = %payload.title, body = %payload.body, "schedule");
        Ok(handle)
    }

    fn cancel(&self, handle: PlatformHandle) -> Result<(), PlatformError> {
        if let Some(key) = self.state.lock().scheduled.remove(&handle) {
            info!(%key, "cancel");
        }
        Ok(())
    }

    fn deliver_now(&self, notification: &ScheduledNotification) -> Result<(), PlatformError> {
        info!(
            title = %notification.payload.title,
            body = %notification.payload.body,
            "deliver"
        );
        Ok(())
    }

    fn request_permission(&self) -> Result<PermissionState, PlatformError> {
        let mut state = self.state.lock();
        state.permission = self.prompt_answer;
        info!(answer = ?state.permission, "permission prompt");
        Ok(state.permission)
    }

    fn current_permission(&self) -> Result<PermissionState, PlatformError> {
        Ok(self.state.lock().permission)
    }
}
