//! In-memory [`NotificationPlatform`] that records every call.
//!
//! Used by tests and by hosts that want to drive delivery themselves: nothing
//! fires on its own, callers pop due notifications with [`RecordingPlatform::fire_due`].

use std::collections::{BTreeMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};

use crate::{
    notifications::{
        NotificationPayload, NotificationPlatform, PlatformError, PlatformHandle,
        ScheduledNotification,
    },
    permission::PermissionState,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveNotification {
    pub handle: PlatformHandle,
    pub key: String,
    pub fire_at: DateTime<Utc>,
    pub payload: NotificationPayload,
}

#[derive(Debug, Default)]
struct RecordingState {
    next_handle: u64,
    live: BTreeMap<PlatformHandle, LiveNotification>,
    delivered: Vec<ScheduledNotification>,
    permission: PermissionState,
    prompt_answer: PermissionState,
    unavailable: bool,
    prompts: usize,
    cancels: usize,
    schedule_failures: VecDeque<String>,
    prompt_failures: VecDeque<String>,
    failing_cancel_keys: HashSet<String>,
    hold_prompts: bool,
}

#[derive(Debug, Default)]
pub struct RecordingPlatform {
    state: Mutex<RecordingState>,
    released: Condvar,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// A platform that answers every call with [`PlatformError::Unavailable`].
    pub fn unavailable() -> Self {
        let platform = Self::default();
        platform.state.lock().unavailable = true;
        platform
    }

    /// Already granted before the session starts, as after a previous visit.
    pub fn granted() -> Self {
        Self::new().with_permission(PermissionState::Granted)
    }

    pub fn with_permission(self, permission: PermissionState) -> Self {
        self.set_permission(permission);
        self
    }

    /// What the user will answer the next time a prompt is shown.
    pub fn with_prompt_answer(self, answer: PermissionState) -> Self {
        self.state.lock().prompt_answer = answer;
        self
    }

    pub fn set_permission(&self, permission: PermissionState) {
        self.state.lock().permission = permission;
    }

    pub fn fail_next_schedule(&self, reason: impl Into<String>) {
        self.state.lock().schedule_failures.push_back(reason.into());
    }

    pub fn fail_next_prompt(&self, reason: impl Into<String>) {
        self.state.lock().prompt_failures.push_back(reason.into());
    }

    /// Every cancel for a notification under `key` fails until cleared.
    pub fn fail_cancels_for(&self, key: impl Into<String>) {
        self.state.lock().failing_cancel_keys.insert(key.into());
    }

    pub fn clear_cancel_failures(&self) {
        self.state.lock().failing_cancel_keys.clear();
    }

    /// Blocks permission prompts until [`RecordingPlatform::release_prompts`].
    pub fn hold_prompts(&self) {
        self.state.lock().hold_prompts = true;
    }

    pub fn release_prompts(&self) {
        self.state.lock().hold_prompts = false;
        self.released.notify_all();
    }

    pub fn prompt_count(&self) -> usize {
        self.state.lock().prompts
    }

    pub fn cancel_count(&self) -> usize {
        self.state.lock().cancels
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn live_for(&self, key: &str) -> Vec<LiveNotification> {
        self.state
            .lock()
            .live
            .values()
            .filter(|live| live.key == key)
            .cloned()
            .collect()
    }

    pub fn delivered(&self) -> Vec<ScheduledNotification> {
        self.state.lock().delivered.clone()
    }

    /// Removes and returns every live notification due at or before `now`.
    pub fn fire_due(&self, now: DateTime<Utc>) -> Vec<LiveNotification> {
        let mut state = self.state.lock();
        let due: Vec<PlatformHandle> = state
            .live
            .values()
            .filter(|live| live.fire_at <= now)
            .map(|live| live.handle)
            .collect();
        due.into_iter()
            .filter_map(|handle| state.live.remove(&handle))
            .collect()
    }
}

impl NotificationPlatform for RecordingPlatform {
    fn schedule(
        &self,
        key: &str,
        fire_at: DateTime<Utc>,
        payload: &NotificationPayload,
    ) -> Result<PlatformHandle, PlatformError> {
        let mut state = self.state.lock();
        if state.unavailable {
            return Err(PlatformError::Unavailable);
        }
        if let Some(reason) = state.schedule_failures.pop_front() {
            return Err(PlatformError::Transient(reason));
        }
        state.next_handle += 1;
        let handle = PlatformHandle(state.next_handle);
        state.live.insert(
            handle,
            LiveNotification {
                handle,
                key: key.to_string(),
                fire_at,
                payload: payload.clone(),
            },
        );
        Ok(handle)
    }

    fn cancel(&self, handle: PlatformHandle) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if state.unavailable {
            return Err(PlatformError::Unavailable);
        }
        if let Some(live) = state.live.get(&handle) {
            if state.failing_cancel_keys.contains(&live.key) {
                return Err(PlatformError::Transient(format!(
                    "cancel refused for {}",
                    live.key
                )));
            }
        }
        state.cancels += 1;
        state.live.remove(&handle);
        Ok(())
    }

    fn deliver_now(&self, notification: &ScheduledNotification) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if state.unavailable {
            return Err(PlatformError::Unavailable);
        }
        state.delivered.push(notification.clone());
        Ok(())
    }

    fn request_permission(&self) -> Result<PermissionState, PlatformError> {
        let mut state = self.state.lock();
        state.prompts += 1;
        while state.hold_prompts {
            self.released.wait(&mut state);
        }
        if state.unavailable {
            return Err(PlatformError::Unavailable);
        }
        if let Some(reason) = state.prompt_failures.pop_front() {
            return Err(PlatformError::Transient(reason));
        }
        state.permission = state.prompt_answer;
        Ok(state.permission)
    }

    fn current_permission(&self) -> Result<PermissionState, PlatformError> {
        let state = self.state.lock();
        if state.unavailable {
            return Err(PlatformError::Unavailable);
        }
        Ok(state.permission)
    }
}
