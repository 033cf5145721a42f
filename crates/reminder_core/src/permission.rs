use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::{
    error::SchedulerError,
    notifications::{NotificationPlatform, PlatformError},
};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

/// Tracks whether delivery is authorized and mediates permission prompts.
///
/// Only one platform prompt is outstanding at a time: callers arriving while a
/// prompt is open wait for it and share its answer.
pub struct PermissionGate {
    platform: Arc<dyn NotificationPlatform>,
    inner: Mutex<GateInner>,
    settled: Condvar,
}

#[derive(Debug, Default)]
struct GateInner {
    state: PermissionState,
    unavailable: bool,
    prompting: bool,
    generation: u64,
    last_result: Option<Result<PermissionState, SchedulerError>>,
    prompts_issued: usize,
}

impl PermissionGate {
    pub fn new(platform: Arc<dyn NotificationPlatform>) -> Self {
        Self {
            platform,
            inner: Mutex::new(GateInner::default()),
            settled: Condvar::new(),
        }
    }

    pub fn current_state(&self) -> PermissionState {
        self.inner.lock().state
    }

    pub fn can_deliver(&self, enabled: bool) -> bool {
        enabled && self.current_state() == PermissionState::Granted
    }

    /// Number of prompts actually shown by the platform.
    pub fn request_count(&self) -> usize {
        self.inner.lock().prompts_issued
    }

    pub fn request(&self) -> Result<PermissionState, SchedulerError> {
        let mut inner = self.inner.lock();
        if inner.unavailable {
            return Err(SchedulerError::PlatformUnavailable);
        }
        if inner.prompting {
            return self.wait_for_prompt(&mut inner);
        }

        inner.prompting = true;
        inner.prompts_issued += 1;
        let answer = MutexGuard::unlocked(&mut inner, || self.platform.request_permission());

        let outcome = match answer {
            Ok(state) => {
                inner.state = state;
                tracing::debug!(?state, "permission prompt answered");
                Ok(state)
            }
            Err(PlatformError::Unavailable) => {
                Self::force_denied(&mut inner);
                Err(SchedulerError::PlatformUnavailable)
            }
            Err(PlatformError::Transient(reason)) => {
                tracing::warn!(%reason, "permission prompt failed");
                Err(SchedulerError::PermissionPrompt(reason))
            }
        };
        inner.prompting = false;
        inner.generation = inner.generation.wrapping_add(1);
        inner.last_result = Some(outcome.clone());
        self.settled.notify_all();
        outcome
    }

    /// Re-reads the platform's permission without prompting.
    pub fn refresh(&self) -> PermissionState {
        let mut inner = self.inner.lock();
        if inner.unavailable || inner.prompting {
            return inner.state;
        }
        match self.platform.current_permission() {
            Ok(state) => inner.state = state,
            Err(PlatformError::Unavailable) => Self::force_denied(&mut inner),
            Err(PlatformError::Transient(reason)) => {
                tracing::warn!(%reason, "unable to read notification permission");
            }
        }
        inner.state
    }

    pub(crate) fn mark_unavailable(&self) {
        Self::force_denied(&mut self.inner.lock());
    }

    fn wait_for_prompt(
        &self,
        inner: &mut MutexGuard<'_, GateInner>,
    ) -> Result<PermissionState, SchedulerError> {
        let generation = inner.generation;
        while inner.prompting && inner.generation == generation {
            self.settled.wait(inner);
        }
        let state = inner.state;
        inner.last_result.clone().unwrap_or(Ok(state))
    }

    fn force_denied(inner: &mut GateInner) {
        if !inner.unavailable {
            tracing::warn!("notification platform unavailable; permission forced to denied");
        }
        inner.unavailable = true;
        inner.state = PermissionState::Denied;
    }
}
