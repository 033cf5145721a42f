use thiserror::Error;

use crate::notifications::PlatformError;

/// Failures inside the scheduling subsystem. None of these are fatal to callers;
/// they degrade to notifications silently not firing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("notifications are unavailable in this environment")]
    PlatformUnavailable,
    #[error("platform call for `{key}` failed: {reason}")]
    TransientPlatform { key: String, reason: String },
    #[error("permission prompt failed: {0}")]
    PermissionPrompt(String),
    #[error("notification settings unavailable: {0}")]
    SettingsUnavailable(String),
}

impl SchedulerError {
    pub(crate) fn from_platform(key: &str, err: PlatformError) -> Self {
        match err {
            PlatformError::Unavailable => Self::PlatformUnavailable,
            PlatformError::Transient(reason) => Self::TransientPlatform {
                key: key.to_string(),
                reason,
            },
        }
    }
}
