pub mod clock;
pub mod config;
pub mod error;
pub mod notifications;
pub mod nudge;
pub mod permission;
#[cfg(any(test, feature = "test-support"))]
pub mod recording;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod task;

pub use crate::error::SchedulerError;
pub use crate::nudge::NudgeEngine;
pub use crate::scheduler::{NotificationScheduler, NotificationSchedulerBuilder};
pub use crate::session::NotificationSession;
