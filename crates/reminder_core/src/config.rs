use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NUDGE_HOUR: u32 = 20;
pub const DEFAULT_NUDGE_MAX_TITLES: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Offset applied to task dates and times, which are stored as wall-clock values.
    pub utc_offset_minutes: i32,
    pub nudge: NudgeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NudgeConfig {
    /// End-of-day time at which the incomplete-task summary fires.
    pub anchor: NaiveTime,
    pub max_titles: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            nudge: NudgeConfig::default(),
        }
    }
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            anchor: NaiveTime::from_hms_opt(DEFAULT_NUDGE_HOUR, 0, 0).unwrap_or_default(),
            max_titles: DEFAULT_NUDGE_MAX_TITLES,
        }
    }
}

impl SchedulerConfig {
    pub fn time_zone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    /// Resolves a wall-clock date and time to an absolute instant.
    pub fn resolve(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let naive = date.and_time(time);
        match self.time_zone().from_local_datetime(&naive).single() {
            Some(local) => local.with_timezone(&Utc),
            None => Utc.from_utc_datetime(&naive),
        }
    }
}
