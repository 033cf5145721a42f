use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Task record owned by the task-management side. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            time: None,
            scheduled_date: None,
            completed: false,
        }
    }

    pub fn scheduled_at(mut self, date: NaiveDate, time: NaiveTime) -> Self {
        self.scheduled_date = Some(date);
        self.time = Some(time);
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_missing_optional_fields() {
        let task: Task = serde_json::from_str(r#"{"id":"7","title":"Stretch"}"#).unwrap();
        assert_eq!(task, Task::new("7", "Stretch"));
    }

    #[test]
    fn deserializes_scheduled_task() {
        let raw = r#"{"id":"8","title":"Call Mom","time":"09:30:00","scheduled_date":"2024-06-01","completed":true}"#;
        let task: Task = serde_json::from_str(raw).unwrap();
        assert_eq!(task.time, NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(task.scheduled_date, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert!(task.completed);
    }
}
