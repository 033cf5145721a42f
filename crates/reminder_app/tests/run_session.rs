use std::collections::HashMap;
use std::fs;
use std::path::Path;

use reminder_app::app::{load_tasks, run, AppConfig};
use reminder_core::{
    permission::PermissionState,
    scheduler::{ScheduleOutcome, TestNotificationOutcome},
};
use tempfile::tempdir;

const TASKS: &str = r#"[
  {"id": "1", "title": "Call Mom", "scheduled_date": "2099-01-01", "time": "09:00:00"},
  {"id": "2", "title": "Pay rent", "scheduled_date": "2099-01-01", "time": "12:00:00", "completed": true},
  {"id": "3", "title": "Read a book"},
  {"id": "4", "title": "Review notes", "scheduled_date": "2099-01-01", "time": "18:30:00"}
]"#;

fn write_file(path: &Path, contents: &str) {
    fs::write(path, contents).expect("write fixture");
}

fn config_for(vars: HashMap<&'static str, String>) -> AppConfig {
    AppConfig::from_lookup(|name| vars.get(name).cloned()).expect("config")
}

#[test]
fn schedules_reminders_and_nudge_for_enabled_user() {
    let temp = tempdir().expect("tempdir");
    let tasks = temp.path().join("tasks.json");
    let settings = temp.path().join("settings.json");
    write_file(&tasks, TASKS);
    write_file(&settings, r#"{"ada": {"notifications_enabled": true}}"#);

    let config = config_for(HashMap::from([
        ("REMINDER_USER_ID", "ada".to_string()),
        ("REMINDER_TASKS_FILE", tasks.display().to_string()),
        ("REMINDER_SETTINGS_FILE", settings.display().to_string()),
        ("REMINDER_DATE", "2099-01-01".to_string()),
    ]));
    let summary = run(config).expect("run");

    assert!(summary.initialized);
    assert_eq!(summary.permission, PermissionState::Granted);
    assert_eq!(summary.scheduled, 2);
    assert_eq!(summary.skipped, 2);
    assert!(matches!(summary.nudge, Some(ScheduleOutcome::Scheduled(_))));
    assert_eq!(
        summary.test_notification,
        Some(TestNotificationOutcome::Delivered)
    );
    assert_eq!(
        summary.pending_keys,
        vec!["nudge:2099-01-01", "task:1", "task:4"]
    );
    assert_eq!(summary.cancelled_at_teardown, 3);
}

#[test]
fn disabled_user_defers_everything() {
    let temp = tempdir().expect("tempdir");
    let tasks = temp.path().join("tasks.json");
    let settings = temp.path().join("settings.json");
    write_file(&tasks, TASKS);
    write_file(&settings, r#"{"ada": {"notifications_enabled": false}}"#);

    let config = config_for(HashMap::from([
        ("REMINDER_USER_ID", "ada".to_string()),
        ("REMINDER_TASKS_FILE", tasks.display().to_string()),
        ("REMINDER_SETTINGS_FILE", settings.display().to_string()),
        ("REMINDER_DATE", "2099-01-01".to_string()),
    ]));
    let summary = run(config).expect("run");

    assert_eq!(summary.permission, PermissionState::Unknown);
    assert_eq!(summary.scheduled, 0);
    assert_eq!(summary.deferred, 2);
    assert_eq!(summary.nudge, Some(ScheduleOutcome::Deferred));
    assert!(matches!(
        summary.test_notification,
        Some(TestNotificationOutcome::Blocked { enabled: false, .. })
    ));
    assert!(summary.pending_keys.is_empty());
}

#[test]
fn malformed_task_file_is_reported() {
    let temp = tempdir().expect("tempdir");
    let tasks = temp.path().join("tasks.json");
    write_file(&tasks, "{ not a list");
    let err = load_tasks(&tasks).unwrap_err();
    assert!(err.to_string().contains("not a JSON array"));
}

#[test]
fn run_fails_when_tasks_cannot_be_loaded() {
    let temp = tempdir().expect("tempdir");
    let tasks = temp.path().join("missing.json");
    let config = config_for(HashMap::from([
        ("REMINDER_USER_ID", "ada".to_string()),
        ("REMINDER_TASKS_FILE", tasks.display().to_string()),
    ]));
    let err = run(config).unwrap_err();
    assert!(format!("{err:#}").contains("unable to read tasks"));
}
