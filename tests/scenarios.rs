use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use pretty_assertions::assert_eq;

use tasktrack::db::Database;
use tasktrack::model::{JobStatus, NewTask, Preferences};
use tasktrack::notifications::{Channel, Notification, Notifier};
use tasktrack::paths::Paths;
use tasktrack::prefs::PreferenceStore;
use tasktrack::registry::TaskRegistry;
use tasktrack::scheduler::{NotificationScheduler, SchedulerEvent};
use tasktrack::store;
use tasktrack::validate::ValidationError;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
struct Inbox(Arc<Mutex<Vec<String>>>);

impl Inbox {
    fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for Inbox {
    fn create_channel(&mut self, _channel: &Channel) -> Result<()> {
        Ok(())
    }

    fn post(&mut self, _channel: &Channel, notification: &Notification) -> Result<()> {
        self.0.lock().unwrap().push(notification.body.clone());
        Ok(())
    }
}

fn workspace() -> (tempfile::TempDir, Paths, Database) {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::new(dir.path().join("home"));
    paths.ensure().unwrap();
    let db = Database::create(paths.db()).unwrap();
    (dir, paths, db)
}

fn terminal_event(events: &std::sync::mpsc::Receiver<SchedulerEvent>) -> SchedulerEvent {
    loop {
        match events.recv_timeout(WAIT).expect("scheduler went quiet") {
            SchedulerEvent::Scheduled { .. } | SchedulerEvent::Replaced { .. } => {}
            event => return event,
        }
    }
}

#[test]
fn buy_milk_insert_and_delete() {
    let (_dir, _paths, db) = workspace();
    let registry = TaskRegistry::open(&db).unwrap();
    registry.refresh().wait().unwrap();
    assert!(registry.snapshot().is_empty());

    registry.insert(NewTask::titled("Buy milk")).wait().unwrap();
    let tasks = registry.snapshot();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, 1);
    assert_eq!(tasks[0].title, "Buy milk");
    assert_eq!(tasks[0].text_content, None);
    assert_eq!(tasks[0].image_data, None);
    assert_eq!(tasks[0].audio_data, None);

    let task = tasks[0].clone();
    registry.delete(&task).wait().unwrap();
    assert!(registry.snapshot().is_empty());

    let conn = db.connect().unwrap();
    assert!(store::list_tasks(&conn).unwrap().is_empty());
}

#[test]
fn empty_title_never_reaches_the_table() {
    let (_dir, _paths, db) = workspace();
    let registry = TaskRegistry::open(&db).unwrap();
    for title in ["", " ", "\n\t"] {
        let err = registry.insert(NewTask::titled(title)).wait().unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::EmptyTitle)
        );
    }
    let conn = db.connect().unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn writes_from_one_registry_show_up_in_another_after_refresh() {
    let (_dir, _paths, db) = workspace();
    let ui = TaskRegistry::open(&db).unwrap();
    let other = TaskRegistry::open(&db).unwrap();
    let updates = ui.subscribe();

    other
        .insert(NewTask::titled("from elsewhere").with_image(vec![1, 2, 3], Some("pic".into())))
        .wait()
        .unwrap();
    ui.refresh().wait().unwrap();

    let list = updates.recv_timeout(WAIT).unwrap();
    let list = if list.is_empty() {
        // The initial load may have been published first
        updates.recv_timeout(WAIT).unwrap()
    } else {
        list
    };
    assert_eq!(list[0].title, "from elsewhere");
    assert_eq!(list[0].image_data.as_deref(), Some(&[1u8, 2, 3][..]));
}

#[test]
fn preferences_name_and_reset() {
    let (_dir, paths, _db) = workspace();
    let prefs = PreferenceStore::open(paths.prefs()).unwrap();
    assert_eq!(prefs.current(), Preferences::default());

    prefs.save_user_name("Ann").wait().unwrap();
    assert_eq!(
        PreferenceStore::open(paths.prefs()).unwrap().current(),
        Preferences {
            is_first_time: false,
            user_name: "Ann".into()
        }
    );

    prefs.set_first_time(true).wait().unwrap();
    let reread = PreferenceStore::open(paths.prefs()).unwrap().current();
    assert!(reread.is_first_time);
    assert_eq!(reread.user_name, "");
}

#[test]
fn reminder_fires_once_with_latest_message() {
    let (_dir, _paths, db) = workspace();
    let inbox = Inbox::default();
    let scheduler = NotificationScheduler::start(&db, inbox.clone(), true).unwrap();
    let events = scheduler.subscribe();

    let soon = Local::now() + chrono::Duration::milliseconds(250);
    let later = Local::now() + chrono::Duration::milliseconds(350);
    let first = scheduler.schedule("m1", &soon).wait().unwrap();
    let second = scheduler.schedule("m2", &later).wait().unwrap();

    assert_eq!(
        terminal_event(&events),
        SchedulerEvent::Fired {
            job_id: second,
            message: "m2".into()
        }
    );
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(inbox.messages(), vec!["m2"]);
    assert_eq!(
        scheduler.job(first).wait().unwrap().unwrap().status,
        JobStatus::Replaced
    );
}

#[test]
fn reminder_without_permission_is_dropped() {
    let (_dir, _paths, db) = workspace();
    let inbox = Inbox::default();
    let scheduler = NotificationScheduler::start(&db, inbox.clone(), false).unwrap();
    let events = scheduler.subscribe();

    let id = scheduler
        .schedule("Hi", &(Local::now() + chrono::Duration::milliseconds(60)))
        .wait()
        .unwrap();

    assert_eq!(terminal_event(&events), SchedulerEvent::PermissionDenied { job_id: id });
    assert!(inbox.messages().is_empty());
    assert!(scheduler.pending().wait().unwrap().is_none());
}
