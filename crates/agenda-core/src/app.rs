use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::calendar::{CalendarEvent, EventDraft, EventList, MonthGrid, WeekDay};
use crate::datetime::local_date;
use crate::notification::{
    Notification, NotificationCenter, Notifier, Permission, reminder_set_message,
    task_added_message, task_completed_message,
};
use crate::reminder::{REMINDER_TITLE, due_reminders};
use crate::store::{CALENDAR_EVENTS_KEY, KeyValueStore, NOTIFICATIONS_KEY, TASKS_KEY};
use crate::task::{Priority, Reminder, Task, TaskDraft, TaskList};
use crate::view::{DayView, ViewState};

enum Slot<T> {
    Missing,
    Corrupt,
    Loaded(Vec<T>),
}

/// Root application state: the three collections plus form and view flags.
///
/// Every mutation goes through one of the action methods below, each of
/// which writes the affected collection back to the store before returning.
pub struct App<S, N> {
    store: S,
    notifier: N,
    tasks: TaskList,
    events: EventList,
    notifications: NotificationCenter,
    today: NaiveDate,
    pub view: ViewState,
    pub task_draft: TaskDraft,
    pub is_adding_task: bool,
    pub event_draft: EventDraft,
    pub show_add_event: bool,
}

impl<S, N> App<S, N>
where
    S: KeyValueStore,
    N: Notifier,
{
    /// Restores state from `store`. Unreadable slots are logged and replaced
    /// by defaults; slots that were never written are seeded and saved.
    #[tracing::instrument(skip_all)]
    pub fn load(store: S, notifier: N, now: DateTime<Utc>) -> Self {
        let today = local_date(now);

        let (tasks, seed_tasks) = match load_slot::<Task, _>(&store, TASKS_KEY) {
            Slot::Loaded(tasks) => (TaskList::restore(tasks), false),
            Slot::Missing => (TaskList::sample(today), true),
            Slot::Corrupt => (TaskList::sample(today), false),
        };
        let notifications = match load_slot::<Notification, _>(&store, NOTIFICATIONS_KEY) {
            Slot::Loaded(items) => NotificationCenter::restore(items),
            Slot::Missing | Slot::Corrupt => NotificationCenter::new(),
        };
        let (events, seed_events) = match load_slot::<CalendarEvent, _>(&store, CALENDAR_EVENTS_KEY)
        {
            Slot::Loaded(events) => (EventList::restore(events), false),
            Slot::Missing => (EventList::sample(today, now), true),
            Slot::Corrupt => (EventList::new(), false),
        };

        info!(
            tasks = tasks.len(),
            events = events.len(),
            notifications = notifications.len(),
            "loaded application state"
        );

        let mut app = Self {
            store,
            notifier,
            tasks,
            events,
            notifications,
            today,
            view: ViewState::new(today),
            task_draft: TaskDraft::titled("", today),
            is_adding_task: true,
            event_draft: EventDraft::blank(today),
            show_add_event: false,
        };

        if seed_tasks {
            app.persist_tasks();
        }
        if seed_events {
            app.persist_events();
        }

        if app.notifier.permission() != Permission::Granted {
            let permission = app.notifier.request_permission();
            debug!(?permission, "requested notification permission");
        }

        app
    }

    /// Re-reads every slot from the store, keeping in-memory state for any
    /// slot that is missing or unreadable. Used by long-running sessions so
    /// edits made by other processes are seen before the next check.
    #[tracing::instrument(skip_all)]
    pub fn reload(&mut self) {
        if let Slot::Loaded(tasks) = load_slot::<Task, _>(&self.store, TASKS_KEY) {
            self.tasks = TaskList::restore(tasks);
        }
        if let Slot::Loaded(items) = load_slot::<Notification, _>(&self.store, NOTIFICATIONS_KEY) {
            self.notifications = NotificationCenter::restore(items);
        }
        if let Slot::Loaded(events) = load_slot::<CalendarEvent, _>(&self.store, CALENDAR_EVENTS_KEY)
        {
            self.events = EventList::restore(events);
        }
    }

    pub fn tasks(&self) -> &[Task] {
        self.tasks.as_slice()
    }

    pub fn task(&self, id: i64) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn events(&self) -> &[CalendarEvent] {
        self.events.as_slice()
    }

    pub fn notifications(&self) -> &[Notification] {
        self.notifications.as_slice()
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.unread_count()
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn into_parts(self) -> (S, N) {
        (self.store, self.notifier)
    }

    /// Re-reads the wall clock date; filters and grids use it as "today".
    pub fn set_clock(&mut self, now: DateTime<Utc>) {
        self.today = local_date(now);
    }

    pub fn visible_tasks(&self) -> Vec<&Task> {
        self.view.visible_tasks(self.tasks.as_slice(), self.today)
    }

    pub fn month_grid(&self) -> MonthGrid {
        self.view
            .month_grid(self.events.as_slice(), self.tasks.as_slice(), self.today)
    }

    pub fn week(&self) -> Vec<WeekDay> {
        self.view.week(self.events.as_slice(), self.today)
    }

    pub fn day(&self) -> DayView<'_> {
        self.view
            .day(self.events.as_slice(), self.tasks.as_slice(), self.today)
    }

    /// Submits the task compose form. A blank title leaves the form as is.
    #[tracing::instrument(skip(self, now))]
    pub fn submit_task(&mut self, now: DateTime<Utc>) -> Option<i64> {
        let (id, title) = {
            let task = self.tasks.add(&self.task_draft, now)?;
            (task.id, task.title.clone())
        };
        self.persist_tasks();

        self.task_draft = TaskDraft::titled("", self.today);
        self.is_adding_task = false;

        self.notifications.push(task_added_message(&title), now);
        self.persist_notifications();
        self.notifier.toast(
            "Task Added",
            &format!("\"{title}\" has been added to your tasks."),
        );

        info!(id, "added task");
        Some(id)
    }

    pub fn add_task(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Option<i64> {
        self.task_draft = draft;
        self.submit_task(now)
    }

    /// Flips completion; only the open-to-done transition is announced.
    #[tracing::instrument(skip(self, now))]
    pub fn toggle_task(&mut self, id: i64, now: DateTime<Utc>) -> Option<bool> {
        let (completed, title) = {
            let task = self.tasks.toggle_completion(id)?;
            (task.completed, task.title.clone())
        };
        self.persist_tasks();

        if completed {
            self.notifications.push(task_completed_message(&title), now);
            self.persist_notifications();
        }
        Some(completed)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_task(&mut self, id: i64) -> bool {
        if self.tasks.delete(id).is_none() {
            debug!("delete ignored for unknown task");
            return false;
        }
        self.persist_tasks();
        true
    }

    pub fn toggle_highlight(&mut self, id: i64) -> Option<bool> {
        let highlighted = self.tasks.toggle_highlight(id)?.highlighted;
        self.persist_tasks();
        Some(highlighted)
    }

    pub fn set_priority(&mut self, id: i64, priority: Option<Priority>) -> bool {
        if self.tasks.set_priority(id, priority).is_none() {
            return false;
        }
        self.persist_tasks();
        true
    }

    /// Overwrites a task's reminder. Setting (not clearing) one is announced.
    #[tracing::instrument(skip(self, reminder, now))]
    pub fn set_reminder(
        &mut self,
        id: i64,
        reminder: Option<Reminder>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(task) = self.tasks.set_reminder(id, reminder) else {
            return false;
        };
        let announce = task
            .reminder
            .as_ref()
            .map(|r| (task.title.clone(), r.label.clone()));
        self.persist_tasks();

        if let Some((title, label)) = announce {
            self.notifications
                .push(reminder_set_message(&title, &label), now);
            self.persist_notifications();
            self.notifier.toast(
                "Reminder Set",
                &format!("You'll be reminded about \"{title}\" in {label}."),
            );
        }
        true
    }

    /// Applies a free-form minute count; invalid input is ignored.
    pub fn apply_custom_reminder(&mut self, id: i64, raw: &str, now: DateTime<Utc>) -> bool {
        match Reminder::custom(raw) {
            Some(reminder) => self.set_reminder(id, Some(reminder), now),
            None => {
                debug!(raw, "ignoring invalid custom reminder");
                false
            }
        }
    }

    /// Submits the event compose form. Missing title or date leaves it open.
    #[tracing::instrument(skip(self, now))]
    pub fn submit_event(&mut self, now: DateTime<Utc>) -> Option<i64> {
        let (id, title) = {
            let event = self.events.add(&self.event_draft, now)?;
            (event.id, event.title.clone())
        };
        self.persist_events();

        self.show_add_event = false;
        self.event_draft = EventDraft::blank(self.today);
        self.notifier.toast(
            "Event Added",
            &format!("\"{title}\" has been added to your calendar."),
        );

        info!(id, "added event");
        Some(id)
    }

    pub fn add_event(&mut self, draft: EventDraft, now: DateTime<Utc>) -> Option<i64> {
        self.event_draft = draft;
        self.submit_event(now)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_event(&mut self, id: i64) -> bool {
        if self.events.delete(id).is_none() {
            debug!("delete ignored for unknown event");
            return false;
        }
        self.persist_events();
        self.notifier.toast(
            "Event Deleted",
            "The event has been removed from your calendar.",
        );
        true
    }

    pub fn mark_all_read(&mut self) {
        self.notifications.mark_all_read();
        self.persist_notifications();
    }

    pub fn delete_notification(&mut self, id: i64) -> bool {
        if self.notifications.delete(id).is_none() {
            return false;
        }
        self.persist_notifications();
        true
    }

    /// One reminder pass at `now`; returns how many reminders fired.
    #[tracing::instrument(skip(self, now))]
    pub fn check_reminders(&mut self, now: DateTime<Utc>) -> usize {
        self.set_clock(now);
        let due = due_reminders(self.tasks.as_slice(), &self.notifications, now);
        if due.is_empty() {
            return 0;
        }

        for reminder in &due {
            self.notifications.push(reminder.message.clone(), now);
            self.notifier
                .notify_if_permitted(REMINDER_TITLE, &reminder.message);
            self.notifier.toast(REMINDER_TITLE, &reminder.message);
        }
        self.persist_notifications();

        info!(count = due.len(), "fired reminders");
        due.len()
    }

    fn persist_tasks(&mut self) {
        save_slot(&mut self.store, TASKS_KEY, self.tasks.as_slice());
    }

    fn persist_events(&mut self) {
        save_slot(&mut self.store, CALENDAR_EVENTS_KEY, self.events.as_slice());
    }

    fn persist_notifications(&mut self) {
        save_slot(
            &mut self.store,
            NOTIFICATIONS_KEY,
            self.notifications.as_slice(),
        );
    }
}

fn load_slot<T, S>(store: &S, key: &str) -> Slot<T>
where
    T: DeserializeOwned,
    S: KeyValueStore,
{
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Slot::Missing,
        Err(error) => {
            error!(key, error = %format!("{error:#}"), "failed reading stored slot; using defaults");
            return Slot::Corrupt;
        }
    };

    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(items) => {
            debug!(key, count = items.len(), "loaded stored slot");
            Slot::Loaded(items)
        }
        Err(error) => {
            error!(key, %error, "failed parsing stored slot; using defaults");
            Slot::Corrupt
        }
    }
}

fn save_slot<T, S>(store: &mut S, key: &str, items: &[T])
where
    T: Serialize,
    S: KeyValueStore,
{
    let json = match serde_json::to_string(items) {
        Ok(json) => json,
        Err(error) => {
            error!(key, %error, "failed serializing slot");
            return;
        }
    };

    if let Err(error) = store.set(key, &json) {
        warn!(key, error = %format!("{error:#}"), "failed writing slot; in-memory state kept");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::RecordingNotifier;
    use crate::store::MemoryStore;

    const T: i64 = 1_760_000_000_000;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).expect("valid instant")
    }

    fn fresh() -> App<MemoryStore, RecordingNotifier> {
        let mut store = MemoryStore::new();
        store.set(TASKS_KEY, "[]").expect("seed tasks");
        store.set(CALENDAR_EVENTS_KEY, "[]").expect("seed events");
        App::load(store, RecordingNotifier::new(Permission::Granted), at(T))
    }

    fn draft(title: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            ..TaskDraft::default()
        }
    }

    fn stored_tasks(app: &App<MemoryStore, RecordingNotifier>) -> Vec<Task> {
        let raw = app
            .store()
            .get(TASKS_KEY)
            .expect("get")
            .expect("tasks slot");
        serde_json::from_str(&raw).expect("parse tasks")
    }

    #[test]
    fn first_run_seeds_and_saves_defaults() {
        let app = App::load(
            MemoryStore::new(),
            RecordingNotifier::new(Permission::NotGranted),
            at(T),
        );

        assert_eq!(app.tasks().len(), 1);
        assert_eq!(app.tasks()[0].title, "example");
        assert_eq!(app.events().len(), 2);
        assert!(app.notifications().is_empty());
        assert!(app.store().get(CALENDAR_EVENTS_KEY).expect("get").is_some());
        assert!(app.store().get(NOTIFICATIONS_KEY).expect("get").is_none());
    }

    #[test]
    fn corrupt_slots_fall_back_without_overwriting() {
        let mut store = MemoryStore::new();
        store.set(TASKS_KEY, "{not json").expect("set");
        store.set(NOTIFICATIONS_KEY, "42").expect("set");
        store.set(CALENDAR_EVENTS_KEY, "[{]").expect("set");

        let app = App::load(store, RecordingNotifier::new(Permission::Granted), at(T));
        assert_eq!(app.tasks().len(), 1);
        assert!(app.notifications().is_empty());
        assert!(app.events().is_empty());
        assert_eq!(
            app.store().get(TASKS_KEY).expect("get").as_deref(),
            Some("{not json")
        );
    }

    #[test]
    fn submit_task_resets_form_and_announces() {
        let mut app = fresh();
        app.task_draft = draft("Go to the market");
        app.task_draft.description = "Saturday morning".to_string();
        app.task_draft.priority = Some(Priority::Medium);

        let id = app.submit_task(at(T + 1)).expect("added");
        assert_eq!(id, T + 1);
        assert!(!app.is_adding_task);
        assert!(app.task_draft.title.is_empty());
        assert!(app.task_draft.description.is_empty());
        assert_eq!(app.task_draft.priority, None);
        assert_eq!(app.notifications()[0].message, "New task added: \"Go to the market\"");
        assert_eq!(
            app.notifier().toasts,
            [(
                "Task Added".to_string(),
                "\"Go to the market\" has been added to your tasks.".to_string()
            )]
        );
        assert_eq!(stored_tasks(&app), app.tasks());
    }

    #[test]
    fn blank_title_keeps_form_open() {
        let mut app = fresh();
        app.task_draft = draft("   ");
        app.task_draft.description = "kept".to_string();

        assert!(app.submit_task(at(T + 1)).is_none());
        assert!(app.is_adding_task);
        assert_eq!(app.task_draft.description, "kept");
        assert!(app.tasks().is_empty());
        assert!(app.notifications().is_empty());
    }

    #[test]
    fn completion_announced_only_when_finishing() {
        let mut app = fresh();
        let id = app.add_task(draft("Stretch"), at(T)).expect("added");
        let before = app.notifications().len();

        assert_eq!(app.toggle_task(id, at(T + 10)), Some(true));
        assert_eq!(app.notifications().len(), before + 1);
        assert_eq!(app.notifications()[0].message, "Task completed: \"Stretch\"");

        assert_eq!(app.toggle_task(id, at(T + 20)), Some(false));
        assert_eq!(app.notifications().len(), before + 1);
        assert_eq!(app.toggle_task(12345, at(T + 30)), None);
    }

    #[test]
    fn reminder_set_announces_but_clear_does_not() {
        let mut app = fresh();
        let id = app.add_task(draft("Tea"), at(T)).expect("added");
        let before = app.notifications().len();

        assert!(app.set_reminder(id, Reminder::new(5, "5 minutes"), at(T + 1)));
        assert_eq!(
            app.notifications()[0].message,
            "Reminder set for \"Tea\" in 5 minutes"
        );
        assert!(app.set_reminder(id, None, at(T + 2)));
        assert_eq!(app.notifications().len(), before + 1);
        assert!(!app.set_reminder(999, Reminder::new(1, "1 minute"), at(T + 3)));
        assert!(!app.apply_custom_reminder(id, "abc", at(T + 4)));
        assert!(app.apply_custom_reminder(id, "45", at(T + 5)));
        assert_eq!(
            app.tasks()[0].reminder,
            Reminder::new(45, "45 minutes")
        );
    }

    #[test]
    fn reminder_fires_once_and_again_after_delete() {
        let mut app = fresh();
        let id = app.add_task(draft("Call mom"), at(T)).expect("added");
        app.set_reminder(id, Reminder::new(5, "5 minutes"), at(T));
        let message = "Reminder: \"Call mom\" is due soon!";
        let count = |app: &App<MemoryStore, RecordingNotifier>| {
            app.notifications()
                .iter()
                .filter(|n| n.message == message)
                .count()
        };

        assert_eq!(app.check_reminders(at(T + 4 * 60_000)), 0);
        assert_eq!(count(&app), 0);

        assert_eq!(app.check_reminders(at(T + 5 * 60_000)), 1);
        assert_eq!(count(&app), 1);
        assert_eq!(app.notifications()[0].message, message);
        assert!(!app.notifications()[0].read);
        assert_eq!(app.notifier().shown.len(), 1);

        assert_eq!(app.check_reminders(at(T + 5 * 60_000 + 10_000)), 0);

        let fired_id = app.notifications()[0].id;
        assert!(app.delete_notification(fired_id));
        assert_eq!(count(&app), 0);

        assert_eq!(app.check_reminders(at(T + 6 * 60_000)), 1);
        assert_eq!(count(&app), 1);
    }

    #[test]
    fn completed_task_does_not_remind() {
        let mut app = fresh();
        let id = app.add_task(draft("Done early"), at(T)).expect("added");
        app.set_reminder(id, Reminder::new(1, "1 minute"), at(T));
        app.toggle_task(id, at(T + 1));
        assert_eq!(app.check_reminders(at(T + 3_600_000)), 0);
    }

    #[test]
    fn reminders_skip_os_notification_without_permission() {
        let mut store = MemoryStore::new();
        store.set(TASKS_KEY, "[]").expect("seed");
        let mut app = App::load(store, RecordingNotifier::new(Permission::NotGranted), at(T));
        let id = app.add_task(draft("Quiet"), at(T)).expect("added");
        app.set_reminder(id, Reminder::new(1, "1 minute"), at(T));

        assert_eq!(app.check_reminders(at(T + 60_000)), 1);
        assert!(app.notifier().shown.is_empty());
        assert!(
            app.notifier()
                .toasts
                .iter()
                .any(|(title, _)| title == REMINDER_TITLE)
        );
    }

    #[test]
    fn events_and_notification_housekeeping() {
        let mut app = fresh();
        let mut event = EventDraft::blank(app.today());
        event.title = "Dentist".to_string();
        app.show_add_event = true;

        let id = app.add_event(event, at(T)).expect("added");
        assert!(!app.show_add_event);
        assert!(app.event_draft.title.is_empty());
        assert_eq!(app.day().events.len(), 1);

        assert!(app.delete_event(id));
        assert!(!app.delete_event(id));
        assert!(app.events().is_empty());

        app.add_task(draft("a"), at(T + 1));
        app.add_task(draft("b"), at(T + 2));
        assert_eq!(app.unread_count(), 2);
        app.mark_all_read();
        assert_eq!(app.unread_count(), 0);
    }

    #[test]
    fn deleting_a_task_twice_is_a_quiet_noop() {
        let mut app = fresh();
        let id = app.add_task(draft("Once"), at(T)).expect("added");
        assert_eq!(app.task(id).map(|t| t.title.as_str()), Some("Once"));

        assert!(app.delete_task(id));
        assert!(app.task(id).is_none());
        assert!(stored_tasks(&app).is_empty());

        app.store_mut().set(TASKS_KEY, "[]\n").expect("marker write");
        assert!(!app.delete_task(id));
        assert_eq!(
            app.store().get(TASKS_KEY).expect("get").as_deref(),
            Some("[]\n")
        );
        assert!(app.tasks().is_empty());
    }

    #[test]
    fn reload_picks_up_external_writes() {
        let mut app = fresh();
        app.add_task(draft("mine"), at(T));

        let external = r#"[{"id":5,"title":"theirs","completed":false,"highlighted":false,
            "priority":null,"reminder":null,"dueDate":"","description":""}]"#;
        app.store_mut().set(TASKS_KEY, external).expect("external write");
        app.store_mut().set(NOTIFICATIONS_KEY, "garbage").expect("external write");

        app.reload();
        assert_eq!(app.tasks().len(), 1);
        assert_eq!(app.tasks()[0].title, "theirs");
        assert_eq!(app.tasks()[0].created_at, 5);
        assert_eq!(app.notifications().len(), 1);
    }

    #[test]
    fn reload_restores_identical_state() {
        let mut app = fresh();
        let id = app.add_task(draft("Persist me"), at(T)).expect("added");
        app.toggle_highlight(id);
        app.set_priority(id, Some(Priority::High));

        let snapshot = app.tasks().to_vec();
        let (store, notifier) = app.into_parts();
        let reloaded = App::load(store, notifier, at(T + 5));

        assert_eq!(reloaded.tasks(), snapshot.as_slice());
        assert_eq!(reloaded.notifications().len(), 1);
    }
}
