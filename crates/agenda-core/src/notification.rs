use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::datetime::timestamp_id;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: i64,
    pub message: String,
    #[serde(default)]
    pub read: bool,
}

pub fn task_added_message(title: &str) -> String {
    format!("New task added: \"{title}\"")
}

pub fn task_completed_message(title: &str) -> String {
    format!("Task completed: \"{title}\"")
}

pub fn reminder_set_message(title: &str, label: &str) -> String {
    format!("Reminder set for \"{title}\" in {label}")
}

pub fn reminder_due_message(title: &str) -> String {
    format!("Reminder: \"{title}\" is due soon!")
}

/// In-app notification history, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationCenter {
    items: Vec<Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(items: Vec<Notification>) -> Self {
        Self { items }
    }

    pub fn as_slice(&self) -> &[Notification] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    pub fn contains_message(&self, message: &str) -> bool {
        self.items.iter().any(|n| n.message == message)
    }

    /// Prepends a new unread notification and returns it.
    pub fn push(&mut self, message: String, now: DateTime<Utc>) -> &Notification {
        let id = timestamp_id(now, self.items.iter().map(|n| n.id));
        debug!(id, message = %message, "recording notification");
        self.items.insert(
            0,
            Notification {
                id,
                message,
                read: false,
            },
        );
        &self.items[0]
    }

    pub fn mark_all_read(&mut self) {
        for item in &mut self.items {
            item.read = true;
        }
    }

    pub fn delete(&mut self, id: i64) -> Option<Notification> {
        let idx = self.items.iter().position(|n| n.id == id)?;
        Some(self.items.remove(idx))
    }
}

/// OS notification permission. Denied and never-asked are both `NotGranted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    NotGranted,
}

/// Host notification surface: OS-level notifications plus ephemeral toasts.
pub trait Notifier {
    fn permission(&self) -> Permission;

    /// Asks the host for permission; the answer only gates later `show` calls.
    fn request_permission(&mut self) -> Permission;

    fn show(&mut self, title: &str, body: &str);

    fn toast(&mut self, title: &str, description: &str);

    /// Shows an OS notification only when permission was granted.
    fn notify_if_permitted(&mut self, title: &str, body: &str) -> bool {
        if self.permission() != Permission::Granted {
            debug!(title, "skipping OS notification because permission is not granted");
            return false;
        }
        self.show(title, body);
        info!(title, "emitted OS notification");
        true
    }
}

/// Records everything it is asked to show.
#[derive(Debug, Clone)]
pub struct RecordingNotifier {
    pub permission: Permission,
    pub shown: Vec<(String, String)>,
    pub toasts: Vec<(String, String)>,
}

impl RecordingNotifier {
    pub fn new(permission: Permission) -> Self {
        Self {
            permission,
            shown: Vec::new(),
            toasts: Vec::new(),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn request_permission(&mut self) -> Permission {
        self.permission
    }

    fn show(&mut self, title: &str, body: &str) {
        self.shown.push((title.to_string(), body.to_string()));
    }

    fn toast(&mut self, title: &str, description: &str) {
        self.toasts.push((title.to_string(), description.to_string()));
    }
}
