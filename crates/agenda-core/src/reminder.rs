use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::notification::{NotificationCenter, reminder_due_message};
use crate::task::Task;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);
pub const REMINDER_TITLE: &str = "Task Reminder";

const MS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReminder {
    pub task_id: i64,
    pub message: String,
}

/// Minutes elapsed since `task` was created, as a fraction.
pub fn elapsed_minutes(task: &Task, now: DateTime<Utc>) -> f64 {
    now.timestamp_millis().saturating_sub(task.created_at) as f64 / MS_PER_MINUTE as f64
}

/// Reminders that should fire at `now`.
///
/// A task qualifies when it is open, carries a reminder, and at least
/// `threshold_minutes` have passed since creation. There is no upper bound,
/// so suppression relies entirely on the notification history: a reminder is
/// skipped while a notification with the same message text exists, and fires
/// again on the next check once that notification is deleted.
pub fn due_reminders(
    tasks: &[Task],
    center: &NotificationCenter,
    now: DateTime<Utc>,
) -> Vec<DueReminder> {
    let now_ms = now.timestamp_millis();
    let mut pending_messages = BTreeSet::new();
    let mut due = Vec::new();

    for task in tasks {
        if task.completed {
            continue;
        }
        let Some(reminder) = task.reminder.as_ref() else {
            continue;
        };

        let threshold_ms = i64::from(reminder.threshold_minutes) * MS_PER_MINUTE;
        if now_ms.saturating_sub(task.created_at) < threshold_ms {
            trace!(
                task_id = task.id,
                elapsed = elapsed_minutes(task, now),
                threshold = reminder.threshold_minutes,
                "reminder not yet due"
            );
            continue;
        }

        let message = reminder_due_message(&task.title);
        if center.contains_message(&message) || pending_messages.contains(&message) {
            continue;
        }

        debug!(task_id = task.id, message = %message, "reminder due");
        pending_messages.insert(message.clone());
        due.push(DueReminder {
            task_id: task.id,
            message,
        });
    }

    due
}

/// Repeating check timer. Each period a tick instant is delivered on the
/// receiver returned by [`ReminderTimer::spawn`]; dropping the timer stops it.
#[derive(Debug)]
pub struct ReminderTimer {
    handle: JoinHandle<()>,
}

impl ReminderTimer {
    /// Must be called within a tokio runtime. The first tick arrives one
    /// full period after spawning.
    pub fn spawn(period: Duration) -> (Self, mpsc::Receiver<DateTime<Utc>>) {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if tx.send(Utc::now()).await.is_err() {
                    debug!("reminder tick receiver dropped; stopping timer");
                    break;
                }
            }
        });

        debug!(period_ms = period.as_millis() as u64, "started reminder timer");
        (Self { handle }, rx)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ReminderTimer {
    fn drop(&mut self) {
        debug!("stopping reminder timer");
        self.handle.abort();
    }
}
