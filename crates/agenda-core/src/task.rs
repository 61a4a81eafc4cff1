use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datetime::{format_date, timestamp_id};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parses a priority where `none` clears it.
    pub fn parse_optional(raw: &str) -> anyhow::Result<Option<Self>> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(None),
            other => other.parse().map(Some),
        }
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Self::Low),
            "medium" | "m" => Ok(Self::Medium),
            "high" | "h" => Ok(Self::High),
            other => Err(anyhow!("invalid priority: {other}")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reminder {
    #[serde(rename = "time", alias = "thresholdMinutes")]
    pub threshold_minutes: u32,
    pub label: String,
}

impl Reminder {
    /// `None` when the threshold is zero.
    pub fn new(threshold_minutes: u32, label: impl Into<String>) -> Option<Self> {
        if threshold_minutes == 0 {
            return None;
        }
        Some(Self {
            threshold_minutes,
            label: label.into(),
        })
    }

    pub fn presets() -> Vec<Self> {
        [(1, "1 minute"), (5, "5 minutes"), (10, "10 minutes"), (20, "20 minutes")]
            .into_iter()
            .filter_map(|(minutes, label)| Self::new(minutes, label))
            .collect()
    }

    /// Custom reminder from free-form minute input; labelled `<n> minutes`.
    pub fn custom(raw: &str) -> Option<Self> {
        let minutes = raw.trim().parse::<u32>().ok()?;
        Self::new(minutes, format!("{minutes} minutes"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,

    /// Creation instant (ms) used as the reminder anchor. Older snapshots
    /// lack it and fall back to `id`.
    #[serde(default)]
    pub created_at: i64,

    pub title: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub highlighted: bool,

    #[serde(default)]
    pub priority: Option<Priority>,

    #[serde(default)]
    pub reminder: Option<Reminder>,

    #[serde(default)]
    pub due_date: String,

    #[serde(default)]
    pub description: String,
}

impl Task {
    pub fn has_due_date(&self) -> bool {
        !self.due_date.is_empty()
    }
}

/// Compose-form contents for a new task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub priority: Option<Priority>,
    pub reminder: Option<Reminder>,
    pub due_date: String,
}

impl TaskDraft {
    pub fn titled(title: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            title: title.into(),
            due_date: format_date(today),
            ..Self::default()
        }
    }
}

/// Ordered task collection. Every operation is total: an unknown id is a
/// no-op reported as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskList {
    tasks: Vec<Task>,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a loaded snapshot, filling in missing creation anchors.
    pub fn restore(mut tasks: Vec<Task>) -> Self {
        for task in &mut tasks {
            if task.created_at == 0 {
                task.created_at = task.id;
            }
        }
        Self { tasks }
    }

    /// First-run contents: one empty example task due today.
    pub fn sample(today: NaiveDate) -> Self {
        Self::restore(vec![Task {
            id: 1,
            created_at: 1,
            title: "example".to_string(),
            completed: false,
            highlighted: false,
            priority: None,
            reminder: None,
            due_date: format_date(today),
            description: String::new(),
        }])
    }

    pub fn as_slice(&self) -> &[Task] {
        &self.tasks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    fn get_mut(&mut self, id: i64) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    /// Appends a task built from `draft`; blank titles are rejected.
    #[tracing::instrument(skip(self, draft, now), fields(title = %draft.title))]
    pub fn add(&mut self, draft: &TaskDraft, now: DateTime<Utc>) -> Option<&Task> {
        if draft.title.trim().is_empty() {
            debug!("ignoring task with blank title");
            return None;
        }

        let id = timestamp_id(now, self.tasks.iter().map(|task| task.id));
        self.tasks.push(Task {
            id,
            created_at: now.timestamp_millis(),
            title: draft.title.clone(),
            completed: false,
            highlighted: false,
            priority: draft.priority,
            reminder: draft.reminder.clone(),
            due_date: draft.due_date.clone(),
            description: draft.description.clone(),
        });
        self.tasks.last()
    }

    pub fn toggle_completion(&mut self, id: i64) -> Option<&Task> {
        let task = self.get_mut(id)?;
        task.completed = !task.completed;
        Some(&*task)
    }

    pub fn delete(&mut self, id: i64) -> Option<Task> {
        let idx = self.tasks.iter().position(|task| task.id == id)?;
        Some(self.tasks.remove(idx))
    }

    pub fn toggle_highlight(&mut self, id: i64) -> Option<&Task> {
        let task = self.get_mut(id)?;
        task.highlighted = !task.highlighted;
        Some(&*task)
    }

    pub fn set_priority(&mut self, id: i64, priority: Option<Priority>) -> Option<&Task> {
        let task = self.get_mut(id)?;
        task.priority = priority;
        Some(&*task)
    }

    pub fn set_reminder(&mut self, id: i64, reminder: Option<Reminder>) -> Option<&Task> {
        let task = self.get_mut(id)?;
        task.reminder = reminder;
        Some(&*task)
    }
}

impl<'a> IntoIterator for &'a TaskList {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}
