use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datetime::{
    add_days, days_in_month, first_weekday_of_month, format_date, start_of_week, timestamp_id,
};
use crate::task::Task;

pub const EVENT_PALETTE: [&str; 5] = ["#4f46e5", "#10b981", "#ef4444", "#f59e0b", "#8b5cf6"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: i64,
    pub title: String,
    pub date: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub color: String,
}

/// Compose-form contents for a new event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub color: String,
}

impl EventDraft {
    pub fn blank(today: NaiveDate) -> Self {
        Self {
            title: String::new(),
            date: format_date(today),
            start_time: "09:00".to_string(),
            end_time: "10:00".to_string(),
            color: EVENT_PALETTE[0].to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventList {
    events: Vec<CalendarEvent>,
}

impl EventList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(events: Vec<CalendarEvent>) -> Self {
        Self { events }
    }

    /// Seed events shown when no calendar has ever been stored.
    pub fn sample(today: NaiveDate, now: DateTime<Utc>) -> Self {
        let base = now.timestamp_millis();
        Self::restore(vec![
            CalendarEvent {
                id: base,
                title: "Team Meeting".to_string(),
                date: format_date(today),
                start_time: "10:00".to_string(),
                end_time: "11:00".to_string(),
                color: EVENT_PALETTE[0].to_string(),
            },
            CalendarEvent {
                id: base + 1,
                title: "Project Review".to_string(),
                date: format_date(add_days(today, 1)),
                start_time: "14:00".to_string(),
                end_time: "15:30".to_string(),
                color: EVENT_PALETTE[1].to_string(),
            },
        ])
    }

    pub fn as_slice(&self) -> &[CalendarEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Appends an event; drafts without a title or date are rejected.
    #[tracing::instrument(skip(self, draft, now), fields(title = %draft.title, date = %draft.date))]
    pub fn add(&mut self, draft: &EventDraft, now: DateTime<Utc>) -> Option<&CalendarEvent> {
        if draft.title.trim().is_empty() || draft.date.trim().is_empty() {
            debug!("ignoring event without title or date");
            return None;
        }

        let id = timestamp_id(now, self.events.iter().map(|event| event.id));
        self.events.push(CalendarEvent {
            id,
            title: draft.title.clone(),
            date: draft.date.clone(),
            start_time: draft.start_time.clone(),
            end_time: draft.end_time.clone(),
            color: draft.color.clone(),
        });
        self.events.last()
    }

    pub fn delete(&mut self, id: i64) -> Option<CalendarEvent> {
        let idx = self.events.iter().position(|event| event.id == id)?;
        Some(self.events.remove(idx))
    }

    pub fn on_date<'a>(&'a self, date: &'a str) -> impl Iterator<Item = &'a CalendarEvent> + 'a {
        self.events.iter().filter(move |event| event.date == date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCell {
    pub day: u32,
    pub date: String,
    pub has_event: bool,
    pub has_task: bool,
    pub is_today: bool,
    pub is_selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonthCell {
    Blank,
    Day(DayCell),
}

/// Month layout for a Sunday-first 7-column grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGrid {
    pub year: i32,
    pub month0: u32,
    pub cells: Vec<MonthCell>,
}

impl MonthGrid {
    pub fn build(
        year: i32,
        month0: u32,
        events: &[CalendarEvent],
        tasks: &[Task],
        today: NaiveDate,
        selected: NaiveDate,
    ) -> Self {
        let year = year + (month0 / 12) as i32;
        let month0 = month0 % 12;
        let leading = first_weekday_of_month(year, month0);
        let day_count = days_in_month(year, month0);
        let today = format_date(today);
        let selected = format_date(selected);

        let mut cells = Vec::with_capacity((leading + day_count) as usize);
        cells.extend((0..leading).map(|_| MonthCell::Blank));

        for day in 1..=day_count {
            let date = format!("{year:04}-{:02}-{day:02}", month0 + 1);
            cells.push(MonthCell::Day(DayCell {
                day,
                has_event: events.iter().any(|event| event.date == date),
                has_task: tasks.iter().any(|task| task.due_date == date),
                is_today: date == today,
                is_selected: date == selected,
                date,
            }));
        }

        Self {
            year,
            month0,
            cells,
        }
    }

    pub fn for_date(
        focus: NaiveDate,
        events: &[CalendarEvent],
        tasks: &[Task],
        today: NaiveDate,
        selected: NaiveDate,
    ) -> Self {
        Self::build(focus.year(), focus.month0(), events, tasks, today, selected)
    }

    pub fn leading_blanks(&self) -> usize {
        self.cells
            .iter()
            .take_while(|cell| matches!(cell, MonthCell::Blank))
            .count()
    }

    pub fn days(&self) -> impl Iterator<Item = &DayCell> {
        self.cells.iter().filter_map(|cell| match cell {
            MonthCell::Day(day) => Some(day),
            MonthCell::Blank => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekDay {
    pub date: NaiveDate,
    pub is_today: bool,
    pub is_selected: bool,
    pub events: Vec<CalendarEvent>,
}

/// The Sunday-to-Saturday week containing `anchor`, with same-day events.
pub fn week_buckets(
    anchor: NaiveDate,
    events: &[CalendarEvent],
    today: NaiveDate,
    selected: NaiveDate,
) -> Vec<WeekDay> {
    let start = start_of_week(anchor);
    (0..7)
        .map(|offset| {
            let date = add_days(start, offset);
            let key = format_date(date);
            WeekDay {
                date,
                is_today: date == today,
                is_selected: date == selected,
                events: events
                    .iter()
                    .filter(|event| event.date == key)
                    .cloned()
                    .collect(),
            }
        })
        .collect()
}
