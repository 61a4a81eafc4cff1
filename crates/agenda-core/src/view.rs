use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDate;
use tracing::debug;

use crate::calendar::{CalendarEvent, MonthGrid, WeekDay, week_buckets};
use crate::datetime::{format_date, shift_months};
use crate::task::Task;

/// Task-list filter mode. Unrecognised tab names pass every task through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tab {
    Today,
    Completed,
    Highlighted,
    Calendar,
    Other(String),
}

impl Tab {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Today => "today",
            Self::Completed => "completed",
            Self::Highlighted => "highlighted",
            Self::Calendar => "calendar",
            Self::Other(name) => name.as_str(),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Today => "Today",
            Self::Completed => "Completed Tasks",
            Self::Highlighted => "Highlighted Tasks",
            Self::Calendar => "Calendar",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl From<&str> for Tab {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "today" => Self::Today,
            "completed" => Self::Completed,
            "highlighted" => Self::Highlighted,
            "calendar" => Self::Calendar,
            _ => Self::Other(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalendarView {
    #[default]
    Month,
    Week,
    Day,
}

impl CalendarView {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
        }
    }
}

impl FromStr for CalendarView {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "month" => Ok(Self::Month),
            "week" => Ok(Self::Week),
            "day" => Ok(Self::Day),
            other => Err(anyhow!("invalid calendar view: {other}")),
        }
    }
}

pub fn matches_tab(task: &Task, tab: &Tab, today: &str, selected: &str) -> bool {
    match tab {
        Tab::Today => task.due_date == today || task.due_date.is_empty(),
        Tab::Completed => task.completed,
        Tab::Highlighted => task.highlighted,
        Tab::Calendar => task.due_date == selected,
        Tab::Other(_) => true,
    }
}

pub fn filter_tasks<'a>(
    tasks: &'a [Task],
    tab: &Tab,
    today: NaiveDate,
    selected: NaiveDate,
) -> Vec<&'a Task> {
    let today = format_date(today);
    let selected = format_date(selected);
    tasks
        .iter()
        .filter(|task| matches_tab(task, tab, &today, &selected))
        .collect()
}

pub fn events_for_date(events: &[CalendarEvent], date: NaiveDate) -> Vec<&CalendarEvent> {
    let key = format_date(date);
    events.iter().filter(|event| event.date == key).collect()
}

/// Navigation and filter state of the task/calendar view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub active_tab: Tab,
    pub selected_date: NaiveDate,
    /// Anchor for month navigation.
    pub focus_date: NaiveDate,
    pub calendar_view: CalendarView,
}

impl ViewState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            active_tab: Tab::Today,
            selected_date: today,
            focus_date: today,
            calendar_view: CalendarView::Month,
        }
    }

    pub fn set_tab(&mut self, tab: Tab) {
        debug!(tab = %tab, "switching tab");
        self.active_tab = tab;
    }

    pub fn set_calendar_view(&mut self, view: CalendarView) {
        self.calendar_view = view;
    }

    /// Selecting a date from the month grid drills down into the day view.
    pub fn select_date(&mut self, date: NaiveDate) {
        self.selected_date = date;
        if self.calendar_view == CalendarView::Month {
            debug!(date = %date, "month date selected, switching to day view");
            self.calendar_view = CalendarView::Day;
        }
    }

    pub fn previous_month(&mut self) {
        self.focus_date = shift_months(self.focus_date, -1);
    }

    pub fn next_month(&mut self) {
        self.focus_date = shift_months(self.focus_date, 1);
    }

    pub fn go_to_today(&mut self, today: NaiveDate) {
        self.focus_date = today;
    }

    pub fn visible_tasks<'a>(&self, tasks: &'a [Task], today: NaiveDate) -> Vec<&'a Task> {
        filter_tasks(tasks, &self.active_tab, today, self.selected_date)
    }

    pub fn month_grid(
        &self,
        events: &[CalendarEvent],
        tasks: &[Task],
        today: NaiveDate,
    ) -> MonthGrid {
        MonthGrid::for_date(self.focus_date, events, tasks, today, self.selected_date)
    }

    pub fn week(&self, events: &[CalendarEvent], today: NaiveDate) -> Vec<WeekDay> {
        week_buckets(self.selected_date, events, today, self.selected_date)
    }

    /// Events plus the current tab's tasks for the selected date.
    pub fn day<'a>(
        &self,
        events: &'a [CalendarEvent],
        tasks: &'a [Task],
        today: NaiveDate,
    ) -> DayView<'a> {
        DayView {
            date: self.selected_date,
            events: events_for_date(events, self.selected_date),
            tasks: self.visible_tasks(tasks, today),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DayView<'a> {
    pub date: NaiveDate,
    pub events: Vec<&'a CalendarEvent>,
    pub tasks: Vec<&'a Task>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn task(id: i64, due: &str, completed: bool, highlighted: bool) -> Task {
        Task {
            id,
            created_at: id,
            title: format!("task {id}"),
            completed,
            highlighted,
            priority: None,
            reminder: None,
            due_date: due.to_string(),
            description: String::new(),
        }
    }

    fn ids(tasks: &[&Task]) -> Vec<i64> {
        tasks.iter().map(|t| t.id).collect()
    }

    fn fixture() -> Vec<Task> {
        vec![
            task(1, "2026-10-15", false, false),
            task(2, "", false, true),
            task(3, "2026-10-16", true, false),
            task(4, "2026-10-14", false, true),
            task(5, "2026-10-15", true, false),
        ]
    }

    #[test]
    fn today_tab_keeps_due_today_or_undated() {
        let tasks = fixture();
        let today = ymd(2026, 10, 15);
        let visible = filter_tasks(&tasks, &Tab::Today, today, ymd(2026, 10, 1));
        assert_eq!(ids(&visible), [1, 2, 5]);
        assert!(visible
            .iter()
            .all(|t| t.due_date.is_empty() || t.due_date == "2026-10-15"));
    }

    #[test]
    fn flag_tabs_and_calendar_tab() {
        let tasks = fixture();
        let today = ymd(2026, 10, 15);
        let selected = ymd(2026, 10, 16);

        assert_eq!(ids(&filter_tasks(&tasks, &Tab::Completed, today, selected)), [3, 5]);
        assert_eq!(ids(&filter_tasks(&tasks, &Tab::Highlighted, today, selected)), [2, 4]);
        assert_eq!(ids(&filter_tasks(&tasks, &Tab::Calendar, today, selected)), [3]);
    }

    #[test]
    fn unknown_tab_passes_everything() {
        let tasks = fixture();
        let tab = Tab::from("inbox");
        assert_eq!(tab, Tab::Other("inbox".to_string()));
        let visible = filter_tasks(&tasks, &tab, ymd(2026, 10, 15), ymd(2026, 10, 15));
        assert_eq!(visible.len(), tasks.len());
    }

    #[test]
    fn selecting_in_month_view_switches_to_day() {
        let mut view = ViewState::new(ymd(2026, 10, 15));
        view.select_date(ymd(2026, 10, 20));
        assert_eq!(view.calendar_view, CalendarView::Day);
        assert_eq!(view.selected_date, ymd(2026, 10, 20));

        view.set_calendar_view(CalendarView::Week);
        view.select_date(ymd(2026, 10, 21));
        assert_eq!(view.calendar_view, CalendarView::Week);
    }

    #[test]
    fn month_navigation_moves_focus_only() {
        let mut view = ViewState::new(ymd(2026, 1, 31));
        view.next_month();
        assert_eq!(view.focus_date, ymd(2026, 2, 28));
        view.previous_month();
        view.previous_month();
        assert_eq!(view.focus_date, ymd(2025, 12, 28));
        assert_eq!(view.selected_date, ymd(2026, 1, 31));
        view.go_to_today(ymd(2026, 1, 31));
        assert_eq!(view.focus_date, ymd(2026, 1, 31));
    }

    #[test]
    fn day_view_collects_events_and_filtered_tasks() {
        let tasks = fixture();
        let events = vec![CalendarEvent {
            id: 7,
            title: "Review".to_string(),
            date: "2026-10-16".to_string(),
            start_time: "14:00".to_string(),
            end_time: "15:30".to_string(),
            color: "#10b981".to_string(),
        }];
        let mut view = ViewState::new(ymd(2026, 10, 15));
        view.set_tab(Tab::Calendar);
        view.select_date(ymd(2026, 10, 16));

        let day = view.day(&events, &tasks, ymd(2026, 10, 15));
        assert_eq!(day.events.len(), 1);
        assert_eq!(ids(&day.tasks), [3]);
    }

    #[test]
    fn calendar_view_parsing() {
        assert_eq!("Week".parse::<CalendarView>().expect("week"), CalendarView::Week);
        assert!("year".parse::<CalendarView>().is_err());
        assert_eq!(Tab::from("COMPLETED"), Tab::Completed);
    }
}
