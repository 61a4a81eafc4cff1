use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Local, Utc};
use unicode_width::UnicodeWidthStr;

use crate::calendar::{CalendarEvent, MonthCell, MonthGrid, WeekDay};
use crate::config::Config;
use crate::datetime::month_title;
use crate::notification::Notification;
use crate::task::{Priority, Task};
use crate::view::DayView;

const WEEKDAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, out, tasks))]
    pub fn write_task_table<W: Write>(
        &self,
        out: &mut W,
        heading: &str,
        tasks: &[&Task],
    ) -> anyhow::Result<()> {
        let noun = if tasks.len() == 1 { "task" } else { "tasks" };
        writeln!(out, "{heading} ({} {noun})", tasks.len())?;
        if tasks.is_empty() {
            return Ok(());
        }

        let headers = ["ID", "Done", "Due", "Priority", "Reminder", "Title"]
            .map(String::from)
            .to_vec();

        let rows = tasks
            .iter()
            .map(|task| {
                let done = if task.completed { "x" } else { " " }.to_string();
                let mut title = task.title.clone();
                if task.highlighted {
                    title = self.paint(&format!("* {title}"), "1");
                }
                vec![
                    self.paint(&task.id.to_string(), "33"),
                    done,
                    task.due_date.clone(),
                    task.priority
                        .map(|p| self.paint_priority(p))
                        .unwrap_or_default(),
                    task.reminder
                        .as_ref()
                        .map(|r| r.label.clone())
                        .unwrap_or_default(),
                    title,
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    pub fn write_task_info<W: Write>(&self, out: &mut W, task: &Task) -> anyhow::Result<()> {
        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(out, "created     {}", format_instant(task.created_at))?;
        writeln!(out, "completed   {}", task.completed)?;
        writeln!(out, "highlighted {}", task.highlighted)?;
        writeln!(
            out,
            "priority    {}",
            task.priority.map(|p| p.as_str()).unwrap_or("none")
        )?;
        if let Some(reminder) = &task.reminder {
            writeln!(
                out,
                "reminder    {} ({} min)",
                reminder.label, reminder.threshold_minutes
            )?;
        }
        if task.has_due_date() {
            writeln!(out, "due         {}", task.due_date)?;
        }
        if !task.description.is_empty() {
            writeln!(out, "description {}", task.description)?;
        }
        Ok(())
    }

    /// Seven-column month grid. `e` marks a day with events, `t` one with
    /// due tasks; today is bracketed and the selected day is starred.
    pub fn write_month<W: Write>(&self, out: &mut W, grid: &MonthGrid) -> anyhow::Result<()> {
        let first = crate::datetime::first_day_of_month(grid.year, grid.month0);
        writeln!(out, "{}", month_title(first))?;
        for label in WEEKDAY_LABELS {
            write!(out, "{label:<7}")?;
        }
        writeln!(out)?;

        for row in grid.cells.chunks(7) {
            for cell in row {
                let text = match cell {
                    MonthCell::Blank => String::new(),
                    MonthCell::Day(day) => {
                        let number = if day.is_today {
                            format!("[{:>2}]", day.day)
                        } else {
                            format!(" {:>2} ", day.day)
                        };
                        let marks = format!(
                            "{}{}{}",
                            if day.has_event { "e" } else { "" },
                            if day.has_task { "t" } else { "" },
                            if day.is_selected { "*" } else { "" },
                        );
                        let text = format!("{number}{marks}");
                        if day.is_today {
                            self.paint(&text, "34")
                        } else {
                            text
                        }
                    }
                };
                let width = UnicodeWidthStr::width(strip_ansi(&text).as_str());
                write!(out, "{text}{}", " ".repeat(7usize.saturating_sub(width)))?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    pub fn write_week<W: Write>(&self, out: &mut W, week: &[WeekDay]) -> anyhow::Result<()> {
        for day in week {
            let mut heading = day.date.format("%a %Y-%m-%d").to_string();
            if day.is_today {
                heading = self.paint(&format!("{heading} (today)"), "34");
            }
            if day.is_selected {
                heading.push_str(" *");
            }
            writeln!(out, "{heading}")?;
            for event in &day.events {
                writeln!(out, "  {}", self.event_line(event))?;
            }
        }
        Ok(())
    }

    pub fn write_day<W: Write>(&self, out: &mut W, day: &DayView<'_>) -> anyhow::Result<()> {
        writeln!(out, "{}", day.date.format("%A, %B %-d"))?;
        writeln!(out, "Events")?;
        if day.events.is_empty() {
            writeln!(out, "  No events scheduled for this day")?;
        }
        for event in &day.events {
            writeln!(out, "  {}", self.event_line(event))?;
        }

        writeln!(out, "Tasks")?;
        if day.tasks.is_empty() {
            writeln!(out, "  No tasks for this day")?;
        }
        for task in &day.tasks {
            let mark = if task.completed { "x" } else { " " };
            let priority = task
                .priority
                .map(|p| format!(" [{}]", self.paint_priority(p)))
                .unwrap_or_default();
            writeln!(out, "  [{mark}] {} {}{priority}", task.id, task.title)?;
        }
        Ok(())
    }

    pub fn write_notifications<W: Write>(
        &self,
        out: &mut W,
        notifications: &[Notification],
        unread: usize,
    ) -> anyhow::Result<()> {
        writeln!(out, "Notifications ({unread} unread)")?;
        if notifications.is_empty() {
            writeln!(out, "  No notifications")?;
        }
        for item in notifications {
            let marker = if item.read { " " } else { "•" };
            let message = if item.read {
                item.message.clone()
            } else {
                self.paint(&item.message, "1")
            };
            writeln!(
                out,
                "{marker} {} {}  {message}",
                item.id,
                format_instant(item.id)
            )?;
        }
        Ok(())
    }

    fn event_line(&self, event: &CalendarEvent) -> String {
        format!(
            "{} {}-{} {} ({})",
            event.id, event.start_time, event.end_time, event.title, event.color
        )
    }

    fn paint_priority(&self, priority: Priority) -> String {
        let code = match priority {
            Priority::Low => "34",
            Priority::Medium => "33",
            Priority::High => "31",
        };
        self.paint(priority.as_str(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn format_instant(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn write_table<W: Write>(
    writer: &mut W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ", width = *width)?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> anyhow::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    fn task(id: i64, title: &str) -> Task {
        Task {
            id,
            created_at: id,
            title: title.to_string(),
            completed: false,
            highlighted: false,
            priority: Some(Priority::High),
            reminder: None,
            due_date: "2024-02-10".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn month_rows_have_seven_columns() {
        let grid = MonthGrid::build(
            2024,
            1,
            &[],
            &[task(1, "x")],
            NaiveDate::from_ymd_opt(2024, 2, 10).expect("date"),
            NaiveDate::from_ymd_opt(2024, 2, 12).expect("date"),
        );
        let text = render(|out| Renderer::plain().write_month(out, &grid));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "February 2024");
        assert!(lines[1].starts_with("Sun"));
        assert_eq!(lines.len(), 2 + 5);
        assert!(text.contains("[10]t"));
        assert!(text.contains(" 12 *"));
    }

    #[test]
    fn task_table_aligns_columns() {
        let a = task(1, "short");
        let b = task(22, "a much longer title");
        let text =
            render(|out| Renderer::plain().write_task_table(out, "Today", &[&a, &b]));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Today (2 tasks)");
        assert!(lines[1].starts_with("ID Done"));
        assert!(lines[3].starts_with("1  "));
        assert!(lines[4].starts_with("22 "));
        assert!(lines[4].contains("high"));
    }

    #[test]
    fn strip_ansi_removes_color_codes() {
        assert_eq!(strip_ansi("\x1b[31mhigh\x1b[0m"), "high");
    }
}
