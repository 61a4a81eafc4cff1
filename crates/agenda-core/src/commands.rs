use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{NaiveDate, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::app::App;
use crate::calendar::EventDraft;
use crate::cli::{AddArgs, CalendarArgs, Command, EventCommand};
use crate::config::Config;
use crate::datetime::{format_date, parse_date_expr};
use crate::notification::{Notifier, Permission};
use crate::reminder::ReminderTimer;
use crate::render::Renderer;
use crate::store::KeyValueStore;
use crate::task::{Priority, Reminder, TaskDraft};
use crate::view::{CalendarView, Tab};

/// Notifier for a terminal session: toasts go to stdout, OS-level
/// notifications ring the bell on stderr. Permission comes from the
/// `notifications` setting.
#[derive(Debug, Clone)]
pub struct TerminalNotifier {
    permission: Permission,
}

impl TerminalNotifier {
    pub fn new(cfg: &Config) -> Self {
        let permission = if cfg.notifications_enabled() {
            Permission::Granted
        } else {
            Permission::NotGranted
        };
        Self { permission }
    }
}

impl Notifier for TerminalNotifier {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn request_permission(&mut self) -> Permission {
        debug!(permission = ?self.permission, "notification permission resolved from config");
        self.permission
    }

    fn show(&mut self, title: &str, body: &str) {
        eprintln!("\x07{title}: {body}");
    }

    fn toast(&mut self, title: &str, description: &str) {
        println!("{title}: {description}");
    }
}

#[instrument(skip_all)]
pub fn dispatch<S: KeyValueStore>(
    app: &mut App<S, TerminalNotifier>,
    cfg: &Config,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let today = app.today();
    debug!(?command, "dispatching command");

    match command {
        Command::Add(args) => cmd_add(app, args, today, now),
        Command::Done { id } => {
            match app.toggle_task(id, now) {
                Some(true) => println!("Completed task {id}."),
                Some(false) => println!("Reopened task {id}."),
                None => println!("No task {id}."),
            }
            Ok(())
        }
        Command::Delete { id } => {
            report(app.delete_task(id), &format!("Deleted task {id}."), id);
            Ok(())
        }
        Command::Highlight { id } => {
            match app.toggle_highlight(id) {
                Some(true) => println!("Highlighted task {id}."),
                Some(false) => println!("Removed highlight from task {id}."),
                None => println!("No task {id}."),
            }
            Ok(())
        }
        Command::Priority { id, priority } => {
            let priority = Priority::parse_optional(&priority)?;
            let label = priority.map(|p| p.as_str()).unwrap_or("none");
            report(
                app.set_priority(id, priority),
                &format!("Set priority of task {id} to {label}."),
                id,
            );
            Ok(())
        }
        Command::Remind { id, minutes } => cmd_remind(app, id, &minutes, now),
        Command::List { tab, date } => {
            app.view.set_tab(Tab::from(tab.as_str()));
            if let Some(raw) = date {
                app.view.selected_date = parse_date_expr(&raw, today)?;
            }
            let visible = app.visible_tasks();
            let mut out = io::stdout().lock();
            renderer.write_task_table(&mut out, app.view.active_tab.title(), &visible)
        }
        Command::Show { id } => {
            let mut out = io::stdout().lock();
            match app.task(id) {
                Some(task) => renderer.write_task_info(&mut out, task),
                None => {
                    writeln!(out, "No task {id}.")?;
                    Ok(())
                }
            }
        }
        Command::Calendar(args) => cmd_calendar(app, renderer, args, today),
        Command::Event(EventCommand::Add {
            title,
            date,
            start,
            end,
            color,
        }) => {
            let mut draft = EventDraft::blank(today);
            draft.title = title.join(" ");
            draft.date = format_date(parse_date_expr(&date, today)?);
            if let Some(start) = start {
                draft.start_time = start;
            }
            if let Some(end) = end {
                draft.end_time = end;
            }
            if let Some(color) = color {
                draft.color = color;
            }
            match app.add_event(draft, now) {
                Some(id) => println!("Created event {id}."),
                None => println!("Event needs a title and a date."),
            }
            Ok(())
        }
        Command::Event(EventCommand::Delete { id }) => {
            if !app.delete_event(id) {
                println!("No event {id}.");
            }
            Ok(())
        }
        Command::Notifications => {
            let mut out = io::stdout().lock();
            renderer.write_notifications(&mut out, app.notifications(), app.unread_count())
        }
        Command::ReadAll => {
            app.mark_all_read();
            println!("Marked all notifications as read.");
            Ok(())
        }
        Command::Dismiss { id } => {
            if app.delete_notification(id) {
                println!("Dismissed notification {id}.");
            } else {
                println!("No notification {id}.");
            }
            Ok(())
        }
        Command::Watch => {
            let period = cfg.reminder_interval()?;
            run_watch(app, period)
        }
    }
}

fn report(changed: bool, message: &str, id: i64) {
    if changed {
        println!("{message}");
    } else {
        println!("No task {id}.");
    }
}

fn cmd_add<S: KeyValueStore>(
    app: &mut App<S, TerminalNotifier>,
    args: AddArgs,
    today: NaiveDate,
    now: chrono::DateTime<Utc>,
) -> anyhow::Result<()> {
    let due_date = if args.due.trim().eq_ignore_ascii_case("none") {
        String::new()
    } else {
        format_date(parse_date_expr(&args.due, today)?)
    };
    let priority = match args.priority.as_deref() {
        Some(raw) => Priority::parse_optional(raw)?,
        None => None,
    };
    let reminder = match args.remind.as_deref() {
        Some(raw) => Some(
            reminder_from_minutes(raw)
                .ok_or_else(|| anyhow!("invalid reminder minutes: {raw}"))?,
        ),
        None => None,
    };

    let draft = TaskDraft {
        title: args.title.join(" "),
        description: args.description,
        priority,
        reminder,
        due_date,
    };

    match app.add_task(draft, now) {
        Some(id) => println!("Created task {id}."),
        None => println!("Task title cannot be empty."),
    }
    Ok(())
}

fn cmd_remind<S: KeyValueStore>(
    app: &mut App<S, TerminalNotifier>,
    id: i64,
    minutes: &str,
    now: chrono::DateTime<Utc>,
) -> anyhow::Result<()> {
    if minutes.trim().eq_ignore_ascii_case("none") {
        report(
            app.set_reminder(id, None, now),
            &format!("Cleared reminder of task {id}."),
            id,
        );
        return Ok(());
    }

    match reminder_from_minutes(minutes) {
        Some(reminder) => {
            if !app.set_reminder(id, Some(reminder), now) {
                println!("No task {id}.");
            }
        }
        None => warn!(minutes, "ignoring reminder that is not a positive minute count"),
    }
    Ok(())
}

/// Preset reminders keep their labels; any other count is a custom one.
fn reminder_from_minutes(raw: &str) -> Option<Reminder> {
    let custom = Reminder::custom(raw)?;
    Some(
        Reminder::presets()
            .into_iter()
            .find(|preset| preset.threshold_minutes == custom.threshold_minutes)
            .unwrap_or(custom),
    )
}

fn cmd_calendar<S: KeyValueStore>(
    app: &mut App<S, TerminalNotifier>,
    renderer: &Renderer,
    args: CalendarArgs,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let view: CalendarView = args.view.parse()?;
    app.view.set_calendar_view(view);
    app.view.set_tab(Tab::Calendar);

    if let Some(raw) = args.date {
        let date = parse_date_expr(&raw, today)?;
        app.view.selected_date = date;
        app.view.focus_date = date;
    }
    for _ in 0..args.prev {
        app.view.previous_month();
    }
    for _ in 0..args.next {
        app.view.next_month();
    }
    if let Some(raw) = args.pick {
        app.view.select_date(parse_date_expr(&raw, today)?);
    }

    let mut out = io::stdout().lock();
    match app.view.calendar_view {
        CalendarView::Month => renderer.write_month(&mut out, &app.month_grid()),
        CalendarView::Week => renderer.write_week(&mut out, &app.week()),
        CalendarView::Day => renderer.write_day(&mut out, &app.day()),
    }
}

/// Runs the reminder timer until interrupted, re-reading the store before
/// every check so tasks added from other invocations are picked up.
#[instrument(skip(app))]
fn run_watch<S: KeyValueStore>(
    app: &mut App<S, TerminalNotifier>,
    period: Duration,
) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(async {
        let (timer, mut ticks) = ReminderTimer::spawn(period);
        info!(period_secs = period.as_secs(), "watching for reminders");
        println!("Watching for reminders every {}s; press Ctrl-C to stop.", period.as_secs());

        app.reload();
        app.check_reminders(Utc::now());

        let shutdown = wait_for_shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                tick = ticks.recv() => {
                    let Some(now) = tick else {
                        warn!("reminder timer stopped unexpectedly");
                        break;
                    };
                    app.reload();
                    let fired = app.check_reminders(now);
                    debug!(fired, "reminder check complete");
                }
                _ = &mut shutdown => {
                    info!("received shutdown signal; stopping watch");
                    break;
                }
            }
        }

        drop(timer);
    });

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(error) => {
            error!(%error, "failed to register SIGTERM handler; falling back to ctrl_c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed waiting for ctrl_c signal");
    }
}
