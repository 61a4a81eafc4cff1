use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "agenda",
    version,
    about = "Agenda: personal tasks, reminders and calendar",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "agendarc")]
    pub agendarc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add a task
    Add(AddArgs),
    /// Toggle a task between open and completed
    Done { id: i64 },
    /// Delete a task
    Delete { id: i64 },
    /// Toggle a task's highlight flag
    Highlight { id: i64 },
    /// Set or clear (`none`) a task's priority
    Priority { id: i64, priority: String },
    /// Set a reminder in minutes after creation, or `none` to clear it
    Remind { id: i64, minutes: String },
    /// List tasks for a tab (today, completed, highlighted, calendar, all)
    List {
        #[arg(long, default_value = "today")]
        tab: String,
        /// Selected date used by the calendar tab
        #[arg(long)]
        date: Option<String>,
    },
    /// Show every field of one task
    Show { id: i64 },
    /// Render the calendar
    Calendar(CalendarArgs),
    /// Manage calendar events
    #[command(subcommand)]
    Event(EventCommand),
    /// List notifications, newest first
    Notifications,
    /// Mark every notification as read
    ReadAll,
    /// Delete one notification
    Dismiss { id: i64 },
    /// Stay running and deliver reminders as they come due
    Watch,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(long, default_value = "")]
    pub description: String,

    #[arg(long)]
    pub priority: Option<String>,

    /// Reminder threshold in minutes
    #[arg(long)]
    pub remind: Option<String>,

    /// Due date (YYYY-MM-DD, today, tomorrow); `none` leaves it empty
    #[arg(long, default_value = "today")]
    pub due: String,
}

#[derive(Args, Debug, Clone)]
pub struct CalendarArgs {
    #[arg(long, default_value = "month")]
    pub view: String,

    /// Focus and selected date
    #[arg(long)]
    pub date: Option<String>,

    /// Pick a date as if clicked in the month grid
    #[arg(long)]
    pub pick: Option<String>,

    /// Months to move back from the focus date
    #[arg(long, default_value_t = 0)]
    pub prev: u32,

    /// Months to move forward from the focus date
    #[arg(long, default_value_t = 0)]
    pub next: u32,
}

#[derive(Subcommand, Debug, Clone)]
pub enum EventCommand {
    /// Add a calendar event
    Add {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
        #[arg(long, default_value = "today")]
        date: String,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a calendar event
    Delete { id: i64 },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of argv.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest
                .split_once('=')
                .or_else(|| rest.split_once(':'))
                .map(|(k, v)| (format!("rc.{k}"), v.to_string()));

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&os(&[
            "agenda",
            "rc.reminder.interval=5",
            "list",
            "rc.color:off",
        ]))
        .expect("preprocess");

        assert_eq!(pre.cleaned_args, os(&["agenda", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.reminder.interval".to_string(), "5".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
    }

    #[test]
    fn parses_add_with_options() {
        let cli = GlobalCli::parse_from(os(&[
            "agenda",
            "--rc",
            "notifications=off",
            "add",
            "Buy",
            "bread",
            "--priority",
            "high",
            "--remind",
            "5",
            "--due",
            "none",
        ]));

        assert_eq!(cli.rc_overrides.len(), 1);
        assert_eq!(cli.rc_overrides[0].key, "notifications");
        let Some(Command::Add(add)) = cli.command else {
            panic!("expected add command");
        };
        assert_eq!(add.title, ["Buy", "bread"]);
        assert_eq!(add.priority.as_deref(), Some("high"));
        assert_eq!(add.remind.as_deref(), Some("5"));
        assert_eq!(add.due, "none");
    }

    #[test]
    fn parses_event_and_calendar_commands() {
        let cli = GlobalCli::parse_from(os(&[
            "agenda", "event", "add", "Standup", "--date", "2026-10-16", "--start", "09:30",
        ]));
        assert!(matches!(
            cli.command,
            Some(Command::Event(EventCommand::Add { ref start, .. })) if start.as_deref() == Some("09:30")
        ));

        let cli = GlobalCli::parse_from(os(&["agenda", "calendar", "--view", "week", "--next", "2"]));
        let Some(Command::Calendar(args)) = cli.command else {
            panic!("expected calendar command");
        };
        assert_eq!(args.view, "week");
        assert_eq!(args.next, 2);
    }

    #[test]
    fn key_val_requires_equals() {
        assert!("color".parse::<KeyVal>().is_err());
        let kv = "color = off".parse::<KeyVal>().expect("kv");
        assert_eq!((kv.key.as_str(), kv.value.as_str()), ("color", "off"));
    }
}
