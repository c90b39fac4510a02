mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{
    daemon::{run_daemon_process, run_foreground, set_lock, show_status, start_daemon, stop_daemon},
    settings::{self, EntryKind, ScheduleChange},
};
use std::fs;
use winddown_core::{config::get_data_dir, TimeOfDay};

#[derive(Parser)]
#[command(name = "winddown")]
#[command(about = "Blocks distracting apps and websites outside work hours", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the blocking daemon in the background
    Start,
    /// Run the blocking daemon in the foreground
    Run,
    /// (Internal) Run the daemon process
    #[command(hide = true)]
    DaemonInternalStart,
    /// Stop the blocking daemon, removing any active block
    Stop,
    /// Show the lock state and both enforcers
    Status {
        /// Also list the block list and the hosts file entries
        #[arg(short, long)]
        verbose: bool,
        /// Print the raw status as JSON
        #[arg(long, conflicts_with = "verbose")]
        json: bool,
    },
    /// Block now, until `unlock`
    Lock,
    /// Lift the block now; the schedule takes over again
    Unlock,
    /// Show or change the blocking schedule
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
    /// Add an app or website to the block list
    Block {
        #[command(subcommand)]
        target: BlockTarget,
    },
    /// Remove an app or website from the block list
    Unblock {
        kind: Kind,
        /// Process name for apps, domain for sites
        id: String,
    },
    /// Enable or disable a block list entry without removing it
    Toggle {
        kind: Kind,
        /// Process name for apps, domain for sites
        id: String,
        #[arg(long, conflicts_with = "off", required_unless_present = "off")]
        on: bool,
        #[arg(long)]
        off: bool,
    },
    /// Minutes of warning before blocking starts (1-120)
    Warning { minutes: u32 },
}

#[derive(Subcommand, Debug)]
enum ScheduleAction {
    /// Print the schedule, warning threshold and block list
    Show,
    /// Change the schedule; omitted options keep their current value
    Set {
        /// Window start, HH:MM
        #[arg(long)]
        start: Option<TimeOfDay>,
        /// Window end, HH:MM (earlier than start for an overnight window)
        #[arg(long)]
        end: Option<TimeOfDay>,
        /// `weekdays`, `weekend`, `all`, or a list such as `mon,tue,fri`
        #[arg(long)]
        days: Option<String>,
        #[arg(long, conflicts_with = "enable")]
        disable: bool,
        #[arg(long)]
        enable: bool,
    },
}

#[derive(Subcommand, Debug)]
enum BlockTarget {
    /// Block an application by process name
    App { app_id: String, name: String },
    /// Block a website; `www.` is added automatically
    Site {
        domain: String,
        name: String,
        /// Extra domains to block with this site
        #[arg(long = "alias")]
        aliases: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    App,
    Site,
}

impl From<Kind> for EntryKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::App => Self::App,
            Kind::Site => Self::Site,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::DaemonInternalStart) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_secs()
            .init();
    }

    let data_dir = get_data_dir()?;
    fs::create_dir_all(&data_dir)?;

    match cli.command {
        Commands::Start => start_daemon(&data_dir),
        Commands::Run => run_foreground(&data_dir).await,
        Commands::DaemonInternalStart => run_daemon_process().await,
        Commands::Stop => stop_daemon(&data_dir).await,
        Commands::Status { verbose, json } => show_status(&data_dir, verbose, json).await,
        Commands::Lock => set_lock(&data_dir, true).await,
        Commands::Unlock => set_lock(&data_dir, false).await,
        Commands::Schedule { action } => match action {
            ScheduleAction::Show => settings::show_schedule(&data_dir).await,
            ScheduleAction::Set {
                start,
                end,
                days,
                disable,
                enable,
            } => {
                let enabled = match (enable, disable) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                };
                let change = ScheduleChange {
                    start,
                    end,
                    days,
                    enabled,
                };
                settings::set_schedule(&data_dir, change).await
            }
        },
        Commands::Block { target } => match target {
            BlockTarget::App { app_id, name } => settings::block_app(&data_dir, app_id, name).await,
            BlockTarget::Site {
                domain,
                name,
                aliases,
            } => settings::block_site(&data_dir, domain, name, aliases).await,
        },
        Commands::Unblock { kind, id } => settings::unblock(&data_dir, kind.into(), &id).await,
        Commands::Toggle { kind, id, on, .. } => {
            settings::toggle(&data_dir, kind.into(), &id, on).await
        }
        Commands::Warning { minutes } => settings::set_warning(&data_dir, minutes).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_toggle_requires_a_direction() {
        assert!(Cli::try_parse_from(["winddown", "toggle", "app", "Slack"]).is_err());
        let cli = Cli::try_parse_from(["winddown", "toggle", "site", "slack.com", "--off"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Toggle { on: false, off: true, .. }
        ));
    }

    #[test]
    fn test_schedule_set_parses_times() {
        let cli = Cli::try_parse_from([
            "winddown", "schedule", "set", "--start", "22:00", "--end", "06:30",
        ])
        .unwrap();
        let Commands::Schedule {
            action: ScheduleAction::Set { start, end, .. },
        } = cli.command
        else {
            panic!("expected schedule set");
        };
        assert_eq!(start, Some(TimeOfDay::new(22, 0).unwrap()));
        assert_eq!(end, Some(TimeOfDay::new(6, 30).unwrap()));
        assert!(Cli::try_parse_from(["winddown", "schedule", "set", "--start", "25:00"]).is_err());
    }
}
