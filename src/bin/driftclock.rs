//! DriftClock - headless alarm clock
//!
//! Usage:
//!   driftclock [run]                    Run the clock, reading commands on stdin
//!   driftclock next                     Print the next alarm time
//!   driftclock status                   Print the whole schedule
//!   driftclock set <slot> <HH:MM>       Set an alarm (slot: once, daily, sun..sat)
//!   driftclock clear <slot>             Clear an alarm
//!   driftclock enable | disable         Master alarm switch

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use driftclock::app;
use driftclock::commands::Command;
use driftclock::config::{resolve_conf_path, resolve_data_dir, AppConfig, ArgMap};
use driftclock::logging::init_logging;
use driftclock::{AlarmSlot, AlarmTime};

#[derive(Parser)]
#[command(
    name = "driftclock",
    about = "DriftClock - headless alarm clock",
    version,
    long_about = "Alarm clock engine with one-time, daily and day-of-week alarms.\nOptions come from alarmclock.conf in the data directory, overridden by -o key=value."
)]
struct Cli {
    /// Data directory holding settings.json, alarmclock.conf and debug.log
    #[arg(long, global = true)]
    datadir: Option<PathBuf>,

    /// Config file name (looked up in the data directory) or path
    #[arg(long, global = true)]
    conf: Option<String>,

    /// Override a config option
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE", global = true)]
    options: Vec<String>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the clock (default)
    Run,
    /// Print the next alarm time
    Next,
    /// Print the schedule and current state
    Status,
    /// Set an alarm
    Set {
        /// once, daily, or a day of week (sun..sat)
        slot: AlarmSlot,
        /// 24-hour time, e.g. 06:45
        time: AlarmTime,
    },
    /// Clear an alarm
    Clear {
        /// once, daily, or a day of week (sun..sat)
        slot: AlarmSlot,
    },
    /// Turn the alarm on
    Enable,
    /// Turn the alarm off
    Disable,
}

impl Commands {
    /// The controller command for one-shot subcommands.
    fn one_shot(self) -> Option<Command> {
        match self {
            Commands::Run => None,
            Commands::Next => Some(Command::QueryNext),
            Commands::Status => Some(Command::QueryStatus),
            Commands::Set { slot, time } => Some(Command::Set(slot, time)),
            Commands::Clear { slot } => Some(Command::Clear(slot)),
            Commands::Enable => Some(Command::Enable(true)),
            Commands::Disable => Some(Command::Enable(false)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.datadir.as_deref());
    let command = cli.command.unwrap_or(Commands::Run).one_shot();

    // Only the long-running clock writes debug.log
    let log_dir = command.is_none().then_some(data_dir.as_path());
    init_logging(log_dir, cli.verbose).context("failed to set up logging")?;

    let mut args = ArgMap::new();
    for pair in &cli.options {
        args.set_pair(pair)
            .with_context(|| format!("invalid option '{}'", pair))?;
    }
    let conf_path = resolve_conf_path(&data_dir, cli.conf.as_deref());
    args.merge_conf_file(&conf_path)
        .with_context(|| format!("failed to read {}", conf_path.display()))?;

    let config = AppConfig::from_args(data_dir, &args).context("invalid configuration")?;

    match command {
        None => app::run(config).await.context("clock stopped with an error")?,
        Some(command) => {
            let reply = app::run_once(&config, command)?;
            println!("{}", reply);
        }
    }
    Ok(())
}
