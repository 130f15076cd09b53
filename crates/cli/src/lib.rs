pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use switchyard_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};
use switchyard_core::Decision;

#[derive(Debug, Parser)]
#[command(
    name = "switchyard",
    about = "Switchyard operator CLI",
    long_about = "Operate the tool-call runtime: migrations, config inspection, confirmations, and the scheduler loop.",
    after_help = "Examples:\n  switchyard migrate\n  switchyard pending --conversation chat-42\n  switchyard resolve --conversation chat-42 --call call-7 --decision approve\n  switchyard run"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a switchyard.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "List the registered tools with their execution mode and parameters")]
    Tools,
    #[command(about = "Fire every schedule entry that is due, once")]
    Tick {
        #[arg(long, value_parser = parse_timestamp, help = "RFC 3339 instant to tick at (default: now)")]
        at: Option<DateTime<Utc>>,
    },
    #[command(about = "List active schedule entries of a conversation")]
    Schedules {
        #[arg(long)]
        conversation: String,
    },
    #[command(about = "Cancel a schedule entry")]
    Cancel {
        #[arg(long)]
        conversation: String,
        #[arg(long)]
        schedule: String,
    },
    #[command(about = "List calls awaiting a human decision")]
    Pending {
        #[arg(long)]
        conversation: String,
    },
    #[command(about = "Approve or reject a call awaiting confirmation")]
    Resolve {
        #[arg(long)]
        conversation: String,
        #[arg(long)]
        call: String,
        #[arg(long, value_enum)]
        decision: DecisionArg,
    },
    #[command(about = "Run the scheduler loop until Ctrl-C")]
    Run,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DecisionArg {
    Approve,
    Reject,
}

impl From<DecisionArg> for Decision {
    fn from(value: DecisionArg) -> Self {
        match value {
            DecisionArg::Approve => Decision::Approve,
            DecisionArg::Reject => Decision::Reject,
        }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|error| format!("expected an RFC 3339 timestamp: {error}"))
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions { config_path: cli.config, ..LoadOptions::default() };

    let logging = AppConfig::load(options.clone())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    init_logging(&logging);

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Config => commands::config::run(&options),
        Command::Tools => commands::tools::run(&options),
        Command::Tick { at } => commands::tick::run(&options, at),
        Command::Schedules { conversation } => commands::schedules::list(&options, &conversation),
        Command::Cancel { conversation, schedule } => {
            commands::schedules::cancel(&options, &conversation, &schedule)
        }
        Command::Pending { conversation } => commands::resolve::pending(&options, &conversation),
        Command::Resolve { conversation, call, decision } => {
            commands::resolve::run(&options, &conversation, &call, decision.into())
        }
        Command::Run => commands::run::run(&options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a single JSON document per command.
fn init_logging(config: &LoggingConfig) {
    use tracing::Level;

    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(log_level);

    match config.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}
