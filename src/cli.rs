use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

const VERSION: &str = env!("INGESTD_VERSION");

/// Top-level CLI definition for the `ingestd` tool.
#[derive(Debug, Parser)]
#[command(
    name = "ingestd",
    version = VERSION,
    about = "Manage per-device RTSP ingest containers.",
    long_about = "ingestd starts, stops and inspects one ingest container per camera.\n\
                  Workload records live in a durable store and are reconciled against the \
                  container runtime on every read."
)]
pub struct Cli {
    /// Path to an explicit configuration file.
    #[arg(
        global = true,
        short,
        long = "config",
        value_name = "PATH",
        help = "Load configuration from PATH instead of $INGESTD_CONFIG or ./ingestd.toml"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create and start the ingest container for a camera.
    Start(StartArgs),
    /// Stop a workload and forget its record.
    Stop(NameArgs),
    /// Show the reconciled record of one workload.
    Info(InfoArgs),
    /// Print the latest log lines captured for a workload.
    Logs(NameArgs),
    /// List every workload, removing records whose container has vanished.
    List(ListArgs),
    /// Stream workloads as they are refreshed, without removing anything.
    Watch(WatchArgs),
    /// Overwrite a stored workload record from a JSON file.
    Update(UpdateArgs),
    /// Read or replace the edge settings.
    Settings(SettingsArgs),
}

#[derive(Debug, Args)]
pub struct StartArgs {
    #[arg(long, value_name = "NAME", help = "Device name; also names the container")]
    pub name: String,

    #[arg(long, value_name = "URI", help = "RTSP source the worker ingests")]
    pub rtsp: String,

    #[arg(long, value_name = "URI", help = "Optional RTMP relay target")]
    pub rtmp: Option<String>,

    #[arg(
        long,
        value_name = "TAG",
        help = "Container image to run instead of the configured default"
    )]
    pub image: Option<String>,
}

#[derive(Debug, Args)]
pub struct NameArgs {
    #[arg(value_name = "NAME")]
    pub name: String,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    #[arg(value_name = "NAME")]
    pub name: String,

    #[arg(long, help = "Print the record as JSON")]
    pub json: bool,
}

#[derive(Debug, Args, Default)]
pub struct ListArgs {
    #[arg(long, help = "Print records as a JSON array")]
    pub json: bool,
}

#[derive(Debug, Args, Default)]
pub struct WatchArgs {
    #[arg(
        long,
        value_name = "SECS",
        help = "Stop delivering records after SECS seconds"
    )]
    pub timeout_secs: Option<u64>,

    #[arg(long, help = "Print one JSON record per line")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[arg(
        long,
        value_name = "PATH",
        help = "JSON workload record to store; `-` reads stdin"
    )]
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Print the stored settings (defaults when none were saved).
    Get,
    /// Replace the stored settings.
    Set(SettingsSetArgs),
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct SettingsSetArgs {
    #[arg(long, value_name = "BODY", help = "Settings document as inline JSON")]
    pub json: Option<String>,

    #[arg(long, value_name = "PATH", help = "Read the settings document from PATH")]
    pub file: Option<PathBuf>,
}
