use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Load spreadsheets and CSV files into database tables", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rebuild one table per sheet or CSV file found in the data directory
    Sync(SyncArgs),
    /// Show the table a file would produce without touching the database
    Inspect(InspectArgs),
    /// Write the default configuration to a YAML file
    InitConfig(InitConfigArgs),
}

/// Settings that override values from the configuration file.
#[derive(Debug, Args, Default)]
pub struct ConfigOverrides {
    /// YAML configuration file (defaults are used when omitted)
    #[arg(short, long, env = "SHEET_SYNC_CONFIG")]
    pub config: Option<PathBuf>,
    /// Name of the primary key column expected in every sheet
    #[arg(long = "key-column")]
    pub key_column: Option<String>,
    /// Money columns to normalize (comma-separated or repeated; replaces the configured list)
    #[arg(long = "money-column", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub money_columns: Vec<String>,
    /// chrono format used to detect date columns, e.g. %Y/%m/%d
    #[arg(long = "date-format")]
    pub date_format: Option<String>,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[command(flatten)]
    pub overrides: ConfigOverrides,
    /// Directory scanned for input files
    #[arg(short = 'd', long = "data-dir", env = "SHEET_SYNC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
    /// SQLite database file receiving the tables
    #[arg(long, env = "SHEET_SYNC_DATABASE")]
    pub database: Option<PathBuf>,
    /// Write a JSON report of every unit's outcome
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub overrides: ConfigOverrides,
    /// Spreadsheet or CSV file to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct InitConfigArgs {
    /// Destination YAML file
    #[arg(short, long)]
    pub output: PathBuf,
    /// Overwrite the destination if it already exists
    #[arg(long)]
    pub force: bool,
}
