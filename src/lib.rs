pub mod cli;
pub mod config;
pub mod data;
pub mod discover;
pub mod identifier;
pub mod inference;
pub mod materialize;
pub mod preprocess;
pub mod reader;
pub mod store;
pub mod sync;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands, ConfigOverrides, InitConfigArgs, InspectArgs, SyncArgs},
    config::SyncConfig,
    store::SqliteConnector,
    sync::Syncer,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_sync", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => handle_sync(&args),
        Commands::Inspect(args) => handle_inspect(&args),
        Commands::InitConfig(args) => handle_init_config(&args),
    }
}

pub fn resolve_config(overrides: &ConfigOverrides) -> Result<SyncConfig> {
    let mut config = match &overrides.config {
        Some(path) => {
            SyncConfig::load(path).with_context(|| format!("Loading config from {path:?}"))?
        }
        None => SyncConfig::default(),
    };
    if let Some(key) = &overrides.key_column {
        config.key_column = key.trim().to_string();
    }
    let money_columns: Vec<String> = overrides
        .money_columns
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| c.to_string())
        .collect();
    if !money_columns.is_empty() {
        config.money_columns = money_columns;
    }
    if let Some(format) = &overrides.date_format {
        config.date_format = format.clone();
    }
    config.validate()?;
    Ok(config)
}

fn handle_sync(args: &SyncArgs) -> Result<()> {
    let mut config = resolve_config(&args.overrides)?;
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(database) = &args.database {
        config.database = database.clone();
    }
    info!(
        "Syncing {:?} into {:?} (key column '{}')",
        config.data_dir, config.database, config.key_column
    );
    let syncer = Syncer::new(&config, SqliteConnector::new(&config.database))?;
    let summary = syncer.sync_directory(&config.data_dir)?;
    if let Some(path) = &args.report {
        summary
            .save_json(path)
            .with_context(|| format!("Writing report to {path:?}"))?;
        info!("Report written to {path:?}");
    }
    Ok(())
}

fn handle_inspect(args: &InspectArgs) -> Result<()> {
    let config = resolve_config(&args.overrides)?;
    let syncer = Syncer::new(&config, SqliteConnector::new(&config.database))?;
    syncer
        .for_each_unit(&args.input, |ctx, dataset| {
            let dataset = match dataset {
                Ok(dataset) => dataset,
                Err(err) => {
                    println!("{} -> {}: read failed: {err:#}", ctx.label(), ctx.table);
                    return;
                }
            };
            match syncer.plan(dataset, &ctx) {
                Ok((cleaned, schema)) => {
                    println!("{} -> {} ({} row(s))", ctx.label(), ctx.table, cleaned.row_count());
                    let headers = vec![
                        "#".to_string(),
                        "column".to_string(),
                        "type".to_string(),
                        "non-null".to_string(),
                    ];
                    let rows: Vec<Vec<String>> = schema
                        .columns
                        .iter()
                        .enumerate()
                        .map(|(idx, column)| {
                            let non_null = cleaned.column_values(idx).flatten().count();
                            vec![
                                (idx + 1).to_string(),
                                column.name.clone(),
                                column.storage.sql(),
                                non_null.to_string(),
                            ]
                        })
                        .collect();
                    table::print_table(&headers, &rows);
                }
                Err(rejection) => {
                    println!("{} -> {}: rejected ({rejection})", ctx.label(), ctx.table);
                }
            }
        })
        .with_context(|| format!("Inspecting {:?}", args.input))
}

fn handle_init_config(args: &InitConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{:?} already exists; pass --force to overwrite it",
            args.output
        );
    }
    SyncConfig::default().save(&args.output)?;
    info!("Default configuration written to {:?}", args.output);
    Ok(())
}
