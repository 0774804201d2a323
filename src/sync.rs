//! Batch orchestration: read each unit, preprocess it, rebuild its table, and
//! load it inside one transaction.
//!
//! Failures never abort the batch. A rejected or failed unit is logged with its
//! file and unit name, recorded in the [`BatchSummary`], and the run moves on.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::{error, info, warn};
use serde::Serialize;

use crate::{
    config::SyncConfig,
    data::Dataset,
    discover::{DiscoveryRules, discover_files},
    identifier::{file_table_name, unit_table_name},
    inference::InferenceRules,
    materialize::{TableSchema, materialize},
    preprocess::{PreprocessRules, Rejection, preprocess},
    reader::open_source,
    store::{Connector, Store},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    Loaded { rows: usize },
    Rejected { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReport {
    pub source: String,
    pub unit: String,
    pub table: String,
    pub outcome: UnitOutcome,
}

impl UnitReport {
    pub fn is_loaded(&self) -> bool {
        matches!(self.outcome, UnitOutcome::Loaded { .. })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub files_discovered: usize,
    pub files_processed: usize,
    pub units_total: usize,
    pub units_succeeded: usize,
    pub units_rejected: usize,
    pub units_failed: usize,
    pub rows_loaded: usize,
    pub reports: Vec<UnitReport>,
}

impl BatchSummary {
    pub fn record(&mut self, report: UnitReport) {
        if report.is_loaded()
            && self
                .reports
                .iter()
                .any(|earlier| earlier.is_loaded() && earlier.table == report.table)
        {
            warn!(
                "Table '{}' from {}/{} replaces a table loaded earlier in this batch",
                report.table, report.source, report.unit
            );
        }
        self.units_total += 1;
        match &report.outcome {
            UnitOutcome::Loaded { rows } => {
                self.units_succeeded += 1;
                self.rows_loaded += rows;
            }
            UnitOutcome::Rejected { .. } => self.units_rejected += 1,
            UnitOutcome::Failed { .. } => self.units_failed += 1,
        }
        self.reports.push(report);
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating report {path:?}"))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).context("Writing report JSON")?;
        writer.flush()?;
        Ok(())
    }
}

/// Where a unit came from and which table it lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitContext {
    pub source: String,
    pub unit: String,
    pub table: String,
}

impl UnitContext {
    pub fn label(&self) -> String {
        format!("{}/{}", self.source, self.unit)
    }

    fn report(&self, outcome: UnitOutcome) -> UnitReport {
        UnitReport {
            source: self.source.clone(),
            unit: self.unit.clone(),
            table: self.table.clone(),
            outcome,
        }
    }
}

pub struct Syncer<C: Connector> {
    connector: C,
    preprocess_rules: PreprocessRules,
    inference_rules: InferenceRules,
    discovery_rules: DiscoveryRules,
    primary_encoding: &'static Encoding,
    fallback_encoding: &'static Encoding,
}

impl<C: Connector> Syncer<C> {
    pub fn new(config: &SyncConfig, connector: C) -> Result<Self> {
        config.validate()?;
        let (primary_encoding, fallback_encoding) = config.encodings()?;
        Ok(Self {
            connector,
            preprocess_rules: config.preprocess_rules(),
            inference_rules: config.inference_rules(),
            discovery_rules: config.discovery_rules(),
            primary_encoding,
            fallback_encoding,
        })
    }

    /// Preprocesses a unit and derives its table definition without touching storage.
    pub fn plan(
        &self,
        dataset: Dataset,
        ctx: &UnitContext,
    ) -> Result<(Dataset, TableSchema), Rejection> {
        let cleaned = preprocess(dataset, &self.preprocess_rules, &ctx.label())?;
        let schema = TableSchema::derive(&ctx.table, &cleaned, &self.inference_rules);
        Ok((cleaned, schema))
    }

    pub fn sync_dataset(&self, dataset: Dataset, ctx: &UnitContext) -> UnitReport {
        let (cleaned, schema) = match self.plan(dataset, ctx) {
            Ok(planned) => planned,
            Err(rejection) => {
                warn!("Skipped {}: {rejection}", ctx.label());
                return ctx.report(UnitOutcome::Rejected {
                    reason: rejection.to_string(),
                });
            }
        };
        match self.load(&cleaned, &schema) {
            Ok(rows) => {
                info!("Loaded {rows} row(s) from {} into '{}'", ctx.label(), ctx.table);
                ctx.report(UnitOutcome::Loaded { rows })
            }
            Err(err) => {
                error!("Sync failed for {} -> '{}': {err:#}", ctx.label(), ctx.table);
                ctx.report(UnitOutcome::Failed {
                    error: format!("{err:#}"),
                })
            }
        }
    }

    fn load(&self, dataset: &Dataset, schema: &TableSchema) -> Result<usize> {
        let mut store = self
            .connector
            .connect()
            .with_context(|| format!("Connecting to {}", self.connector.describe()))?;
        store.begin()?;
        let result = write_table(store.as_mut(), dataset, schema)
            .and_then(|rows| store.commit().map(|_| rows));
        if result.is_err()
            && let Err(rollback_err) = store.rollback()
        {
            warn!("Rollback of '{}' failed: {rollback_err:#}", schema.name);
        }
        result
    }

    /// Reads every unit of `path` and hands it to `visit` together with its context.
    pub fn for_each_unit<F>(&self, path: &Path, mut visit: F) -> Result<()>
    where
        F: FnMut(UnitContext, Result<Dataset>),
    {
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mut reader = open_source(path, self.primary_encoding, self.fallback_encoding)?;
        let units = reader.unit_names();
        if units.is_empty() {
            warn!("{source} contains no sheets");
        }
        let base = file_table_name(path);
        for unit in &units {
            let ctx = UnitContext {
                source: source.clone(),
                unit: unit.clone(),
                table: unit_table_name(&base, unit, units.len()),
            };
            let dataset = reader.read_unit(unit);
            visit(ctx, dataset);
        }
        Ok(())
    }

    pub fn sync_file(&self, path: &Path, summary: &mut BatchSummary) -> Result<()> {
        info!("Processing {path:?}");
        self.for_each_unit(path, |ctx, dataset| {
            let report = match dataset {
                Ok(dataset) => self.sync_dataset(dataset, &ctx),
                Err(err) => {
                    error!("Failed to read {}: {err:#}", ctx.label());
                    ctx.report(UnitOutcome::Failed {
                        error: format!("{err:#}"),
                    })
                }
            };
            summary.record(report);
        })
    }

    pub fn sync_directory(&self, dir: &Path) -> Result<BatchSummary> {
        let files = discover_files(dir, &self.discovery_rules)?;
        let mut summary = BatchSummary {
            files_discovered: files.len(),
            ..BatchSummary::default()
        };
        if files.is_empty() {
            warn!("No matching files found in {dir:?}");
        }
        for path in &files {
            match self.sync_file(path, &mut summary) {
                Ok(()) => summary.files_processed += 1,
                Err(err) => error!("Failed to process {path:?}: {err:#}"),
            }
        }
        info!(
            "Batch complete: {}/{} file(s) processed, {}/{} unit(s) loaded ({} rejected, {} failed), {} row(s)",
            summary.files_processed,
            summary.files_discovered,
            summary.units_succeeded,
            summary.units_total,
            summary.units_rejected,
            summary.units_failed,
            summary.rows_loaded
        );
        Ok(summary)
    }
}

fn write_table(store: &mut dyn Store, dataset: &Dataset, schema: &TableSchema) -> Result<usize> {
    materialize(store, schema)?;
    store
        .execute_many(&schema.insert_sql(), &dataset.rows)
        .with_context(|| format!("Loading rows into '{}'", schema.name))
}
