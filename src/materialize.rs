//! Table definitions derived from cleaned datasets, and the destructive
//! drop-and-recreate that precedes every load.

use anyhow::{Context, Result};
use itertools::Itertools;
use log::info;

use crate::{
    data::Dataset,
    inference::{InferenceRules, StorageType, infer_type},
    store::Store,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub storage: StorageType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn derive(table_name: &str, dataset: &Dataset, rules: &InferenceRules) -> Self {
        let columns = dataset
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| ColumnDescriptor {
                name: name.clone(),
                storage: infer_type(dataset.column_values(idx), name, rules),
            })
            .collect();
        Self {
            name: table_name.to_string(),
            columns,
        }
    }

    pub fn key_column(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.storage.is_key())
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_identifier(&self.name))
    }

    pub fn create_sql(&self) -> String {
        let definitions = self
            .columns
            .iter()
            .map(|column| format!("{} {}", quote_identifier(&column.name), column.storage.sql()))
            .join(", ");
        format!(
            "CREATE TABLE {} ({definitions})",
            quote_identifier(&self.name)
        )
    }

    pub fn insert_sql(&self) -> String {
        let names = self
            .columns
            .iter()
            .map(|column| quote_identifier(&column.name))
            .join(", ");
        let placeholders = (1..=self.columns.len()).map(|n| format!("?{n}")).join(", ");
        format!(
            "INSERT INTO {} ({names}) VALUES ({placeholders})",
            quote_identifier(&self.name)
        )
    }
}

/// Double-quotes an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Drops and recreates the table inside the caller's open transaction.
pub fn materialize(store: &mut dyn Store, schema: &TableSchema) -> Result<()> {
    store
        .execute(&schema.drop_sql())
        .with_context(|| format!("Dropping table '{}'", schema.name))?;
    store
        .execute(&schema.create_sql())
        .with_context(|| format!("Creating table '{}'", schema.name))?;
    info!(
        "Rebuilt table '{}' with {} column(s)",
        schema.name,
        schema.columns.len()
    );
    Ok(())
}
