//! Sync configuration: YAML persistence, defaults, and validation.
//!
//! A [`SyncConfig`] holds everything a batch run needs besides the input files
//! themselves: where the data directory and database live, which column is the
//! primary key, which columns carry money, and the file filters. Missing keys in
//! the YAML document fall back to [`SyncConfig::default`].

use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, ensure};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::{
    discover::DiscoveryRules,
    inference::{DecimalSpec, InferenceRules},
    preprocess::PreprocessRules,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub data_dir: PathBuf,
    pub database: PathBuf,
    pub key_column: String,
    pub money_columns: Vec<String>,
    pub currency_symbols: Vec<String>,
    pub ignore_files: Vec<String>,
    pub extensions: Vec<String>,
    pub lock_prefix: String,
    pub date_format: String,
    pub primary_encoding: String,
    pub fallback_encoding: String,
    pub currency_decimal: DecimalSpec,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database: PathBuf::from("sync.db"),
            key_column: "id".to_string(),
            money_columns: to_strings(&[
                "Revenue", "Price", "Amount", "Cost", "Salary", "Total", "Value",
            ]),
            currency_symbols: to_strings(&["$", "€", "£", "¥", "₹"]),
            ignore_files: to_strings(&["template.xlsx", "backup.xlsx"]),
            extensions: to_strings(&["xlsx", "xls", "xlsm", "ods", "csv"]),
            lock_prefix: "~$".to_string(),
            date_format: "%Y/%m/%d".to_string(),
            primary_encoding: "utf-8".to_string(),
            fallback_encoding: "gbk".to_string(),
            currency_decimal: DecimalSpec::FLOAT_COLUMN,
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .with_context(|| format!("Reading config file {path:?}"))?;
        let mut config: SyncConfig = if raw.trim().is_empty() {
            SyncConfig::default()
        } else {
            serde_yaml::from_str(&raw).with_context(|| format!("Parsing config file {path:?}"))?
        };
        // Headers are matched after trimming.
        config.key_column = config.key_column.trim().to_string();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_yaml::to_string(self).context("Serializing config")?;
        let mut file =
            File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.key_column.trim().is_empty(),
            "Config key_column must not be empty"
        );
        ensure!(
            !self.date_format.trim().is_empty(),
            "Config date_format must not be empty"
        );
        self.currency_decimal
            .ensure_valid()
            .context("Validating currency_decimal")?;
        self.encodings()?;
        Ok(())
    }

    pub fn encodings(&self) -> Result<(&'static Encoding, &'static Encoding)> {
        Ok((
            resolve_encoding(&self.primary_encoding)?,
            resolve_encoding(&self.fallback_encoding)?,
        ))
    }

    pub fn inference_rules(&self) -> InferenceRules {
        InferenceRules {
            key_column: self.key_column.clone(),
            money_columns: self.money_columns.clone(),
            currency_decimal: self.currency_decimal,
        }
    }

    pub fn preprocess_rules(&self) -> PreprocessRules {
        PreprocessRules {
            key_column: self.key_column.clone(),
            money_columns: self.money_columns.clone(),
            currency_symbols: self.currency_symbols.clone(),
            date_format: self.date_format.clone(),
        }
    }

    pub fn discovery_rules(&self) -> DiscoveryRules {
        DiscoveryRules {
            extensions: self.extensions.clone(),
            ignore_files: self.ignore_files.clone(),
            lock_prefix: self.lock_prefix.clone(),
        }
    }
}

pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| anyhow!("Unknown encoding '{label}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.yaml");
        fs::write(&path, "key_column: Key\nmoney_columns: [Revenue]\n").unwrap();

        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.key_column, "Key");
        assert_eq!(config.money_columns, vec!["Revenue".to_string()]);
        assert_eq!(config.date_format, "%Y/%m/%d");
        assert_eq!(config.lock_prefix, "~$");
    }

    #[test]
    fn load_trims_key_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.yaml");
        fs::write(&path, "key_column: \" Key \"\n").unwrap();

        assert_eq!(SyncConfig::load(&path).unwrap().key_column, "Key");
    }

    #[test]
    fn blank_key_column_fails_validation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.yaml");
        fs::write(&path, "key_column: \"  \"\n").unwrap();

        assert!(SyncConfig::load(&path).is_err());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.yaml");
        let mut config = SyncConfig::default();
        config.currency_symbols.push("CHF".into());
        config.save(&path).unwrap();

        assert_eq!(SyncConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn validate_rejects_unknown_encoding() {
        let config = SyncConfig {
            fallback_encoding: "klingon".into(),
            ..SyncConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("klingon"));
    }

    #[test]
    fn validate_rejects_bad_decimal_spec() {
        let config = SyncConfig {
            currency_decimal: DecimalSpec {
                precision: 2,
                scale: 5,
            },
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
