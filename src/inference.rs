//! Storage type inference for cleaned dataset columns.
//!
//! [`infer_type`] looks at the values a column holds once preprocessing is
//! done and picks the storage type used in the table definition. The key
//! column and configured money columns are decided by name; every other column
//! is decided by the [`ColumnKind`] its non-null values share.

use std::fmt;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use crate::data::Value;

const DECIMAL_MAX_PRECISION: u32 = 28;
const VARCHAR_DEFAULT_LENGTH: usize = 255;
const VARCHAR_MAX_LENGTH: usize = 10_000;
const VARCHAR_HEADROOM: f64 = 1.2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecimalSpec {
    pub precision: u32,
    pub scale: u32,
}

impl DecimalSpec {
    /// Precision used for plain floating-point columns.
    pub const FLOAT_COLUMN: DecimalSpec = DecimalSpec {
        precision: 9,
        scale: 4,
    };

    pub fn new(precision: u32, scale: u32) -> Result<Self> {
        let spec = Self { precision, scale };
        spec.ensure_valid()?;
        Ok(spec)
    }

    pub fn ensure_valid(&self) -> Result<()> {
        ensure!(self.precision > 0, "Decimal precision must be positive");
        ensure!(
            self.precision <= DECIMAL_MAX_PRECISION,
            "Decimal precision must be <= {}",
            DECIMAL_MAX_PRECISION
        );
        ensure!(
            self.scale <= self.precision,
            "Decimal scale ({}) cannot exceed precision ({})",
            self.scale,
            self.precision
        );
        Ok(())
    }

    pub fn signature(&self) -> String {
        format!("DECIMAL({},{})", self.precision, self.scale)
    }
}

impl Default for DecimalSpec {
    fn default() -> Self {
        Self::FLOAT_COLUMN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    KeyInteger,
    Date,
    CurrencyDecimal(DecimalSpec),
    Integer,
    Decimal(DecimalSpec),
    Varchar(usize),
    Text,
}

impl StorageType {
    pub fn sql(&self) -> String {
        match self {
            StorageType::KeyInteger => "BIGINT PRIMARY KEY".to_string(),
            StorageType::Date => "DATE".to_string(),
            StorageType::CurrencyDecimal(spec) | StorageType::Decimal(spec) => spec.signature(),
            StorageType::Integer => "BIGINT".to_string(),
            StorageType::Varchar(width) => format!("VARCHAR({width})"),
            StorageType::Text => "TEXT".to_string(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::KeyInteger => "key",
            StorageType::Date => "date",
            StorageType::CurrencyDecimal(_) => "currency",
            StorageType::Integer => "integer",
            StorageType::Decimal(_) => "decimal",
            StorageType::Varchar(_) => "varchar",
            StorageType::Text => "text",
        }
    }

    pub fn is_key(&self) -> bool {
        matches!(self, StorageType::KeyInteger)
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql())
    }
}

/// The shared runtime type of a column's non-null values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Empty,
    Date,
    Decimal,
    Integer,
    Float,
    Text,
}

impl ColumnKind {
    pub fn of<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a Value>>,
    {
        let mut kind = ColumnKind::Empty;
        for value in values.into_iter().flatten() {
            let observed = match value {
                Value::Text(_) => return ColumnKind::Text,
                Value::Date(_) => ColumnKind::Date,
                Value::Decimal(_) => ColumnKind::Decimal,
                Value::Integer(_) => ColumnKind::Integer,
                Value::Float(_) => ColumnKind::Float,
            };
            kind = match (kind, observed) {
                (ColumnKind::Empty, next) => next,
                (current, next) if current == next => current,
                (ColumnKind::Integer, ColumnKind::Float) | (ColumnKind::Float, ColumnKind::Integer) => {
                    ColumnKind::Float
                }
                _ => return ColumnKind::Text,
            };
        }
        kind
    }
}

/// Column names that bypass value-driven inference.
#[derive(Debug, Clone)]
pub struct InferenceRules {
    pub key_column: String,
    pub money_columns: Vec<String>,
    pub currency_decimal: DecimalSpec,
}

impl InferenceRules {
    pub fn is_money_column(&self, name: &str) -> bool {
        self.money_columns.iter().any(|money| money == name)
    }
}

pub fn infer_type<'a, I>(values: I, column_name: &str, rules: &InferenceRules) -> StorageType
where
    I: IntoIterator<Item = Option<&'a Value>> + Clone,
{
    if column_name == rules.key_column {
        return StorageType::KeyInteger;
    }
    if rules.is_money_column(column_name) {
        return StorageType::CurrencyDecimal(rules.currency_decimal);
    }
    match ColumnKind::of(values.clone()) {
        ColumnKind::Date => StorageType::Date,
        ColumnKind::Text | ColumnKind::Empty => StorageType::Varchar(varchar_width(values)),
        ColumnKind::Integer => StorageType::Integer,
        ColumnKind::Float => StorageType::Decimal(DecimalSpec::FLOAT_COLUMN),
        ColumnKind::Decimal => StorageType::CurrencyDecimal(rules.currency_decimal),
    }
}

fn varchar_width<'a, I>(values: I) -> usize
where
    I: IntoIterator<Item = Option<&'a Value>>,
{
    let longest = values
        .into_iter()
        .flatten()
        .map(|value| value.as_display().chars().count())
        .max()
        .filter(|len| *len > 0)
        .unwrap_or(VARCHAR_DEFAULT_LENGTH);
    let padded = (longest as f64 * VARCHAR_HEADROOM).round() as usize;
    padded.clamp(1, VARCHAR_MAX_LENGTH)
}
