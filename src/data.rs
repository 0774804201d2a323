use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    Date(NaiveDate),
}

pub type Cell = Option<Value>;

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Decimal(d) => d.normalize().to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Converts a raw text cell into a nullable text value.
pub fn text_cell(raw: &str) -> Cell {
    if raw.trim().is_empty() {
        None
    } else {
        Some(Value::Text(raw.to_string()))
    }
}

/// Tabular data with a header and rows aligned to it.
///
/// Every row holds exactly `columns.len()` cells; [`Dataset::new`] pads short
/// rows with nulls and truncates long ones.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = Option<&Value>> + Clone + '_ {
        self.rows.iter().map(move |row| row.get(idx).and_then(|c| c.as_ref()))
    }

    /// Returns a dataset restricted to the given column indices, in order.
    pub fn select_columns(self, keep: &[usize]) -> Self {
        let columns = keep.iter().map(|&idx| self.columns[idx].clone()).collect();
        let rows = self
            .rows
            .into_iter()
            .map(|mut row| keep.iter().map(|&idx| row[idx].take()).collect())
            .collect();
        Self { columns, rows }
    }

    /// Returns a dataset with one column's cells rewritten by `convert`.
    pub fn map_column<F>(mut self, idx: usize, mut convert: F) -> Self
    where
        F: FnMut(Cell) -> Cell,
    {
        for row in &mut self.rows {
            let cell = row[idx].take();
            row[idx] = convert(cell);
        }
        self
    }
}

/// Parses a date using exactly one chrono format string.
pub fn parse_date_with_format(value: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), format).ok()
}

/// Parses an integral value from any cell type.
///
/// Floats and numeric text qualify only when they carry no fractional part.
pub fn parse_integral(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Float(f) => float_to_i64(*f),
        Value::Decimal(d) => {
            if d.fract().is_zero() {
                d.to_i64()
            } else {
                None
            }
        }
        Value::Text(s) => {
            let trimmed = s.trim();
            if let Ok(parsed) = trimmed.parse::<i64>() {
                return Some(parsed);
            }
            trimmed.parse::<f64>().ok().and_then(float_to_i64)
        }
        Value::Date(_) => None,
    }
}

pub fn float_to_i64(value: f64) -> Option<i64> {
    if value.is_finite()
        && value.fract() == 0.0
        && value >= i64::MIN as f64
        && value < i64::MAX as f64
    {
        Some(value as i64)
    } else {
        None
    }
}

/// Parses a money-formatted string such as `"$1,234.50"`, `"12%"`, or
/// `"(99.00)"` into a decimal.
///
/// Thousands separators, whitespace, percent signs, and any of `symbols` are
/// stripped before parsing. Parenthesised amounts are negative.
pub fn parse_money(raw: &str, symbols: &[String]) -> Option<Decimal> {
    let mut body = raw.trim();
    let mut negative = false;
    if body.len() > 2 && body.starts_with('(') && body.ends_with(')') {
        negative = true;
        body = &body[1..body.len() - 1];
    }

    let mut stripped = body.to_string();
    for symbol in symbols.iter().filter(|s| !s.is_empty()) {
        stripped = stripped.replace(symbol.as_str(), "");
    }
    let cleaned: String = stripped
        .chars()
        .filter(|c| !matches!(c, ',' | '%') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let parsed = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()?;
    Some(if negative { -parsed } else { parsed })
}

/// Converts any cell into a money decimal; dates and unparseable text become null.
pub fn money_from_value(value: &Value, symbols: &[String]) -> Option<Decimal> {
    match value {
        Value::Text(s) => parse_money(s, symbols),
        Value::Integer(i) => Some(Decimal::from(*i)),
        Value::Float(f) => Decimal::from_f64(*f),
        Value::Decimal(d) => Some(*d),
        Value::Date(_) => None,
    }
}
