//! Row preprocessing pipeline.
//!
//! Turns a raw [`Dataset`] as produced by a reader into one that is safe to
//! load: headers are cleaned, the primary key is validated and coerced, empty
//! rows are removed, and loosely typed text is converted into dates, money
//! decimals, and integers where the data supports it.
//!
//! Each step takes ownership of a dataset and hands back a new one, or a
//! [`Rejection`] explaining why the dataset cannot be loaded. Steps run in a
//! fixed order:
//!
//! 1. header cleanup (trim, synthesize blank names, drop duplicates)
//! 2. key presence check
//! 3. empty-row removal
//! 4. key-only row removal
//! 5. key coercion and de-duplication
//! 6. date detection on text columns (sample based, best effort)
//! 7. money normalization
//! 8. integral-float narrowing

use std::collections::HashSet;

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    data::{
        Cell, Dataset, Value, float_to_i64, money_from_value, parse_date_with_format,
        parse_integral,
    },
    inference::ColumnKind,
};

/// Number of non-null values inspected when deciding whether a column holds dates.
pub const DATE_SAMPLE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("missing primary key column '{0}'")]
    MissingKeyColumn(String),
    #[error("empty after row cleanup")]
    EmptyAfterRowCleanup,
    #[error("empty after content cleanup")]
    EmptyAfterContentCleanup,
    #[error("key column '{0}' not numeric")]
    KeyNotNumeric(String),
}

#[derive(Debug, Clone)]
pub struct PreprocessRules {
    pub key_column: String,
    pub money_columns: Vec<String>,
    pub currency_symbols: Vec<String>,
    pub date_format: String,
}

/// Outcome of sampling a column against the configured date format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateConfidence {
    pub sampled: usize,
    pub parsed: usize,
}

impl DateConfidence {
    /// More than half of the sampled values must parse.
    pub fn is_majority(&self) -> bool {
        self.sampled > 0 && self.parsed * 2 > self.sampled
    }
}

pub fn classify_date_sample(sample: &[Option<&str>], format: &str) -> DateConfidence {
    let sampled = sample.len();
    let parsed = sample
        .iter()
        .filter(|value| {
            value
                .and_then(|text| parse_date_with_format(text, format))
                .is_some()
        })
        .count();
    DateConfidence { sampled, parsed }
}

pub fn preprocess(
    dataset: Dataset,
    rules: &PreprocessRules,
    source: &str,
) -> Result<Dataset, Rejection> {
    let dataset = clean_headers(dataset);
    let key_idx = dataset
        .column_index(&rules.key_column)
        .ok_or_else(|| Rejection::MissingKeyColumn(rules.key_column.clone()))?;
    let dataset = drop_empty_rows(dataset)?;
    let dataset = drop_key_only_rows(dataset, key_idx)?;
    let dataset = coerce_keys(dataset, key_idx, &rules.key_column, source)?;
    let dataset = dedupe_keys(dataset, key_idx, source);
    let dataset = detect_dates(dataset, key_idx, &rules.date_format, source);
    let dataset = normalize_money(dataset, key_idx, rules, source);
    let dataset = narrow_integral_floats(dataset, key_idx, source);
    info!(
        "Preprocessed {source}: {} row(s), {} column(s)",
        dataset.row_count(),
        dataset.column_count()
    );
    Ok(dataset)
}

/// Trims header names, names blank headers `field_<idx>`, and keeps only the
/// first column for each name. Names are compared case-insensitively, as the
/// destination does. Blank-headed columns without any values are dropped
/// outright, and a synthetic name never takes over a name used by a real header.
pub fn clean_headers(mut dataset: Dataset) -> Dataset {
    let named: HashSet<String> = dataset
        .columns
        .iter()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    let mut seen = HashSet::new();
    let mut keep = Vec::with_capacity(dataset.column_count());
    for idx in 0..dataset.column_count() {
        let trimmed = dataset.columns[idx].trim().to_string();
        let name = if trimmed.is_empty() {
            if dataset.column_values(idx).all(|v| v.is_none()) {
                debug!("Dropping unnamed empty column at position {idx}");
                continue;
            }
            synthetic_name(idx, &named, &seen)
        } else {
            trimmed
        };
        if !seen.insert(name.to_lowercase()) {
            warn!("Dropping duplicate column '{name}' at position {idx}");
            continue;
        }
        dataset.columns[idx] = name;
        keep.push(idx);
    }
    if keep.len() == dataset.column_count() {
        dataset
    } else {
        dataset.select_columns(&keep)
    }
}

fn synthetic_name(idx: usize, named: &HashSet<String>, seen: &HashSet<String>) -> String {
    let base = format!("field_{idx}");
    let taken = |candidate: &String| named.contains(candidate) || seen.contains(candidate);
    if !taken(&base) {
        return base;
    }
    (1..)
        .map(|suffix| format!("{base}_{suffix}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

pub fn drop_empty_rows(mut dataset: Dataset) -> Result<Dataset, Rejection> {
    dataset.rows.retain(|row| row.iter().any(Option::is_some));
    if dataset.is_empty() {
        return Err(Rejection::EmptyAfterRowCleanup);
    }
    Ok(dataset)
}

pub fn drop_key_only_rows(mut dataset: Dataset, key_idx: usize) -> Result<Dataset, Rejection> {
    dataset.rows.retain(|row| {
        row.iter()
            .enumerate()
            .any(|(idx, cell)| idx != key_idx && cell.is_some())
    });
    if dataset.is_empty() {
        return Err(Rejection::EmptyAfterContentCleanup);
    }
    Ok(dataset)
}

pub fn coerce_keys(
    mut dataset: Dataset,
    key_idx: usize,
    key_name: &str,
    source: &str,
) -> Result<Dataset, Rejection> {
    let before = dataset.row_count();
    dataset.rows.retain_mut(|row| {
        match row[key_idx].as_ref().and_then(parse_integral) {
            Some(key) => {
                row[key_idx] = Some(Value::Integer(key));
                true
            }
            None => false,
        }
    });
    let dropped = before - dataset.row_count();
    if dropped > 0 {
        warn!("Dropped {dropped} row(s) with non-numeric '{key_name}' in {source}");
    }
    if dataset.is_empty() {
        return Err(Rejection::KeyNotNumeric(key_name.to_string()));
    }
    Ok(dataset)
}

/// Keeps the first row for each key value.
pub fn dedupe_keys(mut dataset: Dataset, key_idx: usize, source: &str) -> Dataset {
    let mut seen = HashSet::new();
    let before = dataset.row_count();
    dataset.rows.retain(|row| match &row[key_idx] {
        Some(Value::Integer(key)) => seen.insert(*key),
        _ => true,
    });
    let dropped = before - dataset.row_count();
    if dropped > 0 {
        warn!("Dropped {dropped} row(s) with duplicate keys in {source}");
    }
    dataset
}

pub fn detect_dates(mut dataset: Dataset, key_idx: usize, format: &str, source: &str) -> Dataset {
    for idx in 0..dataset.column_count() {
        if idx == key_idx || ColumnKind::of(dataset.column_values(idx)) != ColumnKind::Text {
            continue;
        }
        let sample: Vec<Option<&str>> = dataset
            .column_values(idx)
            .flatten()
            .take(DATE_SAMPLE_SIZE)
            .map(Value::as_text)
            .collect();
        let confidence = classify_date_sample(&sample, format);
        if !confidence.is_majority() {
            continue;
        }
        info!(
            "Converted date column '{}' ({}/{} sampled values parsed) in {source}",
            dataset.columns[idx], confidence.parsed, confidence.sampled
        );
        dataset = dataset.map_column(idx, |cell| match cell {
            Some(Value::Text(text)) => parse_date_with_format(&text, format).map(Value::Date),
            Some(Value::Date(date)) => Some(Value::Date(date)),
            _ => None,
        });
    }
    dataset
}

pub fn normalize_money(
    mut dataset: Dataset,
    key_idx: usize,
    rules: &PreprocessRules,
    source: &str,
) -> Dataset {
    for name in &rules.money_columns {
        let Some(idx) = dataset.column_index(name) else {
            continue;
        };
        if idx == key_idx {
            continue;
        }
        let symbols = &rules.currency_symbols;
        let mut unparsed = 0usize;
        dataset = dataset.map_column(idx, |cell: Cell| {
            let value = cell?;
            let parsed = money_from_value(&value, symbols);
            if parsed.is_none() {
                unparsed += 1;
            }
            parsed.map(Value::Decimal)
        });
        if unparsed > 0 {
            warn!("{unparsed} value(s) in money column '{name}' could not be parsed in {source}");
        }
        debug!("Normalized money column '{name}' in {source}");
    }
    dataset
}

pub fn narrow_integral_floats(mut dataset: Dataset, key_idx: usize, source: &str) -> Dataset {
    for idx in 0..dataset.column_count() {
        if idx == key_idx || ColumnKind::of(dataset.column_values(idx)) != ColumnKind::Float {
            continue;
        }
        let integral = dataset.column_values(idx).flatten().all(|value| match value {
            Value::Integer(_) => true,
            Value::Float(f) => float_to_i64(*f).is_some(),
            _ => false,
        });
        if !integral {
            continue;
        }
        debug!(
            "Narrowed integral float column '{}' to integer in {source}",
            dataset.columns[idx]
        );
        dataset = dataset.map_column(idx, |cell| match cell {
            Some(Value::Float(f)) => float_to_i64(f).map(Value::Integer),
            other => other,
        });
    }
    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn rules() -> PreprocessRules {
        PreprocessRules {
            key_column: "Key".to_string(),
            money_columns: vec!["Revenue".to_string()],
            currency_symbols: ["$", "€", "£", "¥", "₹"].iter().map(|s| s.to_string()).collect(),
            date_format: "%Y/%m/%d".to_string(),
        }
    }

    fn text(value: &str) -> Cell {
        Some(Value::Text(value.to_string()))
    }

    fn dataset(columns: &[&str], rows: Vec<Vec<Cell>>) -> Dataset {
        Dataset::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    #[test]
    fn missing_key_column_is_rejected() {
        let input = dataset(&["Name"], vec![vec![text("Acme")]]);
        assert_eq!(
            preprocess(input, &rules(), "test").unwrap_err(),
            Rejection::MissingKeyColumn("Key".into())
        );
    }

    #[test]
    fn header_cleanup_trims_and_drops_duplicates() {
        let input = dataset(
            &[" Key ", "Name", "Name ", ""],
            vec![vec![text("1"), text("first"), text("second"), None]],
        );
        let cleaned = clean_headers(input);
        assert_eq!(cleaned.columns, vec!["Key", "Name"]);
        assert_eq!(cleaned.rows[0], vec![text("1"), text("first")]);
    }

    #[test]
    fn blank_header_with_values_gets_synthetic_name() {
        let input = dataset(&["Key", ""], vec![vec![text("1"), text("x")]]);
        assert_eq!(clean_headers(input).columns, vec!["Key", "field_1"]);
    }

    #[test]
    fn headers_differing_only_in_case_keep_first() {
        let input = dataset(
            &["Key", "Name", "name", "NAME"],
            vec![vec![text("1"), text("Alice"), text("alice"), text("ALICE")]],
        );
        let cleaned = clean_headers(input);
        assert_eq!(cleaned.columns, vec!["Key", "Name"]);
        assert_eq!(cleaned.rows[0], vec![text("1"), text("Alice")]);
    }

    #[test]
    fn synthetic_name_skips_names_used_by_real_headers() {
        let input = dataset(
            &["Key", "", "field_1", "Field_1_1"],
            vec![vec![text("1"), text("a"), text("b"), text("c")]],
        );
        let cleaned = clean_headers(input);
        assert_eq!(cleaned.columns, vec!["Key", "field_1_2", "field_1", "Field_1_1"]);
        assert_eq!(cleaned.rows[0], vec![text("1"), text("a"), text("b"), text("c")]);
    }

    #[test]
    fn all_null_rows_are_rejected() {
        let input = dataset(&["Key", "Name"], vec![vec![None, None]]);
        assert_eq!(
            preprocess(input, &rules(), "test").unwrap_err(),
            Rejection::EmptyAfterRowCleanup
        );
    }

    #[test]
    fn key_only_rows_are_dropped() {
        let input = dataset(
            &["Key", "Name"],
            vec![vec![text("1"), None], vec![text("2"), text("Beta")]],
        );
        let output = preprocess(input, &rules(), "test").unwrap();
        assert_eq!(output.row_count(), 1);
        assert_eq!(output.rows[0][0], Some(Value::Integer(2)));

        let only_keys = dataset(&["Key", "Name"], vec![vec![text("1"), None]]);
        assert_eq!(
            preprocess(only_keys, &rules(), "test").unwrap_err(),
            Rejection::EmptyAfterContentCleanup
        );
    }

    #[test]
    fn non_numeric_keys_are_dropped_or_rejected() {
        let input = dataset(
            &["Key", "Name"],
            vec![vec![text("x"), text("a")], vec![Some(Value::Float(3.0)), text("b")]],
        );
        let output = preprocess(input, &rules(), "test").unwrap();
        assert_eq!(output.rows, vec![vec![Some(Value::Integer(3)), text("b")]]);

        let all_bad = dataset(&["Key", "Name"], vec![vec![text("x"), text("a")]]);
        assert_eq!(
            preprocess(all_bad, &rules(), "test").unwrap_err(),
            Rejection::KeyNotNumeric("Key".into())
        );
    }

    #[test]
    fn duplicate_keys_keep_first_row() {
        let input = dataset(
            &["Key", "Name"],
            vec![
                vec![text("1"), text("first")],
                vec![text("1.0"), text("again")],
                vec![text("2"), text("other")],
            ],
        );
        let output = preprocess(input, &rules(), "test").unwrap();
        assert_eq!(output.row_count(), 2);
        assert_eq!(output.rows[0][1], text("first"));
    }

    fn date_column(good: usize, bad: usize) -> Dataset {
        let mut rows = Vec::new();
        for i in 0..good {
            rows.push(vec![
                Some(Value::Integer(i as i64)),
                text(&format!("2024/01/{:02}", i + 1)),
            ]);
        }
        for i in 0..bad {
            rows.push(vec![
                Some(Value::Integer((good + i) as i64)),
                text("not a date"),
            ]);
        }
        dataset(&["Key", "When"], rows)
    }

    #[test]
    fn date_column_converts_on_majority() {
        let output = detect_dates(date_column(6, 4), 0, "%Y/%m/%d", "test");
        assert_eq!(
            output.rows[0][1],
            Some(Value::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()))
        );
        assert_eq!(output.rows[9][1], None);
    }

    #[test]
    fn date_column_stays_text_without_majority() {
        let output = detect_dates(date_column(4, 6), 0, "%Y/%m/%d", "test");
        assert_eq!(output.rows[0][1], text("2024/01/01"));
    }

    #[test]
    fn date_sample_only_looks_at_first_ten_values() {
        let output = detect_dates(date_column(4, 20), 0, "%Y/%m/%d", "test");
        assert_eq!(output.rows[0][1], text("2024/01/01"));

        let rows = date_column(20, 4);
        let output = detect_dates(rows, 0, "%Y/%m/%d", "test");
        assert_eq!(output.rows[23][1], None);
    }

    #[test]
    fn classify_requires_strict_majority() {
        let sample = [Some("2024/01/01"), Some("nope")];
        let confidence = classify_date_sample(&sample, "%Y/%m/%d");
        assert_eq!(confidence, DateConfidence { sampled: 2, parsed: 1 });
        assert!(!confidence.is_majority());
        assert!(!classify_date_sample(&[], "%Y/%m/%d").is_majority());
    }

    #[test]
    fn money_column_is_normalized() {
        let input = dataset(
            &["Key", "Revenue"],
            vec![
                vec![Some(Value::Integer(1)), text("$1,234.50")],
                vec![Some(Value::Integer(2)), text("12%")],
                vec![Some(Value::Integer(3)), text("abc")],
                vec![Some(Value::Integer(4)), Some(Value::Float(2.5))],
            ],
        );
        let output = normalize_money(input, 0, &rules(), "test");
        let values: Vec<Cell> = output.rows.iter().map(|row| row[1].clone()).collect();
        assert_eq!(
            values,
            vec![
                Some(Value::Decimal(Decimal::new(123450, 2))),
                Some(Value::Decimal(Decimal::from(12))),
                None,
                Some(Value::Decimal(Decimal::new(25, 1))),
            ]
        );
    }

    #[test]
    fn integral_floats_narrow_to_integers() {
        let input = dataset(
            &["Key", "Qty", "Ratio"],
            vec![
                vec![Some(Value::Integer(1)), Some(Value::Float(1.0)), Some(Value::Float(1.0))],
                vec![Some(Value::Integer(2)), Some(Value::Float(2.0)), Some(Value::Float(2.5))],
                vec![Some(Value::Integer(3)), None, None],
                vec![Some(Value::Integer(4)), Some(Value::Float(4.0)), None],
            ],
        );
        let output = narrow_integral_floats(input, 0, "test");
        let qty: Vec<Cell> = output.rows.iter().map(|row| row[1].clone()).collect();
        assert_eq!(
            qty,
            vec![
                Some(Value::Integer(1)),
                Some(Value::Integer(2)),
                None,
                Some(Value::Integer(4)),
            ]
        );
        assert_eq!(output.rows[1][2], Some(Value::Float(2.5)));
    }

    #[test]
    fn end_to_end_revenue_scenario() {
        let input = dataset(
            &["Key", "Name", "Revenue"],
            vec![
                vec![text("1"), text("Acme"), text("$1,000")],
                vec![text("2"), text("Beta"), None],
                vec![text("x"), text("Bad"), text("$5")],
            ],
        );
        let output = preprocess(input, &rules(), "test").unwrap();
        assert_eq!(output.row_count(), 2);
        assert_eq!(output.rows[0][2], Some(Value::Decimal(Decimal::new(100000, 2))));
        assert_eq!(output.rows[1][2], None);
    }
}
