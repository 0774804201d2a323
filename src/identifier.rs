//! Storage identifier normalization.
//!
//! Sheet names and file names arrive in whatever shape users gave them
//! (`"Q1 Sales (final).xlsx"`, `"2024"`, `"报表"`). Tables need identifiers
//! that are lowercase, limited to `[a-z0-9_]`, non-empty, and never start with
//! a digit. [`normalize_identifier`] is total: every input yields a usable name.

use std::{path::Path, sync::OnceLock};

use regex::Regex;

pub const SHEET_PREFIX: &str = "sheet";
pub const TABLE_PREFIX: &str = "table";

fn disallowed_chars() -> &'static Regex {
    static DISALLOWED: OnceLock<Regex> = OnceLock::new();
    DISALLOWED.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static identifier pattern"))
}

pub fn normalize_identifier(raw: &str, fallback_prefix: &str) -> String {
    let lowered = raw.to_lowercase();
    let replaced = disallowed_chars().replace_all(&lowered, "_");
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        return fallback_prefix.to_string();
    }
    if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("{fallback_prefix}_{trimmed}");
    }
    trimmed.to_string()
}

/// Base table name for a source file: the file stem, normalized.
pub fn file_table_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    normalize_identifier(&stem, TABLE_PREFIX)
}

/// Destination table for one unit of a source file.
///
/// Single-unit sources (a flat CSV, or a workbook with one sheet) map to the
/// file's own table name. Workbooks with several sheets get one table per
/// sheet, suffixed with the normalized sheet name.
pub fn unit_table_name(base: &str, unit_name: &str, unit_count: usize) -> String {
    if unit_count <= 1 {
        base.to_string()
    } else {
        format!("{base}_{}", normalize_identifier(unit_name, SHEET_PREFIX))
    }
}
