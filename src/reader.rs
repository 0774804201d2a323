//! Source readers that turn files into raw [`Dataset`]s.
//!
//! A source exposes one or more named units. Workbooks have one unit per sheet
//! with cells typed by the spreadsheet itself; a CSV file is a single unit whose
//! cells are all text, decoded with the primary encoding and retried with the
//! fallback encoding when the bytes are not valid in the first one.

use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use calamine::{Data, DataType, Reader, Sheets, open_workbook_auto};
use encoding_rs::Encoding;
use log::{debug, warn};

use crate::data::{Cell, Dataset, Value, text_cell};

pub trait TabularSource {
    fn unit_names(&self) -> Vec<String>;
    fn read_unit(&mut self, name: &str) -> Result<Dataset>;
}

pub fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

pub fn open_source(
    path: &Path,
    primary: &'static Encoding,
    fallback: &'static Encoding,
) -> Result<Box<dyn TabularSource>> {
    if is_csv(path) {
        Ok(Box::new(CsvSource::new(path, primary, fallback)))
    } else {
        Ok(Box::new(SpreadsheetSource::open(path)?))
    }
}

pub struct CsvSource {
    path: PathBuf,
    unit: String,
    primary: &'static Encoding,
    fallback: &'static Encoding,
}

impl CsvSource {
    pub fn new(path: &Path, primary: &'static Encoding, fallback: &'static Encoding) -> Self {
        let unit = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            unit,
            primary,
            fallback,
        }
    }
}

impl TabularSource for CsvSource {
    fn unit_names(&self) -> Vec<String> {
        vec![self.unit.clone()]
    }

    fn read_unit(&mut self, _name: &str) -> Result<Dataset> {
        let bytes =
            fs::read(&self.path).with_context(|| format!("Reading CSV file {:?}", self.path))?;
        let text = decode_with_fallback(&bytes, self.primary, self.fallback)
            .with_context(|| format!("Decoding CSV file {:?}", self.path))?;
        parse_csv_text(&text).with_context(|| format!("Parsing CSV file {:?}", self.path))
    }
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_with_fallback(
    bytes: &[u8],
    primary: &'static Encoding,
    fallback: &'static Encoding,
) -> Result<String> {
    match decode_bytes(bytes, primary) {
        Ok(text) => Ok(text),
        Err(err) => {
            warn!("{err}; retrying with {}", fallback.name());
            decode_bytes(bytes, fallback)
        }
    }
}

pub fn parse_csv_text(text: &str) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .double_quote(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .context("Reading CSV header")?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let mut rows = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        rows.push(record.iter().map(text_cell).collect::<Vec<Cell>>());
    }
    debug!("Parsed CSV with {} column(s) and {} row(s)", headers.len(), rows.len());
    Ok(Dataset::new(headers, rows))
}

pub struct SpreadsheetSource {
    path: PathBuf,
    workbook: Sheets<BufReader<File>>,
}

impl SpreadsheetSource {
    pub fn open(path: &Path) -> Result<Self> {
        let workbook = open_workbook_auto(path)
            .with_context(|| format!("Opening workbook {path:?}"))?;
        Ok(Self {
            path: path.to_path_buf(),
            workbook,
        })
    }
}

impl TabularSource for SpreadsheetSource {
    fn unit_names(&self) -> Vec<String> {
        self.workbook.sheet_names()
    }

    fn read_unit(&mut self, name: &str) -> Result<Dataset> {
        let range = self
            .workbook
            .worksheet_range(name)
            .with_context(|| format!("Reading sheet '{name}' from {:?}", self.path))?;
        let mut rows = range.rows();
        let headers = match rows.next() {
            Some(header) => header.iter().map(|cell| cell.to_string()).collect(),
            None => Vec::new(),
        };
        let rows = rows
            .map(|row| row.iter().map(cell_from_sheet).collect())
            .collect();
        Ok(Dataset::new(headers, rows))
    }
}

pub fn cell_from_sheet(cell: &Data) -> Cell {
    match cell {
        Data::Int(i) => Some(Value::Integer(*i)),
        Data::Float(f) => Some(Value::Float(*f)),
        Data::String(s) => text_cell(s),
        Data::Bool(b) => Some(Value::Integer(i64::from(*b))),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell.as_date().map(Value::Date),
        _ => None,
    }
}
