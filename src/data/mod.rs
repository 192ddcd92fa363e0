//! Wide TSV → tidy measurement table.
//!
//! Input files carry one row per sample date and one column per fraction:
//!
//! ```text
//! DATE      F1   F2   F3
//! 01/02/24  5    3    1.2
//! 01/03/24  7         0.9
//! ```
//!
//! They are unpivoted into one record per (date, category). Missing cells
//! become 0, rows with an unparseable date are dropped, and an optional
//! companion "std" file is left-joined on (date, category).

pub mod cache;
pub mod dates;
pub mod manifest;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::error::PanelDataError;
use crate::logging::{log, log_rows_dropped, log_uncertainty_ignored, obj, v_str, Domain, Level, ProfileScope};
use dates::parse_mixed_date;

pub const DATE_COLUMN: &str = "DATE";

const MISSING_MARKERS: [&str; 7] = ["", "na", "nan", "n/a", "null", "none", "-"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Serialised as `YYYY-MM-DD`.
    pub date: NaiveDate,
    pub category: String,
    pub value: f64,
    pub value_uncertainty: Option<f64>,
}

/// Tidy table for one panel, ordered by date then by column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSeries {
    pub records: Vec<MeasurementRecord>,
    /// Category names in source column order.
    pub categories: Vec<String>,
    /// Rows discarded because their date key could not be parsed.
    pub dropped_rows: usize,
    /// True when an uncertainty file was successfully merged.
    pub has_uncertainty: bool,
}

impl MeasurementSeries {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn min_date(&self) -> Option<NaiveDate> {
        self.records.iter().map(|r| r.date).min()
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.records.iter().map(|r| r.date).max()
    }

    /// Records whose date is on or after `max_date - weeks`, ordered by
    /// (category name, date). A window reaching past the calendar's range
    /// covers the whole series.
    pub fn trailing_window(&self, weeks: u32) -> Vec<&MeasurementRecord> {
        let Some(max) = self.max_date() else {
            return Vec::new();
        };
        let start = max.checked_sub_signed(Duration::weeks(i64::from(weeks)));
        let mut window: Vec<&MeasurementRecord> = self
            .records
            .iter()
            .filter(|r| start.map_or(true, |s| r.date >= s))
            .collect();
        window.sort_by(|a, b| (a.category.as_str(), a.date).cmp(&(b.category.as_str(), b.date)));
        window
    }

    /// Restrict to the given categories. An empty selection keeps everything.
    pub fn select_categories(&self, selected: &[String]) -> MeasurementSeries {
        if selected.is_empty() {
            return self.clone();
        }
        MeasurementSeries {
            records: self
                .records
                .iter()
                .filter(|r| selected.contains(&r.category))
                .cloned()
                .collect(),
            categories: self
                .categories
                .iter()
                .filter(|c| selected.contains(c))
                .cloned()
                .collect(),
            dropped_rows: self.dropped_rows,
            has_uncertainty: self.has_uncertainty,
        }
    }

    /// Records of one category in date order.
    pub fn category_records<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a MeasurementRecord> + 'a {
        self.records.iter().filter(move |r| r.category == category)
    }
}

/// A parsed wide file before unpivoting.
#[derive(Debug, Clone, Default)]
pub struct WideTable {
    pub categories: Vec<String>,
    pub rows: Vec<WideRow>,
    /// Raw date keys of rows that were dropped.
    pub dropped: Vec<String>,
    /// Non-empty cells that were not numbers.
    pub bad_cells: usize,
}

#[derive(Debug, Clone)]
pub struct WideRow {
    pub date: NaiveDate,
    pub values: Vec<Option<f64>>,
}

/// Read a tab-separated wide table with a `DATE` key column.
pub fn read_wide_table(path: &Path) -> Result<WideTable, PanelDataError> {
    if !path.is_file() {
        return Err(PanelDataError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let read_err = |source| PanelDataError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(read_err)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(read_err)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    let date_idx = headers
        .iter()
        .position(|h| h == DATE_COLUMN)
        .ok_or_else(|| PanelDataError::MissingDateColumn {
            path: path.to_path_buf(),
        })?;
    let columns = unique_columns(&headers, date_idx);
    if columns.is_empty() {
        return Err(PanelDataError::NoCategories {
            path: path.to_path_buf(),
        });
    }

    let mut table = WideTable {
        categories: columns.iter().map(|(_, h)| h.clone()).collect(),
        ..WideTable::default()
    };

    for result in reader.records() {
        let record = result.map_err(read_err)?;
        let raw_date = record.get(date_idx).unwrap_or("");
        let date = match parse_mixed_date(raw_date) {
            Ok(d) => d,
            Err(err) => {
                table.dropped.push(err.raw);
                continue;
            }
        };
        let values = columns
            .iter()
            .map(|(i, _)| match parse_cell(record.get(*i).unwrap_or("")) {
                Cell::Value(v) => Some(v),
                Cell::Missing => None,
                Cell::Invalid => {
                    table.bad_cells += 1;
                    None
                }
            })
            .collect();
        table.rows.push(WideRow { date, values });
    }
    Ok(table)
}

/// Category columns with repeated names suffixed `.1`, `.2`, ... so every
/// (date, category) key stays unique.
fn unique_columns(headers: &[String], date_idx: usize) -> Vec<(usize, String)> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut columns = Vec::new();
    for (i, h) in headers.iter().enumerate() {
        if i == date_idx || h.is_empty() {
            continue;
        }
        let mut name = h.clone();
        let mut n = 0;
        while seen.contains(&name) {
            n += 1;
            name = format!("{}.{}", h, n);
        }
        seen.insert(name.clone());
        columns.push((i, name));
    }
    columns
}

enum Cell {
    Value(f64),
    Missing,
    Invalid,
}

fn parse_cell(raw: &str) -> Cell {
    let s = raw.trim();
    if MISSING_MARKERS.contains(&s.to_lowercase().as_str()) {
        return Cell::Missing;
    }
    match s.replace(',', "").parse::<f64>() {
        Ok(v) if v.is_finite() => Cell::Value(v),
        Ok(_) => Cell::Missing,
        Err(_) => Cell::Invalid,
    }
}

/// Unpivot into tidy records. Duplicate dates collapse to the later row;
/// missing cells become 0.
pub fn pivot_long(table: &WideTable) -> Vec<MeasurementRecord> {
    let mut by_date: BTreeMap<NaiveDate, &[Option<f64>]> = BTreeMap::new();
    for row in &table.rows {
        by_date.insert(row.date, &row.values);
    }

    let mut records = Vec::with_capacity(by_date.len() * table.categories.len());
    for (date, values) in by_date {
        for (i, category) in table.categories.iter().enumerate() {
            records.push(MeasurementRecord {
                date,
                category: category.clone(),
                value: values.get(i).copied().flatten().unwrap_or(0.0),
                value_uncertainty: None,
            });
        }
    }
    records
}

/// Left-join uncertainty values onto `records` by (date, category). Returns
/// the number of records that received a value.
pub fn merge_uncertainty(records: &mut [MeasurementRecord], uncertainty: &[MeasurementRecord]) -> usize {
    let lookup: HashMap<(NaiveDate, &str), f64> = uncertainty
        .iter()
        .map(|r| ((r.date, r.category.as_str()), r.value))
        .collect();
    let mut matched = 0;
    for rec in records.iter_mut() {
        rec.value_uncertainty = lookup.get(&(rec.date, rec.category.as_str())).copied();
        if rec.value_uncertainty.is_some() {
            matched += 1;
        }
    }
    matched
}

/// Load one panel's tidy table. A bad primary file is an error; a bad
/// uncertainty file is logged and ignored.
pub fn normalize(
    primary_path: &Path,
    uncertainty_path: Option<&Path>,
) -> Result<MeasurementSeries, PanelDataError> {
    let _scope = ProfileScope::new("normalize");
    let table = read_wide_table(primary_path)?;
    report_dropped(primary_path, &table);

    let mut series = MeasurementSeries {
        records: pivot_long(&table),
        categories: table.categories.clone(),
        dropped_rows: table.dropped.len(),
        has_uncertainty: false,
    };

    if let Some(std_path) = uncertainty_path {
        match read_wide_table(std_path) {
            Ok(std_table) => {
                report_dropped(std_path, &std_table);
                merge_uncertainty(&mut series.records, &pivot_long(&std_table));
                series.has_uncertainty = true;
            }
            Err(err) => log_uncertainty_ignored(&std_path.display().to_string(), &err.to_string()),
        }
    }
    Ok(series)
}

fn report_dropped(path: &Path, table: &WideTable) {
    if let Some(first) = table.dropped.first() {
        log_rows_dropped(&path.display().to_string(), table.dropped.len(), first);
    }
    if table.bad_cells > 0 {
        log(
            Level::Warn,
            Domain::Data,
            "non_numeric_cells",
            obj(&[
                ("path", v_str(&path.display().to_string())),
                ("count", json!(table.bad_cells)),
            ]),
        );
    }
}
