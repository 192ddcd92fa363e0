use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::dates::iso;
use super::read_wide_table;
use crate::error::PanelDataError;

/// Fingerprint and shape of one data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub path: String,
    pub hash_sha256: String,
    pub row_count: u64,
    pub dropped_rows: u64,
    pub bad_cells: u64,
    pub categories: Vec<String>,
    pub date_min: Option<String>,
    pub date_max: Option<String>,
    pub modified: Option<String>,
    pub warnings: Vec<String>,
    pub generated_at: String,
}

pub fn build_manifest(path: &Path) -> Result<DatasetManifest, PanelDataError> {
    let table = read_wide_table(path)?;
    let hash = file_sha256(path)?;

    let mut warnings = Vec::new();
    if !table.dropped.is_empty() {
        let sample: Vec<&str> = table.dropped.iter().take(3).map(String::as_str).collect();
        warnings.push(format!("unparseable_dates: {:?}", sample));
    }
    if table.bad_cells > 0 {
        warnings.push(format!("non_numeric_cells: {}", table.bad_cells));
    }
    if table.rows.windows(2).any(|w| w[1].date <= w[0].date) {
        warnings.push("dates_not_strictly_increasing".to_string());
    }

    Ok(DatasetManifest {
        path: path.display().to_string(),
        hash_sha256: hash,
        row_count: table.rows.len() as u64,
        dropped_rows: table.dropped.len() as u64,
        bad_cells: table.bad_cells as u64,
        categories: table.categories.clone(),
        date_min: table.rows.iter().map(|r| r.date).min().map(iso),
        date_max: table.rows.iter().map(|r| r.date).max().map(iso),
        modified: modified_at(path).map(|t| t.to_rfc3339()),
        warnings,
        generated_at: Utc::now().to_rfc3339(),
    })
}

pub fn file_sha256(path: &Path) -> Result<String, PanelDataError> {
    let io_err = |source| PanelDataError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn default_manifest_path(dataset_path: &Path) -> PathBuf {
    let mut p = dataset_path.to_path_buf();
    let fname = dataset_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset.tsv");
    p.set_file_name(format!("{}.manifest.json", fname));
    p
}

pub fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

/// Most recent modification time among the files that exist.
pub fn latest_modification<'a, I>(paths: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = &'a Path>,
{
    paths.into_iter().filter_map(modified_at).max()
}

/// `Last updated: YYYY-MM-DD HH:MM` in the display zone, or `Unknown`.
pub fn format_last_updated(latest: Option<DateTime<Utc>>, tz: chrono_tz::Tz) -> String {
    match latest {
        Some(ts) => format!(
            "Last updated: {}",
            ts.with_timezone(&tz).format("%Y-%m-%d %H:%M")
        ),
        None => "Unknown".to_string(),
    }
}
