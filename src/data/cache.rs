//! Tidy tables cached by file path and modification time.
//!
//! An entry is reused only while both the primary and the uncertainty file
//! keep the mtime they had when the entry was built. Failed loads are never
//! cached and evict whatever was cached for that file, so a broken file is
//! never masked by an older table and a panel recovers as soon as it is fixed.

use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use super::{normalize, MeasurementSeries};
use crate::error::PanelDataError;
use crate::logging::{log, obj, v_str, Domain, Level};

type CacheKey = (PathBuf, Option<PathBuf>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    primary: Option<SystemTime>,
    uncertainty: Option<SystemTime>,
}

#[derive(Debug)]
struct Entry {
    stamp: Stamp,
    series: Arc<MeasurementSeries>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
pub struct TableCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached table for this file pair, re-normalising when either
    /// file's mtime changed since it was cached.
    pub fn get_or_load(
        &self,
        primary: &Path,
        uncertainty: Option<&Path>,
    ) -> Result<Arc<MeasurementSeries>, PanelDataError> {
        let key: CacheKey = (primary.to_path_buf(), uncertainty.map(Path::to_path_buf));
        let stamp = Stamp {
            primary: mtime(primary),
            uncertainty: uncertainty.and_then(mtime),
        };

        // Without a primary mtime the file is gone or unreadable; let
        // normalize report why.
        if stamp.primary.is_some() {
            if let Ok(entries) = self.entries.lock() {
                if let Some(entry) = entries.get(&key).filter(|e| e.stamp == stamp) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    log(
                        Level::Debug,
                        Domain::Cache,
                        "cache_hit",
                        obj(&[("path", v_str(&primary.display().to_string()))]),
                    );
                    return Ok(Arc::clone(&entry.series));
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let series = match normalize(primary, uncertainty) {
            Ok(series) => Arc::new(series),
            Err(err) => {
                self.invalidate(primary);
                return Err(err);
            }
        };
        log(
            Level::Debug,
            Domain::Cache,
            "cache_miss",
            obj(&[
                ("path", v_str(&primary.display().to_string())),
                ("records", json!(series.len())),
            ]),
        );
        if stamp.primary.is_some() {
            if let Ok(mut entries) = self.entries.lock() {
                entries.insert(
                    key,
                    Entry {
                        stamp,
                        series: Arc::clone(&series),
                    },
                );
            }
        }
        Ok(series)
    }

    /// Drop every entry built from `primary`.
    pub fn invalidate(&self, primary: &Path) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|(p, _), _| p != primary);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().map(|e| e.len()).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch_later(path: &Path, secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn reuses_table_until_mtime_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.tsv");
        fs::write(&path, "DATE\tF1\n01/02/24\t5\n").unwrap();
        let cache = TableCache::new();

        let first = cache.get_or_load(&path, None).unwrap();
        let second = cache.get_or_load(&path, None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, entries: 1 });

        fs::write(&path, "DATE\tF1\n01/02/24\t5\n01/03/24\t6\n").unwrap();
        touch_later(&path, 60);
        let third = cache.get_or_load(&path, None).unwrap();
        assert_eq!(third.len(), 2);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn uncertainty_mtime_is_part_of_the_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.tsv");
        let std_path = dir.path().join("s.tsv");
        fs::write(&path, "DATE\tF1\n01/02/24\t5\n").unwrap();
        fs::write(&std_path, "DATE\tF1\n01/02/24\t0.5\n").unwrap();
        let cache = TableCache::new();

        let first = cache.get_or_load(&path, Some(&std_path)).unwrap();
        assert_eq!(first.records[0].value_uncertainty, Some(0.5));

        fs::write(&std_path, "DATE\tF1\n01/02/24\t0.7\n").unwrap();
        touch_later(&std_path, 60);
        let second = cache.get_or_load(&path, Some(&std_path)).unwrap();
        assert_eq!(second.records[0].value_uncertainty, Some(0.7));
    }

    #[test]
    fn failures_are_not_cached() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("late.tsv");
        let cache = TableCache::new();
        assert!(cache.get_or_load(&path, None).is_err());
        assert_eq!(cache.stats().entries, 0);

        fs::write(&path, "DATE\tF1\n01/02/24\t5\n").unwrap();
        assert_eq!(cache.get_or_load(&path, None).unwrap().len(), 1);
    }

    #[test]
    fn invalidate_drops_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.tsv");
        fs::write(&path, "DATE\tF1\n01/02/24\t5\n").unwrap();
        let cache = TableCache::new();
        cache.get_or_load(&path, None).unwrap();
        cache.invalidate(&path);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn failed_reload_evicts_stale_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.tsv");
        fs::write(&path, "DATE\tF1\n01/02/24\t5\n").unwrap();
        let cache = TableCache::new();
        cache.get_or_load(&path, None).unwrap();
        assert_eq!(cache.stats().entries, 1);

        fs::write(&path, "Day\tF1\n01/02/24\t5\n").unwrap();
        touch_later(&path, 5);
        assert!(matches!(
            cache.get_or_load(&path, None),
            Err(PanelDataError::MissingDateColumn { .. })
        ));
        assert_eq!(cache.stats().entries, 0);
    }
}
