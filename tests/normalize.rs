use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use wwtrends::data::dates::iso;
use wwtrends::data::normalize;
use wwtrends::error::PanelDataError;

fn write_tsv(dir: &Path, name: &str, header: &[&str], rows: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut out = String::new();
    out.push_str(&header.join("\t"));
    out.push('\n');
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    fs::write(&path, out).unwrap();
    path
}

#[test]
fn wide_table_becomes_tidy_rows() {
    let dir = TempDir::new().unwrap();
    let path = write_tsv(
        dir.path(),
        "p.tsv",
        &["DATE", "F1", "F2"],
        &["01/02/24\t5\t3", "01/03/24\t7\t"],
    );
    let series = normalize(&path, None).unwrap();
    let rows: Vec<String> = series
        .records
        .iter()
        .map(|r| format!("{},{},{}", iso(r.date), r.category, r.value))
        .collect();
    assert_eq!(
        rows,
        vec![
            "2024-01-02,F1,5",
            "2024-01-02,F2,3",
            "2024-01-03,F1,7",
            "2024-01-03,F2,0",
        ]
    );
}

#[test]
fn full_table_yields_n_times_m_rows() {
    let dir = TempDir::new().unwrap();
    let rows: Vec<String> = (1..=9)
        .map(|d| format!("2024-02-0{}\t{}\t{}\t{}", d, d, d * 2, d * 3))
        .collect();
    let row_refs: Vec<&str> = rows.iter().map(String::as_str).collect();
    let path = write_tsv(dir.path(), "p.tsv", &["DATE", "F1", "F2", "F3"], &row_refs);
    let series = normalize(&path, None).unwrap();
    assert_eq!(series.len(), 9 * 3);
    assert_eq!(series.dropped_rows, 0);
}

#[test]
fn normalizing_twice_is_identical() {
    let dir = TempDir::new().unwrap();
    let path = write_tsv(
        dir.path(),
        "p.tsv",
        &["DATE", "F1", "F2"],
        &["01/02/24\t5\t3", "garbage\t1\t1", "2024-01-09\t\t2.5"],
    );
    let std_path = write_tsv(dir.path(), "s.tsv", &["DATE", "F1"], &["01/02/24\t0.4"]);
    let a = normalize(&path, Some(&std_path)).unwrap();
    let b = normalize(&path, Some(&std_path)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn left_join_populates_exactly_shared_pairs() {
    let dir = TempDir::new().unwrap();
    let path = write_tsv(
        dir.path(),
        "p.tsv",
        &["DATE", "F1", "F2"],
        &["01/02/24\t5\t3", "01/03/24\t7\t1", "01/04/24\t8\t2"],
    );
    // Shares (01/02,F1) and (01/04,F1): k = 2. F3 and 01/05 only exist on
    // the std side and must be discarded.
    let std_path = write_tsv(
        dir.path(),
        "s.tsv",
        &["DATE", "F1", "F3"],
        &["01/02/24\t0.5\t9", "01/04/24\t0.8\t9", "01/05/24\t1.0\t9"],
    );
    let std2 = write_tsv(dir.path(), "s2.tsv", &["DATE", "F2"], &["01/03/24\t0.1"]);

    let series = normalize(&path, Some(&std_path)).unwrap();
    assert_eq!(series.len(), 6);
    assert!(series.has_uncertainty);
    let populated = series
        .records
        .iter()
        .filter(|r| r.value_uncertainty.is_some())
        .count();
    assert_eq!(populated, 2);
    assert!(series.records.iter().all(|r| r.category != "F3"));

    let series2 = normalize(&path, Some(&std2)).unwrap();
    let populated2: Vec<(String, &str)> = series2
        .records
        .iter()
        .filter(|r| r.value_uncertainty.is_some())
        .map(|r| (iso(r.date), r.category.as_str()))
        .collect();
    assert_eq!(populated2, vec![("2024-01-03".to_string(), "F2")]);
}

#[test]
fn missing_cells_become_zero() {
    let dir = TempDir::new().unwrap();
    let path = write_tsv(
        dir.path(),
        "p.tsv",
        &["DATE", "F1", "F2", "F3"],
        &["01/02/24\tNaN\t\tNA", "01/03/24\t1"],
    );
    let series = normalize(&path, None).unwrap();
    assert_eq!(series.len(), 6);
    assert!(series.records.iter().all(|r| r.value.is_finite()));
    assert_eq!(series.records.iter().filter(|r| r.value == 0.0).count(), 5);
}

#[test]
fn unparseable_dates_are_dropped_not_fatal() {
    let dir = TempDir::new().unwrap();
    let path = write_tsv(
        dir.path(),
        "p.tsv",
        &["DATE", "F1"],
        &["01/02/24\t5", "Total\t99", "\t4", "2024-01-05\t6"],
    );
    let series = normalize(&path, None).unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series.dropped_rows, 2);
}

#[test]
fn missing_primary_is_panel_error() {
    let dir = TempDir::new().unwrap();
    let err = normalize(&dir.path().join("absent.tsv"), None).unwrap_err();
    assert!(matches!(err, PanelDataError::NotFound { .. }));
    assert!(err.to_string().contains("cannot load panel"));
}

#[test]
fn bad_uncertainty_file_is_ignored() {
    let dir = TempDir::new().unwrap();
    let path = write_tsv(dir.path(), "p.tsv", &["DATE", "F1"], &["01/02/24\t5"]);
    let no_date = write_tsv(dir.path(), "s.tsv", &["WHEN", "F1"], &["01/02/24\t1"]);

    let series = normalize(&path, Some(&no_date)).unwrap();
    assert_eq!(series.len(), 1);
    assert!(!series.has_uncertainty);
    assert!(series.records[0].value_uncertainty.is_none());

    let series = normalize(&path, Some(&dir.path().join("absent.tsv"))).unwrap();
    assert!(!series.has_uncertainty);
}

#[test]
fn tidy_rows_serialise_with_iso_dates() {
    let dir = TempDir::new().unwrap();
    let path = write_tsv(dir.path(), "p.tsv", &["DATE", "F1"], &["3/7/24\t5"]);
    let series = normalize(&path, None).unwrap();
    let v = serde_json::to_value(&series.records[0]).unwrap();
    assert_eq!(v["date"], "2024-03-07");
    assert_eq!(v["category"], "F1");
    assert!(v["value_uncertainty"].is_null());
}
