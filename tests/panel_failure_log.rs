//! A skipped panel leaves an error record in the run's `events.jsonl`.
//!
//! Kept in its own test binary: the run context is fixed by the first log
//! call in the process, so `LOG_DIR` must be set before anything logs.

use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

use wwtrends::config::PanelConfig;
use wwtrends::panel::build_panels;

fn panel(title: &str, data: &std::path::Path) -> PanelConfig {
    serde_json::from_value(json!({
        "pathogen": "SARS-CoV-2",
        "title": title,
        "plot_data_tsv": data,
    }))
    .unwrap()
}

#[test]
fn unavailable_panel_is_logged_to_run_events() {
    let logs = TempDir::new().unwrap();
    std::env::set_var("LOG_DIR", logs.path());
    std::env::set_var("RUN_ID", "panel-failure");

    let data = TempDir::new().unwrap();
    let good = data.path().join("good.tsv");
    fs::write(&good, "DATE\tF1\n01/02/24\t5\n01/09/24\t6\n").unwrap();
    let configs = vec![
        panel("good", &good),
        panel("broken", &data.path().join("missing.tsv")),
    ];

    let set = build_panels(&configs);
    assert_eq!(set.available().count(), 1);

    let events = fs::read_to_string(logs.path().join("panel-failure").join("events.jsonl")).unwrap();
    let records: Vec<Value> = events
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let failure = records
        .iter()
        .find(|r| r["event"] == "panel_unavailable")
        .expect("panel_unavailable record");
    assert_eq!(failure["panel"], 1);
    assert_eq!(failure["lvl"], "ERROR");
    assert_eq!(failure["component"], "panel");
    assert_eq!(failure["data"]["title"], "broken");
    assert!(failure["path"].as_str().unwrap().ends_with("missing.tsv"));
    assert!(!records
        .iter()
        .any(|r| r["event"] == "panel_unavailable" && r["panel"] == 0));
}
