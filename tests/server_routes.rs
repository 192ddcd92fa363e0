//! Route-level checks against a layout written to a temp dir. No sockets.

use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use wwtrends::config::load_layout;
use wwtrends::server::Dashboard;

fn fixture(dir: &Path) -> Dashboard {
    fs::write(
        dir.join("sars.tsv"),
        "DATE\tF1\tF2\n01/02/24\t5\t3\n01/09/24\t7\t\n01/16/24\t9\t4\n",
    )
    .unwrap();
    fs::write(dir.join("sars_std.tsv"), "DATE\tF1\tF2\n01/02/24\t0.5\t0.3\n").unwrap();
    fs::write(dir.join("rsv.tsv"), "DATE\tF3\n01/02/24\t1\n01/09/24\t2\n").unwrap();
    fs::write(dir.join("mk.png"), [0x89, b'P', b'N', b'G']).unwrap();

    let layout = json!([
        {
            "pathogen": "SARS-CoV-2",
            "title": "SARS-CoV-2",
            "description": "Live qPCR daily trend",
            "plot_data_tsv": dir.join("sars.tsv"),
            "plot_std_tsv": dir.join("sars_std.tsv"),
            "plot_yaxis_title": "copies/L",
            "plot_xaxis_title": "Date",
            "analysis": {
                "trend": "increasing",
                "p_value": 0.01,
                "tau": 0.6,
                "description": "Rising over six months",
                "figure": dir.join("mk.png")
            }
        },
        {
            "pathogen": "Influenza A",
            "title": "Influenza A",
            "description": "",
            "plot_data_tsv": dir.join("flu.tsv"),
            "plot_yaxis_title": "copies/L",
            "plot_xaxis_title": "Date"
        },
        {
            "pathogen": "RSV",
            "title": "RSV",
            "description": "",
            "plot_data_tsv": dir.join("rsv.tsv"),
            "plot_yaxis_title": "copies/L",
            "plot_xaxis_title": "Date"
        }
    ]);
    let layout_path = dir.join("layout.json");
    fs::write(&layout_path, layout.to_string()).unwrap();
    let configs = load_layout(&layout_path).unwrap();
    Dashboard::new(configs, vec![4, 26], 0.05, chrono_tz::America::Denver)
}

#[test]
fn panel_list_skips_unavailable() {
    let dir = TempDir::new().unwrap();
    let d = fixture(dir.path());
    let body = d.handle("GET", "/api/panels").body_json().unwrap();
    let indices: Vec<u64> = body["panels"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["index"].as_u64().unwrap())
        .collect();
    assert_eq!(indices, vec![0, 2]);
    assert_eq!(body["unavailable"][0]["index"], 1);
    assert_eq!(body["panels"][0]["card"]["badges"][2]["text"], "analysis: Increasing");
}

#[test]
fn pathogen_query_filters_panels() {
    let dir = TempDir::new().unwrap();
    let d = fixture(dir.path());
    let body = d.handle("GET", "/api/panels?pathogen=RSV").body_json().unwrap();
    assert_eq!(body["panels"].as_array().unwrap().len(), 1);
    assert_eq!(body["panels"][0]["pathogen"], "RSV");

    let options = d.handle("GET", "/api/pathogens").body_json().unwrap();
    assert_eq!(options, json!(["all pathogens", "SARS-CoV-2", "RSV"]));
}

#[test]
fn panel_detail_has_series_and_trends() {
    let dir = TempDir::new().unwrap();
    let d = fixture(dir.path());
    let resp = d.handle("GET", "/api/panels/0");
    assert_eq!(resp.status, 200);
    let body = resp.body_json().unwrap();
    assert_eq!(body["status"]["status"], "available");
    let records = body["status"]["series"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 6);
    assert_eq!(records[0]["date"], "2024-01-02");
    assert_eq!(records[0]["value_uncertainty"], 0.5);
    assert!(records[2]["value_uncertainty"].is_null());
    assert_eq!(
        body["status"]["trend_by_window"].as_array().unwrap().len(),
        2
    );

    let missing = d.handle("GET", "/api/panels/1");
    assert_eq!(missing.status, 404);
    assert_eq!(missing.body_json().unwrap()["available"], false);
    assert_eq!(d.handle("GET", "/api/panels/9").status, 404);
}

#[test]
fn chart_endpoint_honours_fraction_selection() {
    let dir = TempDir::new().unwrap();
    let d = fixture(dir.path());
    let body = d
        .handle("GET", "/api/panels/0/chart?fractions=F2")
        .body_json()
        .unwrap();
    let traces = body["traces"].as_array().unwrap();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0]["name"], "F2");
    assert_eq!(traces[0]["y"], json!([3.0, 0.0, 4.0]));
    assert_eq!(traces[0]["error_y"], json!([0.3, 0.0, 0.0]));
    assert_eq!(body["layout"]["title"], "SARS-CoV-2");

    let all = d.handle("GET", "/api/panels/0/chart").body_json().unwrap();
    assert_eq!(all["traces"].as_array().unwrap().len(), 2);
}

#[test]
fn analysis_and_figure() {
    let dir = TempDir::new().unwrap();
    let d = fixture(dir.path());
    let body = d.handle("GET", "/api/panels/0/analysis").body_json().unwrap();
    assert_eq!(body["description"], "Rising over six months");
    assert_eq!(body["trend"]["classification"], "increasing");
    assert_eq!(body["figure_url"], "/api/panels/0/figure");

    let fig = d.handle("GET", "/api/panels/0/figure");
    assert_eq!(fig.status, 200);
    assert_eq!(fig.content_type, "image/png");
    assert_eq!(fig.body.len(), 4);

    assert_eq!(d.handle("GET", "/api/panels/2/analysis").status, 404);
    assert_eq!(d.handle("GET", "/api/panels/2/figure").status, 404);
}

#[test]
fn last_updated_reflects_files() {
    let dir = TempDir::new().unwrap();
    let d = fixture(dir.path());
    let body = d.handle("GET", "/api/updated").body_json().unwrap();
    assert!(body["last_updated"]
        .as_str()
        .unwrap()
        .starts_with("Last updated: "));
}
