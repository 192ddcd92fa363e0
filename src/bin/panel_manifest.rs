//! Write a `<file>.manifest.json` beside every data file in the layout.
//!
//! Run with: cargo run --bin panel_manifest [layout.json]

use serde_json::json;
use std::env;
use std::fs;
use std::path::PathBuf;

use wwtrends::config::{load_layout, AppConfig};
use wwtrends::data::manifest::{build_manifest, default_manifest_path};

fn main() {
    let layout_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| AppConfig::from_env().layout_path);

    let configs = match load_layout(&layout_path) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("layout load failed: {}", err);
            std::process::exit(1);
        }
    };

    let mut failures = 0;
    for (idx, config) in configs.iter().enumerate() {
        for path in config.data_files() {
            let manifest = match build_manifest(path) {
                Ok(m) => m,
                Err(err) => {
                    eprintln!("panel {} ({}): {}", idx, config.title, err);
                    failures += 1;
                    continue;
                }
            };
            let out_path = default_manifest_path(path);
            let payload = json!({
                "panel": idx,
                "pathogen": config.pathogen,
                "manifest": manifest,
            });
            let body = match serde_json::to_string_pretty(&payload) {
                Ok(b) => b,
                Err(err) => {
                    eprintln!("failed to encode manifest for {}: {}", path.display(), err);
                    failures += 1;
                    continue;
                }
            };
            if let Err(err) = fs::write(&out_path, body) {
                eprintln!("failed to write {}: {}", out_path.display(), err);
                failures += 1;
                continue;
            }
            println!(
                "wrote manifest {} ({} rows, {} dropped)",
                out_path.display(),
                manifest.row_count,
                manifest.dropped_rows
            );
        }
    }

    if failures > 0 {
        std::process::exit(2);
    }
}
