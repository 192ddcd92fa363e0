//! Print the trend verdicts of every configured panel.
//!
//! Run with: cargo run --bin trend_report [layout.json] [--json]

use std::env;
use std::path::PathBuf;

use wwtrends::chart::sig3;
use wwtrends::config::{load_layout_or_empty, AppConfig};
use wwtrends::panel::{PanelPipeline, PanelStatus};

fn fmt_opt(v: Option<f64>) -> String {
    v.map(sig3).unwrap_or_else(|| "-".to_string())
}

fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env();
    let args: Vec<String> = env::args().skip(1).collect();
    let as_json = args.iter().any(|a| a == "--json");
    let layout_path = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.layout_path.clone());

    let configs = load_layout_or_empty(&layout_path);
    let pipeline = PanelPipeline::new(cfg.trend_windows.clone(), cfg.trend_alpha);
    let panels = pipeline.build(&configs);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&panels)?);
        return Ok(());
    }

    println!(
        "{:<4} {:<20} {:<10} {:<12} {:>10} {:>8} {:>5}",
        "idx", "pathogen", "window", "trend", "p", "tau", "n"
    );
    for entry in &panels.panels {
        match &entry.status {
            PanelStatus::Available(data) => {
                for r in &data.trend_by_window {
                    println!(
                        "{:<4} {:<20} {:<10} {:<12} {:>10} {:>8} {:>5}",
                        entry.index,
                        entry.config.pathogen,
                        r.window_label,
                        r.classification,
                        fmt_opt(r.p_value),
                        fmt_opt(r.tau),
                        r.n
                    );
                }
            }
            PanelStatus::Unavailable { reason } => {
                println!("{:<4} {:<20} unavailable: {}", entry.index, entry.config.pathogen, reason);
            }
        }
        if let Some(pre) = &entry.precomputed {
            println!(
                "{:<4} {:<20} {:<10} {:<12} {:>10} {:>8} {:>5}",
                entry.index,
                entry.config.pathogen,
                pre.window_label,
                pre.classification,
                fmt_opt(pre.p_value),
                fmt_opt(pre.tau),
                "-"
            );
        }
    }
    Ok(())
}
