use anyhow::{Context, Result};
use serde_json::json;

use wwtrends::config::{load_layout_or_empty, AppConfig};
use wwtrends::logging::{log, obj, v_str, Domain, Level};
use wwtrends::server::{serve, Dashboard};

fn main() -> Result<()> {
    let cfg = AppConfig::from_env();
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("layout", v_str(&cfg.layout_path.display().to_string())),
            ("addr", v_str(&cfg.listen_addr())),
            ("windows", json!(cfg.trend_windows)),
            ("alpha", json!(cfg.trend_alpha)),
            ("tz", v_str(cfg.display_tz.name())),
        ]),
    );

    let configs = load_layout_or_empty(&cfg.layout_path);
    let dashboard = Dashboard::from_config(&cfg, configs);

    // Warm the table cache so the first page load is not the slow one.
    let panels = dashboard.pipeline().build(dashboard.configs());
    for entry in panels.unavailable() {
        log(
            Level::Warn,
            Domain::System,
            "panel_skipped",
            obj(&[("panel", json!(entry.index)), ("title", v_str(&entry.config.title))]),
        );
    }

    serve(&cfg.listen_addr(), &dashboard)
        .with_context(|| format!("cannot listen on {}", cfg.listen_addr()))?;
    Ok(())
}
