use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::ConfigLoadError;
use crate::logging::{log_layout_failed, log_layout_loaded};

pub const DEFAULT_LAYOUT_PATH: &str = "assets/data/layout.json";
pub const DEFAULT_TREND_WINDOWS: [u32; 2] = [4, 26];
pub const DEFAULT_TREND_ALPHA: f64 = 0.05;

/// Process settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub layout_path: PathBuf,
    pub bind_addr: String,
    pub port: u16,
    /// Trailing trend windows in weeks, in display order.
    pub trend_windows: Vec<u32>,
    pub trend_alpha: f64,
    pub display_tz: chrono_tz::Tz,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            layout_path: std::env::var("LAYOUT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_LAYOUT_PATH)),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8765),
            trend_windows: std::env::var("TREND_WINDOWS")
                .ok()
                .and_then(|v| parse_windows(&v))
                .unwrap_or_else(|| DEFAULT_TREND_WINDOWS.to_vec()),
            trend_alpha: std::env::var("TREND_ALPHA")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|a: &f64| *a > 0.0 && *a < 1.0)
                .unwrap_or(DEFAULT_TREND_ALPHA),
            display_tz: std::env::var("DISPLAY_TZ")
                .ok()
                .and_then(|v| v.parse::<chrono_tz::Tz>().ok())
                .unwrap_or(chrono_tz::America::Denver),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Longest accepted trend window: a century of weekly samples.
pub const MAX_TREND_WINDOW_WEEKS: u32 = 5200;

/// Parse a comma-separated list of week counts in `1..=MAX_TREND_WINDOW_WEEKS`.
/// `None` if any entry is bad.
pub fn parse_windows(raw: &str) -> Option<Vec<u32>> {
    let windows: Option<Vec<u32>> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .ok()
                .filter(|w| (1..=MAX_TREND_WINDOW_WEEKS).contains(w))
        })
        .collect();
    windows.filter(|w| !w.is_empty())
}

/// Precomputed trend metadata attached to a panel by an upstream analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub trend: String,
    #[serde(default)]
    pub p_value: Option<f64>,
    #[serde(default)]
    pub tau: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub figure: Option<PathBuf>,
}

/// One configured chart/data-source unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default)]
    pub pathogen: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "plot_data_tsv")]
    pub primary_file_path: PathBuf,
    #[serde(rename = "plot_std_tsv", default)]
    pub uncertainty_file_path: Option<PathBuf>,
    #[serde(rename = "plot_title", default)]
    pub plot_title: Option<String>,
    #[serde(rename = "plot_yaxis_title", default)]
    pub y_axis_label: String,
    #[serde(rename = "plot_xaxis_title", default)]
    pub x_axis_label: String,
    #[serde(rename = "plot_group_title", default)]
    pub category_group_label: Option<String>,
    #[serde(default)]
    pub analysis: Option<TrendAnalysis>,
}

impl PanelConfig {
    /// Title shown above the chart; falls back to the panel title.
    pub fn chart_title(&self) -> &str {
        self.plot_title.as_deref().unwrap_or(&self.title)
    }

    pub fn category_label(&self) -> &str {
        self.category_group_label.as_deref().unwrap_or("Fraction")
    }

    /// Every file this panel reads, primary first.
    pub fn data_files(&self) -> Vec<&Path> {
        let mut files = vec![self.primary_file_path.as_path()];
        if let Some(std_file) = &self.uncertainty_file_path {
            files.push(std_file.as_path());
        }
        files
    }
}

/// Load the panel layout. Entries that fail to deserialise make the whole
/// layout invalid, since indices must stay stable for the UI.
pub fn load_layout(path: &Path) -> Result<Vec<PanelConfig>, ConfigLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_layout(&raw, path)
}

pub fn parse_layout(raw: &str, path: &Path) -> Result<Vec<PanelConfig>, ConfigLoadError> {
    let value: Value = serde_json::from_str(raw).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if !value.is_array() {
        return Err(ConfigLoadError::NotAnArray {
            path: path.to_path_buf(),
        });
    }
    serde_json::from_value(value).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Startup variant: a missing or broken layout degrades to no panels.
pub fn load_layout_or_empty(path: &Path) -> Vec<PanelConfig> {
    match load_layout(path) {
        Ok(configs) => {
            log_layout_loaded(&path.display().to_string(), configs.len());
            configs
        }
        Err(err) => {
            log_layout_failed(&path.display().to_string(), &err.to_string());
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: &str = r#"[
        {
            "pathogen": "SARS-CoV-2",
            "title": "SARS-CoV-2 concentration",
            "description": "Live qPCR daily trend",
            "plot_data_tsv": "data/sars.tsv",
            "plot_std_tsv": "data/sars_std.tsv",
            "plot_yaxis_title": "copies/L",
            "plot_xaxis_title": "Date",
            "analysis": {"trend": "increasing", "p_value": 0.01, "tau": 0.4,
                         "description": "rising", "figure": "assets/mk.png"}
        },
        {
            "pathogen": "Influenza A",
            "title": "Influenza A",
            "description": "",
            "plot_data_tsv": "data/flu.tsv",
            "plot_yaxis_title": "copies/L",
            "plot_xaxis_title": "Date",
            "extra_field": 3
        }
    ]"#;

    #[test]
    fn parses_layout_fields() {
        let configs = parse_layout(LAYOUT, Path::new("layout.json")).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].primary_file_path, PathBuf::from("data/sars.tsv"));
        assert_eq!(
            configs[0].uncertainty_file_path,
            Some(PathBuf::from("data/sars_std.tsv"))
        );
        assert_eq!(configs[0].analysis.as_ref().unwrap().tau, Some(0.4));
        assert!(configs[1].uncertainty_file_path.is_none());
        assert!(configs[1].analysis.is_none());
        assert_eq!(configs[1].data_files().len(), 1);
        assert_eq!(configs[1].chart_title(), "Influenza A");
        assert_eq!(configs[1].category_label(), "Fraction");
    }

    #[test]
    fn rejects_non_array_layout() {
        let err = parse_layout(r#"{"pathogen": "x"}"#, Path::new("l.json")).unwrap_err();
        assert!(matches!(err, ConfigLoadError::NotAnArray { .. }));
    }

    #[test]
    fn missing_layout_degrades_to_empty() {
        let configs = load_layout_or_empty(Path::new("/nonexistent/layout.json"));
        assert!(configs.is_empty());
    }

    #[test]
    fn window_parsing() {
        assert_eq!(parse_windows("4, 26"), Some(vec![4, 26]));
        assert_eq!(parse_windows("52"), Some(vec![52]));
        assert_eq!(parse_windows("4,zero"), None);
        assert_eq!(parse_windows("0"), None);
        assert_eq!(parse_windows("5200"), Some(vec![5200]));
        assert_eq!(parse_windows("4,20000000"), None);
        assert_eq!(parse_windows(""), None);
    }
}
