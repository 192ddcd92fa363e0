//! Dashboard JSON server.
//!
//! One thread, one connection at a time: each request is read, answered and
//! closed before the next is accepted. All panel routes go through the same
//! handler keyed by layout index.
//!
//! Endpoints:
//!   GET /api/health                    - liveness probe
//!   GET /api/pathogens                 - pathogen filter options
//!   GET /api/panels?pathogen=P         - summaries + trend cards
//!   GET /api/panels/{i}                - tidy series and trends
//!   GET /api/panels/{i}/chart?fractions=F1,F2
//!   GET /api/panels/{i}/analysis       - precomputed analysis detail
//!   GET /api/panels/{i}/figure         - analysis figure bytes
//!   GET /api/updated                   - last data update stamp

use serde_json::{json, Value};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::time::{Duration, Instant};
use url::Url;

use crate::chart::{build_chart, trend_card};
use crate::config::{AppConfig, PanelConfig};
use crate::data::manifest::{format_last_updated, latest_modification};
use crate::logging::{log, log_request, obj, v_str, Domain, Level};
use crate::panel::{PanelEntry, PanelPipeline, PanelStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    pub fn json(status: u16, value: &Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, &json!({ "error": message }))
    }

    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

fn figure_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Layout plus pipeline; request-scoped results, tables cached by mtime.
#[derive(Debug)]
pub struct Dashboard {
    configs: Vec<PanelConfig>,
    pipeline: PanelPipeline,
    alpha: f64,
    tz: chrono_tz::Tz,
}

impl Dashboard {
    pub fn new(configs: Vec<PanelConfig>, windows: Vec<u32>, alpha: f64, tz: chrono_tz::Tz) -> Self {
        Self {
            configs,
            pipeline: PanelPipeline::new(windows, alpha),
            alpha,
            tz,
        }
    }

    pub fn from_config(cfg: &AppConfig, configs: Vec<PanelConfig>) -> Self {
        Self::new(configs, cfg.trend_windows.clone(), cfg.trend_alpha, cfg.display_tz)
    }

    pub fn configs(&self) -> &[PanelConfig] {
        &self.configs
    }

    pub fn pipeline(&self) -> &PanelPipeline {
        &self.pipeline
    }

    pub fn last_updated(&self) -> String {
        let files = self.configs.iter().flat_map(|c| c.data_files());
        format_last_updated(latest_modification(files), self.tz)
    }

    pub fn handle(&self, method: &str, target: &str) -> Response {
        if method != "GET" {
            return Response::error(405, "only GET is supported");
        }
        let url = match Url::parse("http://localhost").and_then(|base| base.join(target)) {
            Ok(u) => u,
            Err(err) => return Response::error(400, &format!("bad request target: {}", err)),
        };
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        let query = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };

        match segments.as_slice() {
            ["api", "health"] => Response::json(200, &json!({ "status": "ok" })),
            ["api", "pathogens"] => {
                let panels = self.pipeline.build(&self.configs);
                Response::json(200, &json!(panels.pathogen_options()))
            }
            ["api", "updated"] => Response::json(200, &json!({ "last_updated": self.last_updated() })),
            ["api", "panels"] => self.list_panels(query("pathogen").as_deref()),
            ["api", "panels", idx, rest @ ..] => {
                let Ok(index) = idx.parse::<usize>() else {
                    return Response::error(400, &format!("bad panel index {:?}", idx));
                };
                let Some(config) = self.configs.get(index) else {
                    return Response::error(404, &format!("no panel {}", index));
                };
                match rest {
                    [] => self.panel_detail(index, config),
                    ["chart"] => self.panel_chart(index, config, query("fractions").as_deref()),
                    ["analysis"] => self.panel_analysis(index, config),
                    ["figure"] => self.panel_figure(config),
                    _ => Response::error(404, "not found"),
                }
            }
            _ => Response::error(404, "not found"),
        }
    }

    fn list_panels(&self, pathogen: Option<&str>) -> Response {
        let panels = self.pipeline.build(&self.configs);
        let windows = self.pipeline.windows();
        let items: Vec<Value> = panels
            .visible(pathogen)
            .map(|entry| summary_json(entry, trend_card(entry, windows, self.alpha)))
            .collect();
        let unavailable: Vec<Value> = panels
            .unavailable()
            .map(|e| json!({ "index": e.index, "title": e.config.title, "card": trend_card(e, windows, self.alpha) }))
            .collect();
        Response::json(
            200,
            &json!({
                "pathogen": pathogen.unwrap_or(crate::panel::ALL_PATHOGENS),
                "panels": items,
                "unavailable": unavailable,
            }),
        )
    }

    fn panel_detail(&self, index: usize, config: &PanelConfig) -> Response {
        let entry = self.pipeline.build_one(index, config);
        match &entry.status {
            PanelStatus::Available(_) => Response::json(200, &json!(entry)),
            PanelStatus::Unavailable { reason } => unavailable(index, reason),
        }
    }

    fn panel_chart(&self, index: usize, config: &PanelConfig, fractions: Option<&str>) -> Response {
        let selected: Vec<String> = fractions
            .map(|f| {
                f.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        match self
            .pipeline
            .cache()
            .get_or_load(&config.primary_file_path, config.uncertainty_file_path.as_deref())
        {
            Ok(series) => Response::json(200, &json!(build_chart(index, config, &series, &selected))),
            Err(err) => unavailable(index, &err.to_string()),
        }
    }

    fn panel_analysis(&self, index: usize, config: &PanelConfig) -> Response {
        let Some(analysis) = &config.analysis else {
            return Response::error(404, &format!("panel {} has no analysis", index));
        };
        let figure_url = analysis
            .figure
            .as_ref()
            .map(|_| format!("/api/panels/{}/figure", index));
        Response::json(
            200,
            &json!({
                "index": index,
                "pathogen": config.pathogen,
                "title": config.title,
                "description": analysis.description,
                "trend": crate::panel::precomputed_trend(analysis),
                "figure_url": figure_url,
            }),
        )
    }

    fn panel_figure(&self, config: &PanelConfig) -> Response {
        let Some(path) = config.analysis.as_ref().and_then(|a| a.figure.as_ref()) else {
            return Response::error(404, "no figure configured");
        };
        match std::fs::read(path) {
            Ok(body) => Response {
                status: 200,
                content_type: figure_content_type(path),
                body,
            },
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Server,
                    "figure_unreadable",
                    obj(&[
                        ("path", v_str(&path.display().to_string())),
                        ("reason", v_str(&err.to_string())),
                    ]),
                );
                Response::error(404, "figure not available")
            }
        }
    }
}

fn unavailable(index: usize, reason: &str) -> Response {
    Response::json(404, &json!({ "error": reason, "index": index, "available": false }))
}

fn summary_json(entry: &PanelEntry, card: crate::chart::TrendCard) -> Value {
    let trends = entry.data().map(|d| &d.trend_by_window);
    json!({
        "index": entry.index,
        "pathogen": entry.config.pathogen,
        "title": entry.config.title,
        "description": entry.config.description,
        "available": entry.is_available(),
        "categories": entry.data().map(|d| &d.series.categories),
        "trends": trends,
        "precomputed": entry.precomputed,
        "card": card,
    })
}

/// Parse `METHOD TARGET VERSION`.
pub fn parse_request_line(line: &str) -> Option<(&str, &str)> {
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    Some((method, target))
}

/// Idle clients are dropped after this long so the accept loop keeps moving.
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_HEAD_BYTES: u64 = 16 * 1024;

/// Read the request line and drain the headers. `None` when the head does
/// not fit in `MAX_HEAD_BYTES`.
fn read_request_head<R: BufRead>(reader: R) -> io::Result<Option<String>> {
    let mut limited = reader.take(MAX_HEAD_BYTES);
    let mut request_line = String::new();
    limited.read_line(&mut request_line)?;

    // Bodies are never needed.
    let mut header = String::new();
    loop {
        if limited.limit() == 0 {
            return Ok(None);
        }
        header.clear();
        if limited.read_line(&mut header)? == 0 || header.trim().is_empty() {
            break;
        }
    }
    Ok(Some(request_line))
}

fn handle_connection(dashboard: &Dashboard, stream: TcpStream) -> io::Result<()> {
    let started = Instant::now();
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    stream.set_write_timeout(Some(READ_TIMEOUT))?;

    let request = read_request_head(BufReader::new(&stream))?;
    let (method, target, response) = match request.as_deref().map(parse_request_line) {
        None => ("-", "-", Response::error(431, "request head too large")),
        Some(Some((method, target))) => (method, target, dashboard.handle(method, target)),
        Some(None) => ("-", "-", Response::error(400, "malformed request line")),
    };

    let head = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n",
        response.status,
        status_text(response.status),
        response.content_type,
        response.body.len()
    );
    let mut out = &stream;
    out.write_all(head.as_bytes())?;
    out.write_all(&response.body)?;
    out.flush()?;

    log_request(
        method,
        target,
        response.status,
        started.elapsed().as_secs_f64() * 1000.0,
    );
    Ok(())
}

/// Accept loop. Only a bind failure returns; per-connection errors are
/// logged and the loop continues.
pub fn serve(addr: &str, dashboard: &Dashboard) -> io::Result<()> {
    let listener = TcpListener::bind(addr)?;
    log(
        Level::Info,
        Domain::Server,
        "listening",
        obj(&[
            ("addr", v_str(addr)),
            ("panels", json!(dashboard.configs().len())),
        ]),
    );

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Server,
                    "accept_failed",
                    obj(&[("reason", v_str(&err.to_string()))]),
                );
                continue;
            }
        };
        if let Err(err) = handle_connection(dashboard, stream) {
            log(
                Level::Warn,
                Domain::Server,
                "connection_failed",
                obj(&[("reason", v_str(&err.to_string()))]),
            );
        }
    }
    Ok(())
}
