//! In-process request metrics.
//!
//! [`RequestMetrics`] keeps running totals per path, method and status code
//! that can be served as JSON ([`RequestMetrics::summary`]) or as a small
//! HTML page ([`RequestMetrics::render_html`]). Every completed request is
//! also forwarded to the `metrics` facade so an installed exporter sees it.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `cyber_requests_total` | Counter | `method`, `status` |
//! | `cyber_request_duration_seconds` | Histogram | `method` |
//! | `cyber_in_flight_requests` | Gauge | - |

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Default, Clone, Copy)]
struct PathTiming {
    count: u64,
    total: Duration,
}

#[derive(Debug)]
struct Totals {
    total_requests: u64,
    error_count: u64,
    per_path: BTreeMap<String, u64>,
    per_method: BTreeMap<String, u64>,
    per_status: BTreeMap<u16, u64>,
    path_timing: BTreeMap<String, PathTiming>,
    max_latency: Duration,
    total_latency: Duration,
    completed: u64,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl Totals {
    fn new() -> Self {
        Self {
            total_requests: 0,
            error_count: 0,
            per_path: BTreeMap::new(),
            per_method: BTreeMap::new(),
            per_status: BTreeMap::new(),
            path_timing: BTreeMap::new(),
            max_latency: Duration::ZERO,
            total_latency: Duration::ZERO,
            completed: 0,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }
}

/// Shared request metrics collector.
#[derive(Debug)]
pub struct RequestMetrics {
    totals: RwLock<Totals>,
    active: AtomicI64,
}

/// A point-in-time view of [`RequestMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    /// Requests started.
    pub total_requests: u64,
    /// Requests currently in flight.
    pub active_requests: i64,
    /// Completed requests with status >= 400.
    pub error_count: u64,
    /// Mean latency over completed requests, in milliseconds.
    pub avg_response_ms: f64,
    /// Largest observed latency, in milliseconds.
    pub max_response_ms: f64,
    /// Requests per path.
    pub requests_per_path: BTreeMap<String, u64>,
    /// Requests per HTTP method.
    pub requests_per_method: BTreeMap<String, u64>,
    /// Completed requests per status code.
    pub status_codes: BTreeMap<u16, u64>,
    /// Mean latency per path, in milliseconds.
    pub path_avg_response_ms: BTreeMap<String, f64>,
    /// When collection started.
    pub started_at: DateTime<Utc>,
    /// Seconds since collection started.
    pub uptime_secs: u64,
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

impl RequestMetrics {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            totals: RwLock::new(Totals::new()),
            active: AtomicI64::new(0),
        }
    }

    /// The process-wide collector used by the default metrics middleware.
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<RequestMetrics>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Records the start of a request and returns a guard that records its
    /// completion.
    ///
    /// A guard dropped without [`InFlight::finish`] still releases the
    /// active count, so a panicking handler does not leave it inflated.
    #[must_use]
    pub fn start(self: &Arc<Self>, path: &str, method: &str) -> InFlight {
        {
            let mut totals = self.totals.write();
            totals.total_requests += 1;
            *totals.per_path.entry(path.to_string()).or_default() += 1;
            *totals.per_method.entry(method.to_string()).or_default() += 1;
        }
        self.active.fetch_add(1, Ordering::AcqRel);
        gauge!("cyber_in_flight_requests").increment(1.0);

        InFlight {
            metrics: Arc::clone(self),
            path: path.to_string(),
            method: method.to_string(),
            started: Instant::now(),
            done: false,
        }
    }

    fn complete(&self, path: &str, method: &str, status: u16, latency: Duration) {
        {
            let mut totals = self.totals.write();
            *totals.per_status.entry(status).or_default() += 1;
            if status >= 400 {
                totals.error_count += 1;
            }
            let timing = totals.path_timing.entry(path.to_string()).or_default();
            timing.count += 1;
            timing.total += latency;
            totals.completed += 1;
            totals.total_latency += latency;
            if latency > totals.max_latency {
                totals.max_latency = latency;
            }
        }

        counter!(
            "cyber_requests_total",
            "method" => method.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        histogram!("cyber_request_duration_seconds", "method" => method.to_string())
            .record(latency.as_secs_f64());
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        gauge!("cyber_in_flight_requests").decrement(1.0);
    }

    /// Requests currently in flight.
    #[must_use]
    pub fn active(&self) -> i64 {
        self.active.load(Ordering::Acquire)
    }

    /// Returns a snapshot of the collected metrics.
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        let totals = self.totals.read();

        let avg_response_ms = if totals.completed == 0 {
            0.0
        } else {
            millis(totals.total_latency) / totals.completed as f64
        };
        let path_avg_response_ms = totals
            .path_timing
            .iter()
            .filter(|(_, t)| t.count > 0)
            .map(|(path, t)| (path.clone(), millis(t.total) / t.count as f64))
            .collect();

        MetricsSummary {
            total_requests: totals.total_requests,
            active_requests: self.active(),
            error_count: totals.error_count,
            avg_response_ms,
            max_response_ms: millis(totals.max_latency),
            requests_per_path: totals.per_path.clone(),
            requests_per_method: totals.per_method.clone(),
            status_codes: totals.per_status.clone(),
            path_avg_response_ms,
            started_at: totals.started_at,
            uptime_secs: totals.started.elapsed().as_secs(),
        }
    }

    /// Clears every counter except the active count.
    pub fn reset(&self) {
        *self.totals.write() = Totals::new();
    }

    /// Renders the summary as a standalone HTML page.
    #[must_use]
    pub fn render_html(&self) -> String {
        let s = self.summary();
        let mut html = String::with_capacity(2048);

        html.push_str(
            "<!DOCTYPE html>\n<html>\n<head>\n<title>Cyber metrics</title>\n<style>\n\
             body { font-family: Arial, sans-serif; margin: 20px; }\n\
             table { border-collapse: collapse; width: 100%; margin-top: 12px; }\n\
             th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }\n\
             th { background-color: #f2f2f2; }\n\
             </style>\n</head>\n<body>\n<h1>Cyber metrics</h1>\n",
        );
        let _ = writeln!(
            html,
            "<p>Updated {}</p>",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );

        html.push_str("<h2>Overview</h2>\n<table>\n<tr><th>Metric</th><th>Value</th></tr>\n");
        let overview = [
            ("Total requests", s.total_requests.to_string()),
            ("Active requests", s.active_requests.to_string()),
            ("Errors", s.error_count.to_string()),
            ("Average latency", format_duration_ms(s.avg_response_ms)),
            ("Max latency", format_duration_ms(s.max_response_ms)),
            ("Uptime", format!("{}s", s.uptime_secs)),
        ];
        for (name, value) in overview {
            let _ = writeln!(html, "<tr><td>{name}</td><td>{value}</td></tr>");
        }
        html.push_str("</table>\n");

        push_table(
            &mut html,
            "By method",
            ("Method", "Requests"),
            s.requests_per_method.iter().map(|(k, v)| (k.clone(), v.to_string())),
        );
        push_table(
            &mut html,
            "By status",
            ("Status", "Requests"),
            s.status_codes.iter().map(|(k, v)| (k.to_string(), v.to_string())),
        );
        push_table(
            &mut html,
            "Average latency by path",
            ("Path", "Latency"),
            s.path_avg_response_ms
                .iter()
                .map(|(k, v)| (k.clone(), format_duration_ms(*v))),
        );

        html.push_str("</body>\n</html>\n");
        html
    }
}

impl Default for RequestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn push_table(
    html: &mut String,
    title: &str,
    headers: (&str, &str),
    rows: impl Iterator<Item = (String, String)>,
) {
    let _ = writeln!(html, "<h2>{title}</h2>\n<table>");
    let _ = writeln!(html, "<tr><th>{}</th><th>{}</th></tr>", headers.0, headers.1);
    for (key, value) in rows {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{value}</td></tr>",
            escape_html(&key)
        );
    }
    html.push_str("</table>\n");
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Formats milliseconds as `1.50 m`, `2.00 s` or `12.34 ms`.
#[must_use]
pub fn format_duration_ms(ms: f64) -> String {
    if ms >= 60_000.0 {
        format!("{:.2} m", ms / 60_000.0)
    } else if ms >= 1_000.0 {
        format!("{:.2} s", ms / 1_000.0)
    } else {
        format!("{ms:.2} ms")
    }
}

/// Guard for one in-flight request. See [`RequestMetrics::start`].
#[derive(Debug)]
pub struct InFlight {
    metrics: Arc<RequestMetrics>,
    path: String,
    method: String,
    started: Instant,
    done: bool,
}

impl InFlight {
    /// Records completion with `status`.
    pub fn finish(mut self, status: u16) {
        let latency = self.started.elapsed();
        self.metrics
            .complete(&self.path, &self.method, status, latency);
        self.done = true;
        self.metrics.release();
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.done {
            self.metrics.release();
        }
    }
}
