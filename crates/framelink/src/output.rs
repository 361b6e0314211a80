use std::io::{IsTerminal, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Outcome of a single `call` invocation.
#[derive(Debug, Serialize)]
pub struct CallReport {
    pub endpoint: String,
    pub one_way: bool,
    pub request_size: usize,
    pub response_size: Option<usize>,
    pub response: Option<String>,
    pub elapsed_us: u64,
    pub timestamp: String,
}

impl CallReport {
    pub fn new(
        endpoint: String,
        request_size: usize,
        response: Option<&[u8]>,
        elapsed: Duration,
    ) -> Self {
        Self {
            endpoint,
            one_way: response.is_none(),
            request_size,
            response_size: response.map(<[u8]>::len),
            response: response.map(payload_preview),
            elapsed_us: duration_us(elapsed),
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_call(report: &CallReport, raw_response: Option<&[u8]>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ENDPOINT", "KIND", "SENT", "RECEIVED", "ELAPSED", "RESPONSE"])
                .add_row(vec![
                    report.endpoint.clone(),
                    kind_label(report.one_way).to_string(),
                    report.request_size.to_string(),
                    optional(report.response_size),
                    format!("{}us", report.elapsed_us),
                    report.response.clone().unwrap_or_default(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "endpoint={} kind={} sent={} received={} elapsed={}us response={}",
                report.endpoint,
                kind_label(report.one_way),
                report.request_size,
                optional(report.response_size),
                report.elapsed_us,
                report.response.as_deref().unwrap_or("-")
            );
        }
        OutputFormat::Raw => {
            if let Some(bytes) = raw_response {
                print_raw(bytes);
            }
        }
    }
}

/// Aggregate results of a `bench` run.
#[derive(Debug, Serialize)]
pub struct BenchReport {
    pub endpoint: String,
    pub calls: usize,
    pub threads: usize,
    pub payload_size: usize,
    pub failed: usize,
    pub elapsed_ms: f64,
    pub calls_per_sec: f64,
    pub mib_per_sec: f64,
    pub mean_latency_us: u64,
    pub max_latency_us: u64,
}

impl BenchReport {
    pub fn new(
        endpoint: String,
        threads: usize,
        payload_size: usize,
        latencies: &[Duration],
        failed: usize,
        elapsed: Duration,
    ) -> Self {
        let calls = latencies.len() + failed;
        let secs = elapsed.as_secs_f64();
        let completed = latencies.len() as f64;
        let (calls_per_sec, mib_per_sec) = if secs > 0.0 {
            // Each completed call moves the payload in both directions.
            let bytes = completed * payload_size as f64 * 2.0;
            (completed / secs, bytes / secs / (1024.0 * 1024.0))
        } else {
            (0.0, 0.0)
        };
        let total: Duration = latencies.iter().sum();
        let mean = if latencies.is_empty() {
            Duration::ZERO
        } else {
            total / latencies.len() as u32
        };
        let max = latencies.iter().max().copied().unwrap_or_default();

        Self {
            endpoint,
            calls,
            threads,
            payload_size,
            failed,
            elapsed_ms: secs * 1000.0,
            calls_per_sec,
            mib_per_sec,
            mean_latency_us: duration_us(mean),
            max_latency_us: duration_us(max),
        }
    }
}

pub fn print_bench(report: &BenchReport, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METRIC", "VALUE"]);
            for (metric, value) in bench_rows(report) {
                table.add_row(vec![metric.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (metric, value) in bench_rows(report) {
                println!("{metric}: {value}");
            }
        }
    }
}

fn bench_rows(report: &BenchReport) -> Vec<(&'static str, String)> {
    vec![
        ("endpoint", report.endpoint.clone()),
        ("calls", report.calls.to_string()),
        ("threads", report.threads.to_string()),
        ("payload bytes", report.payload_size.to_string()),
        ("failed", report.failed.to_string()),
        ("elapsed", format!("{:.1} ms", report.elapsed_ms)),
        ("throughput", format!("{:.0} calls/s", report.calls_per_sec)),
        ("bandwidth", format!("{:.2} MiB/s", report.mib_per_sec)),
        ("mean latency", format!("{} us", report.mean_latency_us)),
        ("max latency", format!("{} us", report.max_latency_us)),
    ]
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn kind_label(one_way: bool) -> &'static str {
    if one_way {
        "one-way"
    } else {
        "two-way"
    }
}

fn optional(value: Option<usize>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_report_previews_text_and_binary() {
        let text = CallReport::new(
            "unix:///tmp/a.sock".into(),
            5,
            Some(&b"hello"[..]),
            Duration::from_micros(42),
        );
        assert!(!text.one_way);
        assert_eq!(text.response.as_deref(), Some("hello"));
        assert_eq!(text.elapsed_us, 42);

        let binary = CallReport::new(
            "tcp://127.0.0.1:9".into(),
            2,
            Some(&[0xFF, 0xFE][..]),
            Duration::ZERO,
        );
        assert_eq!(binary.response.as_deref(), Some("<binary 2 bytes>"));

        let one_way = CallReport::new("tcp://127.0.0.1:9".into(), 2, None, Duration::ZERO);
        assert!(one_way.one_way);
        assert_eq!(one_way.response_size, None);
    }

    #[test]
    fn bench_report_rates() {
        let latencies = vec![Duration::from_micros(100), Duration::from_micros(300)];
        let report = BenchReport::new(
            "tcp://x:1".into(),
            2,
            1024,
            &latencies,
            1,
            Duration::from_secs(1),
        );
        assert_eq!(report.calls, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.mean_latency_us, 200);
        assert_eq!(report.max_latency_us, 300);
        assert!((report.calls_per_sec - 2.0).abs() < f64::EPSILON);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["threads"], 2);
    }

    #[test]
    fn bench_report_handles_empty_run() {
        let report = BenchReport::new("tcp://x:1".into(), 1, 0, &[], 0, Duration::ZERO);
        assert_eq!(report.calls, 0);
        assert_eq!(report.calls_per_sec, 0.0);
        assert_eq!(report.mean_latency_us, 0);
    }
}
