use std::time::Duration;

use chrono::{DateTime, Utc};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use crate::histogram::Histogram;
use crate::orchestrator::{BenchmarkReport, TrialResult};
use crate::types::{MedianSummary, ReportMode, SummaryStatistic};

const COLUMN_WIDTH: usize = 10;

/// Compact duration text, e.g. `1.5ms`.
pub fn format_duration(d: Duration) -> String {
    format!("{:?}", d)
}

fn format_opt<T>(value: Option<T>, f: impl Fn(T) -> String) -> String {
    value.map(f).unwrap_or_else(|| "-".to_string())
}

fn relative_change(prev: f64, cur: f64) -> Option<f64> {
    if prev == 0.0 {
        return None;
    }
    Some((cur - prev) / prev * 100.0)
}

/// Relative change from `prev` to `cur` in percent. `None` when either
/// side is missing or `prev` is zero.
pub fn percent_change(prev: Option<Duration>, cur: Option<Duration>) -> Option<f64> {
    relative_change(prev?.as_nanos() as f64, cur?.as_nanos() as f64)
}

/// Same as [`percent_change`] for row counts.
pub fn count_change(prev: Option<u64>, cur: Option<u64>) -> Option<f64> {
    relative_change(prev? as f64, cur? as f64)
}

/// Right-aligned signed percentage. Slower is red, faster is green.
pub fn format_percentage(change: Option<f64>) -> String {
    let Some(v) = change else {
        return format!("{:>width$}", "n/a", width = COLUMN_WIDTH);
    };

    let txt = format!("{:.2}%", v);
    if txt == "0.00%" || txt == "-0.00%" {
        return format!("{:>width$}", "0.00%", width = COLUMN_WIDTH);
    }
    if v > 0.0 {
        let padded = format!("{:>width$}", format!("+{}", txt), width = COLUMN_WIDTH);
        padded
            .if_supports_color(Stream::Stdout, |s| s.red())
            .to_string()
    } else {
        let padded = format!("{:>width$}", txt, width = COLUMN_WIDTH);
        padded
            .if_supports_color(Stream::Stdout, |s| s.green())
            .to_string()
    }
}

pub fn format_column_header() -> String {
    format!(
        "   {:>w$} {:>w$} {:>w$}\n",
        "(total)",
        "(cpu)",
        "(plan)",
        w = COLUMN_WIDTH
    )
}

/// `<label>: <elapsed> <cpu> <plan>    <scanned>/<returned>`
pub fn format_median_line(label: &str, m: &MedianSummary) -> String {
    format!(
        "{}: {:>w$} {:>w$} {:>w$}    {}/{}\n",
        label,
        format_duration(m.elapsed),
        format_opt(m.cpu_time, format_duration),
        format_opt(m.plan_time, format_duration),
        format_opt(m.rows_scanned, |v| v.to_string()),
        format_opt(m.rows_returned, |v| v.to_string()),
        w = COLUMN_WIDTH
    )
}

/// Percent changes of elapsed, cpu and plan time, then rows scanned.
pub fn format_delta_line(prev: &MedianSummary, cur: &MedianSummary) -> String {
    format!(
        "  {}  {}  {}  {}\n",
        format_percentage(percent_change(Some(prev.elapsed), Some(cur.elapsed))),
        format_percentage(percent_change(prev.cpu_time, cur.cpu_time)),
        format_percentage(percent_change(prev.plan_time, cur.plan_time)),
        format_percentage(count_change(prev.rows_scanned, cur.rows_scanned)),
    )
}

pub fn format_histogram(histogram: Option<&Histogram>) -> String {
    match histogram {
        Some(h) => format!("Latency histogram:\n{}", h),
        None => String::new(),
    }
}

/// Text report for one benchmark: bold name, then per result either a
/// median line (with a delta line against the previous optimizer) or a
/// histogram block.
pub fn format_benchmark(report: &BenchmarkReport, mode: ReportMode) -> String {
    let mut out = String::new();
    out.push_str(
        &report
            .name
            .if_supports_color(Stream::Stdout, |s| s.bold())
            .to_string(),
    );
    out.push('\n');

    if mode == ReportMode::Median {
        out.push_str(&format_column_header());
    }

    let mut prev: Option<&TrialResult> = None;
    for result in &report.results {
        match &result.summary {
            SummaryStatistic::Median(m) => {
                out.push_str(&format_median_line(&result.label(), m));
                if let Some(p) = prev
                    && p.worker.is_none()
                    && result.worker.is_none()
                    && let SummaryStatistic::Median(pm) = &p.summary
                {
                    out.push_str(&format_delta_line(pm, m));
                }
            }
            SummaryStatistic::Histogram(h) => {
                out.push_str(&format!(
                    "{}: {} samples, {} attempts\n",
                    result.label(),
                    result.samples,
                    result.attempts
                ));
                out.push_str(&format_histogram(h.as_ref()));
            }
        }
        prev = Some(result);
    }

    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    database: &'a str,
    started_at: String,
    report: &'static str,
    benchmarks: Vec<JsonBenchmark<'a>>,
}

#[derive(Serialize)]
struct JsonBenchmark<'a> {
    name: &'a str,
    trials: usize,
    mode: &'static str,
    results: Vec<JsonResult<'a>>,
}

#[derive(Serialize)]
struct JsonResult<'a> {
    optimizer: &'a str,
    worker: Option<usize>,
    samples: usize,
    attempts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    median: Option<JsonMedian>,
    /// Absent in median mode, `null` when too few samples for a histogram.
    #[serde(skip_serializing_if = "Option::is_none")]
    histogram: Option<Option<Vec<JsonBucket>>>,
}

#[derive(Serialize)]
struct JsonMedian {
    elapsed_ns: u128,
    elapsed_p95_ns: u128,
    cpu_time_ns: Option<u128>,
    plan_time_ns: Option<u128>,
    rows_scanned: Option<u64>,
    rows_returned: Option<u64>,
}

#[derive(Serialize)]
struct JsonBucket {
    mark_ns: u128,
    count: usize,
    frequency: f64,
}

fn json_result(result: &TrialResult) -> JsonResult<'_> {
    let (median, histogram) = match &result.summary {
        SummaryStatistic::Median(m) => (
            Some(JsonMedian {
                elapsed_ns: m.elapsed.as_nanos(),
                elapsed_p95_ns: m.elapsed_p95.as_nanos(),
                cpu_time_ns: m.cpu_time.map(|d| d.as_nanos()),
                plan_time_ns: m.plan_time.map(|d| d.as_nanos()),
                rows_scanned: m.rows_scanned,
                rows_returned: m.rows_returned,
            }),
            None,
        ),
        SummaryStatistic::Histogram(h) => (
            None,
            Some(h.as_ref().map(|h| {
                h.buckets()
                    .iter()
                    .map(|b| JsonBucket {
                        mark_ns: b.mark.as_nanos(),
                        count: b.count,
                        frequency: b.frequency,
                    })
                    .collect()
            })),
        ),
    };

    JsonResult {
        optimizer: &result.optimizer,
        worker: result.worker,
        samples: result.samples,
        attempts: result.attempts,
        median,
        histogram,
    }
}

/// JSON output format.
pub fn format_json(
    database: &str,
    mode: ReportMode,
    reports: &[BenchmarkReport],
    started_at: DateTime<Utc>,
) -> String {
    let json = JsonReport {
        database,
        started_at: started_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        report: match mode {
            ReportMode::Median => "median",
            ReportMode::Histogram => "histogram",
        },
        benchmarks: reports
            .iter()
            .map(|r| JsonBenchmark {
                name: &r.name,
                trials: r.trials,
                mode: r.mode.as_str(),
                results: r.results.iter().map(json_result).collect(),
            })
            .collect(),
    };

    serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionMode;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn summary(elapsed: u64, cpu: Option<u64>) -> MedianSummary {
        MedianSummary {
            elapsed: ms(elapsed),
            elapsed_p95: ms(elapsed * 2),
            cpu_time: cpu.map(ms),
            plan_time: None,
            rows_scanned: Some(100),
            rows_returned: Some(10),
            samples: 5,
        }
    }

    fn result(optimizer: &str, worker: Option<usize>, summary: SummaryStatistic) -> TrialResult {
        TrialResult {
            optimizer: optimizer.to_string(),
            worker,
            samples: 5,
            attempts: 6,
            summary,
        }
    }

    fn report(results: Vec<TrialResult>) -> BenchmarkReport {
        BenchmarkReport {
            name: "likes".to_string(),
            trials: 5,
            mode: TransactionMode::ReadOnly,
            results,
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-18T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    // --- percentages ---

    #[test]
    fn percent_change_basic() {
        assert_eq!(percent_change(Some(ms(100)), Some(ms(150))), Some(50.0));
        assert_eq!(percent_change(Some(ms(100)), Some(ms(75))), Some(-25.0));
    }

    #[test]
    fn percent_change_missing_or_zero() {
        assert_eq!(percent_change(None, Some(ms(1))), None);
        assert_eq!(percent_change(Some(ms(1)), None), None);
        assert_eq!(percent_change(Some(Duration::ZERO), Some(ms(1))), None);
    }

    #[test]
    fn percent_change_sub_millisecond() {
        let prev = Duration::from_micros(1_500);
        let cur = Duration::from_micros(3_000);
        assert_eq!(percent_change(Some(prev), Some(cur)), Some(100.0));
    }

    #[test]
    fn count_change_rows() {
        assert_eq!(count_change(Some(200), Some(50)), Some(-75.0));
        assert_eq!(count_change(Some(0), Some(50)), None);
        assert_eq!(count_change(None, Some(50)), None);
    }

    #[test]
    fn format_percentage_signs() {
        assert!(format_percentage(Some(12.345)).contains("+12.35%"));
        assert!(format_percentage(Some(-3.0)).contains("-3.00%"));
        assert_eq!(format_percentage(Some(0.0)).trim(), "0.00%");
        assert_eq!(format_percentage(Some(-0.001)).trim(), "0.00%");
        assert_eq!(format_percentage(None).trim(), "n/a");
    }

    #[test]
    fn format_percentage_is_padded() {
        assert_eq!(format_percentage(Some(0.0)).len(), COLUMN_WIDTH);
        assert_eq!(format_percentage(None), "       n/a");
    }

    // --- median lines ---

    #[test]
    fn median_line_fields() {
        let line = format_median_line("2", &summary(12, Some(3)));
        assert!(line.starts_with("2: "));
        assert!(line.contains("12ms"));
        assert!(line.contains("3ms"));
        assert!(line.trim_end().ends_with("100/10"));
    }

    #[test]
    fn median_line_unset_dimensions() {
        let mut m = summary(12, None);
        m.rows_scanned = None;
        m.rows_returned = None;
        let line = format_median_line("default", &m);
        assert!(line.trim_end().ends_with("-/-"));
        assert_eq!(line.matches('-').count(), 4);
    }

    #[test]
    fn delta_line_compares_dimensions() {
        let line = format_delta_line(&summary(100, Some(10)), &summary(50, None));
        assert!(line.contains("-50.00%"));
        assert_eq!(line.matches("n/a").count(), 2);
        assert!(line.trim_end().ends_with("0.00%"));
    }

    #[test]
    fn delta_line_reports_scanned_rows() {
        let prev = summary(100, None);
        let mut cur = summary(100, None);
        cur.rows_scanned = Some(25);
        let line = format_delta_line(&prev, &cur);
        assert!(line.contains("-75.00%"));
        assert_eq!(line.matches("n/a").count(), 2);
    }

    // --- benchmark blocks ---

    #[test]
    fn median_block_with_two_optimizers() {
        let r = report(vec![
            result("1", None, SummaryStatistic::Median(summary(100, Some(10)))),
            result("2", None, SummaryStatistic::Median(summary(110, Some(10)))),
        ]);
        let out = format_benchmark(&r, ReportMode::Median);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].contains("likes"));
        assert!(lines[1].contains("(total)"));
        assert!(lines[2].starts_with("1: "));
        assert!(lines[3].starts_with("2: "));
        assert!(lines[4].contains("+10.00%"));
        assert!(lines[4].contains("0.00%"));
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn worker_results_have_no_delta() {
        let r = report(vec![
            result("", Some(0), SummaryStatistic::Median(summary(100, None))),
            result("", Some(1), SummaryStatistic::Median(summary(200, None))),
        ]);
        let out = format_benchmark(&r, ReportMode::Median);
        assert!(out.contains("default [worker 0]: "));
        assert!(out.contains("default [worker 1]: "));
        assert!(!out.contains('%'));
    }

    #[test]
    fn histogram_block() {
        let h = Histogram::new(&[ms(10), ms(20), ms(30), ms(40), ms(50)]);
        let r = report(vec![result("", None, SummaryStatistic::Histogram(h))]);
        let out = format_benchmark(&r, ReportMode::Histogram);
        assert!(out.contains("default: 5 samples, 6 attempts"));
        assert!(out.contains("Latency histogram:"));
        assert!(out.contains("  50ms"));
        assert!(!out.contains("(total)"));
    }

    #[test]
    fn absent_histogram_prints_nothing() {
        assert_eq!(format_histogram(None), "");
        let r = report(vec![result("", None, SummaryStatistic::Histogram(None))]);
        let out = format_benchmark(&r, ReportMode::Histogram);
        assert!(!out.contains("Latency histogram:"));
    }

    // --- JSON ---

    #[test]
    fn json_output_valid() {
        let h = Histogram::new(&[ms(1), ms(2)]);
        let reports = vec![
            report(vec![result("1", None, SummaryStatistic::Median(summary(7, Some(2))))]),
            report(vec![result("", Some(0), SummaryStatistic::Histogram(h))]),
        ];
        let out = format_json("db", ReportMode::Median, &reports, fixed_now());
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(parsed["database"], "db");
        assert_eq!(parsed["started_at"], "2026-02-18T00:00:00Z");
        assert_eq!(parsed["report"], "median");

        let first = &parsed["benchmarks"][0]["results"][0];
        assert_eq!(parsed["benchmarks"][0]["mode"], "ro");
        assert_eq!(first["median"]["elapsed_ns"], 7_000_000);
        assert_eq!(first["median"]["cpu_time_ns"], 2_000_000);
        assert!(first["median"]["plan_time_ns"].is_null());
        assert!(first.get("histogram").is_none());

        let second = &parsed["benchmarks"][1]["results"][0];
        assert_eq!(second["worker"], 0);
        assert_eq!(second["histogram"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn json_absent_histogram_is_null() {
        let reports = vec![report(vec![result(
            "",
            None,
            SummaryStatistic::Histogram(None),
        )])];
        let out = format_json("db", ReportMode::Histogram, &reports, fixed_now());
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();

        let first = &parsed["benchmarks"][0]["results"][0];
        assert!(first.get("histogram").is_some());
        assert!(first["histogram"].is_null());
        assert!(first.get("median").is_none());
    }
}
