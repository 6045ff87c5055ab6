//! Human-readable run reports

use colored::Colorize;
use loadgen_engine::RunReport;
use loadgen_metrics::{MetricSummary, RunSummary, ThresholdReport, ThresholdResult, ThresholdStatus};

const NAME_WIDTH: usize = 28;

/// One-line progress snapshot for the live reporter
pub fn live_snapshot(summary: &RunSummary) -> String {
    let mut parts = vec![format!("elapsed={:.1}s", summary.elapsed.as_secs_f64())];

    if let Some(iterations) = summary.counter("iterations") {
        parts.push(format!("iterations={}", iterations.count));
    }
    if let Some(errors) = summary.rate("iteration_errors") {
        parts.push(format!("iteration_errors={:.2}%", errors.rate * 100.0));
    }
    if let Some(reqs) = summary.counter("http_reqs") {
        parts.push(format!("http_reqs={} ({:.1}/s)", reqs.count, reqs.rate));
    }
    if let Some(duration) = summary.trend("http_req_duration").filter(|d| d.count > 0) {
        parts.push(format!("http_req_duration.p95={}", format_value(duration.p95, true)));
    }
    if let Some(dropped) = summary.counter("dropped_iterations").filter(|d| d.count > 0) {
        parts.push(format!("dropped={}", dropped.count));
    }

    parts.join(" ")
}

/// Final end-of-run report
pub fn render_final(run: &RunReport, summary: &RunSummary, thresholds: &ThresholdReport) -> String {
    let mut lines = vec![
        String::new(),
        format!(
            "  {} duration={:.1}s started={} dropped={} interrupted={}{}",
            "run".bold(),
            run.elapsed.as_secs_f64(),
            run.started,
            run.dropped,
            run.interrupted,
            if run.stopped_early { " (stopped early)" } else { "" },
        ),
        String::new(),
    ];

    for (name, metric) in &summary.metrics {
        let mark = threshold_mark(name, thresholds);
        lines.push(format!("  {} {} {}", mark, pad_name(name), describe(metric)));

        for result in thresholds.results.iter().filter(|r| &r.metric == name) {
            lines.push(format!("      {}", describe_threshold(result)));
        }
    }

    // Thresholds on metrics that were never registered
    for result in thresholds
        .results
        .iter()
        .filter(|r| !summary.metrics.contains_key(&r.metric))
    {
        lines.push(format!("    {}", pad_name(&result.metric)));
        lines.push(format!("      {}", describe_threshold(result)));
    }

    lines.push(String::new());
    if thresholds.results.is_empty() {
        lines.push("  no thresholds configured".to_string());
    } else if thresholds.passed() {
        lines.push(format!("  {}", "all thresholds passed".green().bold()));
    } else {
        let failed = thresholds.failures().count();
        lines.push(format!(
            "  {}",
            format!("{} of {} thresholds failed", failed, thresholds.results.len())
                .red()
                .bold()
        ));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn pad_name(name: &str) -> String {
    let dots = NAME_WIDTH.saturating_sub(name.len());
    format!("{}{}:", name, ".".repeat(dots).dimmed())
}

fn threshold_mark(name: &str, thresholds: &ThresholdReport) -> String {
    let mut relevant = thresholds.results.iter().filter(|r| r.metric == name).peekable();
    if relevant.peek().is_none() {
        return " ".to_string();
    }
    if relevant.any(|r| r.status.is_failure()) {
        "✗".red().to_string()
    } else {
        "✓".green().to_string()
    }
}

fn describe(metric: &MetricSummary) -> String {
    match metric {
        MetricSummary::Trend(trend) if trend.count == 0 => "no samples".dimmed().to_string(),
        MetricSummary::Trend(trend) => {
            let v = |value: f64| format_value(value, trend.is_time);
            let mut line = format!(
                "avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={} count={}",
                v(trend.avg),
                v(trend.min),
                v(trend.med),
                v(trend.max),
                v(trend.p90),
                v(trend.p95),
                v(trend.p99),
                trend.count
            );
            if trend.dropped_samples > 0 {
                line.push_str(&format!(" unretained={}", trend.dropped_samples));
            }
            line
        }
        MetricSummary::Rate(rate) => format!(
            "{:.2}% {} {} {} {}",
            rate.rate * 100.0,
            "✓".green(),
            rate.passes,
            "✗".red(),
            rate.fails
        ),
        MetricSummary::Counter(counter) => format!("{} {:.2}/s", counter.count, counter.rate),
    }
}

fn describe_threshold(result: &ThresholdResult) -> String {
    let observed = result
        .observed
        .map(|value| format!("{:.2}", value))
        .unwrap_or_else(|| "-".to_string());

    match result.status {
        ThresholdStatus::Passed => format!("{} {} (observed {})", "✓".green(), result.expression, observed),
        ThresholdStatus::Failed => format!(
            "{} {} (observed {})",
            "✗".red(),
            result.expression.red(),
            observed
        ),
        ThresholdStatus::NoData => format!("{} {} (no data)", "-".dimmed(), result.expression),
        ThresholdStatus::NotApplicable => format!(
            "{} {} (statistic not available for this metric)",
            "✗".red(),
            result.expression.red()
        ),
    }
}

/// Milliseconds for time trends, switching to seconds past one second
fn format_value(value: f64, is_time: bool) -> String {
    if !is_time {
        format!("{:.2}", value)
    } else if value >= 1000.0 {
        format!("{:.2}s", value / 1000.0)
    } else {
        format!("{:.2}ms", value)
    }
}
