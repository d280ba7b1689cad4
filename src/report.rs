//! Plain-text reports
//!
//! Latencies are shown in milliseconds. Unavailable statistics print as `-`.

use crate::compare::{ComparisonResult, Metric, Winner};
use crate::metrics::LatencyStats;
use crate::results::BenchmarkResult;
use std::io::{self, Write};

const LABEL_WIDTH: usize = 41;

fn ms(secs: f64) -> String {
    format!("{:.1}", secs * 1000.0)
}

fn opt(value: Option<f64>, fmt: impl Fn(f64) -> String) -> String {
    value.map(fmt).unwrap_or_else(|| "-".to_string())
}

fn line<W: Write>(w: &mut W, label: &str, value: impl std::fmt::Display) -> io::Result<()> {
    writeln!(w, "{:<width$}{}", format!("{}:", label), value, width = LABEL_WIDTH)
}

fn write_latency_block<W: Write>(
    w: &mut W,
    title: &str,
    stats: Option<&LatencyStats>,
) -> io::Result<()> {
    writeln!(w, "{:-^50}", title)?;
    match stats {
        Some(s) => {
            line(w, "Mean (ms)", ms(s.mean))?;
            line(w, "P50 (ms)", ms(s.p50))?;
            line(w, "P95 (ms)", ms(s.p95))?;
            line(w, "P99 (ms)", ms(s.p99))?;
            line(w, "Min (ms)", ms(s.min))?;
            line(w, "Max (ms)", ms(s.max))?;
        }
        None => writeln!(w, "unavailable")?,
    }
    Ok(())
}

pub fn write_result<W: Write>(w: &mut W, result: &BenchmarkResult) -> io::Result<()> {
    let stats = &result.stats;
    writeln!(w, "{:=^50}", format!(" {} ", result.model))?;
    line(w, "Suite", &result.suite)?;
    line(w, "Run at", result.timestamp.format("%Y-%m-%d %H:%M:%S UTC"))?;
    line(w, "Successful requests", stats.successful)?;
    line(w, "Failed requests", stats.failed)?;
    line(w, "Success rate", format!("{:.1}%", stats.success_rate()))?;
    line(w, "Total input tokens", stats.total_input_tokens)?;
    line(w, "Total output tokens", stats.total_output_tokens)?;
    line(w, "Mean tokens/s", opt(stats.mean_tps, |v| format!("{:.1}", v)))?;
    line(w, "Median tokens/s", opt(stats.median_tps, |v| format!("{:.1}", v)))?;
    line(w, "Estimated cost (USD)", opt(stats.total_cost, |v| format!("{:.6}", v)))?;
    line(w, "Cost per request (USD)", opt(stats.cost_per_request, |v| format!("{:.6}", v)))?;
    line(
        w,
        "Mean quality",
        match stats.mean_quality {
            Some(q) => format!("{:.3} ({} scored)", q, stats.quality_samples),
            None => "-".to_string(),
        },
    )?;

    if stats.ttft.is_some() {
        write_latency_block(w, "Time to First Token", stats.ttft.as_ref())?;
    }
    write_latency_block(w, "Total Latency", stats.latency.as_ref())?;

    writeln!(w, "{:-^50}", "Per Prompt")?;
    for sample in &result.samples {
        let mut prompt: String = sample.prompt.chars().take(40).collect();
        if sample.prompt.chars().count() > 40 {
            prompt.push_str("...");
        }
        if sample.success() {
            writeln!(
                w,
                "#{:<3} {:<10} {:>9} ms  ttft {:>9}  {:>6} tok  q {}  {}",
                sample.index,
                sample.category.to_string(),
                ms(sample.latency_secs),
                opt(sample.ttft_secs, ms),
                sample.output_tokens,
                opt(sample.quality, |q| format!("{:.2}", q)),
                prompt
            )?;
        } else {
            let reason = sample
                .error
                .as_ref()
                .map(|e| e.message.as_str())
                .unwrap_or("unknown error");
            writeln!(
                w,
                "#{:<3} {:<10} FAILED: {}  {}",
                sample.index,
                sample.category.to_string(),
                reason,
                prompt
            )?;
        }
    }
    writeln!(w, "{}", "=".repeat(50))?;
    Ok(())
}

fn format_metric(metric: Metric, value: Option<f64>) -> String {
    match metric {
        Metric::TtftP50 | Metric::TtftP95 | Metric::LatencyP50 => opt(value, |v| format!("{} ms", ms(v))),
        Metric::MeanTps => opt(value, |v| format!("{:.1}", v)),
        Metric::Cost => opt(value, |v| format!("${:.4}", v)),
        Metric::Quality => opt(value, |v| format!("{:.3}", v)),
    }
}

pub fn write_comparison<W: Write>(w: &mut W, comparison: &ComparisonResult) -> io::Result<()> {
    let name_a = &comparison.model_a.model;
    let name_b = &comparison.model_b.model;
    let col_width = name_a.len().max(name_b.len()).max(12);
    let metric_width = 20;
    let separator = "=".repeat(metric_width + 2 * (col_width + 3) + 12);

    writeln!(w, "{}", separator)?;
    writeln!(
        w,
        "Comparison: {} vs {} (suite: {})",
        name_a, name_b, comparison.model_a.suite
    )?;
    writeln!(w, "{}", separator)?;

    writeln!(
        w,
        "{:<mw$} | {:<cw$} | {:<cw$} | Winner",
        "Metric",
        name_a,
        name_b,
        mw = metric_width,
        cw = col_width
    )?;
    writeln!(w, "{}", "-".repeat(separator.len()))?;

    for row in &comparison.metrics {
        let winner = comparison.model_name(row.winner).unwrap_or("tie");
        writeln!(
            w,
            "{:<mw$} | {:<cw$} | {:<cw$} | {}",
            row.metric.label(),
            format_metric(row.metric, row.model_a),
            format_metric(row.metric, row.model_b),
            winner,
            mw = metric_width,
            cw = col_width
        )?;
    }

    writeln!(
        w,
        "{:<mw$} | {:<cw$} | {:<cw$} | -",
        "Failed requests",
        comparison.model_a.stats.failed,
        comparison.model_b.stats.failed,
        mw = metric_width,
        cw = col_width
    )?;

    let (wins_a, wins_b) = comparison.wins();
    writeln!(w)?;
    match comparison.overall {
        Winner::ModelA => writeln!(w, "Winner: {} ({} vs {} metrics)", name_a, wins_a, wins_b)?,
        Winner::ModelB => writeln!(w, "Winner: {} ({} vs {} metrics)", name_b, wins_b, wins_a)?,
        Winner::Tie => writeln!(w, "No overall winner ({} - {})", wins_a, wins_b)?,
    }
    writeln!(w, "{}", separator)?;
    Ok(())
}

pub fn print_result(result: &BenchmarkResult) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out)?;
    write_result(&mut out, result)
}

pub fn print_comparison(comparison: &ComparisonResult) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out)?;
    write_comparison(&mut out, comparison)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::PriceTable;
    use crate::results::tests::{completed, failed};

    fn render<F: Fn(&mut Vec<u8>) -> io::Result<()>>(f: F) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_result_report_marks_unavailable() {
        let result = BenchmarkResult::new("gpt-4o", "factual", "", vec![failed(0)], &PriceTable::builtin());
        let text = render(|w| write_result(w, &result));
        assert!(text.contains("Failed requests:"));
        assert!(text.contains("unavailable"));
        assert!(text.contains("FAILED: rate limited by the API"));
        assert!(!text.contains("Time to First Token"));
    }

    #[test]
    fn test_comparison_report_names_winner() {
        let a = BenchmarkResult::new(
            "gpt-4o-mini",
            "reasoning",
            "",
            vec![completed(0, 2.0, 100)],
            &PriceTable::builtin(),
        );
        let b = BenchmarkResult::new(
            "gpt-4o",
            "reasoning",
            "",
            vec![completed(0, 1.0, 100)],
            &PriceTable::builtin(),
        );
        let comparison = ComparisonResult::from_results(a, b);
        let text = render(|w| write_comparison(w, &comparison));
        assert!(text.contains("Comparison: gpt-4o-mini vs gpt-4o"));
        assert!(text.contains("Winner: gpt-4o (4 vs 1 metrics)"));
        assert!(text.contains("Quality score"));
    }
}
