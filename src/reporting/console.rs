//! # Console Reporting Module / 控制台报告模块
//!
//! Colored, localized summaries printed at the end of a run or an analysis.
//!
//! 在运行或分析结束时打印的彩色本地化摘要。

use colored::*;

use crate::core::aggregator::ResultTable;
use crate::core::analysis::AnalysisReport;
use crate::core::models::OutcomeStatus;
use crate::infra::t;

/// Status counts of one configuration column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnSummary {
    pub label: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub crashed: usize,
    pub skipped: usize,
    pub total_secs: f64,
}

/// Counts every column of the table, in declaration order.
pub fn summarize_columns(table: &ResultTable) -> Vec<ColumnSummary> {
    let mut summaries: Vec<ColumnSummary> = table
        .labels
        .iter()
        .map(|label| ColumnSummary {
            label: label.clone(),
            ..ColumnSummary::default()
        })
        .collect();

    for row in &table.rows {
        let Some(summary) = table.column(&row.config_label).and_then(|c| summaries.get_mut(c)) else {
            continue;
        };
        summary.total += 1;
        summary.total_secs += row.duration_secs;
        match row.status {
            OutcomeStatus::Succeeded => summary.passed += 1,
            OutcomeStatus::Failed => summary.failed += 1,
            OutcomeStatus::TimedOut => summary.timed_out += 1,
            OutcomeStatus::Crashed => summary.crashed += 1,
            OutcomeStatus::Skipped => summary.skipped += 1,
        }
    }
    summaries
}

/// Prints the per-configuration summary of a run.
///
/// ```text
/// --- Run Summary ---
///   - Configuration                             | Total  Passed  Failed Timeout Crashed Skipped |     Time
///   - baseline_compile_no_cache                 |    12      11       1       0       0       0 |   42.10s
/// ```
pub fn print_summary(table: &ResultTable, locale: &str) {
    println!("\n{}", t!("summary.banner", locale = locale).bold());

    if table.is_empty() {
        println!("  {}", t!("summary.empty", locale = locale).dimmed());
        return;
    }

    println!(
        "  - {:<42} | {:>6} {:>7} {:>7} {:>7} {:>7} {:>7} | {:>9}",
        t!("summary.configuration", locale = locale),
        t!("summary.total", locale = locale),
        t!("summary.passed", locale = locale),
        t!("summary.failed", locale = locale),
        t!("summary.timeout", locale = locale),
        t!("summary.crashed", locale = locale),
        t!("summary.skipped", locale = locale),
        t!("summary.time", locale = locale),
    );

    for summary in summarize_columns(table) {
        let label = if summary.failed + summary.timed_out + summary.crashed > 0 {
            summary.label.yellow()
        } else if summary.total == 0 {
            summary.label.dimmed()
        } else {
            summary.label.green()
        };
        println!(
            "  - {:<42} | {:>6} {:>7} {:>7} {:>7} {:>7} {:>7} | {:>8.2}s",
            label,
            summary.total,
            summary.passed,
            summary.failed,
            summary.timed_out,
            summary.crashed,
            summary.skipped,
            summary.total_secs,
        );
    }
}

/// Prints the speedup statistics of an analysis report.
pub fn print_analysis(report: &AnalysisReport, locale: &str) {
    println!(
        "\n{}",
        t!(
            "analyze.banner",
            locale = locale,
            baseline = &report.baseline,
            measure = report.measure.to_string()
        )
        .bold()
    );
    println!(
        "  {}",
        t!("analyze.tests", locale = locale, count = report.tests.len()).cyan()
    );

    for summary in &report.summary {
        if summary.valid_samples == 0 {
            println!(
                "  - {:<42} {}",
                summary.label,
                t!("analyze.not_comparable", locale = locale).dimmed()
            );
            continue;
        }
        println!(
            "  - {:<42} {}",
            summary.label,
            t!(
                "analyze.speedup",
                locale = locale,
                mean = summary.speedup.mean.to_string(),
                median = summary.speedup.median.to_string(),
                min = summary.speedup.min.to_string(),
                max = summary.speedup.max.to_string(),
                samples = summary.valid_samples
            )
        );
        println!(
            "    {:<42} {}",
            "",
            t!(
                "analyze.overhead",
                locale = locale,
                mean = summary.overhead.mean.to_string(),
                median = summary.overhead.median.to_string()
            )
            .dimmed()
        );
    }

    println!("  {}", t!("analyze.means", locale = locale).cyan());
    for mean in &report.means {
        println!(
            "  - {:<42} {} ({})",
            mean.label,
            mean.mean,
            t!("analyze.samples", locale = locale, count = mean.samples)
        );
    }
}
