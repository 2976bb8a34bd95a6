//! # Analysis Module / 分析模块
//!
//! Compares configurations of a frozen result table against a baseline
//! configuration, test by test. The default comparison is the cache ablation:
//! every ablation level against `ablation_no_cache`, on the extracted kernel
//! time.
//!
//! A value that cannot be computed (missing baseline, missing or failed
//! candidate, zero denominator) is reported as `not_comparable`, never as a
//! number.
//!
//! 逐个测试地将结果表中的配置与基线配置进行比较。默认比较为缓存消融实验。
//! 无法计算的值（缺少基线、候选缺失或失败、分母为零）报告为 `not_comparable`，
//! 绝不报告为数字。

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::core::aggregator::{ResultRow, ResultTable};
use crate::core::matrix::ABLATION_LABELS;
use crate::core::models::Repository;
use crate::error::ConfigError;

/// The per-cell quantity being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    /// Extracted kernel time in milliseconds.
    Metric,
    /// Wall-clock duration of the cell in seconds.
    Duration,
    /// Peak resident set size in kilobytes, as reported by `time -v`.
    MaxRss,
}

impl Measure {
    fn value_of(&self, row: &ResultRow) -> Option<f64> {
        if !row.succeeded() {
            return None;
        }
        let value = match self {
            Measure::Metric => row.metric?,
            Measure::Duration => row.duration_secs,
            Measure::MaxRss => row.max_rss_kb? as f64,
        };
        value.is_finite().then_some(value)
    }
}

impl FromStr for Measure {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metric" => Ok(Measure::Metric),
            "duration" => Ok(Measure::Duration),
            "max_rss" => Ok(Measure::MaxRss),
            other => Err(ConfigError::Invalid(format!(
                "unknown measure '{other}' (expected 'metric', 'duration' or 'max_rss')"
            ))),
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Metric => f.write_str("metric"),
            Measure::Duration => f.write_str("duration"),
            Measure::MaxRss => f.write_str("max_rss"),
        }
    }
}

/// A derived number, or the explicit marker that it cannot be derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparable {
    Value(f64),
    NotComparable,
}

impl Comparable {
    fn from_option(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Comparable::Value(v),
            _ => Comparable::NotComparable,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Comparable::Value(v) => Some(*v),
            Comparable::NotComparable => None,
        }
    }

    pub fn is_comparable(&self) -> bool {
        matches!(self, Comparable::Value(_))
    }
}

impl Serialize for Comparable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Comparable::Value(v) => serializer.serialize_f64(*v),
            Comparable::NotComparable => serializer.serialize_str("not_comparable"),
        }
    }
}

impl fmt::Display for Comparable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparable::Value(v) => write!(f, "{v:.3}"),
            Comparable::NotComparable => f.write_str("not_comparable"),
        }
    }
}

/// What to compare against what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    baseline: String,
    candidates: Vec<String>,
    measure: Measure,
}

impl Comparison {
    pub fn new(baseline: impl Into<String>, candidates: Vec<String>, measure: Measure) -> Result<Self, ConfigError> {
        let baseline = baseline.into();
        if candidates.is_empty() {
            return Err(ConfigError::Invalid("no configurations to compare".to_string()));
        }
        if candidates.contains(&baseline) {
            return Err(ConfigError::Invalid(format!(
                "'{baseline}' is both the baseline and a candidate"
            )));
        }
        Ok(Self {
            baseline,
            candidates,
            measure,
        })
    }

    /// Every cache level against `ablation_no_cache`, on kernel time.
    pub fn ablation() -> Self {
        Self {
            baseline: ABLATION_LABELS[0].to_string(),
            candidates: ABLATION_LABELS[1..].iter().map(|l| l.to_string()).collect(),
            measure: Measure::Metric,
        }
    }

    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn measure(&self) -> Measure {
        self.measure
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateResult {
    pub label: String,
    pub value: Comparable,
    /// `value - baseline`
    pub delta: Comparable,
    /// `baseline / value`
    pub speedup: Comparable,
    /// `value / baseline`
    pub overhead: Comparable,
    /// `value - previous candidate` (the baseline for the first candidate).
    pub step_delta: Comparable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestComparison {
    pub repository: Repository,
    pub ordinal: usize,
    pub test_id: String,
    pub baseline: Comparable,
    pub candidates: Vec<CandidateResult>,
}

/// Mean, median and range of a set of per-test ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatioStats {
    pub mean: Comparable,
    pub median: Comparable,
    pub min: Comparable,
    pub max: Comparable,
}

impl RatioStats {
    const EMPTY: RatioStats = RatioStats {
        mean: Comparable::NotComparable,
        median: Comparable::NotComparable,
        min: Comparable::NotComparable,
        max: Comparable::NotComparable,
    };

    fn of(mut samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self::EMPTY;
        }
        samples.sort_by(f64::total_cmp);
        let n = samples.len();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (samples[n / 2 - 1] + samples[n / 2]) / 2.0
        } else {
            samples[n / 2]
        };
        RatioStats {
            mean: Comparable::Value(mean),
            median: Comparable::Value(median),
            min: Comparable::Value(samples[0]),
            max: Comparable::Value(samples[n - 1]),
        }
    }
}

/// Speedup and overhead statistics of one candidate over every comparable
/// test. Both are taken over the same samples; the mean overhead is not the
/// reciprocal of the mean speedup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedupSummary {
    pub label: String,
    pub valid_samples: usize,
    pub speedup: RatioStats,
    pub overhead: RatioStats,
}

/// Mean of the measure over every succeeded cell of one configuration,
/// independent of the other configurations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationMean {
    pub label: String,
    pub samples: usize,
    pub mean: Comparable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub baseline: String,
    pub candidates: Vec<String>,
    pub measure: Measure,
    pub tests: Vec<TestComparison>,
    pub summary: Vec<SpeedupSummary>,
    /// The baseline first, then the candidates in order.
    pub means: Vec<ConfigurationMean>,
}

impl AnalysisReport {
    /// Pretty JSON. The same report always serializes to the same bytes.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Runs a comparison over a result table.
///
/// 对结果表执行比较。
pub fn analyze(table: &ResultTable, comparison: &Comparison) -> Result<AnalysisReport, ConfigError> {
    let baseline_column = table.column(&comparison.baseline).ok_or_else(|| {
        ConfigError::Invalid(format!(
            "configuration '{}' is not in the result table",
            comparison.baseline
        ))
    })?;
    let candidate_columns = comparison
        .candidates
        .iter()
        .map(|label| {
            table.column(label).ok_or_else(|| {
                ConfigError::Invalid(format!("configuration '{label}' is not in the result table"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let measure = comparison.measure;
    let mut tests = Vec::new();
    for row in table.pivot() {
        let baseline = row.cells[baseline_column].and_then(|cell| measure.value_of(cell));
        let mut previous = baseline;
        let mut candidates = Vec::with_capacity(candidate_columns.len());

        for (label, column) in comparison.candidates.iter().zip(&candidate_columns) {
            let value = row.cells[*column].and_then(|cell| measure.value_of(cell));
            candidates.push(CandidateResult {
                label: label.clone(),
                value: Comparable::from_option(value),
                delta: difference(value, baseline),
                speedup: ratio(baseline, value),
                overhead: ratio(value, baseline),
                step_delta: difference(value, previous),
            });
            previous = value;
        }

        tests.push(TestComparison {
            repository: row.repository,
            ordinal: row.ordinal,
            test_id: row.test_id.to_string(),
            baseline: Comparable::from_option(baseline),
            candidates,
        });
    }

    let summary = comparison
        .candidates
        .iter()
        .enumerate()
        .map(|(i, label)| summarize(label, &tests, i))
        .collect();

    let means = std::iter::once(&comparison.baseline)
        .chain(&comparison.candidates)
        .map(|label| configuration_mean(table, label, measure))
        .collect();

    Ok(AnalysisReport {
        baseline: comparison.baseline.clone(),
        candidates: comparison.candidates.clone(),
        measure,
        tests,
        summary,
        means,
    })
}

fn difference(value: Option<f64>, reference: Option<f64>) -> Comparable {
    match (value, reference) {
        (Some(value), Some(reference)) => Comparable::from_option(Some(value - reference)),
        _ => Comparable::NotComparable,
    }
}

fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Comparable {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d > 0.0 => Comparable::from_option(Some(n / d)),
        _ => Comparable::NotComparable,
    }
}

/// Ratios are only paired when both directions are defined, so speedup and
/// overhead always share their sample set.
fn summarize(label: &str, tests: &[TestComparison], index: usize) -> SpeedupSummary {
    let (speedups, overheads): (Vec<f64>, Vec<f64>) = tests
        .iter()
        .filter_map(|test| {
            let candidate = &test.candidates[index];
            Some((candidate.speedup.value()?, candidate.overhead.value()?))
        })
        .unzip();

    SpeedupSummary {
        label: label.to_string(),
        valid_samples: speedups.len(),
        speedup: RatioStats::of(speedups),
        overhead: RatioStats::of(overheads),
    }
}

fn configuration_mean(table: &ResultTable, label: &str, measure: Measure) -> ConfigurationMean {
    let values: Vec<f64> = table
        .rows
        .iter()
        .filter(|row| row.config_label == label)
        .filter_map(|row| measure.value_of(row))
        .collect();
    let mean = if values.is_empty() {
        Comparable::NotComparable
    } else {
        Comparable::Value(values.iter().sum::<f64>() / values.len() as f64)
    };
    ConfigurationMean {
        label: label.to_string(),
        samples: values.len(),
        mean,
    }
}
