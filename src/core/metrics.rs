//! Best-effort extraction of numbers from captured test logs.
//!
//! Nothing here fails: a log that does not contain the expected lines simply
//! yields `None`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::matrix::MetricKind;

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("built-in log pattern must compile")
}

/// `Triton-Viz: execution time for _jsd_kernel: 3.326 ms`
///
/// The kernel name may itself contain ':'; the value is the last `: <n> ms`.
static SANITIZER_TIMING: Lazy<Regex> =
    Lazy::new(|| pattern(r"Triton-Viz:\s+execution time for\s+(\S+):\s+([\d.]+)\s+ms"));

/// `[liger][triton] kernel=_jsd_kernel cpu_launch_ms=3.136 gpu_time_ms=119.417`
static LIGER_PROFILER: Lazy<Regex> = Lazy::new(|| {
    pattern(r"\[liger\]\[triton\]\s+kernel=(\S+)\s+cpu_launch_ms=[\d.]+\s+gpu_time_ms=([\d.]+)")
});

/// `[triton-profiler] kernel=matmul_kernel [M=256, N=256] cpu_launch_ms=0.037 gpu_time_ms=0.029`
static TRITON_PROFILER: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"\[triton-profiler\]\s+kernel=(\S+)(?:\s+\[.*?\])?\s+cpu_launch_ms=[\d.]+\s+gpu_time_ms=([\d.]+)",
    )
});

static MAX_RSS: Lazy<Regex> =
    Lazy::new(|| pattern(r"Maximum resident set size \(kbytes\):\s*(\d+)"));

/// Total kernel time in milliseconds reported in `log`, or `None` if the log
/// contains no timing line of the expected kind.
///
/// Only per-kernel lines count; summary lines printed by the same tools carry
/// no `kernel=` field and are ignored.
pub fn extract_kernel_time(log: &str, kind: MetricKind) -> Option<f64> {
    let samples: Vec<f64> = log
        .lines()
        .filter_map(|line| {
            let caps = match kind {
                MetricKind::SanitizerTiming => SANITIZER_TIMING.captures(line),
                MetricKind::ProfilerGpuTime => LIGER_PROFILER
                    .captures(line)
                    .or_else(|| TRITON_PROFILER.captures(line)),
            }?;
            parse_non_negative(&caps[2])
        })
        .collect();

    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum())
    }
}

/// Peak resident set size reported by `/usr/bin/time -v`.
pub fn extract_max_rss_kb(log: &str) -> Option<u64> {
    MAX_RSS
        .captures_iter(log)
        .filter_map(|caps| caps[1].parse::<u64>().ok())
        .last()
}

fn parse_non_negative(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}
