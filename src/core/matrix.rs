//! # Configuration Matrix / 配置矩阵
//!
//! The column axis of the execution grid. Config groups are a static,
//! declarative table mapping a group name to an ordered list of environment
//! configurations; expanding a set of requested groups is a pure lookup so the
//! resulting matrix is identical on every machine and every call.
//!
//! 执行网格的列轴。配置组是一个静态的声明式表，将组名映射到有序的环境配置列表；
//! 展开请求的组只是纯查找，因此结果矩阵在每台机器、每次调用中都完全相同。

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::ConfigError;

/// Static description of one environment configuration.
#[derive(Debug, PartialEq, Eq)]
pub struct ConfigSpec {
    /// Globally unique label, used in result columns.
    pub label: &'static str,
    /// Short name inside its group, used as the log sub-directory.
    pub name: &'static str,
    pub description: &'static str,
    pub env: &'static [(&'static str, &'static str)],
    /// Program (plus arguments) the test command is wrapped with. Empty for none.
    pub command_prefix: &'static str,
}

/// Static description of a config group.
#[derive(Debug)]
pub struct GroupSpec {
    pub name: &'static str,
    pub configs: &'static [ConfigSpec],
}

const TIME_PREFIX: &str = "/usr/bin/time -v";
const COMPUTE_SANITIZER: &str = "compute-sanitizer";
const TRITON_SANITIZER: &str = "triton-sanitizer";
const TIMED_TRITON_SANITIZER: &str = "/usr/bin/time -v triton-sanitizer";

const COMPILE_NO_CACHE: &[(&str, &str)] = &[
    ("TRITON_ALWAYS_COMPILE", "1"),
    ("PYTORCH_NO_CUDA_MEMORY_CACHING", "1"),
];
const NO_COMPILE_WITH_CACHE: &[(&str, &str)] = &[
    ("TRITON_ALWAYS_COMPILE", "0"),
    ("PYTORCH_NO_CUDA_MEMORY_CACHING", "0"),
];
const COMPILE_WITH_CACHE: &[(&str, &str)] = &[
    ("TRITON_ALWAYS_COMPILE", "1"),
    ("PYTORCH_NO_CUDA_MEMORY_CACHING", "0"),
];
const NO_COMPILE_NO_CACHE: &[(&str, &str)] = &[
    ("TRITON_ALWAYS_COMPILE", "0"),
    ("PYTORCH_NO_CUDA_MEMORY_CACHING", "1"),
];

const PROFILED: &[(&str, &str)] = &[
    ("TRITON_ALWAYS_COMPILE", "0"),
    ("PYTORCH_NO_CUDA_MEMORY_CACHING", "0"),
    ("ENABLE_TRITON_PROFILER", "1"),
];
const TIMED: &[(&str, &str)] = &[
    ("TRITON_ALWAYS_COMPILE", "0"),
    ("PYTORCH_NO_CUDA_MEMORY_CACHING", "0"),
    ("ENABLE_TIMING", "1"),
];
const TIMED_PROFILER_OFF: &[(&str, &str)] = &[
    ("TRITON_ALWAYS_COMPILE", "0"),
    ("PYTORCH_NO_CUDA_MEMORY_CACHING", "0"),
    ("ENABLE_TRITON_PROFILER", "0"),
    ("ENABLE_TIMING", "1"),
];

/// Builds an ablation binding list from the (symbol, loop, grid, kernel) cache toggles.
macro_rules! ablation_env {
    ($symbol:literal, $loop_:literal, $grid:literal, $kernel:literal) => {
        &[
            ("SANITIZER_ENABLE_SYMBOL_CACHE", $symbol),
            ("SANITIZER_ENABLE_LOOP_CACHE", $loop_),
            ("SANITIZER_ENABLE_GRID_CACHE", $grid),
            ("SANITIZER_ENABLE_KERNEL_CACHE", $kernel),
            ("ENABLE_TIMING", "1"),
        ]
    };
}

/// The toggle grid shared by the baseline and sanitizer groups.
macro_rules! cache_grid {
    ($group:literal, $prefix:expr, $what:literal) => {
        &[
            ConfigSpec {
                label: concat!($group, "_compile_no_cache"),
                name: "compile_no_cache",
                description: concat!($what, ": always compile, disable CUDA memory caching"),
                env: COMPILE_NO_CACHE,
                command_prefix: $prefix,
            },
            ConfigSpec {
                label: concat!($group, "_no_compile_with_cache"),
                name: "no_compile_with_cache",
                description: concat!($what, ": cached kernels, enable CUDA memory caching"),
                env: NO_COMPILE_WITH_CACHE,
                command_prefix: $prefix,
            },
            ConfigSpec {
                label: concat!($group, "_compile_with_cache"),
                name: "compile_with_cache",
                description: concat!($what, ": always compile, enable CUDA memory caching"),
                env: COMPILE_WITH_CACHE,
                command_prefix: $prefix,
            },
            ConfigSpec {
                label: concat!($group, "_no_compile_no_cache"),
                name: "no_compile_no_cache",
                description: concat!($what, ": cached kernels, disable CUDA memory caching"),
                env: NO_COMPILE_NO_CACHE,
                command_prefix: $prefix,
            },
        ]
    };
}

/// Ablation level labels in increasing cache permissiveness.
pub const ABLATION_LABELS: [&str; 5] = [
    "ablation_no_cache",
    "ablation_symbol_only",
    "ablation_symbol_loop",
    "ablation_symbol_loop_grid",
    "ablation_all_cache",
];

/// The fixed registry, in declaration order.
pub static REGISTRY: &[GroupSpec] = &[
    GroupSpec {
        name: "baseline",
        configs: cache_grid!("baseline", TIME_PREFIX, "Baseline"),
    },
    GroupSpec {
        name: "compute_sanitizer",
        configs: cache_grid!("compute_sanitizer", COMPUTE_SANITIZER, "Compute-sanitizer"),
    },
    GroupSpec {
        name: "triton_sanitizer",
        configs: cache_grid!("triton_sanitizer", TIMED_TRITON_SANITIZER, "Triton-sanitizer"),
    },
    GroupSpec {
        name: "kernel_time",
        configs: &[
            ConfigSpec {
                label: "pytest_kernel_time_baseline",
                name: "baseline",
                description: "Kernel timing: baseline with profiling enabled",
                env: PROFILED,
                command_prefix: "",
            },
            ConfigSpec {
                label: "pytest_kernel_time_compute_sanitizer",
                name: "compute-sanitizer",
                description: "Kernel timing: compute-sanitizer with profiling enabled",
                env: PROFILED,
                command_prefix: COMPUTE_SANITIZER,
            },
            ConfigSpec {
                label: "pytest_kernel_time_triton_sanitizer",
                name: "triton-sanitizer",
                description: "Kernel timing: triton-sanitizer with sanitizer timing",
                env: TIMED,
                command_prefix: TRITON_SANITIZER,
            },
        ],
    },
    GroupSpec {
        name: "kernel_time_liger_kernel",
        configs: &[
            ConfigSpec {
                label: "kernel_time_baseline",
                name: "baseline",
                description: "Kernel timing: baseline (no compile, with cache)",
                env: PROFILED,
                command_prefix: "",
            },
            ConfigSpec {
                label: "kernel_time_compute_sanitizer",
                name: "compute-sanitizer",
                description: "Kernel timing: compute-sanitizer (no compile, with cache)",
                env: PROFILED,
                command_prefix: COMPUTE_SANITIZER,
            },
            ConfigSpec {
                label: "kernel_time_triton_sanitizer",
                name: "triton-sanitizer",
                description: "Kernel timing: triton-sanitizer (no compile, with cache)",
                env: TIMED,
                command_prefix: TRITON_SANITIZER,
            },
        ],
    },
    GroupSpec {
        name: "kernel_time_tritonbench",
        configs: &[
            ConfigSpec {
                label: "kernel_time_tritonbench_baseline",
                name: "baseline",
                description: "TritonBench kernel timing: baseline, profiling enabled",
                env: PROFILED,
                command_prefix: "",
            },
            ConfigSpec {
                label: "kernel_time_tritonbench_compute_sanitizer",
                name: "compute-sanitizer",
                description: "TritonBench kernel timing: compute-sanitizer, profiling enabled",
                env: PROFILED,
                command_prefix: COMPUTE_SANITIZER,
            },
            ConfigSpec {
                label: "kernel_time_tritonbench_triton_sanitizer",
                name: "triton-sanitizer",
                description: "TritonBench kernel timing: triton-sanitizer, profiling disabled",
                env: TIMED_PROFILER_OFF,
                command_prefix: TRITON_SANITIZER,
            },
        ],
    },
    GroupSpec {
        name: "ablation_studies",
        configs: &[
            ConfigSpec {
                label: ABLATION_LABELS[0],
                name: "no_cache",
                description: "Ablation study: no cache enabled (0,0,0,0)",
                env: ablation_env!("0", "0", "0", "0"),
                command_prefix: TRITON_SANITIZER,
            },
            ConfigSpec {
                label: ABLATION_LABELS[1],
                name: "symbol_only",
                description: "Ablation study: symbol cache only (1,0,0,0)",
                env: ablation_env!("1", "0", "0", "0"),
                command_prefix: TRITON_SANITIZER,
            },
            ConfigSpec {
                label: ABLATION_LABELS[2],
                name: "symbol_loop",
                description: "Ablation study: symbol and loop cache (1,1,0,0)",
                env: ablation_env!("1", "1", "0", "0"),
                command_prefix: TRITON_SANITIZER,
            },
            ConfigSpec {
                label: ABLATION_LABELS[3],
                name: "symbol_loop_grid",
                description: "Ablation study: symbol, loop and grid cache (1,1,1,0)",
                env: ablation_env!("1", "1", "1", "0"),
                command_prefix: TRITON_SANITIZER,
            },
            ConfigSpec {
                label: ABLATION_LABELS[4],
                name: "all_cache",
                description: "Ablation study: all caches enabled (1,1,1,1)",
                env: ablation_env!("1", "1", "1", "1"),
                command_prefix: TRITON_SANITIZER,
            },
        ],
    },
];

/// Groups selected by the `all` alias.
pub const ALL_ALIAS_GROUPS: [&str; 3] = ["baseline", "compute_sanitizer", "triton_sanitizer"];

static GROUP_INDEX: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    REGISTRY
        .iter()
        .enumerate()
        .map(|(i, group)| (group.name, i))
        .collect()
});

static LABEL_INDEX: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    let mut index = HashMap::new();
    for config in REGISTRY.iter().flat_map(|group| group.configs) {
        let next = index.len();
        index.entry(config.label).or_insert(next);
    }
    index
});

/// Position of a configuration label in registry declaration order, or
/// `None` for a label the registry does not know.
pub fn label_rank(label: &str) -> Option<usize> {
    LABEL_INDEX.get(label).copied()
}

/// Which timing instrumentation a configuration turns on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricKind {
    /// The sanitizer prints per-kernel execution times (`ENABLE_TIMING=1`).
    SanitizerTiming,
    /// The profiler plugin prints per-kernel GPU times (`ENABLE_TRITON_PROFILER=1`).
    ProfilerGpuTime,
}

/// One environment configuration. A thin handle on a registry entry, so it
/// is cheap to copy and cannot be mutated after construction.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EnvConfig {
    group: &'static str,
    spec: &'static ConfigSpec,
}

impl EnvConfig {
    pub fn label(&self) -> &'static str {
        self.spec.label
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn group(&self) -> &'static str {
        self.group
    }

    pub fn description(&self) -> &'static str {
        self.spec.description
    }

    pub fn bindings(&self) -> &'static [(&'static str, &'static str)] {
        self.spec.env
    }

    pub fn command_prefix(&self) -> &'static str {
        self.spec.command_prefix
    }

    /// Looks up a binding value by variable name.
    pub fn get(&self, var: &str) -> Option<&'static str> {
        self.spec
            .env
            .iter()
            .find(|(name, _)| *name == var)
            .map(|(_, value)| *value)
    }

    pub fn metric_kind(&self) -> Option<MetricKind> {
        if self.get("ENABLE_TIMING") == Some("1") {
            Some(MetricKind::SanitizerTiming)
        } else if self.get("ENABLE_TRITON_PROFILER") == Some("1") {
            Some(MetricKind::ProfilerGpuTime)
        } else {
            None
        }
    }

    /// `true` when the prefix runs `time -v`, whose report carries peak RSS.
    pub fn reports_memory(&self) -> bool {
        self.spec.command_prefix.contains("time -v")
    }

    pub fn is_profiled(&self) -> bool {
        self.get("ENABLE_TRITON_PROFILER") == Some("1")
    }
}

impl fmt::Debug for EnvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvConfig")
            .field("group", &self.group)
            .field("label", &self.spec.label)
            .finish_non_exhaustive()
    }
}

/// A named, non-empty bundle of configurations.
#[derive(Debug, Clone)]
pub struct ConfigGroup {
    name: &'static str,
    configs: Vec<EnvConfig>,
}

impl ConfigGroup {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn configs(&self) -> &[EnvConfig] {
        &self.configs
    }
}

/// Looks a group up in the registry.
pub fn group(name: &str) -> Result<ConfigGroup, ConfigError> {
    let index = GROUP_INDEX
        .get(name)
        .copied()
        .ok_or_else(|| ConfigError::UnknownGroup(name.to_string()))?;
    Ok(group_at(index))
}

fn group_at(index: usize) -> ConfigGroup {
    let spec = &REGISTRY[index];
    ConfigGroup {
        name: spec.name,
        configs: spec
            .configs
            .iter()
            .map(|config| EnvConfig {
                group: spec.name,
                spec: config,
            })
            .collect(),
    }
}

/// Every group of the registry, in declaration order.
pub fn registry_groups() -> Vec<ConfigGroup> {
    (0..REGISTRY.len()).map(group_at).collect()
}

/// The grid's column axis: every selected configuration with its declaration index.
#[derive(Debug, Clone)]
pub struct ConfigMatrix {
    groups: Vec<&'static str>,
    columns: Vec<EnvConfig>,
}

impl ConfigMatrix {
    /// Configurations in declaration order. The position is the column index.
    pub fn columns(&self) -> &[EnvConfig] {
        &self.columns
    }

    pub fn group_names(&self) -> &[&'static str] {
        &self.groups
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.columns.iter().map(EnvConfig::label).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Expands the requested group names into the column axis.
///
/// The groups are concatenated in registry order regardless of request order;
/// a repeated label keeps its first occurrence. `all` expands to the baseline
/// and both sanitizer groups.
///
/// 将请求的组名展开为列轴。组按注册表顺序拼接，与请求顺序无关；重复的标签保留首次出现。
pub fn build_matrix<S: AsRef<str>>(requested: &[S]) -> Result<ConfigMatrix, ConfigError> {
    if requested.is_empty() {
        return Err(ConfigError::NoGroups);
    }

    let mut selected = vec![false; REGISTRY.len()];
    for name in requested {
        let name = name.as_ref().trim();
        if name == "all" {
            for alias in ALL_ALIAS_GROUPS {
                selected[GROUP_INDEX[alias]] = true;
            }
            continue;
        }
        let index = GROUP_INDEX
            .get(name)
            .ok_or_else(|| ConfigError::UnknownGroup(name.to_string()))?;
        selected[*index] = true;
    }

    let mut seen = HashSet::new();
    let mut groups = Vec::new();
    let mut columns = Vec::new();
    for (index, _) in selected.iter().enumerate().filter(|(_, on)| **on) {
        let group = group_at(index);
        groups.push(group.name);
        for config in group.configs {
            if seen.insert(config.label()) {
                columns.push(config);
            }
        }
    }

    Ok(ConfigMatrix { groups, columns })
}
