//! # Data Models Module / 数据模型模块
//!
//! This module defines the data structures that flow through the harness:
//! repositories and their tests (the grid's rows), execution cells (row ×
//! column), and the outcome recorded for each cell.
//!
//! 此模块定义了贯穿整个测试框架的数据结构：仓库及其测试（网格的行）、
//! 执行单元（行 × 列）以及为每个单元记录的结果。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::matrix::EnvConfig;
use crate::error::ConfigError;

/// The closed set of target test suites.
/// The declaration order is the row order of every result table.
///
/// 目标测试套件的封闭集合。声明顺序即结果表的行顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repository {
    LigerKernel,
    FlagGems,
    Tritonbench,
}

impl Repository {
    pub const ALL: [Repository; 3] = [
        Repository::LigerKernel,
        Repository::FlagGems,
        Repository::Tritonbench,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Repository::LigerKernel => "liger_kernel",
            Repository::FlagGems => "flag_gems",
            Repository::Tritonbench => "tritonbench",
        }
    }

    /// Default test directory, relative to the project root.
    pub fn default_test_dir(&self) -> &'static str {
        match self {
            Repository::LigerKernel => "submodules/Liger-Kernel/test/transformers/",
            Repository::FlagGems => "submodules/FlagGems/tests/",
            Repository::Tritonbench => "submodules/TritonBench/",
        }
    }

    /// Default test command; the test path is appended.
    pub fn default_command(&self) -> &'static str {
        match self {
            Repository::LigerKernel | Repository::FlagGems => "pytest -s --assert=plain",
            Repository::Tritonbench => "python",
        }
    }

    /// `true` for suites whose files are expanded into individual pytest functions.
    pub fn is_pytest(&self) -> bool {
        !matches!(self, Repository::Tritonbench)
    }

    /// Conventional whitelist file name.
    pub fn whitelist_file_name(&self) -> String {
        format!("{}_whitelist.txt", self.as_str())
    }

    /// Parses a `--repos` value: `all` or a comma separated list.
    /// The result is deduplicated and in declaration order.
    pub fn parse_list(value: &str) -> Result<Vec<Repository>, ConfigError> {
        let mut selected = Vec::new();
        for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part == "all" {
                selected.extend(Repository::ALL);
            } else {
                selected.push(part.parse()?);
            }
        }
        if selected.is_empty() {
            return Err(ConfigError::Invalid("no repositories selected".to_string()));
        }
        selected.sort();
        selected.dedup();
        Ok(selected)
    }
}

impl FromStr for Repository {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Repository::ALL
            .into_iter()
            .find(|repo| repo.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownRepository(s.to_string()))
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered test. The ordinal is its position in the suite-native order
/// (after whitelist filtering), starting at 0 per repository, and is the
/// ordering key of every later aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub repository: Repository,
    /// `<file stem>::<function>` for pytest functions, `<file stem>` for whole files.
    pub id: String,
    pub file: PathBuf,
    pub function: Option<String>,
    pub ordinal: usize,
}

impl TestCase {
    /// Human readable name, e.g. `flag_gems/test_add/test_accuracy_add`.
    pub fn display_name(&self) -> String {
        let stem = self.file_stem();
        match &self.function {
            Some(function) => format!("{}/{}/{}", self.repository, stem, function),
            None => format!("{}/{}", self.repository, stem),
        }
    }

    pub fn file_stem(&self) -> String {
        self.file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Sort key of a result row: repository rank, test ordinal, column index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey {
    pub repository: Repository,
    pub ordinal: usize,
    pub column: usize,
}

/// The atomic unit of work: one test under one configuration.
/// Built once by the planner and consumed once by the engine.
#[derive(Debug, Clone)]
pub struct ExecutionCell {
    pub test: TestCase,
    pub config: EnvConfig,
    /// Declaration index of `config` in the matrix.
    pub column: usize,
    /// Where the raw stdout/stderr capture goes.
    pub log_path: PathBuf,
    /// Zero-padded test number written into the log header.
    pub test_number: String,
}

impl ExecutionCell {
    pub fn key(&self) -> RowKey {
        RowKey {
            repository: self.test.repository,
            ordinal: self.test.ordinal,
            column: self.column,
        }
    }
}

/// Terminal state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    TimedOut,
    Crashed,
    Skipped,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Succeeded => "succeeded",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::TimedOut => "timed_out",
            OutcomeStatus::Crashed => "crashed",
            OutcomeStatus::Skipped => "skipped",
        }
    }

    /// The upper-case marker used in the wide table and log footers.
    pub fn marker(&self) -> &'static str {
        match self {
            OutcomeStatus::Succeeded => "PASSED",
            OutcomeStatus::Failed => "FAILED",
            OutcomeStatus::TimedOut => "TIMEOUT",
            OutcomeStatus::Crashed => "CRASHED",
            OutcomeStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The immutable record of one executed (or skipped) cell.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub key: RowKey,
    pub test_id: String,
    pub test_name: String,
    pub group: &'static str,
    pub config_label: &'static str,
    pub status: OutcomeStatus,
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub log_path: PathBuf,
    /// Total kernel time in milliseconds, when the configuration is instrumented.
    pub metric: Option<f64>,
    pub max_rss_kb: Option<u64>,
    /// Why the cell did not succeed, if it did not.
    pub error: Option<String>,
}

impl Outcome {
    /// An outcome for a cell that never reached the running state.
    pub fn skipped(cell: &ExecutionCell, reason: impl Into<String>) -> Self {
        Self {
            key: cell.key(),
            test_id: cell.test.id.clone(),
            test_name: cell.test.display_name(),
            group: cell.config.group(),
            config_label: cell.config.label(),
            status: OutcomeStatus::Skipped,
            exit_code: None,
            duration: Duration::ZERO,
            log_path: cell.log_path.clone(),
            metric: None,
            max_rss_kb: None,
            error: Some(reason.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}
