//! # Cell Execution Engine Module / 单元执行引擎模块
//!
//! This module runs execution cells. Each cell is launched as an isolated
//! process with a private copy of the base environment plus its
//! configuration's bindings, bounded by a wall-clock timeout, and turned into
//! exactly one [`Outcome`] no matter how the process ends.
//!
//! Only harness-level problems (a log file that cannot be created, no process
//! spawning at all) abort a run; everything that happens inside a cell is
//! recorded and the engine moves on.
//!
//! 此模块负责运行执行单元。每个单元作为独立进程启动，使用基础环境的私有副本
//! 加上其配置的绑定，受墙钟超时限制，并且无论进程如何结束都恰好产生一个
//! [`Outcome`]。只有框架级问题才会中止运行；单元内部发生的一切都会被记录，
//! 引擎继续执行下一个单元。

use async_trait::async_trait;
use chrono::Local;
use colored::*;
use futures::{stream, StreamExt};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::aggregator::Aggregator;
use crate::core::environment::BaseEnvironment;
use crate::core::metrics;
use crate::core::models::{ExecutionCell, Outcome, OutcomeStatus, Repository};
use crate::error::{CellExecutionError, EngineFatalError};
use crate::infra::command::{LaunchRequest, ProcessExit};
use crate::infra::t;

const SEPARATOR_WIDTH: usize = 80;

/// Profiler plugin loaded into pytest when `ENABLE_TRITON_PROFILER=1`.
pub const PYTEST_PROFILER_PLUGIN: &str = "pytest_triton_profiler";
/// Wrapper script (under the project root) that profiles TritonBench files.
pub const TRITONBENCH_PROFILER_WRAPPER: &str = "tritonbench_profiler_wrapper.py";

/// Starts the process of a cell and waits for it to exit.
///
/// Dropping the returned future must terminate the process and all of its
/// descendants; the engine relies on this for timeouts and interrupts.
///
/// 启动单元的进程并等待其退出。丢弃返回的 future 必须终止该进程及其所有子孙进程。
#[async_trait]
pub trait CellLauncher: Send + Sync {
    async fn launch(&self, request: LaunchRequest) -> io::Result<ProcessExit>;
}

/// How the tests of one repository are invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteCommand {
    /// Program followed by its fixed arguments, e.g. `["pytest", "-s"]`.
    pub command: Vec<String>,
    /// Working directory, and the base test paths are made relative to.
    pub test_dir: PathBuf,
}

/// A fully resolved command line for one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub cwd: PathBuf,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

/// Builds the command line of a cell: the configuration's prefix, the suite
/// command (with the profiler hook when the configuration enables it) and the
/// test target.
pub fn build_invocation(cell: &ExecutionCell, suite: &SuiteCommand, project_root: &Path) -> Invocation {
    let config = &cell.config;
    let mut argv: Vec<String> = split_prefix(config.command_prefix());

    let relative = cell
        .test
        .file
        .strip_prefix(&suite.test_dir)
        .unwrap_or(&cell.test.file)
        .to_string_lossy()
        .into_owned();

    let (program, fixed_args) = match suite.command.split_first() {
        Some((program, args)) => (program.clone(), args),
        None => (String::new(), &[][..]),
    };
    argv.push(program);

    if cell.test.repository.is_pytest() {
        if config.is_profiled() {
            argv.push("-p".to_string());
            argv.push(PYTEST_PROFILER_PLUGIN.to_string());
        }
        argv.extend(fixed_args.iter().cloned());
        match &cell.test.function {
            Some(function) => argv.push(format!("{relative}::{function}")),
            None => argv.push(relative),
        }
    } else {
        argv.extend(fixed_args.iter().cloned());
        if config.is_profiled() {
            argv.push(
                project_root
                    .join(TRITONBENCH_PROFILER_WRAPPER)
                    .to_string_lossy()
                    .into_owned(),
            );
        }
        argv.push(relative);
    }

    Invocation {
        argv,
        cwd: suite.test_dir.clone(),
    }
}

fn split_prefix(prefix: &str) -> Vec<String> {
    if prefix.trim().is_empty() {
        return Vec::new();
    }
    shlex::split(prefix).unwrap_or_else(|| prefix.split_whitespace().map(String::from).collect())
}

/// Counters of one engine run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total_cells: usize,
    /// Cells that produced an outcome row.
    pub completed: usize,
    /// Launches that were attempted.
    pub attempted: usize,
    /// Launches whose process actually started.
    pub spawned: usize,
    pub interrupted: bool,
}

/// What happened to a single cell.
enum CellReport {
    Finished { outcome: Outcome, attempted: bool, spawned: bool },
    Interrupted,
}

/// Runs execution cells against a launcher.
///
/// 针对启动器运行执行单元。
pub struct Engine<L> {
    launcher: L,
    base_env: BaseEnvironment,
    suites: BTreeMap<Repository, SuiteCommand>,
    project_root: PathBuf,
    timeout: Duration,
    jobs: usize,
}

impl<L: CellLauncher> Engine<L> {
    pub fn new(launcher: L, base_env: BaseEnvironment, project_root: PathBuf, timeout: Duration) -> Self {
        Self {
            launcher,
            base_env,
            suites: BTreeMap::new(),
            project_root,
            timeout,
            jobs: 1,
        }
    }

    /// Registers how the tests of `repository` are invoked.
    pub fn with_suite(mut self, repository: Repository, suite: SuiteCommand) -> Self {
        self.suites.insert(repository, suite);
        self
    }

    /// Number of cells in flight at once. Clamped to `1..=num_cpus`.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.clamp(1, num_cpus::get().max(1));
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Executes every cell, appending one outcome per finished cell to `aggregator`.
    ///
    /// On cancellation the in-flight cells are killed and dropped without a
    /// row; the outcomes already appended stay valid. The caller flushes the
    /// aggregator whether this returns `Ok` or `Err`.
    pub async fn run(
        &self,
        cells: Vec<ExecutionCell>,
        aggregator: &Aggregator,
        stop: &CancellationToken,
    ) -> Result<RunStats, EngineFatalError> {
        let mut stats = RunStats {
            total_cells: cells.len(),
            ..RunStats::default()
        };

        let mut reports = stream::iter(cells)
            .map(|cell| self.run_cell(cell, stop))
            .buffer_unordered(self.jobs);

        while let Some(report) = reports.next().await {
            match report? {
                CellReport::Finished {
                    outcome,
                    attempted,
                    spawned,
                } => {
                    stats.attempted += usize::from(attempted);
                    stats.spawned += usize::from(spawned);
                    stats.completed += 1;
                    aggregator.append(outcome);
                }
                CellReport::Interrupted => stats.interrupted = true,
            }
        }
        drop(reports);

        if stats.attempted > 0 && stats.spawned == 0 {
            return Err(EngineFatalError::NoProcessSpawned {
                attempted: stats.attempted,
            });
        }
        Ok(stats)
    }

    async fn run_cell(
        &self,
        cell: ExecutionCell,
        stop: &CancellationToken,
    ) -> Result<CellReport, EngineFatalError> {
        if stop.is_cancelled() {
            return Ok(CellReport::Interrupted);
        }

        let name = cell.test.display_name();
        if !cell.test.file.exists() {
            let reason = CellExecutionError::MissingTest(cell.test.file.clone());
            println!(
                "{}",
                t!("run.cell_skipped", name = &name, config = cell.config.label()).dimmed()
            );
            return Ok(CellReport::Finished {
                outcome: Outcome::skipped(&cell, reason.to_string()),
                attempted: false,
                spawned: false,
            });
        }

        let suite = self.suites.get(&cell.test.repository).cloned().unwrap_or_else(|| SuiteCommand {
            command: split_prefix(cell.test.repository.default_command()),
            test_dir: cell.test.file.parent().map(Path::to_path_buf).unwrap_or_default(),
        });
        let invocation = build_invocation(&cell, &suite, &self.project_root);
        let mut log = create_log(&cell.log_path)?;
        write_header(&mut log, &cell, &name, &invocation).map_err(|source| EngineFatalError::CellLog {
            path: cell.log_path.clone(),
            source,
        })?;

        println!(
            "{}",
            t!("run.cell_running", name = &name, config = cell.config.label()).blue()
        );
        tracing::debug!(command = %invocation.command_line(), cwd = %invocation.cwd.display(), "launching cell");

        let child_log = log.try_clone().map_err(|source| EngineFatalError::CellLog {
            path: cell.log_path.clone(),
            source,
        })?;
        let mut argv = invocation.argv.into_iter();
        let request = LaunchRequest {
            program: argv.next().unwrap_or_default(),
            args: argv.collect(),
            cwd: invocation.cwd,
            env: self.base_env.overlay(&cell.config),
            log: child_log,
        };

        let start = Instant::now();
        let result = tokio::select! {
            biased;
            exit = self.launcher.launch(request) => Some(exit),
            _ = tokio::time::sleep(self.timeout) => None,
            _ = stop.cancelled() => {
                append_footer(&cell.log_path, start.elapsed(), "INTERRUPTED", None);
                println!("{}", t!("run.cell_interrupted", name = &name).yellow());
                return Ok(CellReport::Interrupted);
            }
        };
        let duration = start.elapsed();

        let (status, exit_code, error, spawned) = match result {
            None => (
                OutcomeStatus::TimedOut,
                None,
                Some(CellExecutionError::Timeout(self.timeout.as_secs())),
                true,
            ),
            Some(Ok(exit)) => classify(exit),
            Some(Err(e)) => (
                OutcomeStatus::Crashed,
                None,
                Some(CellExecutionError::Spawn(e)),
                false,
            ),
        };
        let error = error.map(|e| e.to_string());
        append_footer(&cell.log_path, duration, status.marker(), error.as_deref());

        let captured = fs::read(&cell.log_path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        let metric = cell
            .config
            .metric_kind()
            .and_then(|kind| metrics::extract_kernel_time(&captured, kind));
        let max_rss_kb = if cell.config.reports_memory() {
            metrics::extract_max_rss_kb(&captured)
        } else {
            None
        };

        print_cell_result(&name, cell.config.label(), status, duration);

        let outcome = Outcome {
            key: cell.key(),
            test_id: cell.test.id.clone(),
            test_name: name,
            group: cell.config.group(),
            config_label: cell.config.label(),
            status,
            exit_code,
            duration,
            log_path: cell.log_path.clone(),
            metric,
            max_rss_kb,
            error,
        };
        Ok(CellReport::Finished {
            outcome,
            attempted: true,
            spawned,
        })
    }
}

/// Maps a process exit onto an outcome status.
pub fn classify(exit: ProcessExit) -> (OutcomeStatus, Option<i32>, Option<CellExecutionError>, bool) {
    match (exit.code, exit.signal) {
        (Some(0), _) => (OutcomeStatus::Succeeded, Some(0), None, true),
        (Some(code), _) => (
            OutcomeStatus::Failed,
            Some(code),
            Some(CellExecutionError::NonZeroExit(code)),
            true,
        ),
        (None, Some(signal)) => (
            OutcomeStatus::Crashed,
            None,
            Some(CellExecutionError::Signal(signal)),
            true,
        ),
        (None, None) => (OutcomeStatus::Crashed, None, None, true),
    }
}

fn create_log(path: &Path) -> Result<File, EngineFatalError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| EngineFatalError::OutputDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    File::create(path).map_err(|source| EngineFatalError::CellLog {
        path: path.to_path_buf(),
        source,
    })
}

fn write_header(log: &mut File, cell: &ExecutionCell, name: &str, invocation: &Invocation) -> io::Result<()> {
    writeln!(log, "Test Number: {}", cell.test_number)?;
    writeln!(log, "Test: {name}")?;
    writeln!(log, "Environment: {}", cell.config.label())?;
    writeln!(log, "Command: {}", invocation.command_line())?;
    writeln!(log, "Start Time: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(log, "{}", "=".repeat(SEPARATOR_WIDTH))?;
    log.flush()
}

/// Appends the footer. A log that cannot be reopened only loses its footer.
fn append_footer(path: &Path, elapsed: Duration, status: &str, error: Option<&str>) {
    let result = OpenOptions::new().append(true).open(path).and_then(|mut log| {
        writeln!(log)?;
        writeln!(log, "{}", "=".repeat(SEPARATOR_WIDTH))?;
        writeln!(log, "End Time: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(log, "Elapsed Time: {:.2} seconds", elapsed.as_secs_f64())?;
        writeln!(log, "Status: {status}")?;
        if let Some(error) = error {
            writeln!(log, "Error: {error}")?;
        }
        Ok(())
    });
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "could not write log footer");
    }
}

fn print_cell_result(name: &str, config: &str, status: OutcomeStatus, duration: Duration) {
    let duration = format!("{:.2}", duration.as_secs_f64());
    let line = match status {
        OutcomeStatus::Succeeded => t!("run.cell_passed", name = name, config = config, duration = &duration).green(),
        OutcomeStatus::Failed => t!("run.cell_failed", name = name, config = config, duration = &duration).red(),
        OutcomeStatus::TimedOut => t!("run.cell_timeout", name = name, config = config, duration = &duration).red(),
        OutcomeStatus::Crashed => t!("run.cell_crashed", name = name, config = config, duration = &duration).red(),
        OutcomeStatus::Skipped => t!("run.cell_skipped", name = name, config = config).dimmed(),
    };
    println!("{line}");
}
