//! # Error Taxonomy / 错误分类
//!
//! Three classes of failure exist in a harness run:
//!
//! - [`ConfigError`]: the grid itself is undefined (unknown group, malformed
//!   whitelist or settings). Raised before any cell executes.
//! - [`CellExecutionError`]: something went wrong inside a single cell. These
//!   are always converted into an outcome row and never escape the engine.
//! - [`EngineFatalError`]: the harness cannot continue (no output directory,
//!   no process could be spawned). The partial result table is still flushed.
//!
//! 运行中存在三类失败：配置错误（网格未定义）、单元执行错误（记录为结果行，
//! 绝不向上传播）以及引擎致命错误（中止运行，但仍会写出部分结果表）。

use std::path::PathBuf;
use thiserror::Error;

/// The grid could not be defined.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown config group '{0}'")]
    UnknownGroup(String),

    #[error("unknown repository '{0}'")]
    UnknownRepository(String),

    #[error("no config groups were requested")]
    NoGroups,

    #[error("malformed whitelist {path} at line {line}: {reason}")]
    MalformedWhitelist {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("whitelist {path} is not valid UTF-8")]
    WhitelistEncoding { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {reason}")]
    Settings { path: PathBuf, reason: String },

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// A failure below the cell boundary. Recorded, never fatal.
#[derive(Error, Debug)]
pub enum CellExecutionError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("test exceeded the {0}s timeout")]
    Timeout(u64),

    #[error("return code: {0}")]
    NonZeroExit(i32),

    #[error("terminated by signal {0}")]
    Signal(i32),

    #[error("test file {0} disappeared before launch")]
    MissingTest(PathBuf),
}

/// An unrecoverable harness-level failure.
#[derive(Error, Debug)]
pub enum EngineFatalError {
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot create cell log {path}: {source}")]
    CellLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no process could be spawned ({attempted} launch attempts failed)")]
    NoProcessSpawned { attempted: usize },

    #[error("cannot prepare library overlay: {0}")]
    Overlay(String),

    #[error("cannot write result table {path}: {reason}")]
    Export { path: PathBuf, reason: String },
}

/// Errors that make the whole command exit non-zero.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fatal(#[from] EngineFatalError),
}

impl HarnessError {
    /// Process exit code for this error class. Cell failures never get here,
    /// a run with only cell-level failures exits 0.
    pub fn exit_code(&self) -> u8 {
        match self {
            HarnessError::Config(_) => 2,
            HarnessError::Fatal(_) => 3,
        }
    }
}
