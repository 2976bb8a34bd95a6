//! # Core Module / 核心模块
//!
//! The grid and everything that flows through it: the configuration matrix,
//! test discovery, the execution engine, aggregation and analysis.
//!
//! 网格以及流经网格的一切：配置矩阵、测试发现、执行引擎、聚合与分析。

pub mod aggregator;
pub mod analysis;
pub mod config;
pub mod discovery;
pub mod environment;
pub mod execution;
pub mod matrix;
pub mod metrics;
pub mod models;
pub mod planner;
pub mod whitelist;

// Re-exports
pub use aggregator::{Aggregator, ResultRow, ResultTable};
pub use execution::{CellLauncher, Engine};
pub use matrix::{build_matrix, ConfigMatrix, EnvConfig};
pub use models::{ExecutionCell, Outcome, OutcomeStatus, Repository, TestCase};
