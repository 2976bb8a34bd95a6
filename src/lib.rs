//! # Kernel Matrix Runner Library / Kernel Matrix Runner 库
//!
//! This library runs GPU kernel test suites under a matrix of sanitizer and
//! caching configurations. Every (test, configuration) cell is executed in an
//! isolated process group with its own log, and the outcomes are aggregated
//! into one ordered result table that the analysis compares across
//! configurations.
//!
//! 此库在由 sanitizer 与缓存配置组成的矩阵下运行 GPU 内核测试套件。
//! 每个（测试，配置）单元都在独立的进程组中执行并拥有自己的日志，
//! 结果被聚合为一个有序结果表，供分析模块跨配置比较。
//!
//! ## Modules / 模块
//!
//! - `core` - The grid: matrix, discovery, execution engine, aggregation, analysis
//! - `infra` - Process launching, file system operations, library overlay
//! - `reporting` - Console summaries and CSV/JSON exports
//! - `cli` / `commands` - Command-line interface and commands
//!
//! - `core` - 网格：矩阵、测试发现、执行引擎、聚合、分析
//! - `infra` - 进程启动、文件系统操作、动态库覆盖层
//! - `reporting` - 控制台摘要与 CSV/JSON 导出
//! - `cli` / `commands` - 命令行接口和命令

pub mod cli;
pub mod commands;
pub mod core;
pub mod error;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::models;
pub use core::config;
pub use core::execution;
pub use error::{CellExecutionError, ConfigError, EngineFatalError, HarnessError};
pub use infra::t;

/// Detects the best available locale for the system language.
///
/// Tries the full locale first (e.g. "zh-CN"), then the language part only
/// (e.g. "en" from "en-US"), and finally falls back to "en".
pub fn detect_locale() -> String {
    let locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    let available_locales = rust_i18n::available_locales!();

    if available_locales.contains(&locale.as_str()) {
        return locale;
    }
    locale
        .split('-')
        .next()
        .filter(|lang_code| available_locales.contains(lang_code))
        .unwrap_or("en")
        .to_string()
}

/// Initializes i18n based on the system locale.
pub fn init() {
    rust_i18n::set_locale(&detect_locale());
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
