//! # Reporting Module / 报告模块
//!
//! Console summaries and the machine-readable exports of a run: the long and
//! wide CSV tables and the JSON analysis report.
//!
//! 控制台摘要以及运行的机器可读导出：长表和宽表 CSV 以及 JSON 分析报告。

pub mod console;
pub mod export;

// Re-export common reporting functions
pub use console::{print_analysis, print_summary};
pub use export::{read_table, write_analysis, write_table, write_wide_table};
