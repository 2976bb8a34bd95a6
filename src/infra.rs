//! # Infrastructure Module / 基础设施模块
//!
//! Process launching, file system operations, the library overlay and i18n.
//!
//! 进程启动、文件系统操作、动态库覆盖层以及国际化支持。

pub mod command;
pub mod fs;
pub mod overlay;

// Re-export i18n functions for easier access
pub use rust_i18n::t;
