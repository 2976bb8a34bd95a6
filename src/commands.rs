//! # Commands Module / 命令模块
//!
//! One module per subcommand of the command line.
//!
//! 每个命令行子命令对应一个模块。

pub mod analyze;
pub mod clean;
pub mod init;
pub mod list;
pub mod run;
