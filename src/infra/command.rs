//! # Process Execution Module / 进程执行模块
//!
//! Launches a test as the leader of its own process group with stdout and
//! stderr redirected into the cell's log file. Dropping a running
//! [`ProcessGroup`] kills the whole group, so a timed-out or interrupted test
//! never leaves descendant processes behind.
//!
//! 将测试作为独立进程组的组长启动，stdout 和 stderr 重定向到单元日志文件。
//! 丢弃正在运行的 [`ProcessGroup`] 会杀死整个进程组，因此超时或被中断的测试
//! 不会留下任何子孙进程。

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use crate::core::execution::CellLauncher;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ProcessExit {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Everything needed to start one test process.
#[derive(Debug)]
pub struct LaunchRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// The complete environment of the child; nothing is inherited.
    pub env: BTreeMap<String, String>,
    /// Receives both stdout and stderr.
    pub log: File,
}

impl LaunchRequest {
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A spawned child leading its own process group.
pub struct ProcessGroup {
    child: tokio::process::Child,
    pgid: Option<i32>,
    reaped: bool,
}

impl ProcessGroup {
    pub fn spawn(mut cmd: tokio::process::Command) -> io::Result<Self> {
        isolate(&mut cmd);
        cmd.kill_on_drop(true);

        let child = cmd.spawn()?;
        let pgid = child.id().and_then(|id| i32::try_from(id).ok());
        Ok(Self {
            child,
            pgid,
            reaped: false,
        })
    }

    /// Waits for the leader to exit, then kills whatever is left of its group.
    pub async fn wait(&mut self) -> io::Result<ProcessExit> {
        let status = self.child.wait().await?;
        self.reaped = true;
        // Background children of the test would otherwise outlive it.
        self.kill_group();
        Ok(status.into())
    }

    #[cfg(unix)]
    fn kill_group(&self) {
        if let Some(pgid) = self.pgid {
            // SAFETY: killpg only sends a signal; ESRCH for an empty group is harmless.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}
}

#[cfg(unix)]
fn isolate(cmd: &mut tokio::process::Command) {
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut tokio::process::Command) {}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if !self.reaped {
            tracing::debug!(pgid = ?self.pgid, "killing unfinished process group");
            self.kill_group();
        }
    }
}

/// Runs cells as real subprocesses.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubprocessLauncher;

#[async_trait]
impl CellLauncher for SubprocessLauncher {
    async fn launch(&self, request: LaunchRequest) -> io::Result<ProcessExit> {
        let stdout = request.log.try_clone()?;

        let mut cmd = tokio::process::Command::new(&request.program);
        cmd.args(&request.args)
            .current_dir(&request.cwd)
            .env_clear()
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(request.log));

        let mut group = ProcessGroup::spawn(cmd)?;
        group.wait().await
    }
}
