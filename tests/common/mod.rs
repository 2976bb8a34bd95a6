// Shared test helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};

use kernel_matrix_runner::core::execution::CellLauncher;
use kernel_matrix_runner::infra::command::{LaunchRequest, ProcessExit};

/// What a fake test process does.
#[derive(Debug, Clone)]
pub struct Script {
    pub output: String,
    pub delay: Duration,
    /// `None` simulates a spawn failure.
    pub exit: Option<ProcessExit>,
}

impl Script {
    pub fn pass(output: &str) -> Self {
        Self {
            output: output.to_string(),
            delay: Duration::ZERO,
            exit: Some(ProcessExit::code(0)),
        }
    }

    pub fn exit(code: i32) -> Self {
        Self {
            output: String::new(),
            delay: Duration::ZERO,
            exit: Some(ProcessExit::code(code)),
        }
    }

    pub fn spawn_failure() -> Self {
        Self {
            output: String::new(),
            delay: Duration::ZERO,
            exit: None,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A launch as the fake saw it.
#[derive(Debug, Clone)]
pub struct Launched {
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

type Behaviour = dyn Fn(&LaunchRequest) -> Script + Send + Sync;

/// A launcher that never starts a process: it writes the scripted output into
/// the cell log, waits for the scripted delay and returns the scripted exit.
#[derive(Clone)]
pub struct FakeLauncher {
    behaviour: Arc<Behaviour>,
    launched: Arc<Mutex<Vec<Launched>>>,
}

impl FakeLauncher {
    pub fn new(behaviour: impl Fn(&LaunchRequest) -> Script + Send + Sync + 'static) -> Self {
        Self {
            behaviour: Arc::new(behaviour),
            launched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn passing() -> Self {
        Self::new(|_| Script::pass(""))
    }

    pub fn launched(&self) -> Vec<Launched> {
        self.launched.lock().unwrap().clone()
    }
}

#[async_trait]
impl CellLauncher for FakeLauncher {
    async fn launch(&self, request: LaunchRequest) -> io::Result<ProcessExit> {
        let script = (self.behaviour)(&request);
        let mut argv = vec![request.program.clone()];
        argv.extend(request.args.iter().cloned());
        self.launched.lock().unwrap().push(Launched {
            argv,
            cwd: request.cwd.clone(),
            env: request.env.clone(),
        });

        let mut log = request.log;
        log.write_all(script.output.as_bytes())?;
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        script
            .exit
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such program"))
    }
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// A pytest file declaring the given test functions.
pub fn pytest_source(functions: &[&str]) -> String {
    let mut source = String::from("import pytest\n\n");
    for function in functions {
        source.push_str(&format!("def {function}():\n    assert True\n\n"));
    }
    source
}

/// A project root with the default FlagGems and TritonBench layouts.
///
/// FlagGems: `test_add.py` (2 tests) and `test_mul.py` (1 test).
/// TritonBench: `data/TritonBench_G_v1/{a_kernel,b_kernel}.py` and `EVAL/c_kernel.py`.
pub fn setup_project() -> TempDir {
    let root = tempdir().expect("Failed to create temporary directory");
    let gems = root.path().join("submodules/FlagGems/tests");
    write_file(
        &gems.join("test_add.py"),
        &pytest_source(&["test_accuracy_add", "test_accuracy_add_scalar"]),
    );
    write_file(&gems.join("test_mul.py"), &pytest_source(&["test_accuracy_mul"]));
    write_file(&gems.join("conftest.py"), "import pytest\n");

    let bench = root.path().join("submodules/TritonBench");
    write_file(&bench.join("data/TritonBench_G_v1/b_kernel.py"), "print('b')\n");
    write_file(&bench.join("data/TritonBench_G_v1/a_kernel.py"), "print('a')\n");
    write_file(&bench.join("EVAL/c_kernel.py"), "print('c')\n");
    write_file(&bench.join("EVAL/__init__.py"), "");
    root
}

/// Absolute test directory of a repository inside a [`setup_project`] root.
pub fn gems_dir(root: &Path) -> PathBuf {
    root.join("submodules/FlagGems/tests")
}

pub fn bench_dir(root: &Path) -> PathBuf {
    root.join("submodules/TritonBench")
}
