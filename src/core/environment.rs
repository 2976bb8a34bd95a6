//! # Base Environment / 基础环境
//!
//! The environment every test process starts from. It is captured once per
//! run and shared read-only; each cell layers its own bindings onto a private
//! copy, so no cell can observe another cell's overlay and the harness never
//! mutates its own process environment.
//!
//! 每个测试进程的起始环境。每次运行只捕获一次并以只读方式共享；每个单元在
//! 私有副本上叠加自己的绑定，因此单元之间互不可见，且框架从不修改自身进程环境。

use std::collections::BTreeMap;
use std::path::Path;

use crate::core::matrix::EnvConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseEnvironment {
    vars: BTreeMap<String, String>,
}

impl BaseEnvironment {
    /// Snapshot of the current process environment.
    pub fn capture() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Sets (or replaces) a binding.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Prepends `entry` to a `:`-separated search path variable.
    pub fn with_path_prefix(mut self, key: &str, entry: &str) -> Self {
        let value = match self.vars.get(key).filter(|v| !v.is_empty()) {
            Some(existing) => format!("{entry}:{existing}"),
            None => entry.to_string(),
        };
        self.vars.insert(key.to_string(), value);
        self
    }

    /// Puts the project root on `PYTHONPATH` so the profiler plugins resolve.
    pub fn with_project_root(self, root: &Path) -> Self {
        let root = root.to_string_lossy().into_owned();
        self.with_path_prefix("PYTHONPATH", &root)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// A private copy of the base with the configuration's bindings applied.
    pub fn overlay(&self, config: &EnvConfig) -> BTreeMap<String, String> {
        let mut env = self.vars.clone();
        for (key, value) in config.bindings() {
            env.insert((*key).to_string(), (*value).to_string());
        }
        env
    }
}
