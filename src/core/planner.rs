//! # Execution Planner Module / 执行计划模块
//!
//! Crosses the configuration matrix with the discovered tests.
//!
//! 将配置矩阵与发现的测试做笛卡尔积。

use std::path::Path;

use crate::core::discovery::Discovery;
use crate::core::matrix::ConfigMatrix;
use crate::core::models::{ExecutionCell, Repository, TestCase};
use crate::infra::fs::{cell_log_path, test_number};

/// Per-repository counts of the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryPlan {
    pub repository: Repository,
    pub tests: usize,
    /// Tests the whitelist removed. They never become cells.
    pub excluded: usize,
    pub whitelisted: bool,
}

/// The complete grid of a run.
/// 一次运行的完整网格。
#[derive(Debug)]
pub struct ExecutionPlan {
    /// Cells grouped by configuration, then by repository and test ordinal.
    pub cells: Vec<ExecutionCell>,
    pub repositories: Vec<RepositoryPlan>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn excluded(&self) -> usize {
        self.repositories.iter().map(|r| r.excluded).sum()
    }
}

/// Builds every cell of `matrix × discoveries`.
///
/// Discovery runs once per repository; the resulting tests are reused for
/// every column so all columns see the same ordinals.
pub fn plan_execution(matrix: &ConfigMatrix, discoveries: &[Discovery], output_dir: &Path) -> ExecutionPlan {
    let mut suites: Vec<(Vec<TestCase>, RepositoryPlan)> = Vec::new();
    for discovery in discoveries {
        let tests: Vec<TestCase> = discovery.tests().collect();
        let plan = RepositoryPlan {
            repository: discovery.repository(),
            tests: tests.len(),
            excluded: discovery.excluded_count(),
            whitelisted: discovery.whitelist().is_some(),
        };
        tracing::info!(
            repository = %plan.repository,
            tests = plan.tests,
            excluded = plan.excluded,
            "discovered tests"
        );
        suites.push((tests, plan));
    }

    let mut cells = Vec::new();
    for (column, config) in matrix.columns().iter().enumerate() {
        for (tests, _) in &suites {
            for test in tests {
                let number = test_number(test.ordinal, tests.len());
                cells.push(ExecutionCell {
                    test: test.clone(),
                    config: *config,
                    column,
                    log_path: cell_log_path(output_dir, config, test, &number),
                    test_number: number,
                });
            }
        }
    }

    ExecutionPlan {
        cells,
        repositories: suites.into_iter().map(|(_, plan)| plan).collect(),
    }
}
