//! # Result Aggregator / 结果聚合器
//!
//! Outcomes arrive in completion order; the table is ordered by row key only
//! when it is frozen. Appending is the one shared mutable operation of a run,
//! so it sits behind a mutex and never reorders or rewrites existing entries.
//!
//! 结果按完成顺序到达；只有在冻结时才按行键排序。追加是运行中唯一的共享可变
//! 操作，因此由互斥锁保护，且从不重排或改写已有条目。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::core::matrix::label_rank;
use crate::core::models::{Outcome, OutcomeStatus, Repository, RowKey};

/// Append-only collector of outcomes.
#[derive(Debug, Default)]
pub struct Aggregator {
    outcomes: Mutex<Vec<Outcome>>,
    labels: Vec<&'static str>,
}

impl Aggregator {
    /// `labels` are the matrix columns in declaration order.
    pub fn new(labels: Vec<&'static str>) -> Self {
        Self {
            outcomes: Mutex::new(Vec::new()),
            labels,
        }
    }

    pub fn append(&self, outcome: Outcome) {
        // A poisoned lock still holds every completed row.
        let mut outcomes = match self.outcomes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        outcomes.push(outcome);
    }

    pub fn len(&self) -> usize {
        match self.outcomes.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freezes a snapshot of what has been collected so far.
    ///
    /// Can be called at any point: a partial run yields a shorter, still
    /// well-formed table.
    pub fn finalize(&self) -> ResultTable {
        let mut outcomes = match self.outcomes.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        outcomes.sort_by_key(|outcome| outcome.key);
        ResultTable {
            labels: self.labels.iter().map(|label| label.to_string()).collect(),
            rows: outcomes.iter().map(ResultRow::from).collect(),
        }
    }
}

/// One row of the long result table; also the CSV record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub ordinal: usize,
    pub repository: Repository,
    pub test_id: String,
    pub config_label: String,
    pub status: OutcomeStatus,
    pub exit_code: Option<i32>,
    pub duration_secs: f64,
    pub metric: Option<f64>,
    pub max_rss_kb: Option<u64>,
}

impl From<&Outcome> for ResultRow {
    fn from(outcome: &Outcome) -> Self {
        Self {
            ordinal: outcome.key.ordinal,
            repository: outcome.key.repository,
            test_id: outcome.test_id.clone(),
            config_label: outcome.config_label.to_string(),
            status: outcome.status,
            exit_code: outcome.exit_code,
            duration_secs: outcome.duration.as_secs_f64(),
            metric: outcome.metric,
            max_rss_kb: outcome.max_rss_kb,
        }
    }
}

impl ResultRow {
    pub fn succeeded(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

/// The frozen, ordered table of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    /// Column labels in declaration order.
    pub labels: Vec<String>,
    pub rows: Vec<ResultRow>,
}

/// One test with its cells laid out by column.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow<'a> {
    pub repository: Repository,
    pub ordinal: usize,
    pub test_id: &'a str,
    /// Indexed like [`ResultTable::labels`].
    pub cells: Vec<Option<&'a ResultRow>>,
}

impl ResultTable {
    /// Rebuilds a table from rows read back from disk, restoring the order.
    ///
    /// Known labels are put back in registry declaration order, so a partial
    /// table where a later column finished first still reads back correctly.
    /// Labels the registry does not know follow in first-seen order.
    pub fn from_rows(mut rows: Vec<ResultRow>) -> Self {
        let mut labels: Vec<String> = Vec::new();
        for row in &rows {
            if !labels.contains(&row.config_label) {
                labels.push(row.config_label.clone());
            }
        }
        // Stable, so unknown labels keep their first-seen order.
        labels.sort_by_key(|label| label_rank(label).unwrap_or(usize::MAX));
        let column = |label: &str| labels.iter().position(|l| l == label).unwrap_or(usize::MAX);
        rows.sort_by_key(|row| RowKey {
            repository: row.repository,
            ordinal: row.ordinal,
            column: column(&row.config_label),
        });
        Self { labels, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column index of a label.
    pub fn column(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn has_labels(&self, labels: &[&str]) -> bool {
        labels.iter().all(|label| self.column(label).is_some())
    }

    /// One row per test, in row order.
    pub fn pivot(&self) -> Vec<PivotRow<'_>> {
        let mut tests: BTreeMap<(Repository, usize), PivotRow<'_>> = BTreeMap::new();
        for row in &self.rows {
            let entry = tests
                .entry((row.repository, row.ordinal))
                .or_insert_with(|| PivotRow {
                    repository: row.repository,
                    ordinal: row.ordinal,
                    test_id: &row.test_id,
                    cells: vec![None; self.labels.len()],
                });
            if let Some(column) = self.column(&row.config_label) {
                entry.cells[column] = Some(row);
            }
        }
        tests.into_values().collect()
    }

    /// Repositories present in the table.
    pub fn repositories(&self) -> BTreeSet<Repository> {
        self.rows.iter().map(|row| row.repository).collect()
    }
}
