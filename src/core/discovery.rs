//! # Test Discovery / 测试发现
//!
//! Enumerates the tests of a repository in suite-native order (sorted file
//! order, then declaration order inside a file), filtered by an optional
//! whitelist. The whitelist is a filter only and never reorders tests.
//!
//! 按套件原生顺序（文件排序后再按文件内声明顺序）枚举仓库中的测试，并可选地
//! 通过白名单过滤。白名单只做过滤，不会重新排序。

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::models::{Repository, TestCase};
use crate::core::whitelist::Whitelist;

/// Benchmark roots scanned inside the TritonBench checkout.
pub const TRITONBENCH_DIRS: [&str; 3] = ["data/TritonBench_G_v1", "LLM_generated", "EVAL"];

/// Discovery rule for one repository.
///
/// `tests()` returns a fresh iterator on every call, so the sequence can be
/// restarted; files are read lazily as the iterator advances.
#[derive(Debug, Clone)]
pub struct Discovery {
    repository: Repository,
    test_dir: PathBuf,
    whitelist: Option<Whitelist>,
}

impl Discovery {
    pub fn new(repository: Repository, test_dir: PathBuf, whitelist: Option<Whitelist>) -> Self {
        Self {
            repository,
            test_dir,
            whitelist,
        }
    }

    pub fn repository(&self) -> Repository {
        self.repository
    }

    pub fn test_dir(&self) -> &Path {
        &self.test_dir
    }

    pub fn whitelist(&self) -> Option<&Whitelist> {
        self.whitelist.as_ref()
    }

    /// Test files of the suite in sorted order. Empty if the test directory is missing.
    pub fn test_files(&self) -> Vec<PathBuf> {
        if !self.test_dir.is_dir() {
            tracing::warn!(
                repository = %self.repository,
                dir = %self.test_dir.display(),
                "test directory does not exist"
            );
            return Vec::new();
        }

        let mut files = Vec::new();
        if self.repository.is_pytest() {
            if let Ok(entries) = fs::read_dir(&self.test_dir) {
                files.extend(
                    entries
                        .filter_map(Result::ok)
                        .map(|entry| entry.path())
                        .filter(|path| path.is_file() && is_pytest_file(path)),
                );
            }
        } else {
            for dir in TRITONBENCH_DIRS {
                collect_python_files(&self.test_dir.join(dir), &mut files);
            }
        }
        files.sort();
        files
    }

    /// Every test the suite would run, before whitelist filtering. No ordinals.
    fn candidates(&self) -> impl Iterator<Item = (PathBuf, Option<String>)> + '_ {
        let repository = self.repository;
        self.test_files().into_iter().flat_map(move |file| {
            let functions = if repository.is_pytest() {
                test_functions(&file)
            } else {
                Vec::new()
            };
            if functions.is_empty() {
                vec![(file, None)]
            } else {
                functions
                    .into_iter()
                    .map(|function| (file.clone(), Some(function)))
                    .collect()
            }
        })
    }

    /// The tests to run, whitelist applied, with ordinals counted from 0.
    pub fn tests(&self) -> impl Iterator<Item = TestCase> + '_ {
        let repository = self.repository;
        self.candidates()
            .filter(move |(file, function)| match &self.whitelist {
                Some(whitelist) => whitelist.allows(&stem_of(file), function.as_deref()),
                None => true,
            })
            .enumerate()
            .map(move |(ordinal, (file, function))| {
                let stem = stem_of(&file);
                let id = match &function {
                    Some(function) => format!("{stem}::{function}"),
                    None => stem,
                };
                TestCase {
                    repository,
                    id,
                    file,
                    function,
                    ordinal,
                }
            })
    }

    /// Number of candidate tests removed by the whitelist.
    pub fn excluded_count(&self) -> usize {
        match &self.whitelist {
            Some(_) => self.candidates().count() - self.tests().count(),
            None => 0,
        }
    }
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_pytest_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.starts_with("test_") && name.ends_with(".py")
}

fn collect_python_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            if name != "__pycache__" {
                collect_python_files(&path, out);
            }
        } else if name.ends_with(".py") && !name.starts_with("__") {
            out.push(path);
        }
    }
}

/// Names of the `def test_*` functions of a Python file, in declaration order.
/// A file that cannot be read yields no functions and is run as a whole.
pub fn test_functions(file: &Path) -> Vec<String> {
    let source = match fs::read_to_string(file) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!(file = %file.display(), error = %e, "could not scan test functions");
            return Vec::new();
        }
    };

    let mut functions: Vec<String> = Vec::new();
    for line in source.lines() {
        let Some(rest) = line.trim_start().strip_prefix("def ") else {
            continue;
        };
        let name: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if name.starts_with("test_") && !functions.contains(&name) {
            functions.push(name);
        }
    }
    functions
}
