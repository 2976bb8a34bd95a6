//! # File System Operations Module / 文件系统操作模块
//!
//! Output layout, deterministic log file names, atomic writes and cleanup
//! of generated output directories.
//!
//! 输出目录布局、确定性的日志文件名、原子写入以及生成目录的清理。

use anyhow::{Context, Result};
use fs_extra::remove_items;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::matrix::EnvConfig;
use crate::core::models::TestCase;
use crate::error::EngineFatalError;

/// Replaces every character that is not safe in a file name with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Zero-padded test number, as wide as the number of tests in the repository.
pub fn test_number(ordinal: usize, total: usize) -> String {
    let width = total.max(1).to_string().len();
    format!("{:0width$}", ordinal + 1, width = width)
}

/// `<output>/<group>/<config name>/<number>_<repo>_<test id>.log`
///
/// The number, repository and test id make the name unique within a config
/// directory, and the config directory is unique per label.
pub fn cell_log_path(output_dir: &Path, config: &EnvConfig, test: &TestCase, number: &str) -> PathBuf {
    output_dir
        .join(config.group())
        .join(config.name())
        .join(format!(
            "{}_{}_{}.log",
            number,
            test.repository,
            sanitize(&test.id)
        ))
}

/// Creates the output directory (and parents).
pub fn ensure_dir(path: &Path) -> Result<(), EngineFatalError> {
    fs::create_dir_all(path).map_err(|source| EngineFatalError::OutputDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `contents` to `path` through a temporary file in the same
/// directory, so readers never see a half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".kmr_")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    temp.write_all(contents)?;
    temp.flush()?;
    temp.persist(path)
        .with_context(|| format!("Failed to move result into {}", path.display()))?;
    Ok(())
}

/// Matches `name` against a pattern where `*` is any run and `?` any single character.
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, n));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            n = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

/// Directories directly inside `base` whose name matches `pattern`, sorted.
pub fn matching_dirs(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(base)
        .with_context(|| format!("Failed to list {}", base.display()))?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter(|entry| matches_pattern(pattern, &entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Removes the given directories.
pub fn remove_dirs(dirs: &[PathBuf]) -> Result<()> {
    remove_items(dirs).map_err(|e| anyhow::anyhow!("Failed to remove directories: {e}"))?;
    Ok(())
}
