//! # Whitelist Loader / 白名单加载器
//!
//! Reads the optional per-repository allow-list `<repo>_whitelist.txt`.
//! A missing file is not an error: it means "no restriction".
//!
//! 读取可选的每仓库白名单 `<repo>_whitelist.txt`。文件不存在不是错误，表示“不限制”。

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::core::models::Repository;
use crate::error::ConfigError;

/// A set of test identifiers restricting what discovery yields.
///
/// Entries are either `<file stem>::<function>` or a bare `<file stem>`; a bare
/// stem selects every test of that file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    entries: BTreeSet<String>,
}

impl Whitelist {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Whether a test in `file_stem` (optionally a single `function`) is allowed.
    pub fn allows(&self, file_stem: &str, function: Option<&str>) -> bool {
        if self.entries.contains(file_stem) {
            return true;
        }
        match function {
            Some(function) => self.entries.contains(&format!("{file_stem}::{function}")),
            None => false,
        }
    }
}

/// Path of the conventional whitelist file for `repo` inside `dir`.
pub fn whitelist_path(dir: &Path, repo: Repository) -> PathBuf {
    dir.join(repo.whitelist_file_name())
}

/// Loads `<dir>/<repo>_whitelist.txt` if it exists.
pub fn load_whitelist(dir: &Path, repo: Repository) -> Result<Option<Whitelist>, ConfigError> {
    load_whitelist_file(&whitelist_path(dir, repo), repo)
}

/// Loads a whitelist from an explicit path.
///
/// Returns `Ok(None)` when the file does not exist or lists no entries.
/// Blank lines and `#` comments are skipped.
pub fn load_whitelist_file(path: &Path, repo: Repository) -> Result<Option<Whitelist>, ConfigError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let content = String::from_utf8(bytes).map_err(|_| ConfigError::WhitelistEncoding {
        path: path.to_path_buf(),
    })?;

    let mut entries = BTreeSet::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = parse_entry(line, repo).map_err(|reason| ConfigError::MalformedWhitelist {
            path: path.to_path_buf(),
            line: index + 1,
            reason,
        })?;
        entries.insert(entry);
    }

    if entries.is_empty() {
        tracing::debug!(path = %path.display(), "whitelist has no entries, treating as absent");
        return Ok(None);
    }
    Ok(Some(Whitelist { entries }))
}

fn parse_entry(line: &str, repo: Repository) -> Result<String, String> {
    let parts: Vec<&str> = line.split("::").collect();
    let file = parts[0].trim();
    if file.is_empty() {
        return Err("missing file name".to_string());
    }
    let stem = Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| format!("cannot derive a file name from '{file}'"))?;

    match parts.as_slice() {
        [_] => Ok(stem),
        // TritonBench runs whole files; a function suffix is ignored.
        [_, _] if !repo.is_pytest() => Ok(stem),
        [_, function] => {
            let function = function.trim();
            if function.is_empty() {
                Err("empty test function after '::'".to_string())
            } else {
                Ok(format!("{stem}::{function}"))
            }
        }
        _ => Err(format!("expected '<file>::<function>', found '{line}'")),
    }
}
