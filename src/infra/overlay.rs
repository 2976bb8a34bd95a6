//! # Library Overlay / 动态库覆盖层
//!
//! Exposes chosen shared libraries to the tests through a private directory
//! of symlinks prepended to the library search path. Nothing outside that
//! directory is touched, and the directory is removed when the guard drops,
//! on every exit path.
//!
//! 通过一个私有符号链接目录（预置到库搜索路径）向测试暴露指定的共享库。
//! 该目录之外的任何内容都不会被修改，守卫被丢弃时目录会被删除。

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::core::config::OverlaySettings;
use crate::core::environment::BaseEnvironment;
use crate::error::EngineFatalError;

/// Scoped ownership of the overlay directory.
#[derive(Debug)]
pub struct LibraryOverlay {
    dir: TempDir,
    search_path_var: String,
    preload: Vec<PathBuf>,
}

impl LibraryOverlay {
    /// Builds the overlay, or returns `None` if no libraries are configured.
    pub fn acquire(settings: &OverlaySettings) -> Result<Option<Self>, EngineFatalError> {
        if settings.libraries.is_empty() {
            return Ok(None);
        }

        let dir = tempfile::Builder::new()
            .prefix("kmr_overlay_")
            .tempdir()
            .map_err(|e| EngineFatalError::Overlay(format!("cannot create directory: {e}")))?;

        let mut preload = Vec::new();
        for library in &settings.libraries {
            let source = PathBuf::from(
                shellexpand::full(&library.source)
                    .map_err(|e| EngineFatalError::Overlay(e.to_string()))?
                    .as_ref(),
            );
            if !source.exists() {
                return Err(EngineFatalError::Overlay(format!(
                    "library {} does not exist",
                    source.display()
                )));
            }
            let alias = match &library.alias {
                Some(alias) => alias.clone(),
                None => source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| {
                        EngineFatalError::Overlay(format!("{} has no file name", source.display()))
                    })?,
            };
            let link = dir.path().join(&alias);
            link_library(&source, &link)
                .map_err(|e| EngineFatalError::Overlay(format!("cannot link {alias}: {e}")))?;
            tracing::info!(source = %source.display(), alias = %alias, "library overlaid");
            preload.push(link);
        }

        Ok(Some(Self {
            dir,
            search_path_var: settings.search_path_var.clone(),
            preload: if settings.preload { preload } else { Vec::new() },
        }))
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Layers the overlay onto a base environment.
    pub fn apply(&self, env: BaseEnvironment) -> BaseEnvironment {
        let dir = self.dir.path().to_string_lossy().into_owned();
        let mut env = env.with_path_prefix(&self.search_path_var, &dir);
        for library in self.preload.iter().rev() {
            env = env.with_path_prefix("LD_PRELOAD", &library.to_string_lossy());
        }
        env
    }
}

#[cfg(unix)]
fn link_library(source: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, link)
}

#[cfg(not(unix))]
fn link_library(source: &Path, link: &Path) -> std::io::Result<()> {
    std::fs::copy(source, link).map(|_| ())
}
