// src/commands/clean.rs

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::path::Path;

use crate::infra::fs::{matching_dirs, remove_dirs};
use crate::t;

/// Removes output directories in the current directory matching `pattern`.
pub fn execute(pattern: &str, assume_yes: bool, locale: &str) -> Result<()> {
    let dirs = matching_dirs(Path::new("."), pattern)?;
    if dirs.is_empty() {
        println!("{}", t!("clean.nothing", locale = locale, pattern = pattern).green());
        return Ok(());
    }

    println!("{}", t!("clean.found", locale = locale, count = dirs.len()).yellow());
    for dir in &dirs {
        println!("  - {}", dir.display());
    }

    if !assume_yes {
        let confirmation = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(t!("clean.prompt", locale = locale, count = dirs.len()))
            .default(false)
            .interact()
            .context(t!("clean.confirmation_failed", locale = locale).to_string())?;
        if !confirmation {
            println!("{}", t!("clean.aborted", locale = locale));
            return Ok(());
        }
    }

    remove_dirs(&dirs)?;
    println!(
        "{} {}",
        "✔".green(),
        t!("clean.removed", locale = locale, count = dirs.len()).bold()
    );
    Ok(())
}
