//! # Settings Initialization Module / 设置初始化模块
//!
//! Writes a `Harness.toml` settings file, either with defaults or through a
//! short interactive wizard.
//!
//! 写入 `Harness.toml` 设置文件，使用默认值或通过简短的交互式向导。

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, MultiSelect};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::core::config::{RepositorySettings, Settings, DEFAULT_SETTINGS_FILE};
use crate::core::models::Repository;
use crate::t;

/// Runs the interactive wizard to generate a `Harness.toml` file.
///
/// 运行交互式向导以生成 `Harness.toml` 文件。
pub fn run_init_wizard(language: &str, non_interactive: bool) -> Result<()> {
    let config_path = Path::new(DEFAULT_SETTINGS_FILE);
    let theme = ColorfulTheme::default();

    if !non_interactive {
        println!("\n{}", t!("init.welcome", locale = language).cyan().bold());
        println!("{}", t!("init.description", locale = language));
    }

    if config_path.exists() && !non_interactive {
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(t!("init.overwrite_prompt", locale = language, path = config_path.display()))
            .default(false)
            .interact()
            .context(t!("init.confirmation_failed", locale = language).to_string())?;
        if !confirmation {
            println!("{}", t!("init.aborted", locale = language));
            return Ok(());
        }
    }

    let mut settings = Settings {
        language: Some(language.to_string()),
        ..Settings::default()
    };

    if non_interactive {
        return write_settings(config_path, &settings, language);
    }

    settings.project_root = Input::with_theme(&theme)
        .with_prompt(t!("init.project_root_prompt", locale = language))
        .default(settings.project_root.clone())
        .interact_text()?;
    settings.output_dir = Input::with_theme(&theme)
        .with_prompt(t!("init.output_dir_prompt", locale = language))
        .default(settings.output_dir.clone())
        .interact_text()?;
    settings.timeout_secs = Input::with_theme(&theme)
        .with_prompt(t!("init.timeout_prompt", locale = language))
        .default(settings.timeout_secs)
        .validate_with(|value: &u64| {
            if *value > 0 {
                Ok(())
            } else {
                Err(t!("init.timeout_invalid", locale = language).to_string())
            }
        })
        .interact_text()?;

    let names: Vec<&str> = Repository::ALL.iter().map(Repository::as_str).collect();
    let selections = MultiSelect::with_theme(&theme)
        .with_prompt(t!("init.repositories_prompt", locale = language))
        .items(&names)
        .interact()
        .context(t!("init.confirmation_failed", locale = language).to_string())?;

    settings.repositories = selections
        .into_iter()
        .map(|i| {
            let repo = Repository::ALL[i];
            (
                repo.as_str().to_string(),
                RepositorySettings {
                    test_dir: Some(repo.default_test_dir().to_string()),
                    command: Some(repo.default_command().to_string()),
                },
            )
        })
        .collect::<BTreeMap<_, _>>();

    write_settings(config_path, &settings, language)
}

fn write_settings(path: &Path, settings: &Settings, language: &str) -> Result<()> {
    let toml_string = toml::to_string_pretty(settings)
        .context(t!("init.serialize_failed", locale = language).to_string())?;

    fs::write(path, toml_string)
        .with_context(|| t!("init.write_failed", locale = language, path = path.display()).to_string())?;

    println!(
        "\n{} {}",
        "✔".green(),
        t!("init.success", locale = language, path = path.display()).bold()
    );
    println!("{}", t!("init.usage_hint", locale = language));

    Ok(())
}
