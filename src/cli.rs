// src/cli.rs
use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::{env, path::PathBuf};

use crate::commands::{self, analyze::AnalyzeArgs, run::RunArgs};
use crate::core::config::DEFAULT_SETTINGS_FILE;
use crate::t;

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for a `--lang <VALUE>` argument.
fn pre_parse_language() -> (String, bool) {
    let args: Vec<String> = env::args().collect();
    if let Some(pos) = args.iter().position(|arg| arg == "--lang") {
        if let Some(lang) = args.get(pos + 1) {
            return (lang.clone(), true);
        }
    }
    if let Some(lang) = args.iter().find_map(|arg| arg.strip_prefix("--lang=")) {
        return (lang.to_string(), true);
    }
    (crate::detect_locale(), false)
}

fn build_cli(locale: &str) -> Command {
    Command::new("kernel-matrix-runner")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli.about", locale = locale).to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli.lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cli.run_about", locale = locale).to_string())
                .arg(
                    Arg::new("repos")
                        .long("repos")
                        .help(t!("cli.arg_repos", locale = locale).to_string())
                        .value_name("REPOS")
                        .default_value("all")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("config-groups")
                        .long("config-groups")
                        .help(t!("cli.arg_config_groups", locale = locale).to_string())
                        .value_name("GROUPS")
                        .value_delimiter(',')
                        .required(true)
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("output-dir")
                        .short('o')
                        .long("output-dir")
                        .help(t!("cli.arg_output_dir", locale = locale).to_string())
                        .value_name("OUTPUT_DIR")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("settings")
                        .short('s')
                        .long("settings")
                        .help(t!("cli.arg_settings", locale = locale).to_string())
                        .value_name("SETTINGS")
                        .default_value(DEFAULT_SETTINGS_FILE)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("whitelist")
                        .long("whitelist")
                        .help(t!("cli.arg_whitelist", locale = locale).to_string())
                        .value_name("FILE")
                        .value_parser(clap::value_parser!(PathBuf))
                        .requires("whitelist-repo")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("whitelist-repo")
                        .long("whitelist-repo")
                        .help(t!("cli.arg_whitelist_repo", locale = locale).to_string())
                        .value_name("REPO")
                        .requires("whitelist")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("timeout")
                        .short('t')
                        .long("timeout")
                        .help(t!("cli.arg_timeout", locale = locale).to_string())
                        .value_name("SECONDS")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .help(t!("cli.arg_jobs", locale = locale).to_string())
                        .value_name("JOBS")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("analyze")
                .about(t!("cli.analyze_about", locale = locale).to_string())
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .help(t!("cli.arg_input", locale = locale).to_string())
                        .value_name("RESULTS_CSV")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help(t!("cli.arg_output", locale = locale).to_string())
                        .value_name("REPORT_JSON")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("baseline")
                        .long("baseline")
                        .help(t!("cli.arg_baseline", locale = locale).to_string())
                        .value_name("LABEL")
                        .requires("compare")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("compare")
                        .long("compare")
                        .help(t!("cli.arg_compare", locale = locale).to_string())
                        .value_name("LABELS")
                        .value_delimiter(',')
                        .requires("baseline")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("measure")
                        .long("measure")
                        .help(t!("cli.arg_measure", locale = locale).to_string())
                        .value_name("MEASURE")
                        .value_parser(["metric", "duration", "max_rss"])
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(Command::new("list").about(t!("cli.list_about", locale = locale).to_string()))
        .subcommand(
            Command::new("clean")
                .about(t!("cli.clean_about", locale = locale).to_string())
                .arg(
                    Arg::new("pattern")
                        .long("pattern")
                        .help(t!("cli.arg_pattern", locale = locale).to_string())
                        .value_name("PATTERN")
                        .default_value("test_outputs*")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("yes")
                        .short('y')
                        .long("yes")
                        .help(t!("cli.arg_yes", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("init")
                .about(t!("cli.init_about", locale = locale).to_string())
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("cli.arg_non_interactive", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

pub async fn run() -> Result<()> {
    // Pre-parse language and initialize i18n first.
    let (language, explicit) = pre_parse_language();
    rust_i18n::set_locale(&language);

    let matches = build_cli(&language).get_matches();
    let language_override = explicit.then(|| language.clone());

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let args = RunArgs {
                repos: run_matches
                    .get_one::<String>("repos")
                    .cloned()
                    .unwrap_or_else(|| "all".to_string()),
                config_groups: run_matches
                    .get_many::<String>("config-groups")
                    .map(|groups| groups.cloned().collect())
                    .unwrap_or_default(),
                output_dir: run_matches.get_one::<PathBuf>("output-dir").cloned(),
                settings: run_matches
                    .get_one::<PathBuf>("settings")
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE)),
                whitelist: run_matches.get_one::<PathBuf>("whitelist").cloned(),
                whitelist_repo: run_matches.get_one::<String>("whitelist-repo").cloned(),
                timeout_secs: run_matches.get_one::<u64>("timeout").copied(),
                jobs: run_matches.get_one::<usize>("jobs").copied(),
                language: language_override,
            };
            commands::run::execute(args).await?;
        }
        Some(("analyze", analyze_matches)) => {
            let args = AnalyzeArgs {
                input: analyze_matches
                    .get_one::<PathBuf>("input")
                    .cloned()
                    .unwrap_or_default(),
                output: analyze_matches.get_one::<PathBuf>("output").cloned(),
                baseline: analyze_matches.get_one::<String>("baseline").cloned(),
                compare: analyze_matches
                    .get_many::<String>("compare")
                    .map(|labels| labels.cloned().collect())
                    .unwrap_or_default(),
                measure: analyze_matches.get_one::<String>("measure").cloned(),
            };
            commands::analyze::execute(args, &language)?;
        }
        Some(("list", _)) => {
            commands::list::execute(&language);
        }
        Some(("clean", clean_matches)) => {
            let pattern = clean_matches
                .get_one::<String>("pattern")
                .cloned()
                .unwrap_or_else(|| "test_outputs*".to_string());
            commands::clean::execute(&pattern, clean_matches.get_flag("yes"), &language)?;
        }
        Some(("init", init_matches)) => {
            let non_interactive = init_matches.get_flag("non-interactive");

            // Show language detection message if it was auto-detected
            if !explicit {
                println!(
                    "🌐 {}",
                    t!("init.language_detected", locale = &language, lang = &language)
                );
            }
            commands::init::run_init_wizard(&language, non_interactive)?;
        }
        _ => {
            // Clap has already printed help for a missing subcommand.
        }
    }
    Ok(())
}
