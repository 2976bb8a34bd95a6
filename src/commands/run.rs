// src/commands/run.rs

use anyhow::Result;
use chrono::Local;
use colored::*;
use std::path::{Path, PathBuf};
#[cfg(not(unix))]
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        aggregator::{Aggregator, ResultTable},
        analysis::{analyze, Comparison},
        config::{load_settings, Settings},
        discovery::Discovery,
        environment::BaseEnvironment,
        execution::{Engine, SuiteCommand},
        matrix::{build_matrix, ABLATION_LABELS},
        models::Repository,
        planner::plan_execution,
        whitelist::{load_whitelist, load_whitelist_file},
    },
    error::{ConfigError, EngineFatalError, HarnessError},
    infra::{command::SubprocessLauncher, fs::ensure_dir, overlay::LibraryOverlay},
    reporting::{print_summary, write_analysis, write_table, write_wide_table},
    t,
};

/// Arguments of the `run` command.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub repos: String,
    pub config_groups: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub settings: PathBuf,
    pub whitelist: Option<PathBuf>,
    pub whitelist_repo: Option<String>,
    pub timeout_secs: Option<u64>,
    pub jobs: Option<usize>,
    pub language: Option<String>,
}

/// Paths of the files a run produced.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub table: PathBuf,
    pub wide_table: PathBuf,
    pub ablation_report: Option<PathBuf>,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let mut settings = load_settings(&args.settings).map_err(HarnessError::from)?;
    apply_overrides(&mut settings, &args);
    settings.validate().map_err(HarnessError::from)?;

    let locale = args
        .language
        .clone()
        .or_else(|| settings.language.clone())
        .unwrap_or_else(|| rust_i18n::locale().to_string());
    rust_i18n::set_locale(&locale);

    // Everything that can make the grid undefined is resolved before any cell runs.
    let matrix = build_matrix(&args.config_groups).map_err(HarnessError::from)?;
    let repositories = Repository::parse_list(&args.repos).map_err(HarnessError::from)?;
    let discoveries = discover(&settings, &repositories, &args).map_err(HarnessError::from)?;
    let project_root = settings.project_root().map_err(HarnessError::from)?;
    let suites = repositories
        .iter()
        .map(|repo| {
            Ok((
                *repo,
                SuiteCommand {
                    command: settings.command(*repo)?,
                    test_dir: settings.test_dir(*repo)?,
                },
            ))
        })
        .collect::<Result<Vec<_>, ConfigError>>()
        .map_err(HarnessError::from)?;

    println!(
        "{}",
        t!("run.project_root", locale = &locale, path = project_root.display())
    );
    println!(
        "{}",
        t!(
            "run.matrix",
            locale = &locale,
            groups = matrix.group_names().join(", "),
            count = matrix.len()
        )
        .cyan()
    );

    let output_dir = PathBuf::from(&settings.output_dir);
    ensure_dir(&output_dir).map_err(HarnessError::from)?;

    let plan = plan_execution(&matrix, &discoveries, &output_dir);
    for repo in &plan.repositories {
        println!(
            "{}",
            t!(
                "run.repository_tests",
                locale = &locale,
                repo = repo.repository.as_str(),
                count = repo.tests
            )
            .cyan()
        );
        if repo.whitelisted {
            println!(
                "{}",
                t!(
                    "run.whitelist_excluded",
                    locale = &locale,
                    repo = repo.repository.as_str(),
                    count = repo.excluded
                )
                .yellow()
            );
        }
    }

    // Held until the end of the run; dropping it removes the overlay directory.
    let overlay = LibraryOverlay::acquire(&settings.overlay).map_err(HarnessError::from)?;
    let mut base_env = BaseEnvironment::capture();
    for (key, value) in &settings.env {
        base_env = base_env.with(key.clone(), value.clone());
    }
    base_env = base_env.with_project_root(&project_root);
    if let Some(overlay) = &overlay {
        println!(
            "{}",
            t!("run.overlay", locale = &locale, path = overlay.path().display()).cyan()
        );
        base_env = overlay.apply(base_env);
    }

    let mut engine = Engine::new(SubprocessLauncher, base_env, project_root, settings.timeout())
        .with_jobs(settings.jobs);
    for (repo, suite) in suites {
        engine = engine.with_suite(repo, suite);
    }

    let aggregator = Aggregator::new(matrix.labels());
    if plan.is_empty() {
        println!("{}", t!("run.no_cells", locale = &locale).green());
    } else {
        println!(
            "{}",
            t!(
                "run.starting",
                locale = &locale,
                cells = plan.cells.len(),
                jobs = engine.jobs(),
                timeout = settings.timeout_secs
            )
            .bold()
        );
    }

    let stop = setup_signal_handler(&locale);
    let result = engine.run(plan.cells, &aggregator, &stop).await;

    // The table is flushed whether the engine finished, was interrupted or failed.
    let table = aggregator.finalize();
    let artifacts = flush(&table, &output_dir, &locale).map_err(HarnessError::from)?;
    drop(overlay);

    print_summary(&table, &locale);
    println!(
        "\n{}",
        t!("run.table_written", locale = &locale, path = artifacts.table.display()).green()
    );
    println!(
        "{}",
        t!("run.table_written", locale = &locale, path = artifacts.wide_table.display()).green()
    );
    if let Some(report) = &artifacts.ablation_report {
        println!(
            "{}",
            t!("run.ablation_written", locale = &locale, path = report.display()).green()
        );
    }

    let stats = result.map_err(HarnessError::from)?;
    if stats.interrupted {
        println!(
            "{}",
            t!(
                "run.interrupted",
                locale = &locale,
                completed = stats.completed,
                total = stats.total_cells
            )
            .yellow()
            .bold()
        );
    } else {
        println!("\n{}", t!("run.completed", locale = &locale).green().bold());
    }
    Ok(())
}

fn apply_overrides(settings: &mut Settings, args: &RunArgs) {
    if let Some(output_dir) = &args.output_dir {
        settings.output_dir = output_dir.to_string_lossy().into_owned();
    }
    if let Some(timeout) = args.timeout_secs {
        settings.timeout_secs = timeout;
    }
    if let Some(jobs) = args.jobs {
        settings.jobs = jobs;
    }
}

/// Builds the discovery rule of every selected repository.
///
/// An explicit `--whitelist` replaces the conventional whitelist file of its
/// repository; it must exist.
fn discover(settings: &Settings, repositories: &[Repository], args: &RunArgs) -> Result<Vec<Discovery>, ConfigError> {
    let explicit = match (&args.whitelist, &args.whitelist_repo) {
        (Some(path), Some(repo)) => {
            let repo: Repository = repo.parse()?;
            if !path.is_file() {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "whitelist not found"),
                });
            }
            Some((repo, path.clone()))
        }
        _ => None,
    };

    let whitelist_dir = settings.whitelist_dir()?;
    repositories
        .iter()
        .map(|repo| {
            let whitelist = match &explicit {
                Some((explicit_repo, path)) if explicit_repo == repo => load_whitelist_file(path, *repo)?,
                _ => load_whitelist(&whitelist_dir, *repo)?,
            };
            Ok(Discovery::new(*repo, settings.test_dir(*repo)?, whitelist))
        })
        .collect()
}

/// Writes the long and wide tables, plus the ablation report when the table
/// holds every ablation level.
pub fn flush(table: &ResultTable, output_dir: &Path, locale: &str) -> Result<RunArtifacts, EngineFatalError> {
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let table_path = output_dir.join(format!("results_{stamp}.csv"));
    let wide_path = output_dir.join(format!("results_{stamp}_wide.csv"));
    write_table(table, &table_path)?;
    write_wide_table(table, &wide_path)?;

    let mut ablation_report = None;
    if !table.is_empty() && table.has_labels(&ABLATION_LABELS) {
        let report_path = output_dir.join(format!("ablation_{stamp}.json"));
        let written = analyze(table, &Comparison::ablation())
            .map_err(anyhow::Error::from)
            .and_then(|report| write_analysis(&report, &report_path));
        match written {
            Ok(()) => ablation_report = Some(report_path),
            Err(e) => println!(
                "{}",
                t!("run.ablation_failed", locale = locale, error = format!("{e:#}")).yellow()
            ),
        }
    }

    Ok(RunArtifacts {
        table: table_path,
        wide_table: wide_path,
        ablation_report,
    })
}

/// Cancels the run on SIGINT, SIGTERM or SIGHUP.
///
/// Tests run in their own process groups and never see a signal sent to the
/// harness, so every terminating signal has to go through the token for the
/// groups to be killed and the partial table to be flushed. The listeners
/// are installed before this returns, ahead of the first cell.
fn setup_signal_handler(locale: &str) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    let signals = match shutdown_signals() {
        Ok(signals) => signals,
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for termination signals");
            return token;
        }
    };

    tokio::spawn(async move {
        let name = signals.await;
        tracing::info!(signal = name, "shutdown requested");
        println!("\n{}", t!("run.shutdown_signal", locale = &locale).yellow());
        token_clone.cancel();
    });

    token
}

#[cfg(unix)]
fn shutdown_signals() -> std::io::Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = hangup.recv() => "SIGHUP",
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signals() -> std::io::Result<impl Future<Output = &'static str>> {
    Ok(async {
        match signal::ctrl_c().await {
            Ok(()) => "Ctrl-C",
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending().await
            }
        }
    })
}
