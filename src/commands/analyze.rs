// src/commands/analyze.rs

use anyhow::Result;
use colored::*;
use std::path::PathBuf;

use crate::{
    core::analysis::{analyze, Comparison, Measure},
    error::HarnessError,
    reporting::{print_analysis, read_table, write_analysis},
    t,
};

/// Arguments of the `analyze` command.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeArgs {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub baseline: Option<String>,
    pub compare: Vec<String>,
    pub measure: Option<String>,
}

impl AnalyzeArgs {
    /// The comparison to run: explicit labels, or the cache ablation.
    pub fn comparison(&self) -> Result<Comparison, HarnessError> {
        let measure = match &self.measure {
            Some(measure) => Some(measure.parse::<Measure>()?),
            None => None,
        };
        let comparison = match &self.baseline {
            Some(baseline) => Comparison::new(
                baseline.clone(),
                self.compare.clone(),
                measure.unwrap_or(Measure::Metric),
            )?,
            None => {
                let ablation = Comparison::ablation();
                match measure {
                    Some(measure) if measure != ablation.measure() => Comparison::new(
                        ablation.baseline().to_string(),
                        ablation.candidates().to_vec(),
                        measure,
                    )?,
                    _ => ablation,
                }
            }
        };
        Ok(comparison)
    }
}

pub fn execute(args: AnalyzeArgs, locale: &str) -> Result<()> {
    let comparison = args.comparison()?;
    let table = read_table(&args.input)?;
    println!(
        "{}",
        t!(
            "analyze.loaded",
            locale = locale,
            path = args.input.display(),
            rows = table.len()
        )
    );

    let report = analyze(&table, &comparison).map_err(HarnessError::from)?;
    print_analysis(&report, locale);

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("analysis.json"));
    write_analysis(&report, &output)?;
    println!(
        "\n{}",
        t!("analyze.written", locale = locale, path = output.display()).green()
    );
    Ok(())
}
