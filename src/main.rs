mod config;
mod report;
mod scan;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use jdepcheck::{Analyzer, Granularity};
use log::LevelFilter;

use crate::config::{RulesConfig, load_rules};
use crate::report::{build_invocation, build_sarif};
use crate::scan::scan_inputs;

/// CLI arguments for jdepcheck execution.
#[derive(Parser, Debug)]
#[command(
    name = "jdepcheck",
    about = "Package dependency, cycle and rule analysis for JVM class files, as SARIF.",
    version
)]
struct Cli {
    #[arg(long = "input", value_name = "PATH", required = true)]
    inputs: Vec<PathBuf>,
    #[arg(long, value_name = "PATH")]
    rules: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = GranularityArg::Package)]
    granularity: GranularityArg,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum GranularityArg {
    Package,
    Class,
}

impl From<GranularityArg> for Granularity {
    fn from(value: GranularityArg) -> Self {
        match value {
            GranularityArg::Package => Granularity::Package,
            GranularityArg::Class => Granularity::Class,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet);
    run(cli)
}

fn init_logging(quiet: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if quiet {
        builder.filter_level(LevelFilter::Error);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn run(cli: Cli) -> Result<()> {
    for input in &cli.inputs {
        if !input.exists() {
            anyhow::bail!("input not found: {}", input.display());
        }
    }

    let started_at = Instant::now();
    let config = match &cli.rules {
        Some(path) => load_rules(path)?,
        None => RulesConfig::default(),
    };
    let scan = scan_inputs(cli.inputs.as_slice())?;
    let artifact_count = scan.artifacts.len();
    let class_count = scan.classes.len();

    let analyzer = Analyzer::new()
        .with_filter(config.filter)
        .with_rules(config.rules, config.mode)
        .with_granularity(cli.granularity.into());
    let result = analyzer.analyze(scan.classes);

    let invocation = build_invocation(result.failures().is_empty());
    let sarif = build_sarif(&result, scan.artifacts, invocation);

    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &sarif)
        .context("failed to serialize SARIF output")?;
    writer
        .write_all(b"\n")
        .context("failed to write SARIF output")?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} classes={} artifacts={} cycles={} violations={}",
            started_at.elapsed().as_millis(),
            class_count,
            artifact_count,
            result.cycles().len(),
            result.violations().len()
        );
    }

    Ok(())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}
