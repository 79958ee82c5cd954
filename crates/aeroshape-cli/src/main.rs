//! aeroshape - aerodynamic shape evaluation and optimization CLI
//!
//! Drives Gmsh (geometry and meshing) and SU2 (flow solution) from a single
//! configuration file.
//!
//! ## Commands
//!
//! - `run`: evaluate one design (the defaults, with optional overrides)
//! - `optimize`: genetic optimization over the design variables
//! - `validate`: load and validate a configuration
//! - `parse`: read coefficients from existing solver outputs

use aeroshape_core::config::ConvergenceConfig;
use aeroshape_core::solver::parse::coefficients_from_text;
use aeroshape_core::{run_optimization, run_single, AerodynamicCoefficients, AppConfig};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "aeroshape")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Aerodynamic shape evaluation and optimization (Gmsh + SU2)", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single design
    Run {
        /// Configuration file (.yaml, .yml or .json)
        #[arg(short, long)]
        config: PathBuf,

        /// Override a design variable (repeatable)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,

        /// Write the solver configuration without running the solver
        #[arg(long)]
        render_only: bool,
    },

    /// Run the genetic optimizer
    Optimize {
        /// Configuration file (.yaml, .yml or .json)
        #[arg(short, long)]
        config: PathBuf,

        /// Random seed (overrides optimizer.seed)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Load and validate a configuration file
    Validate {
        /// Configuration file (.yaml, .yml or .json)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Parse coefficients from existing solver outputs
    Parse {
        /// Solver history CSV
        #[arg(long)]
        history: PathBuf,

        /// Forces breakdown report
        #[arg(long)]
        breakdown: Option<PathBuf>,

        /// Configuration providing the convergence policy
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    aeroshape_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            config,
            overrides,
            render_only,
        } => cmd_run(&config, &overrides, render_only).await,
        Commands::Optimize { config, seed } => cmd_optimize(&config, seed).await,
        Commands::Validate { config } => cmd_validate(&config),
        Commands::Parse {
            history,
            breakdown,
            config,
        } => cmd_parse(&history, breakdown.as_deref(), config.as_deref()),
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load(path).with_context(|| format!("Invalid configuration {:?}", path))
}

/// Parse a `name=value` override.
fn parse_override(raw: &str) -> Result<(String, f64)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("override {:?} must have the form name=value", raw);
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("override {:?} has an empty name", raw);
    }
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("override {:?} has a non-numeric value", raw))?;
    if !value.is_finite() {
        bail!("override {:?} is not finite", raw);
    }
    Ok((name.to_string(), value))
}

/// Evaluate one design; stage failures end the process with an error.
async fn cmd_run(config_path: &Path, overrides: &[String], render_only: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let overrides = overrides
        .iter()
        .map(|raw| parse_override(raw))
        .collect::<Result<Vec<_>>>()?;
    let vector = config
        .design_space()?
        .with_overrides(&overrides)
        .context("Invalid design variable override")?;

    let report = run_single(Arc::new(config), vector, render_only)
        .await
        .context("Single run failed")?;

    println!("Run:       {}", report.run_id);
    println!("Design:    {}", report.vector);
    println!("Directory: {}", report.work_dir.display());
    println!("Config:    {}", report.case.solver.config_path.display());
    match &report.coefficients {
        Some(c) => print_coefficients(c),
        None => println!("Solver not run (render only)"),
    }
    if let Some(post) = &report.post {
        println!("Summary:   {}", post.summary.display());
    }
    Ok(())
}

async fn cmd_optimize(config_path: &Path, seed: Option<u64>) -> Result<()> {
    let config = load_config(config_path)?;
    config
        .validate_for_optimization()
        .context("Configuration cannot be optimized")?;
    let results_dir = config.paths.results_dir.clone();
    let best_file = results_dir.join(&config.report.best_design_file);

    let result = run_optimization(Arc::new(config), seed).await?;

    println!(
        "Generations: {}{}",
        result.generations_completed,
        if result.stopped_early { " (stalled)" } else { "" }
    );
    println!(
        "Evaluations: {} ({} failed, {} cached)",
        result.total_evaluations, result.failed_evaluations, result.cache_hits
    );
    match &result.best {
        Some(best) => {
            println!("Best:        {} fitness {:.6}", best.id, best.score());
            println!("Design:      {}", best.vector);
            if let Some(c) = best.outcome.coefficients() {
                print_coefficients(c);
            }
        }
        None => println!("Best:        none"),
    }
    println!("Report:      {}", best_file.display());
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let space = config.design_space()?;
    info!(variables = space.len(), "Configuration valid");
    println!("Configuration {:?} is valid", config_path);
    println!("Design variables: {}", space.names().join(", "));
    println!("Results directory: {}", config.paths.results_dir.display());
    if !config.execution.run_solver {
        println!("Note: execution.run_solver = false, optimization is unavailable");
    }
    Ok(())
}

#[derive(Serialize)]
struct ParseOutput<'a> {
    history: &'a Path,
    breakdown: Option<&'a Path>,
    coefficients: AerodynamicCoefficients,
}

fn cmd_parse(history: &Path, breakdown: Option<&Path>, config: Option<&Path>) -> Result<()> {
    let convergence = match config {
        Some(path) => load_config(path)?.solver.convergence,
        None => ConvergenceConfig::default(),
    };
    let history_text = std::fs::read_to_string(history)
        .with_context(|| format!("Failed to read {:?}", history))?;
    let breakdown_text = match breakdown {
        Some(path) => Some((
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?,
            path,
        )),
        None => None,
    };

    let coefficients = coefficients_from_text(
        &history_text,
        breakdown_text.as_ref().map(|(text, path)| (text.as_str(), *path)),
        &convergence,
    )
    .context("Failed to parse solver outputs")?;

    let output = ParseOutput {
        history,
        breakdown,
        coefficients,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_coefficients(c: &AerodynamicCoefficients) {
    println!("CL:        {:.6}", c.cl);
    println!("CD:        {:.6}", c.cd);
    if let Some(cm) = c.cm {
        println!("CMz:       {:.6}", cm);
    }
    println!("L/D:       {:.4}", c.lift_to_drag);
    println!(
        "Converged: {} ({} iterations)",
        c.converged, c.iterations
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_override() {
        assert_eq!(
            parse_override("length=1.25").unwrap(),
            ("length".to_string(), 1.25)
        );
        assert_eq!(
            parse_override(" mach_number = 0.3 ").unwrap(),
            ("mach_number".to_string(), 0.3)
        );
        assert!(parse_override("length").is_err());
        assert!(parse_override("=1.0").is_err());
        assert!(parse_override("length=abc").is_err());
        assert!(parse_override("length=inf").is_err());
    }

    #[test]
    fn test_cli_parses_run_command() {
        let cli = Cli::try_parse_from([
            "aeroshape",
            "run",
            "--config",
            "case.yaml",
            "--set",
            "length=1.1",
            "--set",
            "taper=0.4",
            "--render-only",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                config,
                overrides,
                render_only,
            } => {
                assert_eq!(config, PathBuf::from("case.yaml"));
                assert_eq!(overrides, vec!["length=1.1", "taper=0.4"]);
                assert!(render_only);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cmd_validate_rejects_unknown_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("case.cfg"), "MESH_FILENAME= {mesh_file}\n").unwrap();
        let config = dir.path().join("case.yaml");
        std::fs::write(
            &config,
            "design_variables:\n  - name: length\n    lower: 0.8\n    upper: 1.2\nsolver:\n  template: case.cfg\n",
        )
        .unwrap();
        let err = cmd_validate(&config).unwrap_err();
        assert!(format!("{:#}", err).contains("mesh_file"));
    }

    #[test]
    fn test_cmd_parse_reads_history() {
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("history.csv");
        std::fs::write(&history, "\"Inner_Iter\",\"CL\",\"CD\"\n0,0.40,0.040\n1,0.42,0.035\n")
            .unwrap();
        cmd_parse(&history, None, None).unwrap();
        assert!(cmd_parse(&dir.path().join("missing.csv"), None, None).is_err());
    }
}
