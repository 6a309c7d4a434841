//! evgraph CLI: run, validate, and explain analysis files.

use clap::{Parser, Subcommand};
use evgraph_core::config::EngineConfig;
use evgraph_exec::Engine;
use evgraph_io::JsonlSource;
use evgraph_planner::{parse_yaml_analysis, AnalysisConfig, ParsedAnalysis};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "evgraph")]
#[command(about = "Lazy computation graphs over partitioned event data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Default, Clone)]
struct Overrides {
    /// Number of partitions (overrides config)
    #[arg(long)]
    npartitions: Option<usize>,

    /// Maximum parallel partition passes (overrides config)
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Directory holding `<dataset>.jsonl` files (overrides config)
    #[arg(long)]
    data_dir: Option<String>,

    /// Directory snapshots are written under (overrides config)
    #[arg(long)]
    output_dir: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an analysis and print merged results as JSON
    Run {
        /// Path to the analysis YAML file
        #[arg(short, long)]
        analysis: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Validate an analysis file (syntax and expressions)
    Validate {
        /// Path to the analysis YAML file
        #[arg(short, long)]
        analysis: PathBuf,
    },

    /// Show the lowered program and partition plan
    Explain {
        /// Path to the analysis YAML file
        #[arg(short, long)]
        analysis: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            analysis,
            overrides,
        } => {
            if let Err(e) = run_analysis(&analysis, &overrides) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Validate { analysis } => {
            if let Err(e) = validate_analysis(&analysis) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Analysis is valid");
        }
        Commands::Explain {
            analysis,
            overrides,
        } => {
            if let Err(e) = explain_analysis(&analysis, &overrides) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn load(path: &Path) -> Result<ParsedAnalysis, Box<dyn std::error::Error>> {
    let yaml_content = fs::read_to_string(path)?;
    Ok(parse_yaml_analysis(&yaml_content)?)
}

/// Env defaults, then the analysis `config:` block, then CLI flags.
fn resolve_config(doc: &AnalysisConfig, overrides: &Overrides) -> EngineConfig {
    let mut config = EngineConfig::from_env();
    doc.apply(&mut config);
    apply_overrides(&mut config, overrides);
    config
}

fn apply_overrides(cfg: &mut EngineConfig, o: &Overrides) {
    if let Some(n) = o.npartitions {
        cfg.npartitions = n;
    }
    if let Some(n) = o.max_parallel {
        cfg.max_parallel_tasks = n;
    }
    if let Some(dir) = &o.data_dir {
        cfg.data_dir = dir.clone();
    }
    if let Some(dir) = &o.output_dir {
        cfg.output_dir = dir.clone();
    }
}

fn build_engine(config: EngineConfig) -> Result<Engine, Box<dyn std::error::Error>> {
    let source = Arc::new(JsonlSource::new(&config.data_dir));
    Ok(Engine::new(config, source)?)
}

fn run_analysis(path: &Path, overrides: &Overrides) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = load(path)?;
    let config = resolve_config(&parsed.config, overrides);
    let engine = build_engine(config)?;
    let analysis = engine.analysis(&parsed)?;
    let results = analysis.run()?;
    tracing::info!(analysis = %path.display(), outputs = results.len(), "analysis finished");

    let mut out = BTreeMap::new();
    for (name, variants) in &results {
        let mut per_tag = serde_json::Map::new();
        for (tag, r) in variants.iter() {
            per_tag.insert(tag.clone(), serde_json::to_value(r)?);
        }
        out.insert(name.clone(), serde_json::Value::Object(per_tag));
    }
    let runs = analysis.frame().runs()?;
    let report = serde_json::json!({
        "results": out,
        "runs": runs,
        "partition_passes": engine.partition_passes(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn validate_analysis(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let _ = load(path)?;
    Ok(())
}

fn explain_analysis(path: &Path, overrides: &Overrides) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = load(path)?;
    let config = resolve_config(&parsed.config, overrides);
    println!("Analysis Execution Plan");
    println!("=======================");
    println!();
    println!("Partitions: {}", config.npartitions);
    println!("Max parallel: {}", config.max_parallel_tasks);
    println!("Samples: {}", parsed.dataset.samples.len());
    println!();
    let engine = build_engine(config)?;
    let analysis = engine.analysis(&parsed)?;
    println!("{}", analysis.frame().explain()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{apply_overrides, AnalysisConfig, EngineConfig, Overrides};

    #[test]
    fn analysis_config_overrides_env_defaults() {
        let mut config = EngineConfig::default();
        let doc = AnalysisConfig {
            npartitions: Some(8),
            output_dir: Some("/tmp/analysis".into()),
            ..Default::default()
        };
        doc.apply(&mut config);
        assert_eq!(config.npartitions, 8);
        assert_eq!(config.output_dir, "/tmp/analysis");
        assert_eq!(config.max_parallel_tasks, EngineConfig::default().max_parallel_tasks);
    }

    #[test]
    fn cli_overrides_higher_priority_than_config() {
        let mut config = EngineConfig::default();
        let doc = AnalysisConfig {
            npartitions: Some(8),
            data_dir: Some("/data/analysis".into()),
            ..Default::default()
        };
        doc.apply(&mut config);
        apply_overrides(
            &mut config,
            &Overrides {
                npartitions: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(config.npartitions, 2);
        assert_eq!(config.data_dir, "/data/analysis");
    }
}
