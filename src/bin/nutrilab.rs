//! CLI binary for nutrilab.
//!
//! A thin shim over the library crate: seeds an in-memory requirement store
//! for one demo user, runs the ingestion pipeline over a local PDF, and
//! prints the report. Useful for trying prompts and inspecting extraction
//! quality without a backend around the crate.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use nutrilab::{
    AnthropicClient, DocumentProcessor, MemoryRepository, NoopOcr, NutrientCatalog,
    PipelineConfig, RequirementStore, Sex,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SexArg {
    Male,
    Female,
}

impl From<SexArg> for Sex {
    fn from(value: SexArg) -> Self {
        match value {
            SexArg::Male => Sex::Male,
            SexArg::Female => Sex::Female,
        }
    }
}

/// Extract lab results from a medical PDF and derive nutrient adjustments.
#[derive(Debug, Parser)]
#[command(name = "nutrilab", version, about)]
struct Cli {
    /// Path to the lab-report PDF.
    input: PathBuf,

    /// Sex used for the demo user's default requirements.
    #[arg(long, value_enum, default_value = "female")]
    sex: SexArg,

    /// Age in years used for the demo user's default requirements.
    #[arg(long, default_value_t = 30)]
    age: u32,

    /// Model identifier for the external calls.
    #[arg(long, env = "NUTRILAB_MODEL")]
    model: Option<String>,

    /// Emit the full report as JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

const DEMO_USER: u32 = 1;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut builder = PipelineConfig::builder();
    if let Some(model) = cli.model.clone() {
        builder = builder.model(model);
    }
    let config = builder.build()?;

    let bytes = std::fs::read(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let filename = cli
        .input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.pdf".to_string());

    let catalog = Arc::new(NutrientCatalog::new());
    let repository = Arc::new(MemoryRepository::new());
    let store = Arc::new(RequirementStore::new(repository, catalog.clone()));
    store
        .initialize_for_user(DEMO_USER, cli.sex.into(), cli.age)
        .await?;
    let before = store.requirements_for_user(DEMO_USER).await?;

    let model = Arc::new(
        AnthropicClient::from_env(config.model.clone(), config.api_timeout_secs)
            .context("constructing model client")?,
    );
    let processor = DocumentProcessor::new(
        model,
        Arc::new(NoopOcr),
        store.clone(),
        catalog.clone(),
        config,
    );

    let report = processor
        .process_document(&bytes, &filename, DEMO_USER)
        .await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.success {
            anyhow::bail!("processing failed");
        }
        return Ok(());
    }

    if !report.success {
        anyhow::bail!(
            "processing failed: {}",
            report.error_message.as_deref().unwrap_or("unknown error")
        );
    }

    println!(
        "{} pages, {} test results, {} anonymized images\n",
        report.stats.total_pages, report.total_results, report.anonymized_images
    );

    for row in &report.test_results {
        println!(
            "  {:<40} {:>10} {:<8} {}",
            row.test, row.value, row.unit, row.range
        );
    }

    if report.nutrient_recommendations.is_empty() {
        println!("\nNo nutrient adjustments recommended.");
        return Ok(());
    }

    println!("\nRecommendations:");
    let after = store.requirements_for_user(DEMO_USER).await?;
    for change in &report.nutrient_recommendations {
        let symbol = if change.should_increase() { "+" } else { "-" };
        match change.nutrient_id {
            Some(id) => {
                let old = before.iter().find(|r| r.nutrient_id == id);
                let new = after.iter().find(|r| r.nutrient_id == id);
                if let (Some(old), Some(new)) = (old, new) {
                    println!(
                        "  {symbol} {:<22} {:.1} -> {:.1} {}",
                        change.nutrient,
                        old.quantity,
                        new.quantity,
                        catalog.unit(id).unwrap_or("")
                    );
                }
            }
            None => println!("  {symbol} {:<22} (not in catalog, skipped)", change.nutrient),
        }
    }

    Ok(())
}
