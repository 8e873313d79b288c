use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ipa_pipeline::{
    extract, load_transcripts, AnthropicClient, AnthropicConfig, CompletionClient,
    CompletionOptions, MarkdownReport, PipelineConfig, Stage, StagePipeline, TextReport,
};

#[derive(Parser)]
#[command(name = "ipa-pipeline")]
#[command(author, version, about = "Interpretative phenomenological analysis of interview transcripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run stages 1-4 over a set of interview transcripts
    Analyze {
        /// Transcript files (plain text), one per participant
        #[arg(short, long, required = true)]
        input: Vec<PathBuf>,

        /// Output file for the canonical report (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Output file for a Markdown rendering of the report
        #[arg(long)]
        markdown: Option<PathBuf>,

        /// Output file for a plain-text rendering of the report
        #[arg(long)]
        text: Option<PathBuf>,

        /// Model identifier
        #[arg(long, default_value = "claude-sonnet-4-20250514")]
        model: String,

        /// Maximum output tokens per stage request
        #[arg(long, default_value = "4096")]
        max_tokens: u32,

        /// Sampling temperature (0-1)
        #[arg(long, default_value = "0.3")]
        temperature: f64,

        /// Retries allowed after a rate-limit response
        #[arg(long, default_value = "2")]
        retries: u32,

        /// Participant pipelines to run at once
        #[arg(long, default_value = "2")]
        concurrency: usize,

        /// Stop sequence passed to the model
        #[arg(long)]
        stop: Option<String>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Repair and validate a saved model response offline
    Repair {
        /// File holding the raw model response
        #[arg(short, long)]
        input: PathBuf,

        /// Stage the response was produced for (1-4)
        #[arg(short, long)]
        stage: u8,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            output,
            markdown,
            text,
            model,
            max_tokens,
            temperature,
            retries,
            concurrency,
            stop,
            verbose,
        } => {
            setup_logging(verbose);
            let options = CompletionOptions {
                model,
                max_tokens,
                temperature,
                stop,
                retry_budget: retries,
            };
            let config = PipelineConfig {
                concurrency,
                ..PipelineConfig::new(options)
            };
            analyze(input, output, markdown, text, config).await
        }
        Commands::Repair {
            input,
            stage,
            verbose,
        } => {
            setup_logging(verbose);
            repair(input, stage)
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

async fn analyze(
    input: Vec<PathBuf>,
    output: PathBuf,
    markdown: Option<PathBuf>,
    text: Option<PathBuf>,
    config: PipelineConfig,
) -> Result<()> {
    info!("Loading {} transcripts", input.len());
    let loaded = load_transcripts(&input);

    for rejected in &loaded.rejected {
        eprintln!(
            "Skipping {:?} ({}): {}",
            rejected.path, rejected.participant, rejected.error
        );
    }
    if loaded.transcripts.is_empty() {
        bail!("No usable transcripts among {} input files", input.len());
    }

    let words: usize = loaded.transcripts.iter().map(|t| t.word_count()).sum();
    info!(
        "Loaded {} transcripts ({} words)",
        loaded.transcripts.len(),
        words
    );

    let api_config = AnthropicConfig::from_env()?;
    let client = CompletionClient::new(Arc::new(AnthropicClient::new(api_config)));
    let pipeline = StagePipeline::new(client, config);

    let mut report = pipeline
        .run_batch(loaded.transcripts)
        .await
        .context("Analysis run failed")?;
    report.record_rejected(&loaded.rejected);

    report.write_json(&output)?;
    info!("Report written to {:?}", output);

    if let Some(path) = markdown {
        MarkdownReport::new(&report).write_file(&path)?;
        info!("Markdown report written to {:?}", path);
    }
    if let Some(path) = text {
        TextReport::new(&report).write_file(&path)?;
        info!("Text report written to {:?}", path);
    }

    println!("Analysis Summary");
    println!("================");
    println!("Run: {}", report.run_id);
    println!("Participants analysed: {}", report.participants.len());
    for analysis in &report.participants {
        println!(
            "  {}: {} statements, {} personal themes",
            analysis.participant,
            analysis.experiential_statements.len(),
            analysis.personal_themes.len()
        );
    }
    println!("Participants excluded: {}", report.failures.len());
    for failure in &report.failures {
        println!("  {}", failure.reason);
    }
    println!("Group themes: {}", report.group_themes.len());
    for theme in &report.group_themes {
        println!(
            "  {} ({} participants)",
            theme.theme_title,
            theme.cited_participants().collect::<HashSet<_>>().len()
        );
    }

    Ok(())
}

fn repair(input: PathBuf, stage: u8) -> Result<()> {
    let Some(stage) = Stage::from_number(stage) else {
        bail!("Stage must be between 1 and 4, got {}", stage);
    };

    let raw = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read model response: {:?}", input))?;

    let value = extract(&raw, stage.schema())
        .with_context(|| format!("Could not recover {} output", stage))?;

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
