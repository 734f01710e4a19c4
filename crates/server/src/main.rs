//! # CourseConnect CLI (`courseconnect`)
//!
//! Runs the study-services HTTP server and exposes the offline pieces
//! (PDF extraction, content filter, syllabus parsing) for scripting.
//!
//! ```bash
//! courseconnect --config ./config/courseconnect.toml serve
//! courseconnect extract-pdf syllabus.pdf
//! courseconnect check-content "is this ok to post?"
//! courseconnect parse-syllabus syllabus.pdf
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use providers::ProviderRouter;
use services::content_filter::check_content;
use services::pdf::{extract_pdf, is_pdf};
use services::syllabus::SyllabusParser;
use shared::settings::{load_config_or_default, AppConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "courseconnect",
    about = "CourseConnect study services: AI tutor, syllabus matching, PDF extraction and class rooms",
    version
)]
struct Cli {
    /// Path to the TOML configuration file. Missing file means defaults.
    #[arg(long, global = true, default_value = "./config/courseconnect.toml")]
    config: PathBuf,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server.
    Serve,

    /// Print the text extracted from a PDF.
    ExtractPdf {
        /// PDF file to read.
        file: PathBuf,
    },

    /// Print the content filter verdict for a piece of text as JSON.
    CheckContent {
        /// Text to check.
        text: String,
    },

    /// Parse a syllabus (PDF or plain text) and print the course metadata.
    ///
    /// Uses the configured chat providers and falls back to pattern
    /// matching when none answer.
    ParseSyllabus {
        /// Syllabus file, PDF or text.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config_or_default(&cli.config)?;
    match cli.command {
        Commands::Serve => courseconnect::serve(config).await,
        Commands::ExtractPdf { file } => {
            let bytes = read(&file)?;
            let extraction = tokio::task::spawn_blocking(move || extract_pdf(&bytes)).await??;
            tracing::debug!(
                "{} pages, {} chars via {:?}",
                extraction.metadata.pages,
                extraction.metadata.characters,
                extraction.metadata.extractor
            );
            println!("{}", extraction.text);
            Ok(())
        }
        Commands::CheckContent { text } => {
            let verdict = check_content(&text);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            Ok(())
        }
        Commands::ParseSyllabus { file } => parse_syllabus(&config, &file).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

async fn parse_syllabus(config: &AppConfig, file: &Path) -> Result<()> {
    let bytes = read(file)?;
    let text = if is_pdf(&bytes) {
        tokio::task::spawn_blocking(move || extract_pdf(&bytes))
            .await??
            .text
    } else {
        String::from_utf8(bytes).with_context(|| format!("{} is neither a PDF nor UTF-8 text", file.display()))?
    };

    let router = Arc::new(ProviderRouter::from_config(&config.model));
    let data = SyllabusParser::new(router).parse(&text).await;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}
