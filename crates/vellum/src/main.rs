//! Vellum CLI - Main entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "vellum")]
#[command(version)]
#[command(about = "Document generation from directive templates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template against JSON data
    Render {
        /// Template markup file
        template: PathBuf,

        /// JSON data file
        #[arg(short, long)]
        data: PathBuf,

        /// Write output to FILE (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Let long tables break row-by-row across pages
        #[arg(long)]
        long_table_split: bool,

        /// Disable table page-break planning entirely
        #[arg(long)]
        no_table_page_breaking: bool,

        /// Convert the output with the external converter (pdf, html);
        /// requires --output
        #[arg(long, value_name = "FORMAT")]
        convert: Option<String>,

        /// Conversion timeout in seconds
        #[arg(long, default_value_t = 120)]
        convert_timeout: u64,
    },

    /// Validate a template's directives without rendering
    Check {
        /// Template markup file
        template: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vellum=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            template,
            data,
            output,
            long_table_split,
            no_table_page_breaking,
            convert,
            convert_timeout,
        } => commands::render::execute(commands::render::RenderArgs {
            template,
            data,
            output,
            long_table_split,
            no_table_page_breaking,
            convert,
            convert_timeout,
        }),
        Commands::Check { template } => commands::check::execute(&template),
    }
}
