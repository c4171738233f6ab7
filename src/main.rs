pub mod types;
pub mod config;
pub mod error;
pub mod data;
pub mod filter;
pub mod render;
pub mod dashboard;
pub mod html;
pub mod server;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the interactive field map
    Serve {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Render one CSV into a standalone map page
    Render {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        #[arg(long, value_name = "FILE")]
        csv: PathBuf,
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        /// Keep only rows where COLUMN equals VALUE; repeat to select more values
        #[arg(short, long, value_name = "COLUMN=VALUE", value_parser = parse_select)]
        select: Vec<(String, String)>,
        /// Write the figure JSON instead of an HTML page
        #[arg(long)]
        json: bool,
    },
}

fn parse_select(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(column, value)| (column.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected COLUMN=VALUE, got '{}'", raw))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load(config.as_deref())?;
            server::start_server(app_config).await?;
        }
        Commands::Render { config, csv, output, select, json } => {
            let app_config = config::AppConfig::load(config.as_deref())?;

            let mut input = filter::SelectionInput::new();
            for (column, value) in select {
                input.entry(column).or_default().push(value);
            }

            let upload = File::open(&csv)
                .with_context(|| format!("Failed to open CSV file: {:?}", csv))?;
            let dashboard = dashboard::Dashboard::new(app_config);
            let pass = dashboard.render_pass(BufReader::new(upload), &input)?;
            info!("Selected {} of {} rows", pass.filtered.len(), pass.total_rows);

            let rendered = pass.map?;
            let page = &dashboard.config().page;
            let body = if json {
                rendered.figure.to_json()?
            } else {
                html::standalone_page(&page.title, &page.subheader, &rendered.figure)?
            };

            fs::write(&output, body)
                .with_context(|| format!("Failed to write {:?}", output))?;
            info!(
                "Wrote map to {:?} ({} rows drawn, {} rows without geometry)",
                output,
                rendered.summary.matched_rows,
                rendered.summary.unmatched_rows
            );
        }
    }

    Ok(())
}
