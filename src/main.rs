//! Reforge command-line driver.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reforge::{primary_sections, ChromeRenderer, CloneConfig, Cloner, HttpFetcher};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Clone a website into a static bundle
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    /// JSON config file (defaults apply when omitted)
    #[arg(short = 'C', long, global = true, value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print body HTML, section structure and CSS as JSON
    #[command(visible_alias = "s")]
    Scrape {
        /// Website URL (scheme optional)
        url: String,

        /// Print only the best section of each kind
        #[arg(long)]
        outline: bool,
    },

    /// Write a self-contained ZIP of the rendered page
    #[command(visible_alias = "c")]
    Clone {
        url: String,

        /// Output archive path
        #[arg(short, long, default_value = "site.zip", value_hint = clap::ValueHint::FilePath)]
        output: PathBuf,
    },

    /// Package edited body HTML and theme CSS as a ZIP
    #[command(visible_alias = "e")]
    Export {
        url: String,

        /// Edited body HTML
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        html: PathBuf,

        /// Theme CSS placed in the document head
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        css: Option<PathBuf>,

        #[arg(short, long, default_value = "site.zip", value_hint = clap::ValueHint::FilePath)]
        output: PathBuf,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn load_config(path: Option<&Path>) -> Result<CloneConfig> {
    match path {
        Some(path) => CloneConfig::load(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(CloneConfig::default()),
    }
}

fn write_archive(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), size = bytes.len(), "archive written");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let fetcher = HttpFetcher::new(&config.user_agent).context("building http client")?;
    let renderer = ChromeRenderer::new(config.render.clone());
    let cloner = Cloner::new(renderer, fetcher, config);

    match cli.command {
        Commands::Scrape { url, outline } => {
            let result = cloner.scrape(&url).await?;
            let json = if outline {
                serde_json::to_string_pretty(&primary_sections(&result.structure))?
            } else {
                serde_json::to_string_pretty(&result)?
            };
            println!("{}", json);
        }
        Commands::Clone { url, output } => {
            let bytes = cloner.clone_static(&url).await?;
            write_archive(&output, &bytes)?;
        }
        Commands::Export { url, html, css, output } => {
            let edited_html =
                std::fs::read_to_string(&html).with_context(|| format!("reading {}", html.display()))?;
            let theme_css = match css {
                Some(path) => {
                    Some(std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?)
                }
                None => None,
            };
            let bytes = cloner.export_with_edits(&url, &edited_html, theme_css.as_deref()).await?;
            write_archive(&output, &bytes)?;
        }
    }
    Ok(())
}
