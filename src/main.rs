#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bugsight::browser_pool::BrowserPool;
use bugsight::config::{BrowserArgs, ServeArgs};
use bugsight::errors::BugsightError;
use bugsight::llm::{LlmClient, LlmConfig};
use bugsight::pipeline;
use bugsight::types::{DomAnalysis, OutputFormat};
use bugsight::server::{self, handlers::validate_url};
use bugsight::webdriver_manager::GLOBAL_DRIVER_MANAGER;

const EXIT_SUCCESS: i32 = 0;

#[derive(Parser)]
#[command(name = "bugsight")]
#[command(about = "Probe a page's interactive elements and ask an LLM for bugs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve(ServeArgs),

    /// Resolve and probe every interactive element on a page
    Scan {
        url: String,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Collect console, network, markup and a screenshot and ask the LLM about them
    Analyze {
        url: String,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() {
    let result = run().await;

    GLOBAL_DRIVER_MANAGER.stop_all();

    match result {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(err) => {
            let err = BugsightError::from(err);
            let error_json = json!({
                "error": true,
                "message": err.to_string(),
                "exit_code": err.exit_code()
            });
            println!(
                "{}",
                serde_json::to_string(&error_json).unwrap_or_else(|_| "{}".to_string())
            );

            eprintln!("Error: {}", err);
            std::process::exit(err.exit_code());
        }
    }
}

async fn run() -> Result<()> {
    // Logs go to stderr so stdout stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bugsight=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => server::serve(args.into_config()?).await?,
        Commands::Scan {
            url,
            format,
            browser,
        } => {
            let config = browser.into_config(1)?;
            let url = validate_url(Some(url.as_str()))?;
            let pool = BrowserPool::new(config.pool.clone());
            let lease = pool.acquire().await?;
            let result = pipeline::scan(&lease, url.as_str(), &config).await;
            pool.discard(lease).await;
            let analysis = result?;
            print_scan(&analysis, format)?;
        }
        Commands::Analyze { url, browser } => {
            let config = browser.into_config(1)?;
            let url = validate_url(Some(url.as_str()))?;
            let llm = LlmClient::new(LlmConfig::from_env());
            let pool = BrowserPool::new(config.pool.clone());
            let lease = pool.acquire().await?;
            let result = pipeline::analyze(&lease, &llm, url.as_str(), &config).await;
            pool.discard(lease).await;
            let mut analysis = result?;
            analysis.screenshot = analysis
                .screenshot
                .map(|name| config.screenshot_dir.join(name).display().to_string());
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Commands::Version => {
            println!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn print_scan(analysis: &DomAnalysis, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(analysis).context("Failed to encode scan result")?
            );
        }
        OutputFormat::Simple => {
            println!("{} ({})", analysis.title, analysis.url);
            println!(
                "{} elements, {} found, {} interactive",
                analysis.summary.total, analysis.summary.found, analysis.summary.interactive
            );
            for report in analysis.elements.iter() {
                let results = &report.test_results;
                let name = report
                    .descriptor
                    .text
                    .as_deref()
                    .or(report.descriptor.id.as_deref())
                    .or(report.descriptor.name.as_deref())
                    .unwrap_or("?");
                let status = match (&results.strategy_used, &results.error) {
                    (None, _) => "not found".to_string(),
                    (Some(strategy), None) => format!(
                        "via {}, {}",
                        strategy,
                        if results.is_interactive() {
                            "interactive"
                        } else {
                            "inert"
                        }
                    ),
                    (Some(strategy), Some(error)) => format!("via {}, {}", strategy, error),
                };
                println!(
                    "  {:<10} {:<30} {}",
                    report.descriptor.kind.bucket(),
                    name,
                    status
                );
            }
        }
    }
    Ok(())
}
