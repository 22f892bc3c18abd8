use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use starturl_sync::{split_markers, DiscoveryPipeline, GoogleRequest, RunConfig, RunSummary};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "starturl-cli")]
#[command(about = "Discover new ATS start URLs and diff them against the known repository")]
struct Cli {
    #[command(flatten)]
    overrides: ConfigOverrides,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct ConfigOverrides {
    /// YAML vendor registry, used when DATABASE_URL is unset.
    #[arg(long, global = true)]
    vendors_file: Option<PathBuf>,
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    /// Folder of known `<vendor>.csv` start URL lists.
    #[arg(long, global = true)]
    known_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    fn apply(self, mut config: RunConfig) -> RunConfig {
        if let Some(path) = self.vendors_file {
            config.vendors_file = Some(path);
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(dir) = self.known_dir {
            config.known_dir = dir;
        }
        config
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Search every vendor's query and keep the live, unknown start URLs.
    GenerateFromGoogle {
        #[arg(long, num_args = 1..)]
        spiders: Option<Vec<String>>,
        #[arg(long = "max", default_value_t = 20)]
        max_urls: usize,
        #[arg(long, requires = "query")]
        spider_name: Option<String>,
        #[arg(long, requires = "spider_name")]
        query: Option<String>,
        #[arg(long)]
        name_regex: Option<String>,
        /// Result offset of the first page.
        #[arg(long, default_value_t = 0)]
        deepnest: usize,
        #[arg(long)]
        skip_liveness: bool,
    },
    /// Route the company dataset's job postings to vendors by domain.
    GenerateFromLinkedin,
    /// Liveness-check a vendor list, then generate from its publisher input.
    CheckSpiderUrls {
        #[arg(long)]
        file_path: PathBuf,
        /// CSS selectors separated by `_|_`.
        #[arg(long)]
        markers: Option<String>,
        #[arg(long)]
        name_regex: Option<String>,
    },
    /// Print the search query built for each vendor.
    BuildQueries {
        #[arg(long, num_args = 1..)]
        spiders: Option<Vec<String>>,
    },
}

fn init_telemetry() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,starturl=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_telemetry();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("run failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.overrides.apply(RunConfig::from_env());
    let pipeline = DiscoveryPipeline::connect(config).await?;

    match cli.command {
        Commands::GenerateFromGoogle {
            spiders,
            max_urls,
            spider_name,
            query,
            name_regex,
            deepnest,
            skip_liveness,
        } => {
            let request = GoogleRequest {
                spiders,
                max_urls,
                spider_name,
                query,
                name_regex,
                deepnest,
                skip_liveness,
            };
            report(&pipeline.generate_from_google(&request).await?);
        }
        Commands::GenerateFromLinkedin => {
            report(&pipeline.generate_from_linkedin().await?);
        }
        Commands::CheckSpiderUrls {
            file_path,
            markers,
            name_regex,
        } => {
            let name_pattern = name_regex
                .as_deref()
                .map(Regex::new)
                .transpose()
                .context("compiling --name-regex")?;
            let markers = markers.as_deref().map(split_markers).unwrap_or_default();
            report(&pipeline.check_spider_urls(&file_path, markers, name_pattern).await?);
        }
        Commands::BuildQueries { spiders } => {
            let queries = pipeline.build_queries(spiders.as_deref()).await?;
            for (vendor, vendor_queries) in &queries {
                for query in vendor_queries {
                    println!("{vendor}\t{query}");
                }
            }
        }
    }

    Ok(())
}

fn report(summary: &RunSummary) {
    info!(run_id = %summary.run_id, output = %summary.output_dir, "summary written");
    println!(
        "run complete: run_id={} raw={} generated={} liveness_failed={} new={} files={} output={}",
        summary.run_id,
        summary.raw_records,
        summary.generated,
        summary.liveness_failed,
        summary.new_urls,
        summary.files.len(),
        summary.output_dir
    );
}
