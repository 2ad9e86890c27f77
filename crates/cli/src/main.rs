//! Command-line front end for the physician directory harvester.
//!
//! Usage:
//!     physdir page 3 --size 50 --state NY
//!     physdir fetch-all --page-size 300 --enrich --format csv --output physicians.csv
//!
//! Set `MEDIFIND_TOKEN` to send a bearer token with upstream requests.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use physdir_export::{describe, to_csv_string, RecordFilter, Summary};
use physdir_model::{PhysicianRecord, SearchQuery};
use physdir_npi::{enrich, NppesClient, NppesConfig};
use physdir_paginate::{page_count, ScrapeSession};
use physdir_upstream::{MedifindClient, MedifindConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "physdir")]
#[command(about = "Harvest physicians for a medical condition from Medifind")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Upstream condition identifier (3766 = neuroendocrine tumor)
    #[arg(long, default_value = "3766")]
    condition_id: u64,

    /// Specialty slugs to restrict the search to (repeatable)
    #[arg(long = "specialty")]
    specialties: Vec<String>,

    /// Result ordering requested from the upstream
    #[arg(long, default_value = "relevance")]
    sort: String,

    /// Condition search endpoint
    #[arg(long, default_value = "https://www.medifind.com/api/search/doctors/conditionSearch")]
    api_url: String,

    /// Upstream request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// NPPES registry endpoint
    #[arg(long, default_value = "https://npiregistry.cms.hhs.gov/api/")]
    npi_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a single page of results
    Page {
        /// 1-based page number
        page: u32,

        /// Results per page
        #[arg(short, long, default_value = "50")]
        size: u32,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Download every page for the condition
    FetchAll {
        /// Results per request
        #[arg(short, long, default_value = "300")]
        page_size: u32,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Keep only physicians in this state
    #[arg(long)]
    state: Option<String>,

    /// Minimum years of experience
    #[arg(long, default_value = "0")]
    min_experience: u32,

    /// Minimum number of publications
    #[arg(long, default_value = "0")]
    min_publications: u32,

    /// Look up NPI numbers for each physician
    #[arg(long)]
    enrich: bool,

    /// Concurrent NPI lookups
    #[arg(long, default_value = "4")]
    concurrency: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: Format,

    /// Write output to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Csv,
}

impl OutputArgs {
    fn filter(&self) -> RecordFilter {
        RecordFilter {
            state: self.state.clone(),
            min_experience: self.min_experience,
            min_publications: self.min_publications,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so CSV/JSON on stdout stays clean.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("physdir=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = MedifindConfig {
        api_url: cli.api_url,
        timeout_secs: cli.timeout_secs,
        bearer_token: std::env::var("MEDIFIND_TOKEN").ok().filter(|t| !t.is_empty()),
        ..Default::default()
    };
    let upstream = MedifindClient::new(config).context("Failed to create upstream client")?;
    let query = SearchQuery::new(cli.condition_id)
        .with_specialties(cli.specialties)
        .with_sort(cli.sort);
    let mut session = ScrapeSession::new(upstream, query);

    let npi_config = NppesConfig {
        base_url: cli.npi_url,
        ..Default::default()
    };

    match cli.command {
        Commands::Page { page, size, output } => {
            run_page(&mut session, page, size, &output, npi_config).await?;
        }
        Commands::FetchAll { page_size, output } => {
            run_fetch_all(&mut session, page_size, &output, npi_config).await?;
        }
    }

    Ok(())
}

async fn run_page(
    session: &mut ScrapeSession<MedifindClient>,
    page: u32,
    size: u32,
    output: &OutputArgs,
    npi_config: NppesConfig,
) -> Result<()> {
    let result = session
        .load_page(page, size)
        .await
        .with_context(|| format!("Failed to fetch data for page {}", page))?;
    let mut records = result.records.clone();

    if let Some(total) = session.total_available() {
        tracing::info!(
            "Page {} of {} ({} physicians in total)",
            page,
            page_count(total, size),
            total
        );
    }

    if output.enrich {
        let lookup = NppesClient::new(npi_config).context("Failed to create NPI client")?;
        records = enrich(records, &lookup, output.concurrency).await;
    }

    emit(&records, output)
}

async fn run_fetch_all(
    session: &mut ScrapeSession<MedifindClient>,
    page_size: u32,
    output: &OutputArgs,
    npi_config: NppesConfig,
) -> Result<()> {
    let dataset = session
        .download_all(page_size)
        .await
        .context("Failed to download full dataset")?;
    tracing::info!(
        "Downloaded {} of {} physicians",
        dataset.len(),
        dataset.total_available
    );

    if output.enrich {
        let lookup = NppesClient::new(npi_config).context("Failed to create NPI client")?;
        session.enrich_dataset(&lookup, output.concurrency).await;
    }

    let records = session
        .dataset()
        .map(|d| d.records.as_slice())
        .unwrap_or_default();
    emit(records, output)
}

/// Filter, render and write records in the requested format.
fn emit(records: &[PhysicianRecord], output: &OutputArgs) -> Result<()> {
    let filtered: Vec<PhysicianRecord> = output
        .filter()
        .apply(records)
        .into_iter()
        .cloned()
        .collect();

    let rendered = match output.format {
        Format::Csv => to_csv_string(&filtered)?,
        Format::Json => serde_json::to_string_pretty(&filtered)?,
        Format::Text => render_text(records.len(), &filtered),
    };

    match &output.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Wrote {} physicians to {}", filtered.len(), path.display());
        }
        None => print!("{}", rendered),
    }

    Ok(())
}

fn render_text(unfiltered: usize, records: &[PhysicianRecord]) -> String {
    let summary = Summary::from_records(records);
    let mut out = String::new();

    out.push_str(&format!(
        "Physicians: {} | Avg. experience: {:.1} years | Publications: {} | Avg. rating: {:.1}\n",
        summary.total, summary.average_experience, summary.total_publications, summary.average_rating
    ));
    if !summary.top_states.is_empty() {
        let states: Vec<_> = summary
            .top_states
            .iter()
            .map(|(state, count)| format!("{} ({})", state, count))
            .collect();
        out.push_str(&format!("Top states: {}\n", states.join(", ")));
    }
    out.push_str("---\n");

    for (i, record) in records.iter().enumerate() {
        out.push_str(&format!("\n{}. ", i + 1));
        out.push_str(&describe(record).replace('\n', "\n   "));
        out.push('\n');
    }

    out.push_str("\n---\n");
    out.push_str(&format!("Showing {} of {} physicians\n", records.len(), unfiltered));
    out
}
