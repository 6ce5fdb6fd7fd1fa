//! CLI command implementations

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Subcommand, ValueEnum};
use serde_json::json;
use vidseek_core::{SourceDescriptor, VidseekConfig, VidseekError};
use vidseek_search::{SearchView, SortOrder, StreamConsumer};
use vidseek_sim::{SimServer, SimulatedCatalog};
use vidseek_web::WebError;

const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the search API server
    Serve {
        /// Address to bind (overrides VIDSEEK_BIND)
        #[arg(long)]
        bind: Option<String>,
        /// JSON file with source descriptors (overrides VIDSEEK_SOURCES_FILE)
        #[arg(long)]
        sources: Option<PathBuf>,
    },
    /// Stream a search from a running server
    Search {
        /// Title to search for
        query: String,
        /// Server base URL
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
        /// Registry source ids to search (default: all enabled)
        #[arg(long = "source")]
        sources: Vec<String>,
        /// Only search registry sources in this group
        #[arg(long)]
        group: Option<String>,
        /// First page to fetch from every source
        #[arg(long)]
        page: Option<u32>,
        /// Result ordering
        #[arg(long, value_enum, default_value_t = SortArg::Relevance)]
        sort: SortArg,
        /// Maximum results to print
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Fetch episodes for one video from one source
    Detail {
        /// Video id as reported by the source
        id: String,
        /// Registry source id
        #[arg(long)]
        source: String,
        /// Server base URL
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Serve simulated catalog sources for local testing
    Sim {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:3100")]
        bind: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Relevance,
    Arrival,
    Latency,
}

impl From<SortArg> for SortOrder {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Relevance => SortOrder::Relevance,
            SortArg::Arrival => SortOrder::Arrival,
            SortArg::Latency => SortOrder::Latency,
        }
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of whichever command fails
pub async fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Serve { bind, sources } => serve(bind, sources).await,
        Commands::Search {
            query,
            server,
            sources,
            group,
            page,
            sort,
            limit,
        } => {
            let options = SearchOptions {
                sources,
                group,
                page,
                sort: sort.into(),
                limit,
            };
            search(&server, &query, options).await
        }
        Commands::Detail { id, source, server } => detail(&server, &id, &source).await,
        Commands::Sim { bind } => sim(&bind).await,
    }
}

async fn serve(bind: Option<String>, sources: Option<PathBuf>) -> Result<()> {
    let mut config = VidseekConfig::from_env();
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(sources) = sources {
        config.server.sources_file = Some(sources);
    }

    match vidseek_web::run_server(config).await {
        Err(WebError::Registry(e)) => {
            let error = VidseekError::from(e);
            tracing::error!(error = %error, "Failed to load sources");
            if error.is_user_error() {
                bail!("{} (fix the sources file and retry)", error.user_message());
            }
            bail!(error.user_message());
        }
        result => Ok(result?),
    }
}

struct SearchOptions {
    sources: Vec<String>,
    group: Option<String>,
    page: Option<u32>,
    sort: SortOrder,
    limit: usize,
}

async fn search(server: &str, query: &str, options: SearchOptions) -> Result<()> {
    let config = VidseekConfig::from_env();
    let client = reqwest::Client::new();
    let server = server.trim_end_matches('/');

    let mut body = json!({ "query": query });
    if !options.sources.is_empty() {
        let known = fetch_sources(&client, server).await?;
        let selected: Vec<&SourceDescriptor> = known
            .iter()
            .filter(|source| options.sources.contains(&source.id))
            .collect();
        if selected.len() != options.sources.len() {
            let missing: Vec<&String> = options
                .sources
                .iter()
                .filter(|id| !known.iter().any(|source| &source.id == *id))
                .collect();
            bail!("Unknown or disabled sources: {missing:?}");
        }
        body["sources"] = json!(selected);
    }
    if let Some(group) = &options.group {
        body["group"] = json!(group);
    }
    if let Some(page) = options.page {
        body["page"] = json!(page);
    }

    let response = client
        .post(format!("{server}/api/search/stream"))
        .json(&body)
        .send()
        .await
        .with_context(|| format!("Could not reach {server}"))?
        .error_for_status()?;

    let mut consumer = StreamConsumer::new(Box::pin(response.bytes_stream()), query, &config.consumer)
        .with_sort_order(options.sort);

    let view = consumer
        .run_to_end(|view| {
            eprint!(
                "\r{}/{} sources, {} shown",
                view.completed_sources,
                view.total_sources,
                view.videos.len()
            );
        })
        .await;
    eprintln!();

    print_view(&view, options.limit);
    Ok(())
}

async fn fetch_sources(client: &reqwest::Client, server: &str) -> Result<Vec<SourceDescriptor>> {
    let listing: serde_json::Value = client
        .get(format!("{server}/api/sources"))
        .send()
        .await
        .with_context(|| format!("Could not reach {server}"))?
        .error_for_status()?
        .json()
        .await?;
    let sources = serde_json::from_value(listing["sources"].clone())
        .context("Server returned an unexpected source listing")?;
    Ok(sources)
}

fn print_view(view: &SearchView, limit: usize) {
    if let Some(reason) = &view.completion {
        println!("Search finished: {reason}");
    }
    println!(
        "{} results shown ({} reported by {} sources)",
        view.videos.len(),
        view.total_videos_found,
        view.total_sources
    );
    println!("{:-<72}", "");

    for scored in view.videos.iter().take(limit) {
        let video = &scored.video;
        println!(
            "{:>6.1}  {:<40} {:<6} [{}:{}]",
            scored.score,
            video.title,
            video.year.as_deref().unwrap_or("-"),
            video.source,
            video.id
        );
    }
    if view.videos.len() > limit {
        println!("... {} more", view.videos.len() - limit);
    }

    if !view.latencies.is_empty() {
        println!("\nSource latency:");
        for (source, latency) in &view.latencies {
            println!("  {source:<20} {latency} ms");
        }
    }
}

async fn detail(server: &str, id: &str, source: &str) -> Result<()> {
    let server = server.trim_end_matches('/');
    let response = reqwest::Client::new()
        .post(format!("{server}/api/detail"))
        .json(&json!({ "id": id, "source": source }))
        .send()
        .await
        .with_context(|| format!("Could not reach {server}"))?;

    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    if !status.is_success() {
        let message = body["error"]["message"].as_str().unwrap_or("unknown error");
        if body["error"]["notFound"].as_bool() == Some(true) {
            bail!("{message} (try another source)");
        }
        bail!("Detail lookup failed ({status}): {message}");
    }

    println!("{}", body["video"]["title"].as_str().unwrap_or(id));
    if let Some(group) = body["playGroup"].as_str() {
        println!("Play group: {group}");
    }
    for episode in body["episodes"].as_array().into_iter().flatten() {
        println!(
            "  {:<16} {}",
            episode["name"].as_str().unwrap_or("-"),
            episode["url"].as_str().unwrap_or("-")
        );
    }
    Ok(())
}

async fn sim(bind: &str) -> Result<()> {
    let server = SimServer::spawn_on(bind, SimulatedCatalog::demo()).await?;

    println!("Simulated catalog running on http://{}", server.address());
    println!("Sources file for `vidseek serve --sources`:");
    println!("{}", serde_json::to_string_pretty(&server.descriptors())?);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down simulated catalog");
    Ok(())
}
