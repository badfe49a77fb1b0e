use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use rsearch_client::config::DEFAULT_BASE_URL;
use rsearch_client::{
    Config, PipelineError, QueryExecutor, SearchPipeline, SearchRequest, StoreConfig,
    TableTemplate, TranslationClient, TranslationConfig,
};

use crate::format::{format_json_lines, format_table, summarize};

/// Sample queries from the rsearch integration guide.
pub static SAMPLE_QUERIES: [(&str, &str); 6] = [
    ("Simple field search", "productCode:13w42"),
    ("Boolean AND", "productCode:13w42 AND region:ca"),
    ("Range query", "rodLength:[50 TO 200]"),
    ("Comparison operator", "price:>=100"),
    ("Complex query", "(region:ca OR region:ny) AND price:<150"),
    ("Wildcard search", "name:Widget*"),
];
/// Sample queries in flight at once; each opens its own store connection.
const EXAMPLE_CONCURRENCY: usize = 4;

#[derive(Parser)]
#[command(
    name = "rsearch-client",
    version,
    about = "Translate search-style queries with an rsearch service and run them against SQLite"
)]
pub struct Cli {
    #[command(flatten)]
    pub service: ServiceArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct ServiceArgs {
    /// Translation service base URL
    #[arg(long, env = "RSEARCH_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub url: String,

    /// Translation request timeout in seconds
    #[arg(long, env = "RSEARCH_TIMEOUT_SECS", default_value_t = 20, global = true)]
    pub timeout_secs: u64,
}

#[derive(Args)]
pub struct StoreArgs {
    /// SQLite database file (must exist)
    #[arg(long, env = "RSEARCH_DB")]
    pub db: PathBuf,

    /// Table to search
    #[arg(long, default_value = "products")]
    pub table: String,

    /// Schema name registered with the translation service
    #[arg(long, default_value = "products")]
    pub schema: String,

    /// Dialect requested from the translation service
    #[arg(long, env = "RSEARCH_DATABASE", default_value = "sqlite")]
    pub database: String,

    /// Statement execution timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub query_timeout_secs: u64,

    /// Fail when a result has more rows than this
    #[arg(long, default_value_t = 10_000)]
    pub max_rows: usize,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Command {
    /// Translate a query and print the matching records
    Search {
        /// Search-style query, e.g. 'productCode:13w42 AND region:ca'
        query: String,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Run the sample queries concurrently
    Examples {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Check the translation service health endpoint
    Health,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

impl ServiceArgs {
    fn translation_config(&self) -> TranslationConfig {
        TranslationConfig {
            request_timeout: Duration::from_secs(self.timeout_secs),
            ..TranslationConfig::new(&self.url)
        }
    }
}

impl StoreArgs {
    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            query_timeout: Duration::from_secs(self.query_timeout_secs),
            max_rows: self.max_rows,
            ..StoreConfig::new(&self.db)
        }
    }
}

type DynError = Box<dyn std::error::Error>;

pub async fn run(cli: Cli) -> Result<(), DynError> {
    match &cli.command {
        Command::Search { query, store } => search(&cli.service, store, query).await,
        Command::Examples { store } => examples(&cli.service, store).await,
        Command::Health => health(&cli.service).await,
    }
}

type Pipeline = SearchPipeline<TranslationClient, QueryExecutor>;

fn build(service: &ServiceArgs, store: &StoreArgs) -> Result<(Pipeline, TableTemplate), DynError> {
    let config = Config {
        translation: service.translation_config(),
        store: store.store_config(),
    };
    let pipeline = SearchPipeline::from_config(&config)?;
    let template = TableTemplate::select_all(&store.table)?;
    Ok((pipeline, template))
}

async fn search(service: &ServiceArgs, store: &StoreArgs, query: &str) -> Result<(), DynError> {
    if query.trim().is_empty() {
        return Err("query must not be empty".into());
    }

    let (pipeline, template) = build(service, store)?;
    info!(query_len = query.len(), table = %store.table, "search");

    let records = pipeline
        .run(&SearchRequest {
            schema: &store.schema,
            database: &store.database,
            template: &template,
            query,
        })
        .await
        .map_err(|e| describe_error(&e))?;

    let output = match store.format {
        OutputFormat::Table => format_table(&records),
        OutputFormat::Json => format_json_lines(&records)?,
    };
    print!("{output}");
    Ok(())
}

async fn examples(service: &ServiceArgs, store: &StoreArgs) -> Result<(), DynError> {
    let (pipeline, template) = build(service, store)?;
    let pipeline = &pipeline;
    let template = &template;

    let mut outcomes: Vec<_> = stream::iter(SAMPLE_QUERIES.iter().enumerate())
        .map(|(i, &(title, query))| async move {
            let result = pipeline
                .run(&SearchRequest {
                    schema: &store.schema,
                    database: &store.database,
                    template,
                    query,
                })
                .await;
            (i, title, query, result)
        })
        .buffer_unordered(EXAMPLE_CONCURRENCY)
        .collect()
        .await;
    outcomes.sort_by_key(|(i, ..)| *i);

    let mut failed = 0;
    for (_, title, query, result) in &outcomes {
        println!("\n=== Example: {title} ===");
        println!("Query: {query}");
        match result {
            Ok(records) => {
                println!("Found {} records", records.len());
                if let Some(first) = records.first() {
                    println!("  - {}", summarize(first));
                }
            }
            Err(e) => {
                failed += 1;
                warn!(example = %title, error = %e, "example failed");
                println!("Error: {}", describe_error(e));
            }
        }
    }

    if failed == outcomes.len() {
        return Err(format!("all {failed} example queries failed").into());
    }
    Ok(())
}

async fn health(service: &ServiceArgs) -> Result<(), DynError> {
    let client = TranslationClient::new(&service.translation_config())?;
    let status = client.health().await?;
    match status.version {
        Some(v) => println!("{}: {} (version {v})", service.url, status.status),
        None => println!("{}: {}", service.url, status.status),
    }
    Ok(())
}

/// User-facing message: origin-tagged error text, plus a hint when a retry may help.
pub fn describe_error(e: &PipelineError) -> String {
    if e.is_retriable() {
        format!("{e} (retriable)")
    } else {
        e.to_string()
    }
}
