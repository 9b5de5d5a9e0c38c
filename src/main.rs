use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use reqwest::Client;
use retail_orders::{
    config::{DateParsing, LoadMode, PipelineConfig, StoreConfig},
    fetch::{self, DatasetSource},
    pipeline::{self, QueryOutput},
    Query,
};
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Retail orders: fetch a CSV, load it into DuckDB, run the analytics catalog"
)]
struct Cli {
    /// YAML configuration file; flags override its values.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, transform, load, then run every catalog query.
    Run(RunArgs),
    /// Run catalog queries against an already-loaded store.
    Query(QueryArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Args)]
struct StoreArgs {
    /// `:memory:`, a DuckDB file, or `duckdb://<path>`.
    #[arg(long)]
    store: Option<String>,
    #[arg(long)]
    table: Option<String>,
}

impl StoreArgs {
    fn apply(self, cfg: &mut StoreConfig) {
        if let Some(s) = self.store {
            cfg.connection = s;
        }
        if let Some(t) = self.table {
            cfg.table = t;
        }
    }
}

#[derive(Args)]
struct RunArgs {
    /// Local CSV or zip file.
    #[arg(long, conflicts_with = "kaggle")]
    source: Option<PathBuf>,
    /// Kaggle dataset, `owner/slug`.
    #[arg(long, requires = "file")]
    kaggle: Option<String>,
    /// File inside the dataset or archive.
    #[arg(long)]
    file: Option<String>,
    #[command(flatten)]
    store: StoreArgs,
    #[arg(long, value_enum)]
    mode: Option<LoadMode>,
    /// chrono format of the order date column.
    #[arg(long)]
    date_format: Option<String>,
    /// Fail the run on the first unparseable date.
    #[arg(long)]
    strict: bool,
    /// Also write the transformed table to this Parquet file.
    #[arg(long)]
    snapshot: Option<PathBuf>,
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// Re-download even when a cached copy exists.
    #[arg(long)]
    refresh: bool,
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,
}

impl RunArgs {
    fn apply(self, cfg: &mut PipelineConfig) -> OutputFormat {
        match (self.source, self.kaggle) {
            (Some(path), _) => {
                cfg.source = Some(DatasetSource::Local {
                    path,
                    file: self.file,
                })
            }
            (None, Some(dataset)) => {
                cfg.source = Some(DatasetSource::Kaggle {
                    dataset,
                    file: self.file.unwrap_or_default(),
                })
            }
            (None, None) => {}
        }
        self.store.apply(&mut cfg.store);
        if let Some(mode) = self.mode {
            cfg.store.mode = mode;
        }
        if let Some(f) = self.date_format {
            cfg.transform.date_format = f;
        }
        if self.strict {
            cfg.transform.date_parsing = DateParsing::Strict;
        }
        if self.snapshot.is_some() {
            cfg.snapshot = self.snapshot;
        }
        if let Some(dir) = self.cache_dir {
            cfg.cache_dir = dir;
        }
        cfg.refresh |= self.refresh;
        self.format
    }
}

#[derive(Args)]
struct QueryArgs {
    /// Catalog queries to run; all of them when omitted.
    names: Vec<Query>,
    #[command(flatten)]
    store: StoreArgs,
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,
}

fn print_queries(outputs: &[QueryOutput]) {
    for out in outputs {
        println!("── {} ({})", out.query, out.description);
        println!("{}", out.rendered);
    }
}

async fn run(mut cfg: PipelineConfig, args: RunArgs) -> Result<()> {
    let format = args.apply(&mut cfg);
    cfg.validate()?;
    let source = cfg
        .source
        .clone()
        .context("no dataset source: pass --source or --kaggle, or set `source` in the config")?;

    // ─── 1) fetch ────────────────────────────────────────────────────
    let start = Instant::now();
    let client = Client::new();
    let dataset = fetch::fetch_dataset(&client, &source, &cfg.cache_dir, cfg.refresh)
        .await
        .with_context(|| format!("fetching {source}"))?;
    info!(origin = %dataset.origin.display(), elapsed = ?start.elapsed(), "fetched");

    // ─── 2) transform, load, query on the blocking pool ──────────────
    let report = tokio::task::spawn_blocking(move || pipeline::run(&dataset.csv, &cfg))
        .await
        .context("pipeline task panicked")?
        .context("pipeline run failed")?;

    // ─── 3) report ───────────────────────────────────────────────────
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => {
            println!(
                "loaded {} rows into `{}` ({:?}); {} rows persisted, {} with no order date",
                report.rows_loaded,
                report.table,
                report.mode,
                report.rows_persisted,
                report.transform.null_dates
            );
            print_queries(&report.queries);
        }
    }
    info!(elapsed = ?start.elapsed(), "all done");
    Ok(())
}

async fn query(mut cfg: PipelineConfig, args: QueryArgs) -> Result<()> {
    args.store.apply(&mut cfg.store);
    cfg.validate()?;
    let queries = if args.names.is_empty() {
        Query::ALL.to_vec()
    } else {
        args.names
    };

    let store = cfg.store;
    let outputs = tokio::task::spawn_blocking(move || pipeline::query(&store, &queries))
        .await
        .context("query task panicked")?
        .context("query failed")?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outputs)?),
        OutputFormat::Table => print_queries(&outputs),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── init logging ────────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => PipelineConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Run(args) => run(cfg, args).await,
        Command::Query(args) => query(cfg, args).await,
    }
}
