use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use news_ingest::catalog;
use news_ingest::cli::{ArticlesArgs, Cli, Command};
use news_ingest::config::Config;
use news_ingest::db::Repository;
use news_ingest::error::{AppError, Result};
use news_ingest::models::RunStats;
use news_ingest::pipeline::{FetchReport, Pipeline};
use news_ingest::stats::RunLedger;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG overrides --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Fetch { sources, key } => {
            let pipeline = Pipeline::new(&config).await?;
            let key = key.unwrap_or_else(|| pipeline.default_key().to_string());
            let report = pipeline.run_fetch(&sources.filter(), &key).await?;
            print_fetch(&report, &key);
        }
        Command::Import { flags, key } => {
            let pipeline = Pipeline::new(&config).await?;
            let key = key.unwrap_or_else(|| pipeline.default_key().to_string());
            let run = pipeline.run_import(&key, flags.options()).await?;
            print_run(&run);
        }
        Command::Run {
            sources,
            flags,
            key,
        } => {
            let pipeline = Pipeline::new(&config).await?;
            let key = key.unwrap_or_else(|| pipeline.default_key().to_string());
            let (report, run) = pipeline
                .run(&sources.filter(), &key, flags.options())
                .await?;
            print_fetch(&report, &key);
            print_run(&run);
        }
        Command::LoadSources { file } => {
            let repo = Repository::new(&config.db_path).await?;
            let sources = match file {
                Some(path) => catalog::from_file(&path)?,
                None => catalog::builtin(),
            };
            let report = catalog::load_sources(&repo, sources).await?;
            println!(
                "Created: {}, Updated: {}, Invalid: {}",
                report.created, report.updated, report.invalid
            );
        }
        Command::Runs { limit } => {
            let repo = Repository::new(&config.db_path).await?;
            for run in RunLedger::new(repo).recent(limit).await? {
                print_run(&run);
            }
        }
        Command::Articles(args) => {
            let repo = Repository::new(&config.db_path).await?;
            list_articles(&repo, &args).await?;
        }
    }

    Ok(())
}

async fn list_articles(repo: &Repository, args: &ArticlesArgs) -> Result<()> {
    let source_id = match args.source.as_deref() {
        Some(name) => match repo.source_by_name(name).await? {
            Some(source) => Some(source.id),
            None => return Err(AppError::Config(format!("unknown source {:?}", name))),
        },
        None => None,
    };

    let page = repo.query_articles(&args.query(source_id)).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    for article in &page.items {
        println!(
            "{}  {}  [{}]  {}",
            article.created_at.format("%Y-%m-%d %H:%M"),
            article.slug,
            article.source_name,
            article.title
        );
    }
    println!(
        "Page {}/{} ({} articles)",
        page.page,
        page.page_count(),
        page.total
    );
    Ok(())
}

fn print_fetch(report: &FetchReport, key: &str) {
    println!(
        "Sources processed: {}, Articles staged: {} (key {}), Rejected: {}",
        report.sources_processed,
        report.articles.len(),
        key,
        report.rejected
    );
}

fn print_run(run: &RunStats) {
    let duration = run
        .duration()
        .map(|d| format!("{:.1}s", d.num_milliseconds() as f64 / 1000.0))
        .unwrap_or_else(|| "unfinished".to_string());
    println!(
        "Run {} started {}: {} ({})",
        run.id,
        run.started_at.format("%Y-%m-%d %H:%M:%S"),
        run.counters(),
        duration
    );
}
