use anyhow::{Context, Result};
use clap::Parser;
use ragbench::config::RetrieverKind;
use ragbench::retrieve::{Fts5Retriever, HttpRetriever, Retriever, RunFileRetriever};
use ragbench::{Config, Harness};
use std::path::PathBuf;

/// Runs retrieval on a benchmark dataset and reports IR metrics.
#[derive(Parser, Debug)]
#[command(name = "ragbench", version)]
struct Args {
    /// Path to a ragbench.toml config file (default: $RAGBENCH_CONFIG or ./ragbench.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the benchmark dataset.
    #[arg(long)]
    benchmark: Option<PathBuf>,

    /// Field in the benchmark dataset that contains the golden answers.
    #[arg(long)]
    gold_field: Option<String>,

    /// Field in the benchmark dataset that contains the questions.
    #[arg(long)]
    question_field: Option<String>,

    /// Where to write predictions and metrics. Optional, since metrics are also logged.
    #[arg(long)]
    logs_dir: Option<PathBuf>,

    /// Maximum number of instances to process.
    #[arg(long)]
    max_instances: Option<usize>,

    /// Comma-separated metrics (e.g. "Rprec,P@1,R@3,nDCG@3,MAP,MRR").
    #[arg(long, value_delimiter = ',')]
    metrics: Option<Vec<String>>,

    /// Retriever to evaluate.
    #[arg(long, value_enum)]
    retriever: Option<RetrieverKind>,

    /// Endpoint of the HTTP retriever.
    #[arg(long)]
    endpoint: Option<String>,

    /// Predictions file for the run-file retriever.
    #[arg(long)]
    predictions: Option<PathBuf>,

    /// SQLite FTS5 index for the sqlite retriever.
    #[arg(long)]
    index_db: Option<PathBuf>,

    /// Keep only the first K retrieved documents per question.
    #[arg(long)]
    top_k: Option<usize>,

    /// Per-question retrieval timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl Args {
    /// Flags win over the config file.
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.benchmark {
            config.benchmark.path = Some(v);
        }
        if let Some(v) = self.gold_field {
            config.benchmark.gold_field = v;
        }
        if let Some(v) = self.question_field {
            config.benchmark.question_field = v;
        }
        if let Some(v) = self.max_instances {
            config.benchmark.max_instances = Some(v);
        }
        if let Some(v) = self.logs_dir {
            config.output.logs_dir = Some(v);
        }
        if let Some(v) = self.metrics {
            config.eval.metrics = v;
        }
        if let Some(v) = self.retriever {
            config.retriever.kind = v;
        }
        if let Some(v) = self.endpoint {
            config.retriever.endpoint = Some(v);
        }
        if let Some(v) = self.predictions {
            config.retriever.predictions = Some(v);
        }
        if let Some(v) = self.index_db {
            config.retriever.index_db = Some(v);
        }
        if let Some(v) = self.top_k {
            config.retriever.top_k = Some(v);
        }
        if let Some(v) = self.timeout_secs {
            config.retriever.timeout_secs = Some(v);
        }
    }
}

/// Build the retriever named in the config.
fn build_retriever(config: &Config) -> Result<Box<dyn Retriever>> {
    let retriever = &config.retriever;
    let built: Box<dyn Retriever> = match retriever.kind {
        RetrieverKind::Http => {
            let endpoint = retriever
                .endpoint
                .clone()
                .context("retriever.endpoint is required for the http retriever")?;
            let api_key = match &retriever.api_key_env {
                Some(var) => Some(std::env::var(var).map_err(|_| {
                    anyhow::anyhow!(
                        "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                        var
                    )
                })?),
                None => None,
            };
            Box::new(HttpRetriever::new(endpoint, api_key, retriever.top_k)?)
        }
        RetrieverKind::RunFile => {
            let path = retriever
                .predictions
                .as_ref()
                .context("retriever.predictions is required for the run_file retriever")?;
            Box::new(RunFileRetriever::from_path(path, &config.benchmark.question_field)?)
        }
        RetrieverKind::Sqlite => {
            let path = retriever
                .index_db
                .as_ref()
                .context("retriever.index_db is required for the sqlite retriever")?;
            Box::new(Fts5Retriever::new(
                path,
                retriever.top_k,
                &retriever.doc_id_field,
            ))
        }
    };
    Ok(built)
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    let retriever = build_retriever(&config)?;
    let harness = Harness::new(config, retriever.as_ref())?;
    let outcome = harness.run().await?;

    if !outcome.failed_queries.is_empty() {
        log::warn!(
            "{} questions failed retrieval and were scored as empty: {}",
            outcome.failed_queries.len(),
            outcome.failed_queries.join(", ")
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // RUST_LOG wins; otherwise the configured level (resolved before the logger exists)
    let default_level = Config::load(args.config.as_deref())
        .map(|c| c.output.log_level)
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", default_level))
        .init();

    let result = run(args).await;
    if let Err(e) = &result {
        log::error!("{:#}", e);
    }
    log::logger().flush();

    if result.is_err() {
        std::process::exit(1);
    }
}
