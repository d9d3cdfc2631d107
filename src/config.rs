use crate::error::RagbenchError;
use crate::eval::Measure;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
///
/// Serialized verbatim into each run artifact under `flags` so a run can be
/// reproduced from its output alone.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub retriever: RetrieverConfig,
    #[serde(default)]
    pub eval: EvalConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Benchmark file location and schema
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BenchmarkConfig {
    /// Path to the benchmark dataset (JSON, JSONL or YAML).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Field of each entry holding the question text.
    #[serde(default = "default_question_field")]
    pub question_field: String,
    /// Field of each entry holding the golden document identifiers.
    #[serde(default = "default_gold_field")]
    pub gold_field: String,
    /// Only evaluate the first N entries.
    #[serde(default)]
    pub max_instances: Option<usize>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            path: None,
            question_field: default_question_field(),
            gold_field: default_gold_field(),
            max_instances: None,
        }
    }
}

/// Which retriever adapter to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverKind {
    /// Remote retrieval service over HTTP
    #[default]
    Http,
    /// Precomputed predictions file
    RunFile,
    /// SQLite FTS5 index (BM25)
    Sqlite,
}

impl std::fmt::Display for RetrieverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrieverKind::Http => write!(f, "http"),
            RetrieverKind::RunFile => write!(f, "run_file"),
            RetrieverKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Retriever configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrieverConfig {
    #[serde(default)]
    pub kind: RetrieverKind,
    /// Endpoint for the HTTP retriever.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding a bearer token for the HTTP retriever.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Predictions file for the run-file retriever.
    #[serde(default)]
    pub predictions: Option<PathBuf>,
    /// SQLite index for the FTS5 retriever.
    #[serde(default)]
    pub index_db: Option<PathBuf>,
    /// Metadata key holding the document identifier.
    #[serde(default = "default_doc_id_field")]
    pub doc_id_field: String,
    /// Keep only the first K retrieved documents.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Per-query timeout; expiry counts as an empty result set.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            kind: RetrieverKind::default(),
            endpoint: None,
            api_key_env: None,
            predictions: None,
            index_db: None,
            doc_id_field: default_doc_id_field(),
            top_k: None,
            timeout_secs: None,
        }
    }
}

/// Metric suite configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvalConfig {
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            metrics: default_metrics(),
        }
    }
}

/// Reporting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Directory for run artifacts. Metrics are always logged; artifacts are optional.
    #[serde(default)]
    pub logs_dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            logs_dir: None,
            log_level: default_log_level(),
        }
    }
}

fn default_question_field() -> String {
    "question".to_string()
}

fn default_gold_field() -> String {
    "context_files".to_string()
}

fn default_doc_id_field() -> String {
    "file_path".to_string()
}

fn default_metrics() -> Vec<String> {
    Measure::default_suite().iter().map(|m| m.to_string()).collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for a config file in this order:
    /// 1. `explicit` (the `--config` flag)
    /// 2. Path specified in RAGBENCH_CONFIG environment variable
    /// 3. ./ragbench.toml in current directory, if it exists
    ///
    /// With no file at all, every setting takes its default and must come from flags.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => match std::env::var("RAGBENCH_CONFIG") {
                Ok(path) => Some(PathBuf::from(path)),
                Err(_) => {
                    let local = PathBuf::from("ragbench.toml");
                    local.exists().then_some(local)
                }
            },
        };

        match config_path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Validate configuration values
    ///
    /// Called after CLI overrides are applied, since the benchmark path and
    /// retriever inputs usually arrive as flags.
    pub fn validate(&self) -> Result<()> {
        if self.benchmark.path.is_none() {
            anyhow::bail!("benchmark.path is not set. Pass --benchmark or set it in ragbench.toml.");
        }

        if self.benchmark.question_field.is_empty() || self.benchmark.gold_field.is_empty() {
            anyhow::bail!("benchmark.question_field and benchmark.gold_field must not be empty");
        }

        if self.retriever.doc_id_field.is_empty() {
            anyhow::bail!("retriever.doc_id_field must not be empty");
        }

        match self.retriever.kind {
            RetrieverKind::Http => {
                let endpoint = self.retriever.endpoint.as_deref().with_context(|| {
                    "retriever.endpoint is required for the http retriever".to_string()
                })?;
                url::Url::parse(endpoint)
                    .with_context(|| format!("retriever.endpoint is not a valid URL: {}", endpoint))?;
            }
            RetrieverKind::RunFile => {
                if self.retriever.predictions.is_none() {
                    anyhow::bail!("retriever.predictions is required for the run_file retriever");
                }
            }
            RetrieverKind::Sqlite => {
                let index = self.retriever.index_db.as_ref().with_context(|| {
                    "retriever.index_db is required for the sqlite retriever".to_string()
                })?;
                if !index.is_file() {
                    anyhow::bail!("retriever.index_db does not exist: {}", index.display());
                }
            }
        }

        if self.retriever.top_k == Some(0) {
            anyhow::bail!("retriever.top_k must be greater than 0");
        }

        if self.retriever.timeout_secs == Some(0) {
            anyhow::bail!("retriever.timeout_secs must be greater than 0");
        }

        self.measures()?;

        Ok(())
    }

    /// Parse the configured metric names. Shared by `validate` and the harness.
    pub fn measures(&self) -> crate::error::Result<Vec<Measure>> {
        if self.eval.metrics.is_empty() {
            return Err(RagbenchError::Config(
                "eval.metrics must name at least one metric".to_string(),
            ));
        }
        self.eval
            .metrics
            .iter()
            .map(|name| name.parse::<Measure>())
            .collect()
    }

    /// Get benchmark path, if configured
    pub fn benchmark_path(&self) -> Option<&Path> {
        self.benchmark.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn write_config(temp_dir: &TempDir, content: &str) -> PathBuf {
        let path = temp_dir.path().join("ragbench.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_config_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
[benchmark]
path = "bench.json"
gold_field = "golden"
max_instances = 5

[retriever]
kind = "run_file"
predictions = "preds.json"
top_k = 10

[eval]
metrics = ["P@1", "MRR"]

[output]
logs_dir = "runs"
log_level = "debug"
"#,
        );

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.benchmark.path, Some(PathBuf::from("bench.json")));
        assert_eq!(config.benchmark.question_field, "question");
        assert_eq!(config.benchmark.gold_field, "golden");
        assert_eq!(config.benchmark.max_instances, Some(5));
        assert_eq!(config.retriever.kind, RetrieverKind::RunFile);
        assert_eq!(config.retriever.doc_id_field, "file_path");
        assert_eq!(config.output.log_level, "debug");
        assert!(config.validate().is_ok());
        assert_eq!(config.measures().unwrap(), vec![Measure::P(1), Measure::Mrr]);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.benchmark.question_field, "question");
        assert_eq!(config.benchmark.gold_field, "context_files");
        assert_eq!(config.measures().unwrap(), Measure::default_suite().to_vec());
        assert!(config.output.logs_dir.is_none());
    }

    #[test]
    fn test_config_requires_benchmark_path() {
        let mut config = Config::default();
        config.retriever.kind = RetrieverKind::RunFile;
        config.retriever.predictions = Some(PathBuf::from("preds.json"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("benchmark.path"));
    }

    #[test]
    fn test_config_http_requires_valid_endpoint() {
        let mut config = Config::default();
        config.benchmark.path = Some(PathBuf::from("bench.json"));
        assert!(config.validate().unwrap_err().to_string().contains("endpoint"));

        config.retriever.endpoint = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.retriever.endpoint = Some("http://localhost:8080/retrieve".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_unknown_metric() {
        let mut config = Config::default();
        config.benchmark.path = Some(PathBuf::from("bench.json"));
        config.retriever.endpoint = Some("http://localhost/retrieve".to_string());
        config.eval.metrics = vec!["P@1".to_string(), "F1".to_string()];
        assert!(config.validate().is_err());
        assert!(matches!(config.measures(), Err(RagbenchError::Config(_))));

        config.eval.metrics.clear();
        assert!(matches!(config.measures(), Err(RagbenchError::Config(_))));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_load_from_env() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "[benchmark]\npath = \"from-env.json\"\n");

        let original = std::env::var("RAGBENCH_CONFIG").ok();
        std::env::set_var("RAGBENCH_CONFIG", path.to_str().unwrap());
        let config = Config::load(None);
        std::env::remove_var("RAGBENCH_CONFIG");
        if let Some(v) = original {
            std::env::set_var("RAGBENCH_CONFIG", v);
        }

        let config = config.unwrap();
        assert_eq!(config.benchmark.path, Some(PathBuf::from("from-env.json")));
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let config = Config::load(Some(Path::new("nonexistent.toml")));
        assert!(config.is_err());
    }
}
