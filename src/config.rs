//! Configuration for the pipeline, its collaborators and the HTTP surface
//!
//! Loads configuration from a YAML file (default `config.yml`) and the
//! environment. Environment variables take precedence over file values and
//! `${VAR}` placeholders in the file are resolved from the environment.
//! Settings marked required have no defaults: a missing value is a fatal
//! configuration error at startup.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::{Error, Result};

/// Vertex count below which community detection is skipped.
pub const SMALL_GRAPH_THRESHOLD: usize = 10;
/// Communities smaller than this are merged into the overflow community.
pub const MIN_COMMUNITY_SIZE: usize = 3;
pub const DEFAULT_RESOLUTION: f64 = 1.0;
pub const DEFAULT_MAX_ITERATIONS: usize = 3;
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";
pub const DEFAULT_DOCUMENTS_FOLDER: &str = "test_docs";
pub const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 300;

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    pipeline: Option<YamlPipeline>,
    graph: Option<YamlGraph>,
    rate_limit: Option<YamlRateLimit>,
    inference: Option<YamlInference>,
    store: Option<YamlStore>,
    server: Option<YamlServer>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlPipeline {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    chunk_size: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    chunk_overlap: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlGraph {
    small_graph_threshold: Option<usize>,
    min_community_size: Option<usize>,
    resolution: Option<f64>,
    max_iterations: Option<usize>,
    partition_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlRateLimit {
    url: Option<String>,
    bucket_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    capacity: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    refill_rate: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    timeout_secs: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlInference {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    temperature: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    max_tokens: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlStore {
    backend: Option<String>,
    uri: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlServer {
    bind: Option<String>,
    documents_folder: Option<String>,
}

/// Deserialize a value that can be either a string or a number
fn deserialize_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {:?}",
            other
        ))),
    }
}

/// How community detection partitions the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    /// One partitioner run over the full graph.
    WholeGraph,
    /// One partitioner run per weakly-connected component.
    PerComponent,
}

impl FromStr for PartitionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "whole_graph" | "whole" | "full" => Ok(PartitionMode::WholeGraph),
            "per_component" | "components" => Ok(PartitionMode::PerComponent),
            other => Err(Error::Config(format!("unknown partition mode '{}'", other))),
        }
    }
}

/// Which store backs the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Neo4j {
        uri: String,
        username: String,
        password: String,
    },
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Window size W in characters.
    pub chunk_size: usize,
    /// Overlap O in characters, `0 < O < W`.
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub small_graph_threshold: usize,
    pub min_community_size: usize,
    pub resolution: f64,
    pub max_iterations: usize,
    pub partition_mode: PartitionMode,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            small_graph_threshold: SMALL_GRAPH_THRESHOLD,
            min_community_size: MIN_COMMUNITY_SIZE,
            resolution: DEFAULT_RESOLUTION,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            partition_mode: PartitionMode::WholeGraph,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub url: String,
    pub bucket_id: String,
    pub capacity: u64,
    /// Tokens added per minute.
    pub refill_rate: f64,
    /// Seconds the limiter may hold a consume request.
    pub timeout_secs: f64,
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub documents_folder: String,
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub graph: GraphConfig,
    pub rate_limit: RateLimitConfig,
    pub inference: InferenceConfig,
    pub store: StoreBackend,
    pub server: ServerConfig,
}

impl Config {
    /// Load from `config.yml` (current or parent directory) when present,
    /// otherwise from the environment alone.
    pub fn new() -> Result<Self> {
        for candidate in ["config.yml", "../config.yml"] {
            if Path::new(candidate).exists() {
                return Self::load(candidate);
            }
        }
        Self::from_env()
    }

    /// Build configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::load_dotenv();
        Self::from_yaml(YamlConfig::default())
    }

    /// Load configuration from a specific file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text, applying environment overrides.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let yaml: YamlConfig = serde_yaml::from_str(content)?;
        Self::from_yaml(yaml)
    }

    fn from_yaml(yaml: YamlConfig) -> Result<Self> {
        let pipeline = yaml.pipeline.unwrap_or_default();
        let graph = yaml.graph.unwrap_or_default();
        let rate_limit = yaml.rate_limit.unwrap_or_default();
        let inference = yaml.inference.unwrap_or_default();
        let store = yaml.store.unwrap_or_default();
        let server = yaml.server.unwrap_or_default();

        let chunk_size: usize = required_parsed(pipeline.chunk_size, "CHUNK_SIZE")?;
        let chunk_overlap: usize = required_parsed(pipeline.chunk_overlap, "CHUNK_OVERLAP")?;
        if chunk_overlap == 0 || chunk_overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk sizes must satisfy CHUNK_SIZE > CHUNK_OVERLAP > 0 (got {} / {})",
                chunk_size, chunk_overlap
            )));
        }

        let defaults = GraphConfig::default();
        let partition_mode = match graph.partition_mode {
            Some(mode) => mode.parse()?,
            None => defaults.partition_mode,
        };
        let graph = GraphConfig {
            small_graph_threshold: graph
                .small_graph_threshold
                .unwrap_or(defaults.small_graph_threshold),
            min_community_size: graph
                .min_community_size
                .unwrap_or(defaults.min_community_size)
                .max(1),
            resolution: graph.resolution.unwrap_or(defaults.resolution),
            max_iterations: graph.max_iterations.unwrap_or(defaults.max_iterations),
            partition_mode,
        };
        if !(graph.resolution.is_finite() && graph.resolution > 0.0) {
            return Err(Error::Config(format!(
                "graph resolution must be a finite value > 0 (got {})",
                graph.resolution
            )));
        }

        let capacity: u64 = required_parsed(rate_limit.capacity, "RATE_LIMIT_CAPACITY")?;
        let refill_rate: f64 = required_parsed(rate_limit.refill_rate, "RATE_LIMIT_REFILL_RATE")?;
        if capacity == 0 || refill_rate <= 0.0 {
            return Err(Error::Config(
                "rate limit capacity and refill rate must be > 0".to_string(),
            ));
        }
        let rate_limit = RateLimitConfig {
            url: required(rate_limit.url, "RATE_LIMITER_URL")?,
            bucket_id: required(rate_limit.bucket_id, "RATE_LIMIT_BUCKET_ID")?,
            capacity,
            refill_rate,
            timeout_secs: required_parsed(rate_limit.timeout_secs, "RATE_LIMIT_TIMEOUT")?,
        };

        let inference = InferenceConfig {
            base_url: required(inference.base_url, "OPENAI_BASE_URL")?,
            api_key: required(inference.api_key, "OPENAI_API_KEY")?,
            model: required(inference.model, "OPENAI_INFERENCE_MODEL_NAME")?,
            temperature: optional_parsed(inference.temperature, "OPENAI_TEMPERATURE")?,
            max_tokens: optional_parsed(inference.max_tokens, "OPENAI_MAX_TOKENS")?,
            timeout_secs: inference
                .timeout_secs
                .unwrap_or(DEFAULT_INFERENCE_TIMEOUT_SECS),
        };

        let backend = resolve_env_string(store.backend, "STORE_BACKEND");
        let store = match backend.as_deref().unwrap_or("memory") {
            "memory" => StoreBackend::Memory,
            "neo4j" => StoreBackend::Neo4j {
                uri: required(store.uri, "NEO4J_URI")?,
                username: required(store.username, "NEO4J_USERNAME")?,
                password: required(store.password, "NEO4J_PASSWORD")?,
            },
            other => {
                return Err(Error::Config(format!(
                    "unknown store backend '{}' (expected memory or neo4j)",
                    other
                )))
            }
        };

        let server = ServerConfig {
            bind: resolve_env_string(server.bind, "BIND_ADDR")
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
            documents_folder: resolve_env_string(server.documents_folder, "DOCUMENTS_FOLDER")
                .unwrap_or_else(|| DEFAULT_DOCUMENTS_FOLDER.to_string()),
        };

        Ok(Self {
            pipeline: PipelineConfig {
                chunk_size,
                chunk_overlap,
            },
            graph,
            rate_limit,
            inference,
            store,
            server,
        })
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        // Try to load from current directory first, then parent
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }
}

/// Resolve a value: env var wins, then `${VAR}` placeholders, then the literal.
fn resolve_env_string(value: Option<String>, env_key: &str) -> Option<String> {
    if let Ok(env_val) = std::env::var(env_key) {
        if !env_val.trim().is_empty() {
            return Some(env_val);
        }
    }
    match value {
        Some(v) if v.starts_with("${") && v.ends_with('}') => {
            let var_name = &v[2..v.len() - 1];
            std::env::var(var_name).ok().filter(|s| !s.trim().is_empty())
        }
        Some(v) if v.trim().is_empty() => None,
        other => other,
    }
}

fn required(value: Option<String>, env_key: &str) -> Result<String> {
    resolve_env_string(value, env_key)
        .ok_or_else(|| Error::Config(format!("{} is required", env_key)))
}

fn required_parsed<T: FromStr>(value: Option<String>, env_key: &str) -> Result<T> {
    let raw = required(value, env_key)?;
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has invalid value '{}'", env_key, raw)))
}

fn optional_parsed<T: FromStr>(value: Option<String>, env_key: &str) -> Result<Option<T>> {
    match resolve_env_string(value, env_key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has invalid value '{}'", env_key, raw))),
    }
}
