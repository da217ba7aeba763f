use crate::vectordb::DistanceMetric;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_VECTOR_DB_PATH: &str = "assets/database/docrag.db";
const DEFAULT_INSERT_BATCH_SIZE: usize = 50;
const DEFAULT_COMBINE_UNDER: usize = 100;
const DEFAULT_SPLIT_AFTER: usize = 1500;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docrag server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application name reported by the base endpoint.
    pub app_name: String,
    /// Application version reported by the base endpoint.
    pub app_version: String,
    /// Backend used for answer generation.
    pub generation_backend: LlmProvider,
    /// Backend used for text embeddings.
    pub embedding_backend: LlmProvider,
    /// API key for OpenAI-compatible backends.
    pub openai_api_key: Option<String>,
    /// Base URL override for OpenAI-compatible backends.
    pub openai_api_url: Option<String>,
    /// Base URL of the Ollama runtime.
    pub ollama_url: Option<String>,
    /// Model identifier used for generation.
    pub generation_model_id: String,
    /// Model identifier used for embeddings.
    pub embedding_model_id: String,
    /// Dimensionality of the produced vectors.
    pub embedding_model_size: usize,
    /// Optional character cap applied to every model input.
    pub input_default_max_characters: Option<usize>,
    /// Optional token cap for generated answers.
    pub generation_default_max_tokens: Option<u32>,
    /// Optional sampling temperature for generated answers.
    pub generation_default_temperature: Option<f32>,
    /// Vector store backend.
    pub vector_db_backend: VectorDbBackend,
    /// Database file used by the SQLite backend.
    pub vector_db_path: PathBuf,
    /// Distance metric assigned to newly created collections.
    pub vector_db_distance_method: DistanceMetric,
    /// Number of records written per insert window.
    pub vector_db_insert_batch_size: usize,
    /// Base URL of the Qdrant instance, when that backend is selected.
    pub qdrant_url: Option<String>,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Chunks shorter than this many characters are merged with a neighbor.
    pub chunk_combine_under: usize,
    /// Running chunks are closed once they exceed this many characters.
    pub chunk_split_after: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported model backends for embeddings and generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Local Ollama runtime.
    Ollama,
    /// OpenAI or any OpenAI-compatible endpoint.
    OpenAI,
}

/// Supported vector store backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDbBackend {
    /// Embedded SQLite index stored at `VECTOR_DB_PATH`.
    Sqlite,
    /// Remote Qdrant instance reachable at `QDRANT_URL`.
    Qdrant,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };
        Ok(Self {
            app_name: vars
                .optional("APP_NAME")
                .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string()),
            app_version: vars
                .optional("APP_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            generation_backend: vars.parsed("GENERATION_BACKEND")?,
            embedding_backend: vars.parsed("EMBEDDING_BACKEND")?,
            openai_api_key: vars.optional("OPENAI_API_KEY"),
            openai_api_url: vars.optional("OPENAI_API_URL"),
            ollama_url: vars.optional("OLLAMA_URL"),
            generation_model_id: vars.required("GENERATION_MODEL_ID")?,
            embedding_model_id: vars.required("EMBEDDING_MODEL_ID")?,
            embedding_model_size: vars.parsed("EMBEDDING_MODEL_SIZE")?,
            input_default_max_characters: vars.parsed_optional("INPUT_DEFAULT_MAX_CHARACTERS")?,
            generation_default_max_tokens: vars.parsed_optional("GENERATION_DEFAULT_MAX_TOKENS")?,
            generation_default_temperature: vars
                .parsed_optional("GENERATION_DEFAULT_TEMPERATURE")?,
            vector_db_backend: vars.parsed("VECTOR_DB_BACKEND")?,
            vector_db_path: vars
                .optional("VECTOR_DB_PATH")
                .unwrap_or_else(|| DEFAULT_VECTOR_DB_PATH.to_string())
                .into(),
            vector_db_distance_method: vars
                .parsed_optional("VECTOR_DB_DISTANCE_METHOD")?
                .unwrap_or_default(),
            vector_db_insert_batch_size: vars
                .parsed_optional("VECTOR_DB_INSERT_BATCH_SIZE")?
                .unwrap_or(DEFAULT_INSERT_BATCH_SIZE),
            qdrant_url: vars.optional("QDRANT_URL"),
            qdrant_api_key: vars.optional("QDRANT_API_KEY"),
            chunk_combine_under: vars
                .parsed_optional("CHUNK_COMBINE_UNDER")?
                .unwrap_or(DEFAULT_COMBINE_UNDER),
            chunk_split_after: vars
                .parsed_optional("CHUNK_SPLIT_AFTER")?
                .unwrap_or(DEFAULT_SPLIT_AFTER),
            server_port: vars.parsed_optional("SERVER_PORT")?,
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Result<T, ConfigError> {
        self.required(key)?
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string()))
    }

    fn parsed_optional<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.optional(key)
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string()))
            })
            .transpose()
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for VectorDbBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
///
/// `env_file` overrides the default `.env` lookup in the working directory.
pub fn init_config(env_file: Option<&std::path::Path>) {
    match env_file {
        Some(path) => {
            if let Err(error) = dotenvy::from_path(path) {
                eprintln!("Failed to read env file {}: {error}", path.display());
            }
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    let config = Config::from_env().expect("Failed to load config from environment");
    CONFIG.set(config).expect("Failed to set config");
}
