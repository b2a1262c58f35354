//! Environment-driven configuration.
//!
//! The service is deployed with environment variables only; there is no
//! config file. [`Config::from_env`] reads every knob, applies defaults,
//! and rejects values that cannot work (zero batch sizes, missing
//! connection strings).
//!
//! | Variable | Default | Purpose |
//! |----------|---------|---------|
//! | `MONGO_URI` | required | MongoDB connection string |
//! | `MONGO_DB` | `studybuddy` | database name |
//! | `EMBED_BASE_URL` | required | embedding service base URL |
//! | `EMBED_BATCH_SIZE` | `8` | texts per embed request |
//! | `MAX_FILES_PER_UPLOAD` | `15` | upload batch cap |
//! | `MAX_FILE_MB` | `50` | per-file size cap |
//! | `CHUNK_MAX_WORDS` | `450` | chunk window size |
//! | `CHUNK_MIN_WORDS` | `150` | soft minimum for terminal chunks |
//! | `CHUNK_OVERLAP_WORDS` | `50` | carry-over between windows |
//! | `MONGO_INSERT_BATCH_SIZE` | `200` | chunk insert batch size |
//! | `PARSER_USE_RICH_PDF` | `false` | use the full PDF library instead of the byte scan |
//! | `LLM_BASE_URL` | `https://api.openai.com/v1` | OpenAI-compatible chat endpoint |
//! | `LLM_MODEL_SMALL` | `gpt-4o-mini` | model for labels and short summaries |
//! | `LLM_MODEL_LARGE` | `gpt-4o` | model for long-document segmentation |
//! | `LLM_API_KEY`, `LLM_API_KEY_1..3` | unset | bearer keys, first usable wins |

use anyhow::{bail, Context, Result};

/// Embedding dimensionality of the remote model. Fixed, not configurable:
/// the stored-chunk contract and the index layout both assume it.
pub const VECTOR_DIM: usize = 384;

/// Ordered list of environment variables consulted for an LLM bearer key.
pub const LLM_KEY_ENV_VARS: &[&str] = &[
    "LLM_API_KEY",
    "LLM_API_KEY_1",
    "LLM_API_KEY_2",
    "LLM_API_KEY_3",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub mongo: MongoConfig,
    pub embed: EmbedConfig,
    pub llm: LlmConfig,
    pub upload: UploadConfig,
    pub chunking: ChunkingConfig,
    pub parser: ParserConfig,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub db: String,
    pub insert_batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct EmbedConfig {
    pub base_url: String,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model_small: String,
    pub model_large: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_files: usize,
    pub max_file_mb: usize,
}

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub max_words: usize,
    pub min_words: usize,
    pub overlap_words: usize,
}

#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub use_rich_pdf: bool,
}

impl UploadConfig {
    pub fn max_file_bytes(&self) -> usize {
        self.max_file_mb * 1024 * 1024
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Config> {
        let mongo = MongoConfig {
            uri: required("MONGO_URI")?,
            db: optional("MONGO_DB").unwrap_or_else(|| "studybuddy".to_string()),
            insert_batch_size: parsed("MONGO_INSERT_BATCH_SIZE", 200)?,
        };

        let embed = EmbedConfig {
            base_url: required("EMBED_BASE_URL")?,
            batch_size: parsed("EMBED_BATCH_SIZE", 8)?,
            timeout_secs: parsed("EMBED_TIMEOUT_SECS", 60)?,
        };

        let llm = LlmConfig {
            base_url: optional("LLM_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model_small: optional("LLM_MODEL_SMALL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            model_large: optional("LLM_MODEL_LARGE").unwrap_or_else(|| "gpt-4o".to_string()),
            timeout_secs: parsed("LLM_TIMEOUT_SECS", 30)?,
        };

        let upload = UploadConfig {
            max_files: parsed("MAX_FILES_PER_UPLOAD", 15)?,
            max_file_mb: parsed("MAX_FILE_MB", 50)?,
        };

        let chunking = ChunkingConfig {
            max_words: parsed("CHUNK_MAX_WORDS", 450)?,
            min_words: parsed("CHUNK_MIN_WORDS", 150)?,
            overlap_words: parsed("CHUNK_OVERLAP_WORDS", 50)?,
        };

        let parser = ParserConfig {
            use_rich_pdf: flag("PARSER_USE_RICH_PDF"),
        };

        let config = Config {
            mongo,
            embed,
            llm,
            upload,
            chunking,
            parser,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.mongo.insert_batch_size == 0 {
            bail!("MONGO_INSERT_BATCH_SIZE must be > 0");
        }
        if self.embed.batch_size == 0 {
            bail!("EMBED_BATCH_SIZE must be > 0");
        }
        if self.upload.max_files == 0 {
            bail!("MAX_FILES_PER_UPLOAD must be > 0");
        }
        if self.upload.max_file_mb == 0 {
            bail!("MAX_FILE_MB must be > 0");
        }
        if self.chunking.max_words == 0 {
            bail!("CHUNK_MAX_WORDS must be > 0");
        }
        if self.chunking.overlap_words >= self.chunking.max_words {
            bail!("CHUNK_OVERLAP_WORDS must be < CHUNK_MAX_WORDS");
        }
        Ok(())
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} must be set", name))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match optional(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} is not a valid value: {:?}", name, raw)),
        None => Ok(default),
    }
}

fn flag(name: &str) -> bool {
    matches!(
        optional(name).as_deref(),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}
