mod chat;
mod web;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use docux_core::config::{DEFAULT_CHAT_MODEL, GROQ_BASE_URL};
use docux_core::{
    AppConfig, ChunkingConfig, EmbeddingConfig, IndexConfig, PromptSet, ProviderConfig,
    RetrievalConfig, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_SESSION_ID,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docux", version, about = "Chat with your PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Args, Debug, Clone)]
struct Settings {
    /// Provider API key; the UI asks for one when absent.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// OpenAI-compatible chat completions base URL
    #[arg(long, env = "DOCUX_BASE_URL", default_value = GROQ_BASE_URL, global = true)]
    base_url: String,

    /// Chat model name
    #[arg(long, env = "DOCUX_MODEL", default_value = DEFAULT_CHAT_MODEL, global = true)]
    model: String,

    /// Sampling temperature sent with every completion
    #[arg(long, env = "DOCUX_TEMPERATURE", global = true)]
    temperature: Option<f32>,

    /// Upper bound on generated tokens
    #[arg(long, env = "DOCUX_MAX_TOKENS", global = true)]
    max_tokens: Option<u32>,

    /// Per HTTP call timeout in seconds
    #[arg(long, env = "DOCUX_HTTP_TIMEOUT_SECS", global = true)]
    http_timeout_secs: Option<u64>,

    /// Deadline for every embedding, index, and chat call in seconds
    #[arg(long, env = "DOCUX_REQUEST_TIMEOUT_SECS", global = true)]
    request_timeout_secs: Option<u64>,

    /// Maximum chunk size in characters
    #[arg(long, env = "DOCUX_CHUNK_SIZE", default_value_t = 5_000, global = true)]
    chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[arg(long, env = "DOCUX_CHUNK_OVERLAP", default_value_t = 500, global = true)]
    chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, env = "DOCUX_TOP_K", default_value_t = 4, global = true)]
    top_k: usize,

    /// TOML file with `version`, `contextualize_system`, and `answer_system`
    #[arg(long, env = "DOCUX_PROMPTS", global = true)]
    prompts: Option<PathBuf>,

    /// Embeddings endpoint; the local hashed embedder is used when unset
    #[arg(long, env = "DOCUX_EMBEDDING_URL", global = true)]
    embedding_url: Option<String>,

    /// Embedding model served by --embedding-url
    #[arg(long, env = "DOCUX_EMBEDDING_MODEL", default_value = "text-embedding-3-small", global = true)]
    embedding_model: String,

    /// Embedding vector dimension
    #[arg(long, env = "DOCUX_EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS, global = true)]
    embedding_dimensions: usize,

    /// Texts per embeddings request
    #[arg(long, env = "DOCUX_EMBEDDING_BATCH", default_value_t = 64, global = true)]
    embedding_batch_size: usize,

    /// L2-normalise local hashed embeddings
    #[arg(long, default_value_t = false, global = true)]
    normalize_embeddings: bool,

    /// Qdrant base URL; the in-memory index is used when unset
    #[arg(long, env = "DOCUX_QDRANT_URL", global = true)]
    qdrant_url: Option<String>,

    /// Qdrant collection rebuilt for every upload batch
    #[arg(long, env = "DOCUX_QDRANT_COLLECTION", default_value = "docux_chunks", global = true)]
    qdrant_collection: String,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the upload and question page over HTTP.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "DOCUX_BIND", default_value = "127.0.0.1:8501")]
        bind: String,
        /// Largest accepted form submission in megabytes.
        #[arg(long, env = "DOCUX_MAX_UPLOAD_MB", default_value_t = 200)]
        max_upload_mb: usize,
    },
    /// Ask questions about local PDFs from the terminal.
    Chat {
        /// PDF file to load; repeatable.
        #[arg(long = "pdf")]
        pdfs: Vec<PathBuf>,
        /// Folder searched recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Conversation id.
        #[arg(long, default_value = DEFAULT_SESSION_ID)]
        session: String,
    },
}

impl Settings {
    fn app_config(&self) -> anyhow::Result<AppConfig> {
        let prompts = match &self.prompts {
            Some(path) => PromptSet::from_toml_file(path)
                .with_context(|| format!("loading prompts from {}", path.display()))?,
            None => PromptSet::default(),
        };

        let embedding = match &self.embedding_url {
            Some(base_url) => EmbeddingConfig::Http {
                base_url: base_url.clone(),
                model: self.embedding_model.clone(),
                dimensions: self.embedding_dimensions,
                batch_size: self.embedding_batch_size,
            },
            None => EmbeddingConfig::Hashed {
                dimensions: self.embedding_dimensions,
                normalize: self.normalize_embeddings,
            },
        };

        let index = match &self.qdrant_url {
            Some(url) => IndexConfig::Qdrant {
                url: url.clone(),
                collection: self.qdrant_collection.clone(),
            },
            None => IndexConfig::Memory,
        };

        let config = AppConfig {
            provider: ProviderConfig {
                base_url: self.base_url.clone(),
                model: self.model.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                http_timeout_secs: self.http_timeout_secs,
            },
            embedding,
            index,
            chunking: ChunkingConfig::new(self.chunk_size, self.chunk_overlap),
            retrieval: RetrievalConfig { top_k: self.top_k },
            prompts,
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.settings.app_config()?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        model = %config.provider.model,
        "docux boot"
    );

    match cli.command {
        Command::Serve {
            bind,
            max_upload_mb,
        } => {
            web::serve(
                config,
                cli.settings.api_key.as_deref(),
                &bind,
                max_upload_mb.saturating_mul(1024 * 1024),
            )
            .await
        }
        Command::Chat {
            pdfs,
            folder,
            session,
        } => {
            chat::run(
                config,
                cli.settings.api_key,
                chat::Sources { pdfs, folder },
                &session,
            )
            .await
        }
    }
}
