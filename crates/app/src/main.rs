mod server;

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use talking_pdfs_core::config::{
    DEFAULT_API_BASE, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL, DEFAULT_INDEX_DIR,
    DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
};
use talking_pdfs_core::{
    load_uploads, AppConfig, CharacterNgramEmbedder, Embedder, GeminiChat, GeminiClient,
    GeminiEmbedder, IndexState, QaCoordinator, API_KEY_ENV,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Coordinator = QaCoordinator<Box<dyn Embedder>, GeminiChat>;

#[derive(Parser)]
#[command(name = "talking-pdfs", version, about = "Talk to the PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Gemini API key
    #[arg(long, env = API_KEY_ENV, hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Generative Language API base URL
    #[arg(long, env = "TALKING_PDFS_API_BASE", default_value = DEFAULT_API_BASE, global = true)]
    api_base: String,

    /// Directory holding the persisted vector index
    #[arg(long, env = "TALKING_PDFS_INDEX_DIR", default_value = DEFAULT_INDEX_DIR, global = true)]
    index_dir: PathBuf,

    /// Embedding model
    #[arg(long, env = "TALKING_PDFS_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL, global = true)]
    embedding_model: String,

    /// Chat model used to answer questions
    #[arg(long, env = "TALKING_PDFS_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL, global = true)]
    chat_model: String,

    /// Sampling temperature for answers
    #[arg(long, env = "TALKING_PDFS_TEMPERATURE", default_value_t = DEFAULT_TEMPERATURE, global = true)]
    temperature: f32,

    /// Number of chunks retrieved as context
    #[arg(long, env = "TALKING_PDFS_TOP_K", default_value_t = DEFAULT_TOP_K, global = true)]
    top_k: usize,

    /// Embed locally with hashed character trigrams instead of the hosted model.
    #[arg(long, env = "TALKING_PDFS_OFFLINE", default_value_t = false, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk and index PDFs, replacing any previous index.
    Process {
        /// PDF files, or folders searched recursively for PDFs.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Ask a question about the processed PDFs.
    Ask {
        question: String,
        /// Print the retrieved context chunks after the reply.
        #[arg(long, env = "TALKING_PDFS_SHOW_CONTEXT", default_value_t = false)]
        show_context: bool,
    },
    /// Show whether an index has been built.
    Status,
    /// Serve the upload and question page over HTTP.
    Serve {
        #[arg(long, env = "TALKING_PDFS_ADDR", default_value = "127.0.0.1:8501")]
        addr: SocketAddr,
        /// Maximum upload size in megabytes.
        #[arg(long, env = "TALKING_PDFS_MAX_UPLOAD_MB", default_value = "200")]
        max_upload_mb: usize,
    },
}

impl Cli {
    fn app_config(&self) -> AppConfig {
        AppConfig {
            api_base: self.api_base.clone(),
            embedding_model: self.embedding_model.clone(),
            chat_model: self.chat_model.clone(),
            temperature: self.temperature,
            top_k: self.top_k,
            index_dir: self.index_dir.clone(),
            ..AppConfig::default()
        }
        .with_api_key(self.api_key.clone())
    }
}

fn build_coordinator(config: &AppConfig, offline: bool) -> anyhow::Result<Coordinator> {
    let client = GeminiClient::new(config)?;
    let embedder: Box<dyn Embedder> = if offline {
        Box::new(CharacterNgramEmbedder::default())
    } else {
        Box::new(GeminiEmbedder::new(client.clone(), &config.embedding_model))
    };
    let chat = GeminiChat::new(client, &config.chat_model, config.temperature);
    Ok(QaCoordinator::new(config, embedder, chat)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.app_config();
    if config.api_key.is_none() {
        warn!("{API_KEY_ENV} is not set; requests to the hosted models will fail");
    }

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        index_dir = %config.index_dir.display(),
        "talking-pdfs boot"
    );

    let qa = build_coordinator(&config, cli.offline)?;

    match cli.command {
        Command::Process { paths } => {
            let uploads = load_uploads(&paths).await?;
            info!(documents = uploads.len(), "processing uploads");
            let report = qa.process_documents(&uploads).await?;

            println!("Done!");
            println!(
                "{} document(s), {} page(s), {} chunk(s) indexed into {}",
                report.documents.len(),
                report.pages,
                report.chunks,
                report.index_file.display()
            );
            println!("Your PDFs have been processed. You can now ask questions about them.");
        }
        Command::Ask {
            question,
            show_context,
        } => {
            let answer = qa.answer_question(&question).await?;
            println!("Reply: {}", answer.text.trim());

            if show_context {
                for (position, chunk) in answer.context.iter().enumerate() {
                    println!("[context {}] score={:.4}", position + 1, chunk.score);
                    println!("{}", chunk.text.trim());
                }
            }
        }
        Command::Status => match qa.index_state().await? {
            IndexState::Empty => println!("no index: process some PDFs first"),
            IndexState::Ready {
                chunks,
                embedding_model,
                built_at,
            } => println!(
                "index ready: {chunks} chunk(s), model={embedding_model}, built_at={}",
                built_at.to_rfc3339()
            ),
        },
        Command::Serve {
            addr,
            max_upload_mb,
        } => {
            server::serve(Arc::new(qa), addr, max_upload_mb * 1024 * 1024).await?;
        }
    }

    Ok(())
}
