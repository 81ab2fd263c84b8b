pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
#[doc(hidden)]
pub mod testing;

pub use chunking::{ChunkingConfig, Chunks, TextSplitter};
pub use config::{AppConfig, API_KEY_ENV};
pub use embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IndexError, IngestError, PipelineError, Result, ServiceError};
pub use extractor::{extract_text, LopdfExtractor, PageText, PdfExtractor};
pub use index::{VectorIndex, INDEX_FILE_NAME};
pub use ingest::{discover_pdf_files, load_uploads};
pub use models::{
    Answer, DocumentFingerprint, IndexState, PdfUpload, ProcessReport, RetrievedChunk, TextChunk,
};
pub use orchestrator::QaCoordinator;
pub use prompt::PromptTemplate;
pub use providers::{GeminiChat, GeminiClient, GeminiEmbedder};
pub use traits::{ChatModel, Embedder};
