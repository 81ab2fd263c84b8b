use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error in {document}: {details}")]
    PdfParse { document: String, details: String },

    #[error("no text could be extracted from the uploaded documents")]
    NoText,

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("missing API credential: set {0}")]
    MissingCredential(&'static str),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("{service} returned {status}: {details}")]
    Api {
        service: String,
        status: u16,
        details: String,
    },

    #[error("{0} returned no content")]
    EmptyResponse(String),

    #[error("invalid response from {service}: {details}")]
    InvalidResponse { service: String, details: String },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no index found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Index(IndexError),

    #[error("no documents processed yet: upload PDFs and process them before asking questions")]
    IndexNotFound,

    #[error("invalid question: {0}")]
    InvalidQuestion(String),

    #[error("invalid prompt template: {0}")]
    InvalidTemplate(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<IndexError> for PipelineError {
    fn from(value: IndexError) -> Self {
        match value {
            IndexError::NotFound(_) => PipelineError::IndexNotFound,
            other => PipelineError::Index(other),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
