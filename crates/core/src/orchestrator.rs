use crate::chunking::TextSplitter;
use crate::config::AppConfig;
use crate::extractor::{extract_with, LopdfExtractor};
use crate::index::{self, VectorIndex};
use crate::ingest::fingerprint;
use crate::prompt::{stuff_context, PromptTemplate, CONTEXT_VARIABLE, QUESTION_VARIABLE};
use crate::traits::{ChatModel, Embedder};
use crate::{
    Answer, IndexState, IngestError, PdfUpload, PipelineError, ProcessReport, Result,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Runs the two user actions: turning uploaded PDFs into a persisted index,
/// and answering a question from that index.
pub struct QaCoordinator<E, C>
where
    E: Embedder,
    C: ChatModel,
{
    embedder: E,
    chat: C,
    splitter: TextSplitter,
    prompt: PromptTemplate,
    index_dir: PathBuf,
    top_k: usize,
}

impl<E, C> QaCoordinator<E, C>
where
    E: Embedder,
    C: ChatModel,
{
    pub fn new(config: &AppConfig, embedder: E, chat: C) -> Result<Self> {
        Ok(Self {
            embedder,
            chat,
            splitter: TextSplitter::new(config.chunking)?,
            prompt: PromptTemplate::question_answering(),
            index_dir: config.index_dir.clone(),
            top_k: config.top_k,
        })
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Result<Self> {
        let declared = prompt.input_variables();
        if !declared.iter().any(|name| name == CONTEXT_VARIABLE)
            || !declared.iter().any(|name| name == QUESTION_VARIABLE)
        {
            return Err(PipelineError::InvalidTemplate(format!(
                "template must declare {{{CONTEXT_VARIABLE}}} and {{{QUESTION_VARIABLE}}}"
            )));
        }
        self.prompt = prompt;
        Ok(self)
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub async fn index_state(&self) -> Result<IndexState> {
        Ok(index::index_state(&self.index_dir).await?)
    }

    /// Extract, chunk, embed and persist. The previous index is only
    /// replaced once every embedding has been obtained.
    pub async fn process_documents(&self, documents: &[PdfUpload]) -> Result<ProcessReport> {
        let extracted = extract_with(&LopdfExtractor, documents)?;
        if extracted.text.trim().is_empty() {
            return Err(IngestError::NoText.into());
        }

        let chunks = self.splitter.split_text(&extracted.text);
        info!(chunks = chunks.len(), "split text into chunks");

        let vectors = self.embedder.embed_documents(&chunks).await?;
        info!(
            model = self.embedder.model(),
            vectors = vectors.len(),
            "embedded chunks"
        );

        let sources = documents.iter().map(fingerprint).collect::<Vec<_>>();
        let chunk_count = chunks.len();
        let index = VectorIndex::build(self.embedder.model(), chunks, vectors, sources.clone())?;
        let index_file = index.save(&self.index_dir).await?;

        Ok(ProcessReport {
            documents: sources,
            pages: extracted.pages,
            characters: extracted.text.chars().count(),
            chunks: chunk_count,
            dimensions: index.dimensions,
            index_file,
        })
    }

    pub async fn answer_question(&self, question: &str) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(PipelineError::InvalidQuestion(
                "question is empty".to_string(),
            ));
        }

        let index = VectorIndex::load(&self.index_dir).await?;
        if index.embedding_model != self.embedder.model() {
            warn!(
                stored = %index.embedding_model,
                current = self.embedder.model(),
                "index was built with a different embedding model"
            );
        }

        let query_vector = self.embedder.embed_query(question).await?;
        let context = index.search(&query_vector, self.top_k)?;
        info!(retrieved = context.len(), "retrieved context chunks");

        let stuffed = stuff_context(&context);
        let prompt = self.prompt.render(&[
            (CONTEXT_VARIABLE, stuffed.as_str()),
            (QUESTION_VARIABLE, question),
        ])?;

        let text = self.chat.complete(&prompt).await?;
        info!(model = self.chat.model(), chars = text.len(), "received answer");

        Ok(Answer {
            question: question.to_string(),
            text,
            context,
        })
    }
}
