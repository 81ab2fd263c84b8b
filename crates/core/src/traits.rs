use crate::ServiceError;
use async_trait::async_trait;

/// Turns text into fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ServiceError>;
}

/// Generates a completion for a single prompt, with no conversation memory.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, ServiceError>;
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn model(&self) -> &str {
        (**self).model()
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        (**self).embed_documents(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        (**self).embed_query(text).await
    }
}
