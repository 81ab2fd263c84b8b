//! Google Gemini (Generative Language API) clients for embeddings and chat.

use crate::config::{AppConfig, API_KEY_ENV};
use crate::traits::{ChatModel, Embedder};
use crate::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Largest batch `batchEmbedContents` accepts.
pub const MAX_EMBED_BATCH: usize = 100;

const TASK_RETRIEVAL_DOCUMENT: &str = "RETRIEVAL_DOCUMENT";
const TASK_RETRIEVAL_QUERY: &str = "RETRIEVAL_QUERY";

/// HTTP client shared by the embedder and the chat model.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    base: Url,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Result<Self, ServiceError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        let mut base = config.api_base.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            http,
            base: Url::parse(&base)?,
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> Result<Url, ServiceError> {
        Ok(self.base.join(&format!("v1beta/{model}:{method}"))?)
    }

    async fn post_json<B, R>(&self, service: &str, url: Url, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ServiceError::MissingCredential(API_KEY_ENV))?;

        debug!(service, url = %url, "sending request");
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                service: service.to_string(),
                status: status.as_u16(),
                details: error_message(&body),
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|error| ServiceError::InvalidResponse {
                service: service.to_string(),
                details: error.to_string(),
            })
    }
}

/// Prefers the `error.message` field of a Google API error body.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        error: Detail,
    }
    #[derive(Deserialize)]
    struct Detail {
        message: String,
    }

    match serde_json::from_str::<Envelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) => body.trim().to_string(),
    }
}

fn qualified_model(model: &str) -> String {
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content,
    task_type: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    client: GeminiClient,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(client: GeminiClient, model: &str) -> Self {
        Self {
            client,
            model: qualified_model(model),
        }
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        task_type: &str,
    ) -> Result<Vec<Vec<f32>>, ServiceError> {
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: &self.model,
                    content: Content::text(None, text),
                    task_type,
                })
                .collect(),
        };

        let url = self.client.endpoint(&self.model, "batchEmbedContents")?;
        let response: BatchEmbedResponse = self.client.post_json("embedding", url, &request).await?;

        if response.embeddings.len() != texts.len() {
            return Err(ServiceError::InvalidResponse {
                service: "embedding".to_string(),
                details: format!(
                    "requested {} embeddings, received {}",
                    texts.len(),
                    response.embeddings.len()
                ),
            });
        }

        Ok(response
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect())
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_EMBED_BATCH) {
            vectors.extend(self.embed_batch(batch, TASK_RETRIEVAL_DOCUMENT).await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let mut vectors = self
            .embed_batch(&[text.to_string()], TASK_RETRIEVAL_QUERY)
            .await?;
        vectors
            .pop()
            .ok_or_else(|| ServiceError::EmptyResponse("embedding".to_string()))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Clone)]
pub struct GeminiChat {
    client: GeminiClient,
    model: String,
    temperature: f32,
}

impl GeminiChat {
    pub fn new(client: GeminiClient, model: &str, temperature: f32) -> Self {
        Self {
            client,
            model: qualified_model(model),
            temperature,
        }
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let request = GenerateRequest {
            contents: vec![Content::text(Some("user"), prompt)],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        let url = self.client.endpoint(&self.model, "generateContent")?;
        let response: GenerateResponse = self.client.post_json("chat", url, &request).await?;

        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ServiceError::EmptyResponse("chat".to_string()));
        }
        Ok(text)
    }
}
