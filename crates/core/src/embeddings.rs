use crate::traits::Embedder;
use crate::ServiceError;
use async_trait::async_trait;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;
pub const CHARACTER_NGRAM_MODEL: &str = "local/char-trigram";

/// Hashes lowercase character trigrams into buckets. Needs no network access,
/// which makes it usable offline and in tests.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            let bucket = (fnv1a(window) % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vector.iter_mut().for_each(|value| *value /= magnitude);
        }
        vector
    }
}

fn fnv1a(window: &[char]) -> u64 {
    let mut hash = 1469598103934665603u64;
    let mut buffer = [0u8; 4];
    for ch in window {
        for byte in ch.encode_utf8(&mut buffer).bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
    }
    hash
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model(&self) -> &str {
        CHARACTER_NGRAM_MODEL
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        Ok(self.embed_one(text))
    }
}
