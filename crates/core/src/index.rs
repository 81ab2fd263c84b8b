use crate::error::IndexError;
use crate::models::{DocumentFingerprint, IndexState, RetrievedChunk};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;
use uuid::Uuid;

pub const INDEX_FILE_NAME: &str = "index.json";
pub const INDEX_FORMAT_VERSION: u32 = 1;

pub fn index_file_path(index_dir: &Path) -> PathBuf {
    index_dir.join(INDEX_FILE_NAME)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub text: String,
    pub vector: Vec<f32>,
}

/// Exact nearest-neighbour index over chunk embeddings, persisted as one
/// JSON file per index directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimensions: usize,
    pub created_at: DateTime<Utc>,
    pub sources: Vec<DocumentFingerprint>,
    pub entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn build(
        embedding_model: impl Into<String>,
        texts: Vec<String>,
        vectors: Vec<Vec<f32>>,
        sources: Vec<DocumentFingerprint>,
    ) -> Result<Self, IndexError> {
        if texts.len() != vectors.len() {
            return Err(IndexError::Corrupt(format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                texts.len()
            )));
        }

        let dimensions = vectors.first().map(Vec::len).unwrap_or_default();
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                actual: bad.len(),
            });
        }

        let entries = texts
            .into_iter()
            .zip(vectors)
            .map(|(text, vector)| IndexEntry { text, vector })
            .collect();

        Ok(Self {
            format_version: INDEX_FORMAT_VERSION,
            embedding_model: embedding_model.into(),
            dimensions,
            created_at: Utc::now(),
            sources,
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn state(&self) -> IndexState {
        IndexState::Ready {
            chunks: self.entries.len(),
            embedding_model: self.embedding_model.clone(),
            built_at: self.created_at,
        }
    }

    /// Replaces whatever index lives in `index_dir`. The new file is written
    /// next to the old one and renamed over it, so readers never observe a
    /// half-written index.
    pub async fn save(&self, index_dir: &Path) -> Result<PathBuf, IndexError> {
        fs::create_dir_all(index_dir).await?;
        let target = index_file_path(index_dir);
        let staging = index_dir.join(format!(".{INDEX_FILE_NAME}.{}.tmp", Uuid::new_v4()));

        let payload = serde_json::to_vec(self)?;
        if let Err(error) = fs::write(&staging, &payload).await {
            let _ = fs::remove_file(&staging).await;
            return Err(error.into());
        }
        if let Err(error) = fs::rename(&staging, &target).await {
            let _ = fs::remove_file(&staging).await;
            return Err(error.into());
        }

        info!(
            path = %target.display(),
            entries = self.entries.len(),
            dimensions = self.dimensions,
            "saved vector index"
        );
        Ok(target)
    }

    pub async fn load(index_dir: &Path) -> Result<Self, IndexError> {
        let path = index_file_path(index_dir);
        let payload = match fs::read(&path).await {
            Ok(payload) => payload,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexError::NotFound(path))
            }
            Err(error) => return Err(error.into()),
        };

        let index: VectorIndex = serde_json::from_slice(&payload)?;
        index.validate()?;
        Ok(index)
    }

    fn validate(&self) -> Result<(), IndexError> {
        if self.format_version != INDEX_FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| entry.vector.len() != self.dimensions)
        {
            return Err(IndexError::Corrupt(format!(
                "entry has {} dimensions, index declares {}",
                entry.vector.len(),
                self.dimensions
            )));
        }
        Ok(())
    }

    /// Top `k` entries by cosine similarity, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut scored = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query, &entry.vector), entry))
            .collect::<Vec<_>>();
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| RetrievedChunk {
                text: entry.text.clone(),
                score,
            })
            .collect())
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

/// Reports whether an index exists without loading its entries into a
/// search structure.
pub async fn index_state(index_dir: &Path) -> Result<IndexState, IndexError> {
    match VectorIndex::load(index_dir).await {
        Ok(index) => Ok(index.state()),
        Err(IndexError::NotFound(_)) => Ok(IndexState::Empty),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_index() -> VectorIndex {
        VectorIndex::build(
            "test-model",
            vec![
                "north".to_string(),
                "east".to_string(),
                "north-east".to_string(),
            ],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
            Vec::new(),
        )
        .expect("build")
    }

    #[test]
    fn search_orders_by_cosine_similarity() {
        let hits = sample_index().search(&[1.0, 0.1], 2).expect("search");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "north");
        assert_eq!(hits[1].text, "north-east");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn search_rejects_wrong_dimensions() {
        let result = sample_index().search(&[1.0, 0.0, 0.0], 4);
        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn build_rejects_mismatched_counts() {
        let result = VectorIndex::build("m", vec!["a".to_string()], Vec::new(), Vec::new());
        assert!(matches!(result, Err(IndexError::Corrupt(_))));
    }

    #[test]
    fn zero_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn loading_a_missing_index_is_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = VectorIndex::load(&dir.path().join("faiss_index")).await;

        assert!(matches!(result, Err(IndexError::NotFound(_))));
        assert_eq!(index_state(&dir.path().join("faiss_index")).await?, IndexState::Empty);
        Ok(())
    }

    #[tokio::test]
    async fn save_then_load_round_trips_and_replaces() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index_dir = dir.path().join("faiss_index");

        sample_index().save(&index_dir).await?;
        let replacement = VectorIndex::build(
            "test-model",
            vec!["only".to_string()],
            vec![vec![0.5, 0.5]],
            Vec::new(),
        )?;
        replacement.save(&index_dir).await?;

        let loaded = VectorIndex::load(&index_dir).await?;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.entries[0].text, "only");

        let leftovers = std::fs::read_dir(&index_dir)?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name() != INDEX_FILE_NAME)
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[tokio::test]
    async fn entries_with_the_wrong_width_are_corrupt() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = sample_index().save(dir.path()).await?;

        let mut stored: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        stored["entries"][1]["vector"] = serde_json::json!([0.0, 1.0, 0.5]);
        std::fs::write(&path, serde_json::to_string(&stored)?)?;

        let result = VectorIndex::load(dir.path()).await;
        match result {
            Err(IndexError::Corrupt(details)) => {
                assert!(details.contains("3 dimensions"), "details were {details}")
            }
            other => panic!("expected a corrupt index, got {other:?}"),
        }
        assert!(index_state(dir.path()).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_versions_are_corrupt() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut index = sample_index();
        index.format_version = 99;
        index.save(dir.path()).await?;

        let result = VectorIndex::load(dir.path()).await;
        assert!(matches!(result, Err(IndexError::Corrupt(_))));
        Ok(())
    }
}
