use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One uploaded PDF, kept only for the duration of a process action.
#[derive(Debug, Clone)]
pub struct PdfUpload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl PdfUpload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentFingerprint {
    pub name: String,
    pub checksum: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    /// Char offset of the first character in the source text.
    pub start: usize,
    /// Leading chars shared with the previous chunk.
    pub overlap: usize,
    pub text: String,
}

impl TextChunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// The part of this chunk that no earlier chunk covered.
    pub fn fresh_text(&self) -> &str {
        match self.text.char_indices().nth(self.overlap) {
            Some((byte, _)) => &self.text[byte..],
            None => "",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub context: Vec<RetrievedChunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReport {
    pub documents: Vec<DocumentFingerprint>,
    pub pages: usize,
    pub characters: usize,
    pub chunks: usize,
    pub dimensions: usize,
    pub index_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexState {
    Empty,
    Ready {
        chunks: usize,
        embedding_model: String,
        built_at: DateTime<Utc>,
    },
}

impl IndexState {
    pub fn is_ready(&self) -> bool {
        matches!(self, IndexState::Ready { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::TextChunk;

    #[test]
    fn fresh_text_skips_overlap_by_chars() {
        let chunk = TextChunk {
            index: 1,
            start: 3,
            overlap: 2,
            text: "éàbcd".to_string(),
        };
        assert_eq!(chunk.fresh_text(), "bcd");
        assert_eq!(chunk.char_len(), 5);
    }

    #[test]
    fn fresh_text_is_empty_when_fully_overlapped() {
        let chunk = TextChunk {
            index: 0,
            start: 0,
            overlap: 3,
            text: "abc".to_string(),
        };
        assert_eq!(chunk.fresh_text(), "");
    }
}
