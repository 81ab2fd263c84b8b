use crate::error::IngestError;
use crate::models::TextChunk;

pub const DEFAULT_CHUNK_MAX_CHARS: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_CHUNK_MAX_CHARS,
            overlap_chars: DEFAULT_CHUNK_OVERLAP_CHARS,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_chars {} must be smaller than max_chars {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// Breakpoints in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Word,
}

const BOUNDARIES: [Boundary; 4] = [
    Boundary::Paragraph,
    Boundary::Line,
    Boundary::Sentence,
    Boundary::Word,
];

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    config: ChunkingConfig,
}

impl TextSplitter {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn split<'a>(&self, text: &'a str) -> Chunks<'a> {
        let mut offsets = text.char_indices().map(|(byte, _)| byte).collect::<Vec<_>>();
        offsets.push(text.len());

        Chunks {
            source: text,
            chars: text.chars().collect(),
            offsets,
            config: self.config,
            start: 0,
            overlap: 0,
            index: 0,
            finished: text.is_empty(),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split(text).map(|chunk| chunk.text).collect()
    }
}

/// Lazily yields the chunks of one text. Consumed once; split again to restart.
#[derive(Debug)]
pub struct Chunks<'a> {
    source: &'a str,
    chars: Vec<char>,
    offsets: Vec<usize>,
    config: ChunkingConfig,
    start: usize,
    overlap: usize,
    index: usize,
    finished: bool,
}

impl<'a> Chunks<'a> {
    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.source[self.offsets[start]..self.offsets[end]]
    }

    fn is_boundary(&self, boundary: Boundary, end: usize) -> bool {
        let last = self.chars[end - 1];
        let before = end.checked_sub(2).map(|position| self.chars[position]);
        match boundary {
            Boundary::Paragraph => last == '\n' && before == Some('\n'),
            Boundary::Line => last == '\n',
            Boundary::Sentence => {
                last.is_whitespace() && matches!(before, Some('.') | Some('!') | Some('?'))
            }
            Boundary::Word => last.is_whitespace(),
        }
    }

    /// Latest end position in `(floor, limit]` at the most preferred boundary.
    fn natural_break(&self, floor: usize, limit: usize) -> Option<usize> {
        BOUNDARIES.iter().find_map(|boundary| {
            (floor + 1..=limit)
                .rev()
                .find(|end| self.is_boundary(*boundary, *end))
        })
    }

    /// First word start inside `[from, end)`, or `from` when there is none.
    fn word_aligned(&self, from: usize, end: usize) -> usize {
        (from..end)
            .find(|position| *position == 0 || self.chars[position - 1].is_whitespace())
            .unwrap_or(from)
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = TextChunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let total = self.chars.len();
        let start = self.start;
        let overlap = self.overlap;
        let limit = start + self.config.max_chars;

        let end = if limit >= total {
            self.finished = true;
            total
        } else {
            let floor = start + self.config.overlap_chars;
            match self.natural_break(floor, limit) {
                Some(end) => {
                    self.start = self.word_aligned(end - self.config.overlap_chars, end);
                    end
                }
                None => {
                    self.start = limit - self.config.overlap_chars;
                    limit
                }
            }
        };

        if !self.finished {
            self.overlap = end - self.start;
        }

        let chunk = TextChunk {
            index: self.index,
            start,
            overlap,
            text: self.slice(start, end).to_string(),
        };
        self.index += 1;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(max_chars: usize, overlap_chars: usize) -> TextSplitter {
        TextSplitter::new(ChunkingConfig {
            max_chars,
            overlap_chars,
        })
        .expect("valid config")
    }

    fn reassemble(chunks: &[TextChunk]) -> String {
        chunks.iter().map(TextChunk::fresh_text).collect()
    }

    fn sample_text() -> String {
        let mut text = String::new();
        for paragraph in 0..12 {
            for sentence in 0..9 {
                text.push_str(&format!(
                    "Paragraph {paragraph} sentence {sentence} talks about hydraulic pressure. "
                ));
            }
            text.push_str("\n\n");
        }
        text
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert_eq!(splitter(1_000, 200).split("").count(), 0);
    }

    #[test]
    fn short_input_yields_one_identical_chunk() {
        let text = "The capital of France is Paris.";
        let chunks = splitter(1_000, 200).split(text).collect::<Vec<_>>();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].overlap, 0);
    }

    #[test]
    fn input_of_exactly_max_length_is_one_chunk() {
        let text = "x".repeat(1_000);
        assert_eq!(splitter(1_000, 200).split_text(&text), vec![text]);
    }

    #[test]
    fn chunks_reassemble_to_original_text() {
        let text = sample_text();
        let chunks = splitter(1_000, 200).split(&text).collect::<Vec<_>>();

        assert!(chunks.len() > 1);
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn chunks_never_exceed_max_chars() {
        let text = sample_text();
        for chunk in splitter(300, 60).split(&text) {
            assert!(chunk.char_len() <= 300, "chunk {} too long", chunk.index);
            assert!(chunk.overlap <= 60);
        }
    }

    #[test]
    fn hard_cut_shares_exactly_the_overlap() {
        let text = "abcdefghij".repeat(250);
        let chunks = splitter(1_000, 200).split(&text).collect::<Vec<_>>();

        assert_eq!(chunks.len(), 3);
        for pair in chunks.windows(2) {
            let previous: Vec<char> = pair[0].text.chars().collect();
            let shared: String = previous[previous.len() - 200..].iter().collect();
            assert_eq!(pair[1].overlap, 200);
            assert!(pair[1].text.starts_with(&shared));
        }
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn paragraph_breaks_are_preferred_over_sentences() {
        let first = "Short sentence one. Another sentence here. ".repeat(3);
        let second = "Second paragraph words. ".repeat(8);
        let text = format!("{first}\n\n{second}");
        let chunks = splitter(200, 40).split(&text).collect::<Vec<_>>();

        assert!(chunks[0].text.ends_with("\n\n"));
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn word_breaks_avoid_splitting_words() {
        let text = "lorem ipsum dolor sit amet ".repeat(20);
        let chunks = splitter(100, 20).split(&text).collect::<Vec<_>>();

        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.text.ends_with(' '));
        }
        for chunk in &chunks[1..] {
            let first_word = chunk.text.split(' ').next().unwrap_or_default();
            assert!(
                ["lorem", "ipsum", "dolor", "sit", "amet", ""].contains(&first_word),
                "chunk {} starts mid-word: {first_word}",
                chunk.index
            );
        }
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "Größe überprüfen für Maßnahmen ".repeat(40);
        let chunks = splitter(100, 20).split(&text).collect::<Vec<_>>();

        assert!(chunks.len() > 1);
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn chunk_offsets_point_into_source() {
        let text = sample_text();
        let chars: Vec<char> = text.chars().collect();
        for chunk in splitter(250, 50).split(&text) {
            let expected: String = chars[chunk.start..chunk.start + chunk.char_len()]
                .iter()
                .collect();
            assert_eq!(chunk.text, expected);
        }
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let zero = ChunkingConfig {
            max_chars: 0,
            overlap_chars: 0,
        };
        let overlapping = ChunkingConfig {
            max_chars: 100,
            overlap_chars: 100,
        };

        assert!(matches!(
            TextSplitter::new(zero),
            Err(IngestError::InvalidChunkConfig(_))
        ));
        assert!(matches!(
            TextSplitter::new(overlapping),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }
}
