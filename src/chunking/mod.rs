//! Document chunking: overlapping fixed-size token windows, with optional
//! LLM-generated situating context per chunk.

pub mod context;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::Chunk;

/// Options recognized by the chunker.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkOptions {
    /// Maximum tokens per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Tokens shared between adjacent chunks. Must be smaller than
    /// `chunk_size`.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Ask the chat model for a situating context string per chunk.
    #[serde(default)]
    pub generate_context: bool,
}

fn default_chunk_size() -> usize {
    500
}

fn default_overlap() -> usize {
    50
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            generate_context: false,
        }
    }
}

impl ChunkOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Split `text` into overlapping chunks of whitespace tokens.
///
/// Walks the token sequence with a stride of `chunk_size - overlap`; each
/// chunk holds up to `chunk_size` tokens joined by single spaces. The final
/// chunk may be shorter, and every token lands in at least one chunk.
/// Whitespace-only input produces no chunks.
pub fn chunk_text(text: &str, options: &ChunkOptions) -> Result<Vec<Chunk>> {
    options.validate()?;

    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let stride = options.chunk_size - options.overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + options.chunk_size).min(tokens.len());

        let mut metadata = Map::new();
        metadata.insert("chunk_index".to_string(), Value::from(chunks.len()));
        metadata.insert("start_token".to_string(), Value::from(start));
        metadata.insert("end_token".to_string(), Value::from(end));

        chunks.push(Chunk {
            content: tokens[start..end].join(" "),
            context: None,
            content_embedding: None,
            context_embedding: None,
            metadata,
        });

        if end == tokens.len() {
            break;
        }
        start += stride;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(chunk_size: usize, overlap: usize) -> ChunkOptions {
        ChunkOptions {
            chunk_size,
            overlap,
            generate_context: false,
        }
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_empty_text_produces_no_chunks() {
        assert!(chunk_text("", &opts(10, 2)).unwrap().is_empty());
        assert!(chunk_text("  \n\t  ", &opts(10, 2)).unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("alpha beta gamma", &opts(10, 2)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "alpha beta gamma");
    }

    #[test]
    fn test_overlap_equal_to_chunk_size_rejected() {
        let err = chunk_text(&words(30), &opts(10, 10)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_overlap_larger_than_chunk_size_rejected() {
        let err = chunk_text(&words(30), &opts(10, 15)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = chunk_text("a b c", &opts(0, 0)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_adjacent_chunks_share_exactly_overlap_tokens() {
        let text = words(25);
        let chunks = chunk_text(&text, &opts(10, 3)).unwrap();
        assert!(chunks.len() >= 2);

        for pair in chunks.windows(2) {
            let left: Vec<&str> = pair[0].content.split(' ').collect();
            let right: Vec<&str> = pair[1].content.split(' ').collect();
            let shared = &left[left.len() - 3..];
            assert_eq!(shared, &right[..3]);
        }
    }

    #[test]
    fn test_every_token_is_covered_without_gaps() {
        let text = words(1234);
        let chunks = chunk_text(&text, &opts(500, 50)).unwrap();

        let mut covered = vec![false; 1234];
        for chunk in &chunks {
            let start = chunk.metadata["start_token"].as_u64().unwrap() as usize;
            let end = chunk.metadata["end_token"].as_u64().unwrap() as usize;
            assert!(start < end, "no chunk may be empty");
            for slot in &mut covered[start..end] {
                *slot = true;
            }
        }
        assert!(covered.iter().all(|c| *c), "every token appears in a chunk");

        // Each stride begins where the previous chunk still has `overlap`
        // tokens left, so consecutive windows abut with no gap.
        for pair in chunks.windows(2) {
            let prev_end = pair[0].metadata["end_token"].as_u64().unwrap();
            let next_start = pair[1].metadata["start_token"].as_u64().unwrap();
            assert_eq!(prev_end - next_start, 50);
        }
    }

    #[test]
    fn test_final_chunk_may_be_shorter() {
        let chunks = chunk_text(&words(12), &opts(10, 2)).unwrap();
        assert_eq!(chunks.len(), 2);
        let last: Vec<&str> = chunks[1].content.split(' ').collect();
        assert_eq!(last.len(), 4); // tokens 8..12
    }

    #[test]
    fn test_exact_multiple_leaves_no_trailing_chunk() {
        // 10 tokens with chunk_size 10: one chunk, not a dangling empty one.
        let chunks = chunk_text(&words(10), &opts(10, 2)).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_chunk_index_metadata_is_sequential() {
        let chunks = chunk_text(&words(40), &opts(10, 2)).unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata["chunk_index"].as_u64().unwrap(), i as u64);
        }
    }

    #[test]
    fn test_collapses_interior_whitespace() {
        let chunks = chunk_text("a\t\tb\n\nc   d", &opts(10, 2)).unwrap();
        assert_eq!(chunks[0].content, "a b c d");
    }

    #[test]
    fn test_serde_defaults() {
        let opts: ChunkOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.chunk_size, 500);
        assert_eq!(opts.overlap, 50);
        assert!(!opts.generate_context);
    }
}
