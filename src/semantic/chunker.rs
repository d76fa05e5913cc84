//! Word-window text chunking.
//!
//! Text is split on whitespace and regrouped into consecutive,
//! non-overlapping windows of `chunk_size` words, each re-joined with a
//! single space. The final window may be shorter.

/// Default number of words per chunk when the caller does not specify one.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk_size must be greater than 0")]
    InvalidChunkSize,
}

/// Split `text` into chunks of `chunk_size` words.
///
/// Empty or whitespace-only input yields no chunks.
pub fn chunk(text: &str, chunk_size: usize) -> Result<Vec<String>, ChunkError> {
    if chunk_size == 0 {
        return Err(ChunkError::InvalidChunkSize);
    }

    let words: Vec<&str> = text.split_whitespace().collect();

    Ok(words
        .chunks(chunk_size)
        .map(|window| window.join(" "))
        .collect())
}
