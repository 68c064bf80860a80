// Chunking module
// Splits a raw document into bounded-size chunks, the unit of embedding
// and retrieval.


use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Default character bound for a single chunk.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 500;

// A unit boundary is a period followed by one whitespace character, or a
// bare newline. The whitespace after the period is consumed by the split.
static UNIT_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\s|\n").expect("unit boundary pattern is valid"));

/// Split `text` into ordered chunks of at most `max_chunk_size` characters.
///
/// The bound is soft: a single unit (sentence or line) longer than
/// `max_chunk_size` is never split further and becomes its own oversized
/// chunk. Units are re-joined with a normalized `". "` separator, so chunk
/// text can differ from the source around unit boundaries.
#[inline]
pub fn split_into_chunks(text: &str, max_chunk_size: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut chunk = String::new();

    for unit in UNIT_BOUNDARY.split(text) {
        // The bound is checked before the unit joins the accumulator: the
        // unit that overflows seeds the next chunk, not the flushed one.
        if chunk.len() + unit.len() > max_chunk_size {
            flush(&mut chunk, &mut chunks);
            chunk.push_str(unit);
        } else {
            chunk.push_str(unit);
            chunk.push_str(". ");
        }
    }

    flush(&mut chunk, &mut chunks);

    debug!(
        "Split {} chars into {} chunks (bound {})",
        text.len(),
        chunks.len(),
        max_chunk_size
    );

    chunks
}

fn flush(chunk: &mut String, chunks: &mut Vec<String>) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    chunk.clear();
}
