//! Platform text limits and constraint helpers.
//!
//! WhatsApp hard caps: ~4096 chars per text body, 1024-char media captions,
//! 3 reply buttons of 20 chars, 10 list rows with 24-char titles and 72-char
//! descriptions. Everything here truncates or splits before send so the
//! platform never rejects a message for length.

use unicode_segmentation::UnicodeSegmentation;

/// Maximum characters per outbound text body; longer bodies are chunked.
pub const TEXT_CHUNK_LIMIT: usize = 4000;
pub const IMAGE_CAPTION_LIMIT: usize = 1024;
pub const BUTTON_TITLE_LIMIT: usize = 20;
pub const BUTTON_COUNT_LIMIT: usize = 3;
pub const LIST_ROW_LIMIT: usize = 10;
pub const LIST_ROW_TITLE_LIMIT: usize = 24;
pub const LIST_ROW_DESCRIPTION_LIMIT: usize = 72;

/// Splits `text` into sequential chunks of at most `limit` graphemes.
///
/// Chunk order is send order. Empty input produces no chunks.
///
/// ```
/// use relay_core::chunk_text;
///
/// let chunks = chunk_text(&"x".repeat(9000), 4000);
/// assert_eq!(chunks.iter().map(String::len).collect::<Vec<_>>(), vec![4000, 4000, 1000]);
/// ```
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    if text.is_empty() || limit == 0 {
        return Vec::new();
    }
    let graphemes: Vec<&str> = text.graphemes(true).collect();
    graphemes
        .chunks(limit)
        .map(|chunk| chunk.concat())
        .collect()
}

/// Truncates `text` to at most `limit` graphemes.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    text.graphemes(true).take(limit).collect()
}
