//! Text chunking with natural-boundary splitting and overlap
//!
//! Splits extracted text into fixed-size windows, preferring paragraph,
//! sentence, then line breaks near the window end and falling back to a
//! hard cut at a character boundary. Consecutive chunks share roughly
//! `overlap` bytes of trailing context so no chunk loses the sentence
//! that frames it.
//!
//! Guarantees, for any non-empty input:
//! - every chunk is at most `chunk_size` bytes;
//! - chunks are contiguous slices of the input: each chunk starts
//!   inside its predecessor, so the non-overlapping prefixes
//!   concatenate back to the original text;
//! - the splitter always advances, even when a break point or the
//!   overlap would stall it;
//! - output is deterministic for identical input and parameters, which
//!   keeps re-processing idempotent under queue redelivery.

/// How far back from the window end to look for a natural break.
const BREAK_SEARCH_WINDOW: usize = 200;

/// A chunk of text cut from one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Chunk content
    pub content: String,

    /// Chunk index within the document, dense from 0
    pub index: u32,

    /// Starting byte offset in the original text
    pub start_offset: usize,

    /// Ending byte offset
    pub end_offset: usize,
}

/// Split `text` into ordered overlapping chunks.
///
/// Empty input yields an empty vec, not an error. `overlap` is clamped
/// below `chunk_size`.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<TextChunk> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let overlap = overlap.min(chunk_size.saturating_sub(1));
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let mut window_end = floor_char_boundary(text, (start + chunk_size).min(text.len()));
        if window_end <= start {
            // chunk_size smaller than one character; take the character anyway
            window_end = ceil_char_boundary(text, start + 1);
        }

        let end = if window_end >= text.len() {
            text.len()
        } else {
            find_break_point(text, start, window_end)
        };

        chunks.push(TextChunk {
            content: text[start..end].to_string(),
            index: chunks.len() as u32,
            start_offset: start,
            end_offset: end,
        });

        if end >= text.len() {
            break;
        }

        let mut next = floor_char_boundary(text, end.saturating_sub(overlap));
        if next <= start {
            // Overlap would revisit the previous start; advance by at
            // least one character and keep whatever context fits.
            next = ceil_char_boundary(text, start + 1);
        }
        start = next;
    }

    chunks
}

/// Find a natural break in `(start, target]`, searching backwards from
/// `target`. Falls back to `target` (a hard cut) when nothing suitable
/// is in range. `start` and `target` must be char boundaries.
fn find_break_point(text: &str, start: usize, target: usize) -> usize {
    let tail_start = floor_char_boundary(text, target.saturating_sub(BREAK_SEARCH_WINDOW));
    let tail_start = tail_start.max(start);
    let tail = &text[tail_start..target];

    // Paragraph break first
    if let Some(pos) = tail.rfind("\n\n") {
        let abs = tail_start + pos + 2;
        if abs > start {
            return abs;
        }
    }

    // Sentence end
    for pattern in [". ", "。", "! ", "? "] {
        if let Some(pos) = tail.rfind(pattern) {
            let abs = tail_start + pos + pattern.len();
            if abs > start {
                return abs;
            }
        }
    }

    // Line break
    if let Some(pos) = tail.rfind('\n') {
        let abs = tail_start + pos + 1;
        if abs > start {
            return abs;
        }
    }

    target
}

fn floor_char_boundary(text: &str, mut i: usize) -> usize {
    if i >= text.len() {
        return text.len();
    }
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(text: &str, mut i: usize) -> usize {
    if i >= text.len() {
        return text.len();
    }
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Contiguity and coverage: chunks are in-order slices of the
    /// original, each starting inside its predecessor, first at 0 and
    /// last ending at the end. Concatenating the non-overlapping spans
    /// therefore reconstructs the input exactly.
    fn assert_covers(text: &str, chunks: &[TextChunk]) {
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks.last().unwrap().end_offset, text.len());

        let mut reconstructed = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index as usize, i);
            assert_eq!(&text[chunk.start_offset..chunk.end_offset], chunk.content);
            if let Some(next) = chunks.get(i + 1) {
                assert!(next.start_offset > chunk.start_offset, "no forward progress");
                assert!(next.start_offset <= chunk.end_offset, "gap between chunks");
                reconstructed.push_str(&text[chunk.start_offset..next.start_offset]);
            } else {
                reconstructed.push_str(&chunk.content);
            }
        }
        assert_eq!(reconstructed, text);
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(split_text("", 1000, 100).is_empty());
    }

    #[test]
    fn test_short_input_is_single_chunk() {
        let chunks = split_text("short text", 1000, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "short text");
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn test_chunk_size_bound_and_overlap() {
        let text = "This is a sentence. ".repeat(100);
        let chunks = split_text(&text, 200, 50);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(
                chunk.content.len() <= 200,
                "chunk exceeds size: {}",
                chunk.content.len()
            );
        }
        for window in chunks.windows(2) {
            // boundary-adjustment slack allowed, but the shared span
            // must be close to the configured overlap
            let shared = window[0].end_offset - window[1].start_offset;
            assert!(shared >= 40, "chunks share only {shared} bytes");
        }
        assert_covers(&text, &chunks);
    }

    #[test]
    fn test_prefers_sentence_boundaries() {
        let text = "First sentence here. Second sentence here. ".repeat(30);
        let chunks = split_text(&text, 250, 40);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(
                chunk.content.ends_with(". "),
                "chunk ends mid-sentence: {:?}",
                chunk.content
            );
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = "Paragraph one is here.\n\nParagraph two follows it.\n\n".repeat(40);
        let chunks = split_text(&text, 300, 60);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.content.ends_with("\n\n"));
        }
        assert_covers(&text, &chunks);
    }

    #[test]
    fn test_deterministic() {
        let text = "Some repeating content with breaks.\n".repeat(50);
        assert_eq!(split_text(&text, 400, 80), split_text(&text, 400, 80));
    }

    #[test]
    fn test_multibyte_text_never_splits_characters() {
        let text = "가나다라마바사 아자차카타파하. ".repeat(60);
        let chunks = split_text(&text, 100, 30);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.len() <= 100);
            assert!(!chunk.content.is_empty());
        }
        assert_covers(&text, &chunks);
    }

    #[test]
    fn test_unbreakable_text_hard_cuts() {
        let text = "x".repeat(1000);
        let chunks = split_text(&text, 100, 20);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.len() <= 100);
        }
        assert_covers(&text, &chunks);
    }

    #[test]
    fn test_overlap_larger_than_advance_still_progresses() {
        // A break point close to the chunk start plus a large overlap
        // must not loop forever.
        let text = "ab. ".repeat(500);
        let chunks = split_text(&text, 40, 39);
        assert_covers(&text, &chunks);
    }
}
