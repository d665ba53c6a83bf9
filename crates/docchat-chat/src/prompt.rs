//! Grounding prompt assembly
//!
//! Turns retrieved chunks into the system prompt for the chat model.
//! The answer must come from the provided sections only, so the prompt
//! states that constraint explicitly.

use docchat_core::SearchResult;

const INSTRUCTIONS: &str = "You are a helpful assistant that answers questions about a document. \
Use ONLY the document sections provided below to answer. \
If the sections do not contain the information needed, say that you could not \
find it in the document instead of guessing. \
Answer in the same language as the question.";

/// Build the system prompt from retrieved sections.
///
/// Sections are included in retrieval order under `[Section N]` labels
/// until `max_context_length` characters of content are used. The first
/// section is always included, truncated at a character boundary if it
/// alone exceeds the budget.
pub fn build_grounding_prompt(results: &[SearchResult], max_context_length: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;

    for (i, result) in results.iter().enumerate() {
        let content = if i == 0 && result.content.len() > max_context_length {
            truncate_at_char_boundary(&result.content, max_context_length)
        } else {
            result.content.as_str()
        };

        if i > 0 && used + content.len() > max_context_length {
            break;
        }

        if i > 0 {
            context.push_str("\n\n");
        }
        context.push_str(&format!("[Section {}]\n{}", i + 1, content));
        used += content.len();
    }

    format!("{INSTRUCTIONS}\n\nDocument sections:\n\n{context}")
}

fn truncate_at_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(content: &str) -> SearchResult {
        SearchResult {
            id: "p1".into(),
            score: 0.9,
            content: content.into(),
            document_id: "d1".into(),
            owner_id: "u1".into(),
            chunk_index: 0,
        }
    }

    #[test]
    fn test_sections_are_labeled_in_order() {
        let prompt = build_grounding_prompt(&[result("alpha"), result("beta")], 1000);
        let alpha = prompt.find("[Section 1]\nalpha").unwrap();
        let beta = prompt.find("[Section 2]\nbeta").unwrap();
        assert!(alpha < beta);
        assert!(prompt.contains("ONLY the document sections"));
    }

    #[test]
    fn test_budget_drops_trailing_sections() {
        let prompt = build_grounding_prompt(&[result("aaaaaaaaaa"), result("bbbbbbbbbb")], 15);
        assert!(prompt.contains("[Section 1]"));
        assert!(!prompt.contains("[Section 2]"));
    }

    #[test]
    fn test_oversized_first_section_is_truncated_not_dropped() {
        let big = "x".repeat(100);
        let prompt = build_grounding_prompt(&[result(&big)], 10);
        assert!(prompt.contains("[Section 1]\nxxxxxxxxxx"));
        assert!(!prompt.contains(&big));
    }

    #[test]
    fn test_truncation_respects_utf8_boundaries() {
        let text = "héllo wörld";
        let cut = truncate_at_char_boundary(text, 2);
        assert_eq!(cut, "h");
    }
}
