//! Character-bounded context assembly.

use super::types::SearchResult;

const SEPARATOR: &str = "\n\n";

/// One document as it appears in the prompt.
pub fn format_snippet(position: usize, result: &SearchResult) -> String {
    let doc = &result.document;
    format!(
        "[Source {position}] {title}\nCategory: {category}\n{content}\n(confidence: {confidence:.2}, relevance: {relevance:.2})",
        title = doc.title,
        category = doc.category,
        content = doc.content.trim(),
        confidence = doc.confidence_score,
        relevance = result.relevance_score,
    )
}

/// Context text plus how many of the ranked results made it in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    /// Length of the prefix of the ranked results present in `text`.
    pub included: usize,
}

/// Append snippets in ranked order until the next one would push the total
/// past `max_length` characters. Snippets are never cut.
pub fn assemble_context(results: &[SearchResult], max_length: usize) -> AssembledContext {
    let mut text = String::new();
    let mut length = 0usize;
    let mut included = 0usize;

    for (i, result) in results.iter().enumerate() {
        let snippet = format_snippet(i + 1, result);
        let added = snippet.chars().count()
            + if included == 0 {
                0
            } else {
                SEPARATOR.len()
            };
        if length + added > max_length {
            break;
        }
        if included > 0 {
            text.push_str(SEPARATOR);
        }
        text.push_str(&snippet);
        length += added;
        included += 1;
    }

    tracing::debug!(
        included,
        available = results.len(),
        chars = length,
        max_length,
        "context assembled"
    );
    AssembledContext { text, included }
}

pub fn build_context(results: &[SearchResult], max_length: usize) -> String {
    assemble_context(results, max_length).text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::types::{DocumentMetadata, KnowledgeDocument, MatchReason};

    fn result(title: &str, content: &str) -> SearchResult {
        SearchResult {
            document: KnowledgeDocument::from_metadata(
                title,
                DocumentMetadata {
                    title: title.into(),
                    content: content.into(),
                    category: "nutrition".into(),
                    confidence_score: 0.9,
                    ..DocumentMetadata::default()
                },
            ),
            similarity_score: 0.8,
            relevance_score: 0.76,
            match_reason: MatchReason::SemanticSimilarity,
            matched_keywords: vec![],
        }
    }

    #[test]
    fn respects_small_bound_without_truncating() {
        let results = vec![
            result("A", "Short note."),
            result("B", &"long body ".repeat(20)),
            result("C", "Tiny."),
        ];
        let context = build_context(&results, 100);

        assert!(context.chars().count() <= 100);
        let first = format_snippet(1, &results[0]);
        assert_eq!(context, first);
        assert!(!context.contains("long body"));
    }

    #[test]
    fn stops_at_first_snippet_that_does_not_fit() {
        let results = vec![result("A", &"x".repeat(200)), result("B", "fits")];
        assert_eq!(build_context(&results, 100), "");
    }

    #[test]
    fn includes_everything_when_room() {
        let results = vec![result("A", "one"), result("B", "two")];
        let context = build_context(&results, 4000);
        assert!(context.contains("[Source 1] A"));
        assert!(context.contains("[Source 2] B"));
        assert!(context.contains("(confidence: 0.90, relevance: 0.76)"));
        assert_eq!(
            context.chars().count(),
            format_snippet(1, &results[0]).chars().count()
                + 2
                + format_snippet(2, &results[1]).chars().count()
        );
    }

    #[test]
    fn reports_how_many_results_fit() {
        let results = vec![
            result("A", "Short note."),
            result("B", &"long body ".repeat(20)),
            result("C", "Tiny."),
        ];
        let assembled = assemble_context(&results, 100);
        assert_eq!(assembled.included, 1);
        assert_eq!(assemble_context(&results, 4000).included, 3);
        assert_eq!(assemble_context(&[], 4000), AssembledContext::default());
    }
}
