//! Multi-factor re-ranking of retrieved candidates.
//!
//! ```text
//! relevance = similarity × (0.5 + 0.5 × confidence) × context × recency × length
//! ```
//!
//! | Boost | Value | When |
//! |-------|-------|------|
//! | context | 1.2 | category or a tag mentions the query type |
//! | recency | 1.1 | document is younger than 30 days |
//! | length | 1.05 | content is longer than 500 characters |

use chrono::{DateTime, Duration, Utc};

use super::retrieve::Candidate;
use super::types::{ContextualizedQuery, KnowledgeDocument, MatchReason, QueryType, SearchResult};

const CONTEXT_BOOST: f64 = 1.2;
const RECENCY_BOOST: f64 = 1.1;
const LENGTH_BOOST: f64 = 1.05;
const RECENT_DAYS: i64 = 30;
const LONG_CONTENT_CHARS: usize = 500;
const MAX_MATCHED_KEYWORDS: usize = 5;

fn mentions_query_type(doc: &KnowledgeDocument, query_type: QueryType) -> bool {
    query_type.is_mentioned_in(&doc.category) || doc.tags.iter().any(|t| query_type.is_mentioned_in(t))
}

pub fn relevance_score(
    doc: &KnowledgeDocument,
    similarity: f64,
    query_type: Option<QueryType>,
    now: DateTime<Utc>,
) -> f64 {
    let confidence = 0.5 + 0.5 * doc.confidence_score;

    let context = match query_type {
        Some(qt) if mentions_query_type(doc, qt) => CONTEXT_BOOST,
        _ => 1.0,
    };
    let recency = match doc.created_at {
        Some(created) if now - created < Duration::days(RECENT_DAYS) => RECENCY_BOOST,
        _ => 1.0,
    };
    let length = if doc.content.chars().count() > LONG_CONTENT_CHARS {
        LENGTH_BOOST
    } else {
        1.0
    };

    similarity * confidence * context * recency * length
}

/// Why `doc` matched, plus the key terms and concepts found verbatim in it.
pub fn explain_match(doc: &KnowledgeDocument, query: &ContextualizedQuery) -> (MatchReason, Vec<String>) {
    let content = doc.content.to_lowercase();

    let mut matched: Vec<String> = Vec::new();
    for term in query.key_terms.iter().chain(query.related_concepts.iter()) {
        let needle = term.to_lowercase();
        if content.contains(&needle) && !matched.contains(&needle) {
            matched.push(needle);
        }
    }
    matched.truncate(MAX_MATCHED_KEYWORDS);

    let reason = if let Some(term) = query
        .key_terms
        .iter()
        .find(|t| content.contains(&t.to_lowercase()))
    {
        MatchReason::KeyTerm(term.clone())
    } else if let Some(qt) = query
        .context
        .as_ref()
        .map(|c| c.query_type)
        .filter(|qt| qt.is_mentioned_in(&doc.category))
    {
        MatchReason::Category(qt.to_string())
    } else if let Some(concept) = query.related_concepts.iter().find(|c| {
        let c = c.to_lowercase();
        doc.tags.iter().any(|tag| {
            let tag = tag.to_lowercase();
            tag.contains(&c) || c.contains(&tag)
        })
    }) {
        MatchReason::RelatedConcept(concept.clone())
    } else {
        MatchReason::SemanticSimilarity
    };

    (reason, matched)
}

/// Score, sort descending, truncate, and annotate.
pub fn rank(
    candidates: Vec<Candidate>,
    query: &ContextualizedQuery,
    max_results: usize,
    now: DateTime<Utc>,
) -> Vec<SearchResult> {
    let query_type = query.context.as_ref().map(|c| c.query_type);

    let mut scored: Vec<(Candidate, f64)> = candidates
        .into_iter()
        .map(|c| {
            let score = relevance_score(&c.document, c.similarity, query_type, now);
            (c, score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(max_results);

    scored
        .into_iter()
        .map(|(candidate, relevance_score)| {
            let (match_reason, matched_keywords) = explain_match(&candidate.document, query);
            SearchResult {
                document: candidate.document,
                similarity_score: candidate.similarity,
                relevance_score,
                match_reason,
                matched_keywords,
            }
        })
        .collect()
}
