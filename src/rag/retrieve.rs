//! Candidate retrieval: embed the expanded query and ask the vector index.

use std::sync::Arc;

use super::types::{ContextualizedQuery, Degradation, KnowledgeDocument, Outcome, SearchOptions};
use crate::embedding::Embedder;
use crate::index::{IndexQuery, MetadataFilter, VectorIndex};

/// Over-fetch factor for post-filtering.
const OVERFETCH: usize = 2;

/// A document the index returned, with its raw similarity.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub document: KnowledgeDocument,
    pub similarity: f64,
}

/// Index filter for these options. A health context adds the confidence floor.
pub fn build_filter(
    options: &SearchOptions,
    query: &ContextualizedQuery,
    confidence_floor: f64,
) -> MetadataFilter {
    MetadataFilter {
        categories: options.category_filter.clone(),
        tags: options.tag_filter.clone(),
        min_confidence: query.context.as_ref().map(|_| confidence_floor),
    }
}

pub struct Retriever {
    embedder: Arc<Embedder>,
    index: Arc<dyn VectorIndex>,
    confidence_floor: f64,
}

impl Retriever {
    pub fn new(embedder: Arc<Embedder>, index: Arc<dyn VectorIndex>, confidence_floor: f64) -> Self {
        Self {
            embedder,
            index,
            confidence_floor,
        }
    }

    /// Candidates at or above `min_similarity`, in index order. Any failure
    /// yields an empty list, never a partial one.
    pub async fn retrieve(
        &self,
        query: &ContextualizedQuery,
        options: &SearchOptions,
    ) -> Outcome<Vec<Candidate>> {
        let vector = match self.embedder.embed(&query.expanded_query).await {
            Ok(v) => v,
            Err(e) => return Outcome::degraded(Vec::new(), Degradation::from_error("embed", &e)),
        };

        let index_query = IndexQuery {
            vector,
            top_k: options.max_results.max(1) * OVERFETCH,
            filter: build_filter(options, query, self.confidence_floor),
        };
        let matches = match self.index.query(&index_query).await {
            Ok(m) => m,
            Err(e) => return Outcome::degraded(Vec::new(), Degradation::index(&e)),
        };

        let fetched = matches.len();
        let candidates: Vec<Candidate> = matches
            .into_iter()
            .filter(|m| m.score >= options.min_similarity)
            .map(|m| Candidate {
                similarity: m.score.clamp(0.0, 1.0),
                document: KnowledgeDocument::from_metadata(m.id, m.metadata),
            })
            .collect();

        tracing::debug!(
            fetched,
            kept = candidates.len(),
            min_similarity = options.min_similarity,
            "candidates retrieved"
        );
        Outcome::complete(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::types::{HealthQueryContext, QueryType};
    use std::collections::BTreeMap;

    fn query(context: Option<HealthQueryContext>) -> ContextualizedQuery {
        ContextualizedQuery {
            original_query: "q".into(),
            expanded_query: "q".into(),
            key_terms: vec![],
            related_concepts: vec![],
            term_weights: BTreeMap::new(),
            context,
        }
    }

    #[test]
    fn confidence_floor_only_with_context() {
        let options = SearchOptions {
            max_results: 5,
            min_similarity: 0.7,
            category_filter: vec!["nutrition".into()],
            tag_filter: vec![],
        };

        let without = build_filter(&options, &query(None), 0.8);
        assert_eq!(without.min_confidence, None);
        assert_eq!(without.categories, vec!["nutrition"]);

        let ctx = HealthQueryContext::new("u1", QueryType::Nutrition);
        let with = build_filter(&options, &query(Some(ctx)), 0.8);
        assert_eq!(with.min_confidence, Some(0.8));
    }
}
