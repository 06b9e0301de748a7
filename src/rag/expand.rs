//! Query understanding and expansion.
//!
//! Key terms come from a deterministic tokenizer. Related concepts come from
//! the completion model and are best-effort: any failure yields an empty list
//! and a [`Degradation`], never an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::types::{ContextualizedQuery, Degradation, HealthQueryContext, Outcome};
use crate::completion::{ChatMessage, Completer};

const MAX_CONCEPTS: usize = 5;
const KEY_TERMS_IN_EXPANSION: usize = 3;
const CONCEPTS_IN_EXPANSION: usize = 2;

pub const KEY_TERM_WEIGHT: f64 = 1.0;
pub const CONCEPT_WEIGHT: f64 = 0.7;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "his", "how", "its", "may", "new", "now", "old", "see",
    "two", "who", "did", "does", "get", "got", "let", "put", "say", "she", "too", "use", "what",
    "when", "where", "which", "while", "why", "with", "would", "could", "should", "will", "this",
    "that", "these", "those", "there", "their", "them", "they", "then", "than", "from", "into",
    "about", "after", "before", "during", "over", "under", "again", "just", "very", "some",
    "such", "only", "own", "same", "more", "most", "other", "each", "both", "few", "been",
    "being", "were", "your", "yours", "mine", "myself", "yourself", "also", "because", "until",
    "much", "many", "like", "need", "want", "know", "tell", "best", "good",
];

/// Lowercase, split on non-alphanumerics, drop stop words and tokens of two
/// characters or fewer, de-duplicate preserving first occurrence.
pub fn extract_key_terms(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut terms: Vec<String> = Vec::new();
    for token in lower.split(|c: char| !c.is_alphanumeric()) {
        if token.chars().count() <= 2 || STOP_WORDS.contains(&token) {
            continue;
        }
        if !terms.iter().any(|t| t == token) {
            terms.push(token.to_string());
        }
    }
    terms
}

/// Prompt asking for 3 to 5 related concepts, one per line.
pub fn concept_messages(query: &str, context: Option<&HealthQueryContext>) -> Vec<ChatMessage> {
    let system = "You are a health and wellness knowledge assistant. \
                  Given a user question, list 3 to 5 closely related concepts that would help \
                  find relevant reference material. Respond with one concept per line and \
                  nothing else.";

    let mut user = format!("Question: {query}");
    if let Some(ctx) = context {
        user.push_str(&format!("\nTopic: {}", ctx.query_type));
        if !ctx.current_goals.is_empty() {
            user.push_str(&format!("\nUser goals: {}", ctx.current_goals.join(", ")));
        }
    }

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

/// Parse newline-separated concepts, stripping bullets and numbering.
pub fn parse_concepts(text: &str) -> Vec<String> {
    let mut concepts: Vec<String> = Vec::new();
    for line in text.lines() {
        let concept = strip_list_marker(line.trim());
        if concept.is_empty() {
            continue;
        }
        if concepts.iter().any(|c| c.eq_ignore_ascii_case(concept)) {
            continue;
        }
        concepts.push(concept.to_string());
        if concepts.len() == MAX_CONCEPTS {
            break;
        }
    }
    concepts
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim_start_matches(['-', '*', '•', '+']).trim_start();
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    let rest = if digits > 0 {
        line[digits..]
            .strip_prefix('.')
            .or_else(|| line[digits..].strip_prefix(')'))
            .unwrap_or(line)
    } else {
        line
    };
    rest.trim().trim_end_matches(['.', ',', ';']).trim()
}

/// Original query plus the top key terms, top concepts, and context hints,
/// space-joined.
pub fn build_expanded_query(
    query: &str,
    key_terms: &[String],
    concepts: &[String],
    context: Option<&HealthQueryContext>,
) -> String {
    let mut parts: Vec<&str> = vec![query.trim()];
    parts.extend(key_terms.iter().take(KEY_TERMS_IN_EXPANSION).map(String::as_str));
    parts.extend(concepts.iter().take(CONCEPTS_IN_EXPANSION).map(String::as_str));
    if let Some(ctx) = context {
        parts.push(ctx.query_type.as_str());
        if let Some(goal) = ctx.current_goals.first() {
            parts.push(goal);
        }
    }
    parts.join(" ")
}

/// Ranking weights; a key term keeps its weight if a concept repeats it.
pub fn term_weights(key_terms: &[String], concepts: &[String]) -> BTreeMap<String, f64> {
    let mut weights = BTreeMap::new();
    for concept in concepts {
        weights.insert(concept.to_lowercase(), CONCEPT_WEIGHT);
    }
    for term in key_terms {
        weights.insert(term.to_lowercase(), KEY_TERM_WEIGHT);
    }
    weights
}

pub struct QueryExpander {
    completer: Arc<Completer>,
}

impl QueryExpander {
    /// Tokens budgeted for the concept list.
    const CONCEPT_MAX_TOKENS: u32 = 100;

    pub fn new(completer: Arc<Completer>) -> Self {
        Self { completer }
    }

    pub async fn expand(
        &self,
        query: &str,
        context: Option<&HealthQueryContext>,
    ) -> Outcome<ContextualizedQuery> {
        let key_terms = extract_key_terms(query);
        let (concepts, degraded) = match self.related_concepts(query, context).await {
            Ok(concepts) => (concepts, None),
            Err(reason) => (Vec::new(), Some(reason)),
        };

        let expanded = ContextualizedQuery {
            original_query: query.to_string(),
            expanded_query: build_expanded_query(query, &key_terms, &concepts, context),
            term_weights: term_weights(&key_terms, &concepts),
            key_terms,
            related_concepts: concepts,
            context: context.cloned(),
        };
        tracing::debug!(
            key_terms = expanded.key_terms.len(),
            concepts = expanded.related_concepts.len(),
            expanded = %expanded.expanded_query,
            "query expanded"
        );

        Outcome {
            value: expanded,
            degraded,
        }
    }

    async fn related_concepts(
        &self,
        query: &str,
        context: Option<&HealthQueryContext>,
    ) -> std::result::Result<Vec<String>, Degradation> {
        let mut request = self.completer.request(concept_messages(query, context));
        request.max_tokens = Self::CONCEPT_MAX_TOKENS;
        request.temperature = 0.3;

        let completion = self
            .completer
            .complete(request)
            .await
            .map_err(|e| Degradation::from_error("expand", &e))?;
        Ok(parse_concepts(&completion.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::types::QueryType;

    #[test]
    fn key_terms_drop_stop_words_and_short_tokens() {
        let terms = extract_key_terms("What should I eat after a 16-hour fast?");
        assert_eq!(terms, vec!["eat", "hour", "fast"]);
    }

    #[test]
    fn key_terms_deduplicate_in_order() {
        let terms = extract_key_terms("Fasting, fasting and FASTING electrolytes");
        assert_eq!(terms, vec!["fasting", "electrolytes"]);
    }

    #[test]
    fn concepts_strip_markers_and_cap_at_five() {
        let text = "1. Refeeding syndrome\n- Electrolytes\n* Protein intake\n\n2) Insulin response\n• Gut health\n6. Hydration";
        assert_eq!(
            parse_concepts(text),
            vec![
                "Refeeding syndrome",
                "Electrolytes",
                "Protein intake",
                "Insulin response",
                "Gut health"
            ]
        );
    }

    #[test]
    fn expanded_query_includes_context() {
        let ctx = HealthQueryContext::new("u1", QueryType::Fasting)
            .with_goals(["weight loss", "energy"]);
        let key_terms = vec!["eat".to_string(), "hour".into(), "fast".into(), "extra".into()];
        let concepts = vec!["refeeding".to_string(), "protein".into(), "insulin".into()];

        let expanded = build_expanded_query("What to eat?", &key_terms, &concepts, Some(&ctx));
        assert_eq!(
            expanded,
            "What to eat? eat hour fast refeeding protein fasting weight loss"
        );
    }

    #[test]
    fn expanded_query_without_context_or_concepts() {
        let key_terms = vec!["sleep".to_string()];
        assert_eq!(build_expanded_query("sleep tips", &key_terms, &[], None), "sleep tips sleep");
    }

    #[test]
    fn key_term_weight_wins_on_collision() {
        let weights = term_weights(
            &["protein".to_string()],
            &["Protein".to_string(), "refeeding".to_string()],
        );
        assert_eq!(weights["protein"], KEY_TERM_WEIGHT);
        assert_eq!(weights["refeeding"], CONCEPT_WEIGHT);
    }

    #[test]
    fn concept_prompt_mentions_topic_and_goals() {
        let ctx = HealthQueryContext::new("u1", QueryType::Sleep).with_goals(["fall asleep faster"]);
        let messages = concept_messages("Why do I wake up at 3am?", Some(&ctx));
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("Topic: sleep"));
        assert!(messages[1].content.contains("fall asleep faster"));
    }
}
