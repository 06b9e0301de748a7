//! Prompt construction and answer generation.
//!
//! Three paths:
//!
//! - **Grounded**: documents were retrieved; the user prompt embeds them.
//! - **Fallback prompt**: nothing was retrieved; a separate template tells the
//!   model to say it lacks specific information and to recommend a
//!   professional.
//! - **Static fallback**: the completion itself failed; a fixed text is
//!   returned with the failure reason attached.

use std::sync::Arc;

use super::context::AssembledContext;
use super::types::{
    Degradation, GeneratedResponse, HealthQueryContext, ResponsePath, SearchResult, SourceRef,
};
use crate::completion::{ChatMessage, Completer};

pub const STATIC_FALLBACK: &str = "I don't have specific information to answer that right now. \
    For personalised guidance, please consult a qualified healthcare professional such as \
    your doctor or a registered dietitian.";

pub fn system_prompt(context: Option<&HealthQueryContext>) -> String {
    let mut prompt = String::from(
        "You are a knowledgeable, careful health and wellness assistant. \
         Give practical, evidence-based answers in plain language. \
         Never diagnose conditions or replace professional medical advice.",
    );
    if let Some(ctx) = context {
        prompt.push_str(&format!("\n\nThe user is asking about: {}.", ctx.query_type));
        if !ctx.current_goals.is_empty() {
            prompt.push_str(&format!("\nTheir current goals: {}.", ctx.current_goals.join(", ")));
        }
        if !ctx.dietary_restrictions.is_empty() {
            prompt.push_str(&format!(
                "\nRespect these dietary restrictions: {}.",
                ctx.dietary_restrictions.join(", ")
            ));
        }
    }
    prompt
}

pub fn grounded_user_prompt(query: &str, context: &str) -> String {
    format!(
        "Use the reference material below to answer the question. \
         Cite sources as [Source N] where relevant and do not invent facts \
         that the material does not support.\n\n\
         Reference material:\n{context}\n\n\
         Question: {query}"
    )
}

/// Used when retrieval found nothing. Deliberately not the grounded template
/// with an empty context.
pub fn fallback_user_prompt(query: &str) -> String {
    format!(
        "No reference material was found for the question below.\n\
         Begin your answer by stating plainly that you don't have specific information \
         on this in your knowledge base. You may offer brief, widely accepted general \
         guidance, and you must recommend consulting a qualified healthcare professional \
         for advice tailored to the user.\n\n\
         Question: {query}"
    )
}

pub struct ResponseGenerator {
    completer: Arc<Completer>,
}

impl ResponseGenerator {
    pub fn new(completer: Arc<Completer>) -> Self {
        Self { completer }
    }

    /// Answer `query`. `assembled` is the context built from `results`; an
    /// empty context selects the fallback prompt. Only the results that made it
    /// into the context are cited. `upstream` carries a degradation from
    /// an earlier stage, reported if this stage does not degrade itself.
    pub async fn generate(
        &self,
        request_id: String,
        query: &str,
        context: Option<&HealthQueryContext>,
        results: &[SearchResult],
        assembled: &AssembledContext,
        upstream: Option<Degradation>,
    ) -> GeneratedResponse {
        let grounded = assembled.included > 0 && !assembled.text.is_empty();
        let user = if grounded {
            grounded_user_prompt(query, &assembled.text)
        } else {
            fallback_user_prompt(query)
        };
        let messages = vec![ChatMessage::system(system_prompt(context)), ChatMessage::user(user)];

        let sources = if grounded {
            results
                .iter()
                .take(assembled.included)
                .map(|r| SourceRef {
                    id: r.document.id.clone(),
                    title: r.document.title.clone(),
                    relevance_score: r.relevance_score,
                })
                .collect()
        } else {
            Vec::new()
        };

        let degraded_retrieval = if grounded {
            upstream
        } else {
            upstream.or(Some(Degradation::EmptyRetrieval))
        };

        match self.completer.complete(self.completer.request(messages)).await {
            Ok(completion) if !completion.text.is_empty() => GeneratedResponse {
                request_id,
                text: completion.text,
                path: if grounded {
                    ResponsePath::Grounded
                } else {
                    ResponsePath::Fallback
                },
                sources,
                model: Some(completion.model),
                degraded: degraded_retrieval,
            },
            Ok(_) => GeneratedResponse {
                request_id,
                text: STATIC_FALLBACK.to_string(),
                path: ResponsePath::Fallback,
                sources: Vec::new(),
                model: None,
                degraded: Some(Degradation::ProviderError("empty completion".into())),
            },
            Err(e) => GeneratedResponse {
                request_id,
                text: STATIC_FALLBACK.to_string(),
                path: ResponsePath::Fallback,
                sources: Vec::new(),
                model: None,
                degraded: Some(Degradation::from_error("generate", &e)),
            },
        }
    }
}
