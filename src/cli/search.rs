//! CLI `search` command: run a ranked knowledge base search from the terminal.

use anyhow::Result;

use groundwork::config::GroundworkConfig;
use groundwork::rag::SearchOptions;

use crate::server::build_pipeline;

/// Run a search from the terminal and print ranked results.
pub async fn search(
    config: &GroundworkConfig,
    query: &str,
    max_results: Option<usize>,
    categories: Vec<String>,
) -> Result<()> {
    let pipeline = build_pipeline(config)?;

    let mut options = SearchOptions::from_config(&config.retrieval);
    if let Some(n) = max_results {
        options.max_results = n.max(1);
    }
    options.category_filter = categories;

    let outcome = pipeline.search(query, None, &options).await;

    if let Some(reason) = &outcome.degraded {
        println!("Note: search degraded ({})", serde_json::to_string(reason)?);
    }

    if outcome.value.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", outcome.value.len());

    for (i, result) in outcome.value.iter().enumerate() {
        let doc = &result.document;
        let preview: String = doc.content.chars().take(120).collect();
        let ellipsis = if doc.content.chars().count() > 120 { "..." } else { "" };

        println!(
            "  {}. [{}] {} (similarity: {:.2}, relevance: {:.4})",
            i + 1,
            doc.category,
            doc.title,
            result.similarity_score,
            result.relevance_score,
        );
        println!("     {preview}{ellipsis}");
        println!("     match: {}", result.match_reason);
        if !result.matched_keywords.is_empty() {
            println!("     keywords: {}", result.matched_keywords.join(", "));
        }
        println!();
    }

    Ok(())
}
