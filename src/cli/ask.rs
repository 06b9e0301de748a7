//! CLI `ask` command: answer one question from the terminal.

use anyhow::{anyhow, Result};

use groundwork::config::GroundworkConfig;
use groundwork::rag::{HealthQueryContext, QueryType, ResponsePath, SearchOptions};

use crate::server::build_pipeline;

pub async fn ask(
    config: &GroundworkConfig,
    query: &str,
    query_type: Option<&str>,
    goals: Vec<String>,
    restrictions: Vec<String>,
) -> Result<()> {
    let pipeline = build_pipeline(config)?;

    let context = if query_type.is_some() || !goals.is_empty() || !restrictions.is_empty() {
        let query_type = match query_type {
            Some(t) => t.parse::<QueryType>().map_err(|e| anyhow!(e))?,
            None => QueryType::General,
        };
        Some(
            HealthQueryContext::new("cli", query_type)
                .with_goals(goals)
                .with_restrictions(restrictions),
        )
    } else {
        None
    };

    let options = SearchOptions::from_config(&config.retrieval);
    let response = pipeline
        .generate_contextualized_response(query, context.as_ref(), &options)
        .await;

    println!("{}\n", response.text);

    match response.path {
        ResponsePath::Grounded => {
            println!("Sources:");
            for (i, source) in response.sources.iter().enumerate() {
                println!("  {}. {} ({:.3})", i + 1, source.title, source.relevance_score);
            }
        }
        ResponsePath::Fallback => println!("(no matching sources, fallback answer)"),
    }
    if let Some(reason) = &response.degraded {
        println!("Degraded: {}", serde_json::to_string(reason)?);
    }
    if let Some(model) = &response.model {
        println!("Model: {model}");
    }
    println!("Request: {}", response.request_id);

    Ok(())
}
