use anyhow::{Context, Result};

use groundwork::config::GroundworkConfig;
use groundwork::governor::{SqliteUsageStore, UsageStore};

/// Display persisted API usage in the terminal. Works without API keys.
pub fn stats(config: &GroundworkConfig, days: usize) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = groundwork::db::open_database(&db_path)?;
    let store = SqliteUsageStore::new(conn);

    let snapshot = store.load().context("failed to load usage snapshot")?;

    println!("API Usage");
    println!("{}", "=".repeat(40));

    match snapshot {
        Some(snapshot) => {
            let s = &snapshot.stats;
            let budget = config.governor.daily_budget;
            println!("  Day (UTC):           {}", s.day);
            println!("  Chat completions:    {}", s.total_chat_completions);
            println!("  Embeddings:          {}", s.total_embeddings);
            println!("  Prompt tokens:       {}", s.prompt_tokens);
            println!("  Completion tokens:   {}", s.completion_tokens);
            println!("  Total tokens:        {}", s.total_tokens_used);
            println!(
                "  Estimated cost:      ${:.4} of ${:.2} ({:.0}%)",
                s.estimated_cost,
                budget,
                if budget > 0.0 { s.estimated_cost / budget * 100.0 } else { 0.0 }
            );
            println!();

            if !s.by_model.is_empty() {
                println!("By Model:");
                for (model, usage) in &s.by_model {
                    println!(
                        "  {:<24} {:>6} req  ${:.4}  avg {:.0} ms",
                        model,
                        usage.requests,
                        usage.cost,
                        usage.average_latency_ms()
                    );
                }
                println!();
            }
        }
        None => {
            println!("  No usage recorded yet.");
            println!();
        }
    }

    let history = store.archived_days(days)?;
    if !history.is_empty() {
        println!("Previous Days:");
        for (day, usage) in history {
            println!(
                "  {}  chat {:>5}  embed {:>5}  tokens {:>8}  ${:.4}",
                day, usage.chat_requests, usage.embedding_requests, usage.tokens, usage.cost
            );
        }
    }

    Ok(())
}
