//! CLI `doctor` command: check configuration and the usage database.

use anyhow::{Context, Result};

use groundwork::config::{self, GroundworkConfig};
use groundwork::db;

/// Validate configuration, run database diagnostics, and print a health report.
pub fn doctor(config: &GroundworkConfig) -> Result<()> {
    println!("groundwork Health Report");
    println!("========================");
    println!();

    let config_path = config::default_config_path();
    println!(
        "Config file:       {} ({})",
        config_path.display(),
        if config_path.exists() { "found" } else { "not found, using defaults" }
    );
    match config.validate() {
        Ok(()) => println!("Configuration:     OK"),
        Err(e) => println!("Configuration:     INVALID ({e})"),
    }
    println!("Embedding model:   {}", config.embedding.model);
    println!(
        "Completion model:  {} (small requests: {})",
        config.completion.model, config.completion.cheap_model
    );
    println!(
        "Vector index:      {} (namespace: {})",
        if config.index.base_url.is_empty() { "(not set)" } else { &config.index.base_url },
        config.index.namespace
    );
    println!(
        "Daily budget:      ${:.2}, {} chat / {} embedding requests",
        config.governor.daily_budget,
        config.governor.max_daily_chat_requests,
        config.governor.max_daily_embedding_requests
    );
    println!();

    let db_path = config.resolved_db_path();
    if !db_path.exists() {
        println!("Database:          not found at {}", db_path.display());
        println!("It is created on first `groundwork serve`, `search`, or `ask`.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path)
        .context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!(
        "Usage snapshot:    {}",
        if report.has_snapshot { "present" } else { "none yet" }
    );
    println!("Archived days:     {}", report.archived_days);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Stop any running `groundwork serve` process");
        println!("  2. Move {} aside; usage counters restart from zero", db_path.display());
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
