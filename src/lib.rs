//! Grounded answers for health and wellness questions, with a hard cap on API spend.
//!
//! groundwork is a retrieval-augmented generation (RAG) core. It expands a user
//! query, retrieves and re-ranks reference documents from a remote vector index,
//! assembles a bounded context, and asks a chat model for a grounded answer.
//! Every paid call goes through a budget governor:
//!
//! | Guard | Default | On breach |
//! |-------|---------|-----------|
//! | Daily spend | $5.00 per UTC day | `BudgetExceeded`, no network call |
//! | Chat requests | 500 per rolling 24h | `RateLimitExceeded`, no network call |
//! | Embedding requests | 2000 per rolling 24h | `RateLimitExceeded`, no network call |
//! | Embedding cache | 1000 entries, 24h TTL | expired first, then oldest evicted |
//!
//! # Architecture
//!
//! - **Providers**: OpenAI-compatible embedding and chat endpoints over `reqwest`
//! - **Retrieval**: remote vector index queried with metadata filters
//! - **Governance**: in-process governor with state persisted to SQLite
//! - **Transport**: MCP over stdio (primary) or Streamable HTTP/SSE
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite database initialization, schema, migrations, and health checks
//! - [`embedding`]: Embedding provider, cache, and the governed single-flight [`embedding::Embedder`]
//! - [`completion`]: Chat completion provider and the governed [`completion::Completer`]
//! - [`governor`]: Budget state machine, request windows, pricing, and usage accounting
//! - [`index`]: Read-only vector index client
//! - [`rag`]: Query expansion, retrieval, ranking, context assembly, and response generation

pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod governor;
pub mod http;
pub mod index;
pub mod rag;

pub use error::{RagError, Result};
pub use rag::RagPipeline;
