//! Cumulative API usage counters.
//!
//! [`ApiUsageStats`] holds the counters for the current UTC day plus per-model
//! and per-day breakdowns. It is plain data: the [`Governor`](super::Governor)
//! owns the only mutable instance and serializes access to it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::RequestKind;

/// How many days of per-day history survive a daily reset.
pub const HISTORY_DAYS: usize = 30;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub requests: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost: f64,
    pub latency_ms_total: u64,
}

impl ModelUsage {
    pub fn average_latency_ms(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.latency_ms_total as f64 / self.requests as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub chat_requests: u64,
    pub embedding_requests: u64,
    pub tokens: u64,
    pub cost: f64,
}

/// Usage since the last daily reset.
///
/// Embedding tokens are counted as prompt tokens, so
/// `total_tokens_used == prompt_tokens + completion_tokens` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiUsageStats {
    /// UTC day these counters belong to.
    pub day: NaiveDate,
    pub total_chat_completions: u64,
    pub total_embeddings: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens_used: u64,
    pub estimated_cost: f64,
    pub by_model: BTreeMap<String, ModelUsage>,
    /// Keyed by `YYYY-MM-DD`; includes the current day.
    pub by_day: BTreeMap<String, DailyUsage>,
}

impl ApiUsageStats {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            total_chat_completions: 0,
            total_embeddings: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens_used: 0,
            estimated_cost: 0.0,
            by_model: BTreeMap::new(),
            by_day: BTreeMap::new(),
        }
    }

    /// Add one completed call.
    pub fn record(
        &mut self,
        kind: RequestKind,
        model: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
        cost: f64,
        latency_ms: u64,
    ) {
        match kind {
            RequestKind::Chat => self.total_chat_completions += 1,
            RequestKind::Embedding => self.total_embeddings += 1,
        }
        let tokens = prompt_tokens + completion_tokens;
        self.prompt_tokens += prompt_tokens;
        self.completion_tokens += completion_tokens;
        self.total_tokens_used += tokens;
        self.estimated_cost += cost;

        let model_usage = self.by_model.entry(model.to_string()).or_default();
        model_usage.requests += 1;
        model_usage.prompt_tokens += prompt_tokens;
        model_usage.completion_tokens += completion_tokens;
        model_usage.cost += cost;
        model_usage.latency_ms_total += latency_ms;

        let daily = self.by_day.entry(day_key(self.day)).or_default();
        match kind {
            RequestKind::Chat => daily.chat_requests += 1,
            RequestKind::Embedding => daily.embedding_requests += 1,
        }
        daily.tokens += tokens;
        daily.cost += cost;
    }

    /// Today's entry from the per-day map.
    pub fn today(&self) -> DailyUsage {
        self.by_day.get(&day_key(self.day)).cloned().unwrap_or_default()
    }

    /// Zero the cumulative counters for a new day, keeping trimmed history.
    pub fn reset_for(&mut self, day: NaiveDate) {
        let mut history = std::mem::take(&mut self.by_day);
        while history.len() > HISTORY_DAYS {
            history.pop_first();
        }
        *self = Self::new(day);
        self.by_day = history;
    }
}

pub fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}
