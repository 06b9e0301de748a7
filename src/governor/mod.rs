//! Budget governor and request-rate limiter.
//!
//! [`Governor`] gates every paid provider call. It tracks estimated spend for
//! the current UTC day and two sliding 24h request windows (chat and
//! embedding), rejecting calls pre-flight once a threshold is crossed.
//! Rejections never touch the network.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`, so the governor is safe to share between tasks on a
//! multi-threaded runtime. Snapshots are persisted through a [`UsageStore`]
//! after every change.

pub mod pricing;
pub mod store;
pub mod usage;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::GovernorConfig;
use crate::error::{RagError, RequestKind, Result};
pub use store::{GovernorSnapshot, MemoryUsageStore, SqliteUsageStore, UsageStore};
use usage::DailyUsage;
pub use usage::{ApiUsageStats, ModelUsage};

/// Daily budget state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetState {
    WithinBudget,
    Exceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    Info,
    Warning,
    Critical,
}

impl std::str::FromStr for WarningSeverity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetWarning {
    pub severity: WarningSeverity,
    pub message: String,
}

impl BudgetWarning {
    pub fn new(severity: WarningSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

/// Point-in-time view of the sliding windows.
#[derive(Debug, Clone, Serialize)]
pub struct WindowStatus {
    pub chat_requests: usize,
    pub chat_limit: usize,
    pub embedding_requests: usize,
    pub embedding_limit: usize,
}

struct GovernorState {
    stats: ApiUsageStats,
    chat_window: VecDeque<DateTime<Utc>>,
    embedding_window: VecDeque<DateTime<Utc>>,
}

impl GovernorState {
    fn fresh(day: NaiveDate) -> Self {
        Self {
            stats: ApiUsageStats::new(day),
            chat_window: VecDeque::new(),
            embedding_window: VecDeque::new(),
        }
    }

    /// Reset counters if `today` is a new UTC day. Returns the finished day's
    /// totals so the caller can archive them.
    fn roll_over(&mut self, today: NaiveDate) -> Option<(String, DailyUsage)> {
        if self.stats.day == today {
            return None;
        }
        let finished = (usage::day_key(self.stats.day), self.stats.today());
        tracing::info!(
            previous = %finished.0,
            cost = finished.1.cost,
            "new UTC day, resetting usage counters"
        );
        self.stats.reset_for(today);
        Some(finished)
    }

    fn window_mut(&mut self, kind: RequestKind) -> &mut VecDeque<DateTime<Utc>> {
        match kind {
            RequestKind::Chat => &mut self.chat_window,
            RequestKind::Embedding => &mut self.embedding_window,
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(24);
        for window in [&mut self.chat_window, &mut self.embedding_window] {
            while window.front().is_some_and(|t| *t <= cutoff) {
                window.pop_front();
            }
        }
    }

    fn snapshot(&self) -> GovernorSnapshot {
        GovernorSnapshot {
            stats: self.stats.clone(),
            chat_window: self.chat_window.iter().copied().collect(),
            embedding_window: self.embedding_window.iter().copied().collect(),
        }
    }
}

pub struct Governor {
    config: GovernorConfig,
    state: Mutex<GovernorState>,
    store: Arc<dyn UsageStore>,
}

impl Governor {
    /// Create a governor, resuming from the store's last snapshot if any.
    pub fn new(config: GovernorConfig, store: Arc<dyn UsageStore>) -> Self {
        Self::new_at(config, store, Utc::now())
    }

    /// A governor with no persistence beyond the process.
    pub fn in_memory(config: GovernorConfig) -> Self {
        Self::new(config, Arc::new(MemoryUsageStore::new()))
    }

    pub fn new_at(config: GovernorConfig, store: Arc<dyn UsageStore>, now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let mut state = match store.load() {
            Ok(Some(snapshot)) => GovernorState {
                stats: snapshot.stats,
                chat_window: snapshot.chat_window.into(),
                embedding_window: snapshot.embedding_window.into(),
            },
            Ok(None) => GovernorState::fresh(today),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load governor state, starting fresh");
                GovernorState::fresh(today)
            }
        };

        if let Some((day, finished)) = state.roll_over(today) {
            if let Err(e) = store.archive_day(&day, &finished) {
                tracing::warn!(error = %e, day = %day, "failed to archive daily usage");
            }
        }
        state.prune(now);

        tracing::info!(
            day = %state.stats.day,
            cost = state.stats.estimated_cost,
            budget = config.daily_budget,
            "governor ready"
        );

        Self {
            config,
            state: Mutex::new(state),
            store,
        }
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, GovernorState> {
        // Counters stay consistent even if a holder panicked: every mutation
        // completes before the guard is released.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check budget and the request window for `kind`, reserving a window slot
    /// when allowed.
    pub fn preflight(&self, kind: RequestKind) -> Result<()> {
        self.preflight_at(kind, Utc::now())
    }

    pub fn preflight_at(&self, kind: RequestKind, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock();
        let rolled = state.roll_over(now.date_naive());
        if rolled.is_some() {
            self.persist(&state, rolled);
        }

        let spent = state.stats.estimated_cost;
        if spent >= self.config.daily_budget {
            tracing::error!(
                kind = %kind,
                spent,
                budget = self.config.daily_budget,
                "daily budget exhausted, rejecting request"
            );
            return Err(RagError::BudgetExceeded {
                spent,
                limit: self.config.daily_budget,
            });
        }

        state.prune(now);
        let limit = match kind {
            RequestKind::Chat => self.config.max_daily_chat_requests,
            RequestKind::Embedding => self.config.max_daily_embedding_requests,
        };
        let window = state.window_mut(kind);
        if window.len() >= limit {
            tracing::error!(kind = %kind, limit, "daily request window full, rejecting request");
            return Err(RagError::RateLimitExceeded { kind, limit });
        }
        window.push_back(now);
        // The slot counts even if the call fails before anything is recorded
        self.persist(&state, None);
        Ok(())
    }

    /// Account for a completed chat completion. Returns its estimated cost.
    pub fn record_chat(
        &self,
        model: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
        latency_ms: u64,
    ) -> f64 {
        self.record_at(
            RequestKind::Chat,
            model,
            prompt_tokens,
            completion_tokens,
            latency_ms,
            Utc::now(),
        )
    }

    /// Account for a completed embedding call. Returns its estimated cost.
    pub fn record_embedding(&self, model: &str, tokens: u64, latency_ms: u64) -> f64 {
        self.record_at(RequestKind::Embedding, model, tokens, 0, latency_ms, Utc::now())
    }

    pub fn record_at(
        &self,
        kind: RequestKind,
        model: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
        latency_ms: u64,
        now: DateTime<Utc>,
    ) -> f64 {
        let cost = pricing::estimate_cost(model, prompt_tokens, completion_tokens);

        let mut state = self.lock();
        let rolled = state.roll_over(now.date_naive());
        let was_within = state.stats.estimated_cost < self.config.daily_budget;
        state
            .stats
            .record(kind, model, prompt_tokens, completion_tokens, cost, latency_ms);

        if was_within && state.stats.estimated_cost >= self.config.daily_budget {
            tracing::error!(
                spent = state.stats.estimated_cost,
                budget = self.config.daily_budget,
                "daily budget reached, further requests will be rejected until UTC midnight"
            );
        }
        tracing::debug!(
            kind = %kind,
            model,
            prompt_tokens,
            completion_tokens,
            cost,
            latency_ms,
            "usage recorded"
        );

        self.persist(&state, rolled);
        cost
    }

    fn persist(&self, state: &GovernorState, rolled: Option<(String, DailyUsage)>) {
        if let Some((day, finished)) = rolled {
            if let Err(e) = self.store.archive_day(&day, &finished) {
                tracing::warn!(error = %e, day = %day, "failed to archive daily usage");
            }
        }
        if let Err(e) = self.store.save(&state.snapshot()) {
            tracing::warn!(error = %e, "failed to persist governor state");
        }
    }

    pub fn state(&self) -> BudgetState {
        self.state_at(Utc::now())
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> BudgetState {
        let mut state = self.lock();
        if let Some(rolled) = state.roll_over(now.date_naive()) {
            self.persist(&state, Some(rolled));
        }
        if state.stats.estimated_cost >= self.config.daily_budget {
            BudgetState::Exceeded
        } else {
            BudgetState::WithinBudget
        }
    }

    /// Copy of the current day's usage counters.
    pub fn usage_stats(&self) -> ApiUsageStats {
        self.usage_stats_at(Utc::now())
    }

    pub fn usage_stats_at(&self, now: DateTime<Utc>) -> ApiUsageStats {
        let mut state = self.lock();
        if let Some(rolled) = state.roll_over(now.date_naive()) {
            self.persist(&state, Some(rolled));
        }
        state.stats.clone()
    }

    pub fn window_status(&self) -> WindowStatus {
        self.window_status_at(Utc::now())
    }

    pub fn window_status_at(&self, now: DateTime<Utc>) -> WindowStatus {
        let mut state = self.lock();
        state.prune(now);
        WindowStatus {
            chat_requests: state.chat_window.len(),
            chat_limit: self.config.max_daily_chat_requests,
            embedding_requests: state.embedding_window.len(),
            embedding_limit: self.config.max_daily_embedding_requests,
        }
    }

    /// Warnings for spend and request volume approaching or at their limits.
    pub fn budget_warnings(&self) -> Vec<BudgetWarning> {
        self.budget_warnings_at(Utc::now())
    }

    pub fn budget_warnings_at(&self, now: DateTime<Utc>) -> Vec<BudgetWarning> {
        let stats = self.usage_stats_at(now);
        let windows = self.window_status_at(now);
        let ratio = self.config.warning_ratio;
        let mut warnings = Vec::new();

        let budget = self.config.daily_budget;
        let spent = stats.estimated_cost;
        if spent >= budget {
            warnings.push(BudgetWarning::new(
                WarningSeverity::Critical,
                format!(
                    "Daily budget exceeded: ${spent:.4} of ${budget:.2}. \
                     AI requests are blocked until UTC midnight."
                ),
            ));
        } else if spent >= budget * ratio {
            warnings.push(BudgetWarning::new(
                WarningSeverity::Warning,
                format!(
                    "Daily spend at {:.0}% of budget (${spent:.4} of ${budget:.2}).",
                    spent / budget * 100.0
                ),
            ));
        }

        for (kind, used, limit) in [
            (RequestKind::Chat, windows.chat_requests, windows.chat_limit),
            (
                RequestKind::Embedding,
                windows.embedding_requests,
                windows.embedding_limit,
            ),
        ] {
            if used >= limit {
                warnings.push(BudgetWarning::new(
                    WarningSeverity::Critical,
                    format!("{kind} request limit reached: {used} of {limit} in the last 24h."),
                ));
            } else if limit > 0 && used as f64 >= limit as f64 * ratio {
                warnings.push(BudgetWarning::new(
                    WarningSeverity::Warning,
                    format!("{kind} requests at {used} of {limit} in the last 24h."),
                ));
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> GovernorConfig {
        GovernorConfig {
            daily_budget: 1.0,
            max_daily_chat_requests: 3,
            max_daily_embedding_requests: 5,
            ..GovernorConfig::default()
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 10, h, m, 0).unwrap()
    }

    #[test]
    fn budget_transitions_to_exceeded() {
        let gov = Governor::new_at(config(), Arc::new(MemoryUsageStore::new()), at(8, 0));
        assert_eq!(gov.state_at(at(8, 0)), BudgetState::WithinBudget);

        // gpt-4: 0.03/1K in, 0.06/1K out → 20K in + 10K out = $1.20
        gov.record_at(RequestKind::Chat, "gpt-4", 20_000, 10_000, 100, at(8, 1));

        assert_eq!(gov.state_at(at(8, 2)), BudgetState::Exceeded);
        let err = gov.preflight_at(RequestKind::Embedding, at(8, 2)).unwrap_err();
        assert!(matches!(err, RagError::BudgetExceeded { limit, .. } if limit == 1.0));
    }

    #[test]
    fn new_day_resets_budget() {
        let gov = Governor::new_at(config(), Arc::new(MemoryUsageStore::new()), at(8, 0));
        gov.record_at(RequestKind::Chat, "gpt-4", 20_000, 10_000, 100, at(8, 1));
        assert!(gov.preflight_at(RequestKind::Chat, at(9, 0)).is_err());

        let tomorrow = at(9, 0) + Duration::days(1);
        assert!(gov.preflight_at(RequestKind::Chat, tomorrow).is_ok());
        assert_eq!(gov.usage_stats_at(tomorrow).estimated_cost, 0.0);
    }

    #[test]
    fn rolling_window_caps_requests() {
        let gov = Governor::new_at(config(), Arc::new(MemoryUsageStore::new()), at(0, 0));
        for i in 0..3 {
            gov.preflight_at(RequestKind::Chat, at(1, i)).unwrap();
        }
        let err = gov.preflight_at(RequestKind::Chat, at(1, 10)).unwrap_err();
        assert!(matches!(
            err,
            RagError::RateLimitExceeded { kind: RequestKind::Chat, limit: 3 }
        ));

        // Embedding window is independent
        assert!(gov.preflight_at(RequestKind::Embedding, at(1, 10)).is_ok());

        // 24h after the first slot, one slot frees up
        let later = at(1, 0) + Duration::hours(24);
        assert!(gov.preflight_at(RequestKind::Chat, later).is_ok());
        assert!(gov.preflight_at(RequestKind::Chat, later).is_err());
    }

    #[test]
    fn restart_resumes_same_day_and_resets_new_day() {
        let store = Arc::new(MemoryUsageStore::new());
        let gov = Governor::new_at(config(), store.clone(), at(8, 0));
        gov.preflight_at(RequestKind::Chat, at(8, 0)).unwrap();
        gov.record_at(RequestKind::Chat, "gpt-4o", 1000, 1000, 50, at(8, 0));
        drop(gov);

        let resumed = Governor::new_at(config(), store.clone(), at(20, 0));
        let stats = resumed.usage_stats_at(at(20, 0));
        assert_eq!(stats.total_chat_completions, 1);
        assert_eq!(resumed.window_status_at(at(20, 0)).chat_requests, 1);
        drop(resumed);

        let next_day = at(20, 0) + Duration::days(1);
        let fresh = Governor::new_at(config(), store.clone(), next_day);
        assert_eq!(fresh.usage_stats_at(next_day).total_chat_completions, 0);
        assert_eq!(store.archived().len(), 1);
        assert_eq!(store.archived()[0].0, "2026-06-10");
    }

    #[test]
    fn warnings_escalate_with_spend() {
        let gov = Governor::new_at(config(), Arc::new(MemoryUsageStore::new()), at(8, 0));
        assert!(gov.budget_warnings_at(at(8, 0)).is_empty());

        // $0.90 on gpt-4 input tokens only
        gov.record_at(RequestKind::Chat, "gpt-4", 30_000, 0, 10, at(8, 1));
        let warnings = gov.budget_warnings_at(at(8, 2));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, WarningSeverity::Warning);

        gov.record_at(RequestKind::Chat, "gpt-4", 10_000, 0, 10, at(8, 3));
        let warnings = gov.budget_warnings_at(at(8, 4));
        assert_eq!(warnings[0].severity, WarningSeverity::Critical);
    }

    #[test]
    fn window_warnings_fire_near_cap() {
        let gov = Governor::new_at(config(), Arc::new(MemoryUsageStore::new()), at(8, 0));
        for i in 0..4 {
            gov.preflight_at(RequestKind::Embedding, at(8, i)).unwrap();
        }
        let warnings = gov.budget_warnings_at(at(8, 5));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("embedding"));
        assert_eq!(warnings[0].severity, WarningSeverity::Warning);
    }
}
