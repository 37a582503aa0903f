//! Process-scoped usage counters for the model invoker.
//!
//! One `UsageStats` lives inside each invoker, incremented on every provider
//! call and readable at any time. `reset` exists for test isolation only —
//! nothing in the pipeline resets counters mid-run.

use chrono::{DateTime, Utc};

use super::types::ModelRole;

/// Counters accumulated over the life of one invoker.
#[derive(Debug, Clone, Default)]
pub struct UsageStats {
    /// Total provider calls issued, including retries and fallbacks.
    pub requests: u64,
    /// Successful calls against the primary model.
    pub primary_success: u64,
    /// Successful calls against the secondary model.
    pub secondary_success: u64,
    /// Units for which the secondary model was attempted after a restriction.
    pub fallback_count: u64,
    /// Rate-limit retries performed.
    pub retry_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Restriction reasons collected in arrival order, for audit.
    pub restriction_reasons: Vec<String>,
}

impl UsageStats {
    pub fn record_request(&mut self) {
        self.requests += 1;
    }

    pub fn record_success(&mut self, role: ModelRole, input_tokens: u32, output_tokens: u32) {
        match role {
            ModelRole::Primary => self.primary_success += 1,
            ModelRole::Secondary => self.secondary_success += 1,
        }
        self.input_tokens += u64::from(input_tokens);
        self.output_tokens += u64::from(output_tokens);
    }

    pub fn record_retry(&mut self) {
        self.retry_count += 1;
    }

    pub fn record_fallback(&mut self, reason: impl Into<String>) {
        self.fallback_count += 1;
        self.restriction_reasons.push(reason.into());
    }

    pub fn reset(&mut self) {
        *self = UsageStats::default();
    }
}

/// Point-in-time copy of the counters, timestamped for audit logs.
#[derive(Debug, Clone)]
pub struct UsageSnapshot {
    pub taken_at: DateTime<Utc>,
    pub stats: UsageStats,
}

impl UsageSnapshot {
    pub fn of(stats: &UsageStats) -> Self {
        Self {
            taken_at: Utc::now(),
            stats: stats.clone(),
        }
    }
}
