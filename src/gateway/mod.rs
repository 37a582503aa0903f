//! Model gateway: resilient invocation of the primary/secondary models.
//!
//! The invoker owns the retry and fallback machinery so the rest of the
//! pipeline only ever sees a [`UnitOutcome`]: a restriction triggers exactly
//! one attempt against the secondary model, rate limits are retried with
//! backoff and jitter up to a bound, and anything else becomes an empty
//! result with a descriptive error. No path aborts the run.

pub mod error;
pub mod gemini;
pub mod types;
pub mod usage;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::annotate::normalize::normalize;
use crate::annotate::types::{CandidateAnnotation, InputUnit, Provenance};
use crate::extract::extract;
use crate::prompts::compose_annotation;

use gemini::TextModel;

pub use error::{ErrorContext, ProviderError};
pub use gemini::{GeminiAdapter, SignalMap};
pub use types::{GenerationConfig, ModelReply, ModelRole};
pub use usage::{UsageSnapshot, UsageStats};

// =============================================================================
// RETRY POLICY
// =============================================================================

/// Bounded retry with exponential backoff and jitter for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts against one model, first call included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the uniform jitter added to every delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based): the provider's
    /// suggestion when present, else base × 2^attempt, capped, plus jitter.
    pub fn delay(&self, attempt: u32, suggested: Option<Duration>) -> Duration {
        let backoff = suggested.unwrap_or_else(|| backoff_delay(self.base_delay, attempt));
        backoff.min(self.max_delay) + jitter(self.jitter)
    }
}

/// base × 2^attempt, saturating.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u32.saturating_pow(attempt.min(16));
    base.saturating_mul(multiplier)
}

fn jitter(bound: Duration) -> Duration {
    if bound.is_zero() {
        return Duration::ZERO;
    }
    bound.mul_f64(rand::random::<f64>())
}

// =============================================================================
// INVOKER
// =============================================================================

/// Invoker configuration beyond the two model handles.
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    pub annotation_config: GenerationConfig,
    pub fallback_config: GenerationConfig,
    pub validation_config: GenerationConfig,
    pub retry: RetryPolicy,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            annotation_config: GenerationConfig::annotation(),
            fallback_config: GenerationConfig::fallback(),
            validation_config: GenerationConfig::validation(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Which model produced a unit's result and how.
#[derive(Debug, Clone, Default)]
pub struct CallMetadata {
    pub model: String,
    pub fallback_used: bool,
}

/// Everything the invoker recovered for one unit. `error` set with an empty
/// candidate list means "no evidence for this unit", never a fatal failure.
#[derive(Debug, Default)]
pub struct UnitOutcome {
    pub rationale: String,
    pub candidates: Vec<CandidateAnnotation>,
    pub error: Option<String>,
    pub metadata: CallMetadata,
}

/// Resilient invoker over a primary and a secondary model.
pub struct ModelInvoker {
    primary: Arc<dyn TextModel>,
    secondary: Arc<dyn TextModel>,
    config: InvokerConfig,
    stats: Mutex<UsageStats>,
}

impl ModelInvoker {
    pub fn new(primary: Arc<dyn TextModel>, secondary: Arc<dyn TextModel>) -> Self {
        Self::with_config(primary, secondary, InvokerConfig::default())
    }

    pub fn with_config(
        primary: Arc<dyn TextModel>,
        secondary: Arc<dyn TextModel>,
        config: InvokerConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            config,
            stats: Mutex::new(UsageStats::default()),
        }
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    /// Annotate one unit: primary call, one-shot fallback on restriction,
    /// bounded retry on rate limits. Never errors.
    pub async fn invoke(&self, unit: &InputUnit) -> UnitOutcome {
        let prompt = compose_annotation(unit);

        match self
            .generate(ModelRole::Primary, &prompt, &self.config.annotation_config)
            .await
        {
            Ok(reply) => self.outcome_from_reply(reply, ModelRole::Primary, false),
            Err(ProviderError::Restricted { reason, .. }) => {
                warn!(unit = %unit.id, reason = %reason, "primary restricted; falling back");
                self.record(|s| s.record_fallback(&reason));
                self.invoke_fallback(unit, &prompt).await
            }
            Err(err) => {
                debug!(unit = %unit.id, code = err.code(), "primary call failed without result");
                UnitOutcome {
                    error: Some(format!("primary model failed: {err}")),
                    metadata: CallMetadata {
                        model: self.primary.model_id().to_string(),
                        fallback_used: false,
                    },
                    ..Default::default()
                }
            }
        }
    }

    /// At most one fallback attempt per unit.
    async fn invoke_fallback(&self, unit: &InputUnit, prompt: &str) -> UnitOutcome {
        match self
            .generate(ModelRole::Secondary, prompt, &self.config.fallback_config)
            .await
        {
            Ok(reply) => self.outcome_from_reply(reply, ModelRole::Secondary, true),
            Err(err) => {
                warn!(unit = %unit.id, code = err.code(), "fallback model also failed");
                UnitOutcome {
                    error: Some(format!("fallback model failed: {err}")),
                    metadata: CallMetadata {
                        model: self.secondary.model_id().to_string(),
                        fallback_used: true,
                    },
                    ..Default::default()
                }
            }
        }
    }

    fn outcome_from_reply(
        &self,
        reply: ModelReply,
        role: ModelRole,
        fallback_used: bool,
    ) -> UnitOutcome {
        let model = self.model_for(role).model_id().to_string();
        let extraction = extract(&reply.text);
        let provenance = Provenance {
            model: model.clone(),
            fallback_used,
        };

        // A reply with no recoverable array is not the same as a genuine "[]":
        // the unit got no evidence either way, and the outcome says so.
        let (raw_candidates, error) = match extraction.structured {
            Some(list) => (list, None),
            None => {
                warn!(model = %model, reply_len = reply.text.len(), "reply had no recoverable structure");
                (
                    Vec::new(),
                    Some("no structured output recovered from model reply".to_string()),
                )
            }
        };
        let candidates: Vec<CandidateAnnotation> = raw_candidates
            .iter()
            .map(|raw| normalize(raw, provenance.clone()))
            .collect();

        UnitOutcome {
            rationale: extraction.rationale,
            candidates,
            error,
            metadata: CallMetadata {
                model,
                fallback_used,
            },
        }
    }

    /// One generation call with rate-limit retry. Used for both annotation
    /// and validation calls so every request lands in the same counters.
    pub async fn generate(
        &self,
        role: ModelRole,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<ModelReply, ProviderError> {
        let model = self.model_for(role);
        let retry = &self.config.retry;
        let mut attempt = 0u32;

        loop {
            self.record(UsageStats::record_request);

            match model.generate(prompt, config).await {
                Ok(reply) => {
                    self.record(|s| {
                        s.record_success(role, reply.input_tokens, reply.output_tokens)
                    });
                    return Ok(reply);
                }
                Err(err) if err.is_retryable() && attempt + 1 < retry.max_attempts => {
                    let delay = retry.delay(attempt, err.retry_after());
                    warn!(
                        role = role.as_str(),
                        code = err.code(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure; backing off"
                    );
                    self.record(UsageStats::record_retry);
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn model_for(&self, role: ModelRole) -> &dyn TextModel {
        match role {
            ModelRole::Primary => self.primary.as_ref(),
            ModelRole::Secondary => self.secondary.as_ref(),
        }
    }

    fn record(&self, f: impl FnOnce(&mut UsageStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }

    /// Timestamped copy of the usage counters.
    pub fn usage(&self) -> UsageSnapshot {
        let stats = self
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        UsageSnapshot::of(&stats)
    }

    /// Test isolation only; never called mid-run by the pipeline.
    pub fn reset_usage(&self) {
        self.record(UsageStats::reset);
    }
}
