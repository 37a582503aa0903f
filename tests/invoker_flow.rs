//! Invoker fallback/retry behavior against a scripted in-memory model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use versemark::gateway::gemini::TextModel;
use versemark::gateway::{
    ErrorContext, GenerationConfig, InvokerConfig, ModelInvoker, ModelReply, ProviderError,
    RetryPolicy,
};
use versemark::{ContextTag, InputUnit};

/// In-memory model that replays a scripted sequence of results. Once the
/// script runs out it keeps returning malformed-response errors.
struct ScriptedModel {
    id: &'static str,
    script: Mutex<VecDeque<Result<ModelReply, ProviderError>>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(id: &'static str, script: Vec<Result<ModelReply, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            id,
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    async fn generate(
        &self,
        _prompt: &str,
        _config: &GenerationConfig,
    ) -> Result<ModelReply, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::malformed("script exhausted")))
    }

    fn model_id(&self) -> &str {
        self.id
    }
}

fn ok(text: &str) -> Result<ModelReply, ProviderError> {
    Ok(ModelReply {
        text: text.to_string(),
        input_tokens: 10,
        output_tokens: 5,
    })
}

fn rate_limited() -> Result<ModelReply, ProviderError> {
    Err(ProviderError::rate_limited(None, ErrorContext::new()))
}

fn fast_config() -> InvokerConfig {
    InvokerConfig {
        retry: RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        },
        ..Default::default()
    }
}

fn unit() -> InputUnit {
    InputUnit::new("PSA.18.2", "The LORD is my rock", ContextTag::new("poetry"))
}

const CANDIDATE_REPLY: &str = r#"Rock imagery describes the deity.
---
[{"metaphor":"yes","simile":"no","figurative":"yes","primary_span":"my rock","explanation":"deity as stone","confidence":0.9}]"#;

#[tokio::test]
async fn restriction_triggers_single_fallback() {
    let primary = ScriptedModel::new("primary-model", vec![Err(ProviderError::restricted("SAFETY"))]);
    let secondary = ScriptedModel::new("secondary-model", vec![ok(CANDIDATE_REPLY)]);
    let invoker =
        ModelInvoker::with_config(primary.clone(), secondary.clone(), fast_config());

    let outcome = invoker.invoke(&unit()).await;

    assert!(outcome.error.is_none());
    assert!(outcome.metadata.fallback_used);
    assert_eq!(outcome.metadata.model, "secondary-model");
    assert_eq!(outcome.candidates.len(), 1);
    assert!(outcome.candidates[0].flags.metaphor);
    assert!(outcome.candidates[0].provenance.fallback_used);
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 1);

    let usage = invoker.usage().stats;
    assert_eq!(usage.fallback_count, 1);
    assert_eq!(usage.restriction_reasons, vec!["SAFETY".to_string()]);
    assert_eq!(usage.secondary_success, 1);
    assert_eq!(usage.primary_success, 0);
}

#[tokio::test]
async fn restricted_fallback_yields_empty_outcome_not_panic() {
    let primary = ScriptedModel::new("p", vec![Err(ProviderError::restricted("SAFETY"))]);
    let secondary = ScriptedModel::new("s", vec![Err(ProviderError::restricted("RECITATION"))]);
    let invoker =
        ModelInvoker::with_config(primary.clone(), secondary.clone(), fast_config());

    let outcome = invoker.invoke(&unit()).await;

    assert!(outcome.candidates.is_empty());
    assert!(outcome.error.is_some());
    assert!(outcome.metadata.fallback_used);
    // At most one fallback attempt per unit.
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 1);
}

#[tokio::test]
async fn rate_limit_retries_then_succeeds() {
    let primary = ScriptedModel::new(
        "p",
        vec![rate_limited(), rate_limited(), ok(CANDIDATE_REPLY)],
    );
    let secondary = ScriptedModel::new("s", vec![]);
    let invoker =
        ModelInvoker::with_config(primary.clone(), secondary.clone(), fast_config());

    let outcome = invoker.invoke(&unit()).await;

    assert!(outcome.error.is_none());
    assert!(!outcome.metadata.fallback_used);
    assert_eq!(primary.calls(), 3);
    assert_eq!(secondary.calls(), 0);

    let usage = invoker.usage().stats;
    assert_eq!(usage.retry_count, 2);
    assert_eq!(usage.requests, 3);
    assert_eq!(usage.primary_success, 1);
}

#[tokio::test]
async fn rate_limit_retries_are_bounded() {
    let primary = ScriptedModel::new(
        "p",
        (0..10).map(|_| rate_limited()).collect(),
    );
    let secondary = ScriptedModel::new("s", vec![]);
    let invoker = ModelInvoker::with_config(
        primary.clone(),
        secondary.clone(),
        InvokerConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                jitter: Duration::ZERO,
            },
            ..Default::default()
        },
    );

    let outcome = invoker.invoke(&unit()).await;

    assert!(outcome.candidates.is_empty());
    assert!(outcome.error.is_some());
    // Never exceeds the configured maximum attempt count.
    assert_eq!(primary.calls(), 3);
    assert_eq!(secondary.calls(), 0);
}

#[tokio::test]
async fn retryable_server_error_is_retried_then_succeeds() {
    let primary = ScriptedModel::new(
        "p",
        vec![
            Err(ProviderError::provider("gemini", "HTTP 503", true)),
            ok(CANDIDATE_REPLY),
        ],
    );
    let secondary = ScriptedModel::new("s", vec![]);
    let invoker =
        ModelInvoker::with_config(primary.clone(), secondary.clone(), fast_config());

    let outcome = invoker.invoke(&unit()).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.candidates.len(), 1);
    assert!(!outcome.metadata.fallback_used);
    assert_eq!(primary.calls(), 2);
    assert_eq!(secondary.calls(), 0);

    let usage = invoker.usage().stats;
    assert_eq!(usage.retry_count, 1);
    assert_eq!(usage.primary_success, 1);
}

#[tokio::test]
async fn malformed_response_is_not_retried() {
    let primary = ScriptedModel::new("p", vec![Err(ProviderError::malformed("empty body"))]);
    let secondary = ScriptedModel::new("s", vec![]);
    let invoker =
        ModelInvoker::with_config(primary.clone(), secondary.clone(), fast_config());

    let outcome = invoker.invoke(&unit()).await;

    assert!(outcome.candidates.is_empty());
    assert!(outcome.error.is_some());
    assert!(!outcome.metadata.fallback_used);
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 0);
}

#[tokio::test]
async fn unstructured_reply_reports_descriptive_error() {
    let primary = ScriptedModel::new(
        "p",
        vec![ok("Sure! Here are my thoughts on the verse, with no structure at all.")],
    );
    let secondary = ScriptedModel::new("s", vec![]);
    let invoker = ModelInvoker::with_config(primary.clone(), secondary, fast_config());

    let outcome = invoker.invoke(&unit()).await;

    assert!(outcome.candidates.is_empty());
    assert!(outcome
        .error
        .as_deref()
        .unwrap()
        .contains("no structured output"));
    assert!(!outcome.metadata.fallback_used);
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn empty_array_reply_carries_no_error() {
    let primary = ScriptedModel::new("p", vec![ok("Nothing figurative here.\n---\n[]")]);
    let secondary = ScriptedModel::new("s", vec![]);
    let invoker = ModelInvoker::with_config(primary, secondary, fast_config());

    let outcome = invoker.invoke(&unit()).await;

    assert!(outcome.candidates.is_empty());
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn token_totals_accumulate_across_units() {
    let primary = ScriptedModel::new("p", vec![ok(CANDIDATE_REPLY), ok(CANDIDATE_REPLY)]);
    let secondary = ScriptedModel::new("s", vec![]);
    let invoker = ModelInvoker::with_config(primary, secondary, fast_config());

    invoker.invoke(&unit()).await;
    invoker.invoke(&unit()).await;

    let usage = invoker.usage().stats;
    assert_eq!(usage.input_tokens, 20);
    assert_eq!(usage.output_tokens, 10);
    assert_eq!(usage.primary_success, 2);
}

#[tokio::test]
async fn reset_usage_is_explicit_and_total() {
    let primary = ScriptedModel::new("p", vec![ok(CANDIDATE_REPLY)]);
    let secondary = ScriptedModel::new("s", vec![]);
    let invoker = ModelInvoker::with_config(primary, secondary, fast_config());

    invoker.invoke(&unit()).await;
    assert_eq!(invoker.usage().stats.requests, 1);

    invoker.reset_usage();
    assert_eq!(invoker.usage().stats.requests, 0);
}
