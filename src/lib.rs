#![forbid(unsafe_code)]

//! # versemark
//!
//! Annotates short text units (biblical verses) with figurative-language tags
//! produced by a generative model, then independently re-validates each tag
//! before handing it to a record sink.
//!
//! The hard problem is not the annotation task but surviving an unreliable
//! provider: responses arrive fenced in markdown, interleaved with prose,
//! truncated mid-object, blocked by content policy, or rate limited. The
//! pipeline recovers a best-effort structured result from all of these and
//! knows when it cannot.
//!
//! Three layers do the work:
//! - the [`gateway`] invokes a primary model with automatic fallback to a
//!   secondary on restriction and bounded backoff on throttling;
//! - the [`extract`] module turns arbitrary model text into a candidate list
//!   plus a free-text rationale via an ordered strategy chain with a
//!   truncation-repair pass;
//! - the [`annotate`] pipeline re-validates each flagged category with a
//!   category-specific rubric and merges the decisions into final records.

pub mod annotate;
pub mod categories;
pub mod extract;
pub mod gateway;
pub mod prompts;

pub use annotate::types::{
    CandidateAnnotation, ContextTag, FinalRecord, InputUnit, Provenance, RawCandidate,
    ValidationDecision, Verdict,
};
pub use annotate::{CandidateResult, Pipeline, RecordSink, RunSummary, UnitReport, UnitSource};
pub use categories::{Category, CategoryFlags, ALL_CATEGORIES};
pub use extract::{extract, Extraction};
pub use gateway::gemini::TextModel;
pub use gateway::{
    CallMetadata, GeminiAdapter, GenerationConfig, InvokerConfig, ModelInvoker, ModelReply,
    ModelRole, ProviderError, RetryPolicy, SignalMap, UnitOutcome, UsageSnapshot, UsageStats,
};
