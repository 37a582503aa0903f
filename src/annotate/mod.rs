//! Annotation pipeline: unit in, validated records out.
//!
//! Processing is sequential, unit by unit; the only suspension points are
//! provider round-trips and backoff sleeps. Parallelizing across units is a
//! caller decision, not part of this contract. A single unit's failure never
//! aborts the run: every unit terminates in either populated records or an
//! explicit empty/error outcome.

pub mod assemble;
pub mod normalize;
pub mod types;
pub mod validate;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::gateway::{CallMetadata, ModelInvoker};

use assemble::assemble;
use types::{CandidateAnnotation, FinalRecord, InputUnit, ValidationDecision};
use validate::Validator;

// =============================================================================
// External collaborators
// =============================================================================

/// Supplies input units. The pipeline makes no assumption about how units are
/// fetched, cached, or rate-limited upstream.
#[async_trait]
pub trait UnitSource: Send {
    /// Next unit, or `None` at end of stream.
    async fn next_unit(&mut self) -> Option<InputUnit>;
}

/// Receives final annotation records. Implementations are expected to be
/// idempotent keyed by (unit id, candidate ordinal), so re-running the
/// pipeline over an already-processed unit does not duplicate records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn store(
        &self,
        unit: &InputUnit,
        ordinal: usize,
        candidate: &CandidateAnnotation,
        record: &FinalRecord,
    );
}

// =============================================================================
// Reports
// =============================================================================

/// One candidate with its validation decisions and merged record.
#[derive(Debug)]
pub struct CandidateResult {
    pub candidate: CandidateAnnotation,
    pub decisions: Vec<ValidationDecision>,
    pub record: FinalRecord,
}

/// Everything produced for one unit. An empty `candidates` with `error` set
/// means the provider gave no usable evidence; an empty `candidates` without
/// an error means the model found nothing.
#[derive(Debug)]
pub struct UnitReport {
    pub rationale: String,
    pub error: Option<String>,
    pub metadata: CallMetadata,
    pub candidates: Vec<CandidateResult>,
}

/// Totals for a whole run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub units: u64,
    pub candidates: u64,
    pub records_stored: u64,
    pub unit_errors: u64,
}

// =============================================================================
// Pipeline
// =============================================================================

/// Sequential annotation pipeline over one invoker.
pub struct Pipeline {
    invoker: ModelInvoker,
}

impl Pipeline {
    pub fn new(invoker: ModelInvoker) -> Self {
        Self { invoker }
    }

    pub fn invoker(&self) -> &ModelInvoker {
        &self.invoker
    }

    /// Annotate and validate one unit. All validation calls for a candidate
    /// complete before its record is assembled.
    pub async fn process_unit(&self, unit: &InputUnit) -> UnitReport {
        let outcome = self.invoker.invoke(unit).await;

        if let Some(err) = &outcome.error {
            warn!(unit = %unit.id, error = %err, "unit produced no evidence");
        }

        let validator = Validator::new(&self.invoker);
        let mut results = Vec::with_capacity(outcome.candidates.len());

        for candidate in outcome.candidates {
            let mut decisions = Vec::new();
            for category in candidate.flags.set_categories() {
                let decision = validator.validate(category, unit, &candidate).await;
                decisions.push(decision);
            }
            let record = assemble(&candidate, &decisions);
            debug!(
                unit = %unit.id,
                final_valid = record.final_valid,
                decisions = decisions.len(),
                "candidate assembled"
            );
            results.push(CandidateResult {
                candidate,
                decisions,
                record,
            });
        }

        UnitReport {
            rationale: outcome.rationale,
            error: outcome.error,
            metadata: outcome.metadata,
            candidates: results,
        }
    }

    /// Drain the source, storing every candidate's record. Per-unit failures
    /// are counted, logged, and skipped over; the run always completes.
    pub async fn run<S, K>(&self, source: &mut S, sink: &K) -> RunSummary
    where
        S: UnitSource,
        K: RecordSink,
    {
        let mut summary = RunSummary::default();

        while let Some(unit) = source.next_unit().await {
            summary.units += 1;
            let report = self.process_unit(&unit).await;
            if report.error.is_some() {
                summary.unit_errors += 1;
            }

            for (ordinal, result) in report.candidates.iter().enumerate() {
                sink.store(&unit, ordinal, &result.candidate, &result.record)
                    .await;
                summary.records_stored += 1;
            }
            summary.candidates += report.candidates.len() as u64;

            info!(
                unit = %unit.id,
                candidates = report.candidates.len(),
                fallback = report.metadata.fallback_used,
                "unit processed"
            );
        }

        info!(
            units = summary.units,
            records = summary.records_stored,
            errors = summary.unit_errors,
            "run complete"
        );
        summary
    }
}
