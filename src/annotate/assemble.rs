//! Result assembly: pure merge of a candidate and its validation decisions.

use crate::categories::CategoryFlags;

use super::types::{CandidateAnnotation, FinalRecord, ValidationDecision, Verdict};

/// Merge validation decisions into a final record.
///
/// A final flag is true iff a VALID decision exists for that category or a
/// RECLASSIFIED decision targets it; `final_valid` is the OR of final flags.
/// Decisions carrying provider errors contribute their error text to
/// `validation_error` for audit.
pub fn assemble(_candidate: &CandidateAnnotation, decisions: &[ValidationDecision]) -> FinalRecord {
    let mut flags = CategoryFlags::default();
    let mut errors: Vec<String> = Vec::new();

    for decision in decisions {
        match decision.verdict {
            Verdict::Valid => flags.set(decision.category, true),
            Verdict::Invalid => {}
            Verdict::Reclassified(target) => flags.set(target, true),
        }
        if let Some(err) = &decision.error {
            errors.push(format!("{}: {}", decision.category, err));
        }
    }

    FinalRecord {
        flags,
        final_valid: flags.any(),
        validation_error: if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        },
    }
}
