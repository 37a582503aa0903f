//! Candidate normalization.
//!
//! Turns a raw model-emitted object into a fully-populated
//! [`CandidateAnnotation`]: absent or non-yes/no category values default to
//! no, the aggregate flag is recomputed from the per-category flags, and
//! optional fields get empty-string / 0.0 defaults. Downstream code never
//! sees a partially-populated candidate.

use serde_json::Value;

use crate::categories::{CategoryFlags, ALL_CATEGORIES};

use super::types::{CandidateAnnotation, Provenance, RawCandidate};

/// Coerce a model-supplied flag value to the closed yes/no domain.
/// Anything that is not recognizably "yes" is no.
fn coerce_yes(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "yes" | "y" | "true")
        }
        _ => false,
    }
}

/// Normalize one raw candidate. Idempotent over its output: normalizing a
/// candidate rebuilt from a normalized one changes nothing.
pub fn normalize(raw: &RawCandidate, provenance: Provenance) -> CandidateAnnotation {
    let mut flags = CategoryFlags::default();
    for category in ALL_CATEGORIES {
        flags.set(category, coerce_yes(raw.category_value(category)));
    }

    // The model's own aggregate claim is ignored; OR of the flags wins.
    let any_flag = flags.any();

    CandidateAnnotation {
        flags,
        any_flag,
        primary_span: raw.primary_span.clone().unwrap_or_default(),
        reference_span: raw.reference_span.clone().unwrap_or_default(),
        explanation: raw.explanation.clone().unwrap_or_default(),
        confidence: raw.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        provenance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::Category;
    use serde_json::json;

    fn raw(body: serde_json::Value) -> RawCandidate {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn yes_no_coercion() {
        let c = normalize(
            &raw(json!({
                "metaphor": "yes",
                "simile": "No",
                "personification": true,
                "idiom": "maybe",
                "hyperbole": 1,
                "metonymy": null
            })),
            Provenance::default(),
        );
        assert!(c.flags.metaphor);
        assert!(!c.flags.simile);
        assert!(c.flags.personification);
        assert!(!c.flags.idiom);
        assert!(!c.flags.hyperbole);
        assert!(!c.flags.metonymy);
        assert!(!c.flags.other);
    }

    #[test]
    fn aggregate_flag_recomputed_over_model_claim() {
        // Model claims figurative=yes with every flag no: OR of flags wins.
        let c = normalize(
            &raw(json!({"figurative": "yes", "metaphor": "no"})),
            Provenance::default(),
        );
        assert!(!c.any_flag);

        let c = normalize(
            &raw(json!({"figurative": "no", "simile": "yes"})),
            Provenance::default(),
        );
        assert!(c.any_flag);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let c = normalize(&raw(json!({})), Provenance::default());
        assert_eq!(c.primary_span, "");
        assert_eq!(c.reference_span, "");
        assert_eq!(c.explanation, "");
        assert_eq!(c.confidence, 0.0);
        assert!(!c.any_flag);
    }

    #[test]
    fn confidence_clamped() {
        let c = normalize(&raw(json!({"confidence": 1.7})), Provenance::default());
        assert_eq!(c.confidence, 1.0);
        let c = normalize(&raw(json!({"confidence": -0.3})), Provenance::default());
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn idempotent() {
        let first = normalize(
            &raw(json!({
                "metaphor": "yes",
                "primary_span": "as a lion",
                "confidence": 0.8
            })),
            Provenance {
                model: "m".into(),
                fallback_used: false,
            },
        );

        // Rebuild a raw candidate from the normalized output and re-normalize.
        let rebuilt = RawCandidate {
            metaphor: Some(json!(first.flags.get(Category::Metaphor))),
            primary_span: Some(first.primary_span.clone()),
            reference_span: Some(first.reference_span.clone()),
            explanation: Some(first.explanation.clone()),
            confidence: Some(first.confidence),
            ..Default::default()
        };
        let second = normalize(&rebuilt, first.provenance.clone());

        assert_eq!(second.flags, first.flags);
        assert_eq!(second.any_flag, first.any_flag);
        assert_eq!(second.primary_span, first.primary_span);
        assert_eq!(second.confidence, first.confidence);
    }
}
