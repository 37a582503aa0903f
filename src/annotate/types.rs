//! Core value types for the annotation pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::categories::{Category, CategoryFlags};

// =============================================================================
// INPUT
// =============================================================================

/// Opaque tag describing the class of an input unit.
///
/// The pipeline never interprets the tag beyond using it to select a prompt
/// template; whatever taxonomy the source provider uses passes through
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextTag(pub String);

impl ContextTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One text unit to annotate. Immutable; created by the source provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputUnit {
    /// Unit identifier, opaque to the pipeline (e.g. "GEN.1.2").
    pub id: String,
    /// Primary text to annotate.
    pub primary_text: String,
    /// Optional secondary/reference rendering of the same unit.
    pub reference_text: Option<String>,
    /// Selects the prompting strategy; nothing else.
    pub context_tag: ContextTag,
}

impl InputUnit {
    pub fn new(
        id: impl Into<String>,
        primary_text: impl Into<String>,
        context_tag: ContextTag,
    ) -> Self {
        Self {
            id: id.into(),
            primary_text: primary_text.into(),
            reference_text: None,
            context_tag,
        }
    }

    pub fn with_reference(mut self, text: impl Into<String>) -> Self {
        self.reference_text = Some(text.into());
        self
    }
}

// =============================================================================
// RAW CANDIDATE (serde view of model output)
// =============================================================================

/// One candidate object as the model emitted it.
///
/// Every field is optional: providers omit, misspell, and re-type fields
/// freely. Unknown keys are dropped by serde. The normalizer turns this into
/// a fully-populated [`CandidateAnnotation`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCandidate {
    #[serde(default)]
    pub metaphor: Option<Value>,
    #[serde(default)]
    pub simile: Option<Value>,
    #[serde(default)]
    pub personification: Option<Value>,
    #[serde(default)]
    pub idiom: Option<Value>,
    #[serde(default)]
    pub hyperbole: Option<Value>,
    #[serde(default)]
    pub metonymy: Option<Value>,
    #[serde(default)]
    pub other: Option<Value>,
    /// Aggregate flag as claimed by the model; recomputed by the normalizer.
    #[serde(default)]
    pub figurative: Option<Value>,
    #[serde(default)]
    pub primary_span: Option<String>,
    #[serde(default)]
    pub reference_span: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl RawCandidate {
    pub fn category_value(&self, category: Category) -> Option<&Value> {
        match category {
            Category::Metaphor => self.metaphor.as_ref(),
            Category::Simile => self.simile.as_ref(),
            Category::Personification => self.personification.as_ref(),
            Category::Idiom => self.idiom.as_ref(),
            Category::Hyperbole => self.hyperbole.as_ref(),
            Category::Metonymy => self.metonymy.as_ref(),
            Category::Other => self.other.as_ref(),
        }
    }
}

// =============================================================================
// NORMALIZED CANDIDATE
// =============================================================================

/// Which model produced a candidate and whether the fallback path was taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub model: String,
    pub fallback_used: bool,
}

/// A fully-populated detected instance, immutable after normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateAnnotation {
    pub flags: CategoryFlags,
    /// OR over category flags; always consistent with `flags`.
    pub any_flag: bool,
    pub primary_span: String,
    pub reference_span: String,
    pub explanation: String,
    /// Clamped to [0, 1].
    pub confidence: f64,
    pub provenance: Provenance,
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Terminal outcome of second-pass validation for one flagged category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Valid,
    Invalid,
    /// The instance is real but belongs to a different category.
    Reclassified(Category),
}

/// One decision per originally-flagged category per candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationDecision {
    pub category: Category,
    pub verdict: Verdict,
    pub reason: String,
    /// Provider error encountered while validating, if any. A decision with
    /// an error always carries `Verdict::Valid`: evidence is kept, not
    /// silently erased.
    pub error: Option<String>,
}

// =============================================================================
// FINAL RECORD
// =============================================================================

/// Validated flags for one candidate, written once to the record sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalRecord {
    pub flags: CategoryFlags,
    /// OR over final flags.
    pub final_valid: bool,
    /// Joined provider errors from validation, for audit.
    pub validation_error: Option<String>,
}
