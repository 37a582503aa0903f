//! Prompt composition for annotation and validation calls.
//!
//! Pure rendering, no I/O. Annotation templates are selected by the unit's
//! context tag; validation rubrics are selected by category. Unit texts are
//! interpolated verbatim.

use crate::annotate::types::{CandidateAnnotation, InputUnit};
use crate::categories::Category;

// =============================================================================
// Annotation templates
// =============================================================================

/// An annotation prompt template with placeholders.
#[derive(Debug, Clone, Copy)]
pub struct AnnotationTemplate {
    /// Context tags this template serves.
    pub tags: &'static [&'static str],
    pub body: &'static str,
}

const OUTPUT_CONTRACT: &str = r#"First give a short free-text rationale. Then, after a line containing only `---`, output a JSON array of detected instances. Each object must carry "yes"/"no" values for the keys metaphor, simile, personification, idiom, hyperbole, metonymy, other, plus "figurative" (yes if any type applies), "primary_span", "reference_span", "explanation", and "confidence" (0.0-1.0). Output `[]` after the separator if nothing qualifies."#;

/// Permissive default rubric, suited to poetic material where figurative
/// language is the norm.
pub const TEMPLATE_DEFAULT: AnnotationTemplate = AnnotationTemplate {
    tags: &["default", "poetry", "prophecy", "wisdom"],
    body: r#"You are an expert in biblical figurative language. Identify every instance of figurative language in the verse below. Consider metaphor, simile, personification, idiom, hyperbole, and metonymy; use "other" for clearly figurative language outside those types. When in doubt about a borderline instance, include it with a lower confidence rather than omitting it.

Primary text:
{primary_text}

Reference text:
{reference_text}

{output_contract}"#,
};

/// Conservative rubric for material where figurative readings are rare and
/// over-detection is the dominant failure mode.
pub const TEMPLATE_CONSERVATIVE: AnnotationTemplate = AnnotationTemplate {
    tags: &["narrative", "law", "genealogy"],
    body: r#"You are an expert in biblical figurative language. The verse below comes from prose where most language is literal. Identify only instances you are confident are figurative: metaphor, simile, personification, idiom, hyperbole, or metonymy ("other" for clearly figurative language outside those types). Do not flag conventional idioms of the source language that function literally, standard anthropomorphic idioms for God, or ordinary narrative description. Omit borderline cases.

Primary text:
{primary_text}

Reference text:
{reference_text}

{output_contract}"#,
};

pub const ANNOTATION_TEMPLATES: &[AnnotationTemplate] =
    &[TEMPLATE_DEFAULT, TEMPLATE_CONSERVATIVE];

/// Look up the template registered for a context tag, falling back to the
/// permissive default.
pub fn template_for_tag(tag: &str) -> AnnotationTemplate {
    let tag = tag.to_ascii_lowercase();
    ANNOTATION_TEMPLATES
        .iter()
        .find(|t| t.tags.contains(&tag.as_str()))
        .copied()
        .unwrap_or(TEMPLATE_DEFAULT)
}

/// Compose the annotation prompt for a unit. Pure and total.
pub fn compose_annotation(unit: &InputUnit) -> String {
    let template = template_for_tag(unit.context_tag.as_str());
    template
        .body
        .replace("{primary_text}", &unit.primary_text)
        .replace(
            "{reference_text}",
            unit.reference_text.as_deref().unwrap_or("(none)"),
        )
        .replace("{output_contract}", OUTPUT_CONTRACT)
}

// =============================================================================
// Validation rubrics
// =============================================================================

/// Acceptance criteria for one category, rendered into the validation prompt.
fn rubric(category: Category) -> &'static str {
    match category {
        Category::Metaphor => {
            "Accept only if one domain is described in terms of another, distinct domain \
             without a comparison word. Reject plain descriptions, and reject explicit \
             comparisons using like/as (those are similes)."
        }
        Category::Simile => {
            "Accept only if there is an explicit comparison marker (like, as, or the \
             source-language equivalent) between two distinct things. Reject implicit \
             comparisons (those are metaphors)."
        }
        Category::Personification => {
            "Accept only if a human trait, action, or faculty is attributed to something \
             non-human (an object, animal, place, or abstraction). Reject descriptions of \
             humans and reject divine action described without human-specific traits."
        }
        Category::Idiom => {
            "Accept only if the expression is a fixed phrase whose meaning is not \
             derivable from its parts. Reject free combinations that merely sound \
             formulaic."
        }
        Category::Hyperbole => {
            "Accept only if there is deliberate overstatement not meant literally. \
             Reject large-but-literal quantities and merism."
        }
        Category::Metonymy => {
            "Accept only if one thing stands for another via close association \
             (container for contents, instrument for agent, place for people). Reject \
             substitutions based on resemblance (those are metaphors)."
        }
        Category::Other => {
            "Accept only if the span is clearly figurative yet fits none of: metaphor, \
             simile, personification, idiom, hyperbole, metonymy."
        }
    }
}

/// Compose the second-pass validation prompt for one flagged category.
pub fn compose_validation(
    category: Category,
    unit: &InputUnit,
    candidate: &CandidateAnnotation,
) -> String {
    format!(
        "You are re-checking a single figurative-language annotation.\n\n\
         Primary text:\n{primary}\n\n\
         Reference text:\n{reference}\n\n\
         Claimed category: {category}\n\
         Claimed span: {span}\n\
         Annotator's explanation: {explanation}\n\n\
         Acceptance criteria for {category}: {rubric}\n\n\
         Reply with exactly one line starting with one of:\n\
         VALID: <reason> if the span meets the criteria for {category}\n\
         INVALID: <reason> if the span is not figurative, or fails the criteria\n\
         RECLASSIFY: <category> - <reason> if figurative but a different category \
         (one of metaphor, simile, personification, idiom, hyperbole, metonymy, other)",
        primary = unit.primary_text,
        reference = unit.reference_text.as_deref().unwrap_or("(none)"),
        category = category,
        span = candidate.primary_span,
        explanation = candidate.explanation,
        rubric = rubric(category),
    )
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::types::{ContextTag, Provenance};
    use crate::categories::CategoryFlags;

    fn unit(tag: &str) -> InputUnit {
        InputUnit::new("GEN.1.2", "darkness was over the deep", ContextTag::new(tag))
            .with_reference("וְחֹשֶׁךְ עַל־פְּנֵי תְהוֹם")
    }

    #[test]
    fn tag_selects_template() {
        assert_eq!(
            template_for_tag("narrative").tags,
            TEMPLATE_CONSERVATIVE.tags
        );
        assert_eq!(template_for_tag("poetry").tags, TEMPLATE_DEFAULT.tags);
        // Unknown tags fall back to the default.
        assert_eq!(template_for_tag("apocalyptic").tags, TEMPLATE_DEFAULT.tags);
    }

    #[test]
    fn annotation_interpolates_texts() {
        let p = compose_annotation(&unit("poetry"));
        assert!(p.contains("darkness was over the deep"));
        assert!(p.contains("תְהוֹם"));
        assert!(p.contains("JSON array"));
        assert!(!p.contains("{primary_text}"));
    }

    #[test]
    fn annotation_without_reference() {
        let u = InputUnit::new("x", "text", ContextTag::new("poetry"));
        let p = compose_annotation(&u);
        assert!(p.contains("(none)"));
    }

    #[test]
    fn conservative_template_is_stricter() {
        let p = compose_annotation(&unit("law"));
        assert!(p.contains("Omit borderline cases"));
    }

    #[test]
    fn validation_prompt_carries_rubric_and_claim() {
        let candidate = CandidateAnnotation {
            flags: CategoryFlags::default(),
            any_flag: false,
            primary_span: "over the deep".into(),
            reference_span: String::new(),
            explanation: "depth imagery".into(),
            confidence: 0.8,
            provenance: Provenance::default(),
        };
        let p = compose_validation(Category::Metaphor, &unit("poetry"), &candidate);
        assert!(p.contains("Claimed category: metaphor"));
        assert!(p.contains("over the deep"));
        assert!(p.contains("comparison word"));
        assert!(p.contains("RECLASSIFY:"));
    }
}
