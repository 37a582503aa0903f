//! Second-pass validation of flagged categories.
//!
//! Each category flagged on a candidate gets one independent model call with
//! a category-specific rubric. A provider failure or an unparseable reply
//! keeps the original flag: conservative-reject-on-error would silently erase
//! detections, which is the wrong direction for an audit pipeline.

use tracing::{debug, warn};

use crate::categories::Category;
use crate::gateway::{ModelInvoker, ModelRole};
use crate::prompts::compose_validation;

use super::types::{CandidateAnnotation, InputUnit, ValidationDecision, Verdict};

// =============================================================================
// Verdict parsing
// =============================================================================

/// Parsed form of a validation reply, before policy is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedVerdict {
    Valid(String),
    Invalid(String),
    Reclassified(Category, String),
    /// Reply matched none of the expected leading tokens.
    Unparseable(String),
}

/// Parse a validation reply. The expected shape is one line starting with
/// `VALID:`, `INVALID:`, or `RECLASSIFY:`; the remainder is the reason. For
/// `RECLASSIFY:` an optional leading category token is parsed against the
/// closed set, defaulting to [`Category::Other`].
pub fn parse_verdict(raw: &str, original: Category) -> ParsedVerdict {
    let trimmed = raw.trim();

    if let Some(rest) = strip_token(trimmed, "VALID:") {
        return ParsedVerdict::Valid(rest.to_string());
    }
    if let Some(rest) = strip_token(trimmed, "INVALID:") {
        return ParsedVerdict::Invalid(rest.to_string());
    }
    if let Some(rest) = strip_token(trimmed, "RECLASSIFY:") {
        let (target, reason) = parse_reclassify_tail(rest);
        if target == original {
            // Reclassifying to the same category is a confirmation.
            return ParsedVerdict::Valid(reason);
        }
        return ParsedVerdict::Reclassified(target, reason);
    }

    ParsedVerdict::Unparseable(head(trimmed, 120).to_string())
}

fn strip_token<'a>(s: &'a str, token: &str) -> Option<&'a str> {
    let prefix = s.get(..token.len())?;
    if prefix.eq_ignore_ascii_case(token) {
        Some(s[token.len()..].trim())
    } else {
        None
    }
}

/// Split "personification - attributes speech to the sea" into target and
/// reason. An unparseable category token falls back to Other with the full
/// tail preserved as the reason.
fn parse_reclassify_tail(rest: &str) -> (Category, String) {
    let token = rest
        .split(|c: char| c == '-' || c == ':' || c.is_whitespace())
        .find(|t| !t.is_empty())
        .unwrap_or("");

    match Category::parse(token) {
        Some(category) => {
            let after = rest.find(token).map(|p| p + token.len()).unwrap_or(0);
            let reason = rest[after..]
                .trim_start_matches(|c: char| c.is_whitespace() || c == '-' || c == ':')
                .trim()
                .to_string();
            (category, reason)
        }
        None => (Category::Other, rest.trim().to_string()),
    }
}

fn head(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// =============================================================================
// Validator
// =============================================================================

/// Second-pass validator driving one model call per flagged category.
pub struct Validator<'a> {
    invoker: &'a ModelInvoker,
}

impl<'a> Validator<'a> {
    pub fn new(invoker: &'a ModelInvoker) -> Self {
        Self { invoker }
    }

    /// Validate one flagged category on one candidate. Always returns a
    /// decision; errors are folded into the keep-the-flag policy.
    pub async fn validate(
        &self,
        category: Category,
        unit: &InputUnit,
        candidate: &CandidateAnnotation,
    ) -> ValidationDecision {
        let prompt = compose_validation(category, unit, candidate);
        let config = self.invoker.config().validation_config.clone();

        let reply = match self
            .invoker
            .generate(ModelRole::Primary, &prompt, &config)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!(
                    unit = %unit.id,
                    category = %category,
                    code = err.code(),
                    "validation call failed; keeping original flag"
                );
                return ValidationDecision {
                    category,
                    verdict: Verdict::Valid,
                    reason: "kept: validation call failed".to_string(),
                    error: Some(err.to_string()),
                };
            }
        };

        let decision = match parse_verdict(&reply.text, category) {
            ParsedVerdict::Valid(reason) => ValidationDecision {
                category,
                verdict: Verdict::Valid,
                reason,
                error: None,
            },
            ParsedVerdict::Invalid(reason) => ValidationDecision {
                category,
                verdict: Verdict::Invalid,
                reason,
                error: None,
            },
            ParsedVerdict::Reclassified(target, reason) => ValidationDecision {
                category,
                verdict: Verdict::Reclassified(target),
                reason,
                error: None,
            },
            ParsedVerdict::Unparseable(head) => {
                warn!(
                    unit = %unit.id,
                    category = %category,
                    reply_head = %head,
                    "unparseable validation reply; keeping original flag"
                );
                ValidationDecision {
                    category,
                    verdict: Verdict::Valid,
                    reason: format!("kept: unparseable validation reply: {head}"),
                    error: None,
                }
            }
        };

        debug!(
            unit = %unit.id,
            category = %category,
            verdict = ?decision.verdict,
            "validation decision"
        );
        decision
    }
}

// =============================================================================
// TESTS
// =============================================================================
