//! Gemini-style adapter for text generation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, ProviderError};
use super::types::{GenerationConfig, ModelReply};

// =============================================================================
// TRAIT
// =============================================================================

/// Trait for text generation providers.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<ModelReply, ProviderError>;

    /// Model identifier recorded in candidate provenance.
    fn model_id(&self) -> &str;
}

// =============================================================================
// SIGNAL MAP
// =============================================================================

/// Mapping from provider-specific signals to the closed error taxonomy.
///
/// This is configuration, not logic: swapping providers means supplying a
/// different map, and nothing downstream ever sees the provider's own codes.
/// Defaults cover a Gemini-style API.
#[derive(Debug, Clone)]
pub struct SignalMap {
    /// Prompt-feedback block reasons treated as content restrictions.
    pub block_reasons: Vec<String>,
    /// Candidate finish reasons treated as content restrictions.
    pub finish_restrictions: Vec<String>,
    /// HTTP statuses treated as rate limiting.
    pub rate_limit_statuses: Vec<u16>,
    /// HTTP statuses treated as transient provider failures.
    pub retryable_statuses: Vec<u16>,
}

impl Default for SignalMap {
    fn default() -> Self {
        Self {
            block_reasons: vec![
                "SAFETY".into(),
                "BLOCKLIST".into(),
                "PROHIBITED_CONTENT".into(),
                "OTHER".into(),
            ],
            finish_restrictions: vec![
                "SAFETY".into(),
                "RECITATION".into(),
                "BLOCKLIST".into(),
                "PROHIBITED_CONTENT".into(),
                "SPII".into(),
            ],
            rate_limit_statuses: vec![429],
            retryable_statuses: vec![500, 502, 503, 504],
        }
    }
}

impl SignalMap {
    fn is_block_reason(&self, code: &str) -> bool {
        self.block_reasons.iter().any(|c| c == code)
    }

    fn is_finish_restriction(&self, code: &str) -> bool {
        self.finish_restrictions.iter().any(|c| c == code)
    }
}

// =============================================================================
// ADAPTER
// =============================================================================

/// Maximum allowed response content length (1MB).
const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Maximum allowed prompt length in characters.
const MAX_INPUT_CHARS: usize = 500_000;

/// Adapter for a Generative Language-style `generateContent` API.
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    client: reqwest::Client,
    base_url: String,
    model: String,
    signals: SignalMap,
}

impl GeminiAdapter {
    /// Create from API key and model id.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_config(
            api_key,
            model,
            "https://generativelanguage.googleapis.com/v1beta",
            Duration::from_secs(120),
            SignalMap::default(),
        )
    }

    /// Create from environment variables.
    pub fn from_env(model: impl Into<String>) -> Result<Self, ProviderError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| ProviderError::config("GEMINI_API_KEY not set"))?;

        let base_url = std::env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());

        let timeout = std::env::var("GEMINI_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(120));

        Self::with_config(api_key, model, base_url, timeout, SignalMap::default())
    }

    /// Create with custom configuration.
    pub fn with_config(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        signals: SignalMap,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let key_value = HeaderValue::from_str(&api_key)
            .map_err(|_| ProviderError::config("Invalid API key format"))?;
        headers.insert("x-goog-api-key", key_value);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            signals,
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Check if message text reads as a refusal despite a clean finish code.
    fn is_refusal(msg: &str) -> bool {
        let l = msg.trim_start().to_lowercase();
        let first_line = l.lines().next().unwrap_or("");

        const PREFIXES: &[&str] = &[
            "refus",
            "i cannot",
            "i can't",
            "i won't",
            "i will not",
            "i am unable to",
            "i'm unable to",
            "unable to comply",
            "unable to assist",
        ];

        PREFIXES.iter().any(|p| first_line.starts_with(p))
    }

    /// Parse a RetryInfo duration like "30s" or "2.5s".
    fn parse_retry_delay(s: &str) -> Option<Duration> {
        let secs: f64 = s.trim().strip_suffix('s')?.parse().ok()?;
        if secs.is_finite() && secs >= 0.0 {
            Some(Duration::from_secs_f64(secs))
        } else {
            None
        }
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct GenerateApiRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(rename = "generationConfig")]
    generation_config: ApiGenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct ApiGenerationConfig {
    temperature: f32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

impl From<&GenerationConfig> for ApiGenerationConfig {
    fn from(c: &GenerationConfig) -> Self {
        Self {
            temperature: c.temperature,
            top_p: c.top_p,
            top_k: c.top_k,
            max_output_tokens: c.max_output_tokens,
        }
    }
}

#[derive(Deserialize)]
struct GenerateApiResponse {
    candidates: Option<Vec<ApiCandidate>>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiCandidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u32>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "retryDelay")]
    retry_delay: Option<String>,
}

// =============================================================================
// TEXT MODEL IMPL
// =============================================================================

#[async_trait]
impl TextModel for GeminiAdapter {
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<ModelReply, ProviderError> {
        if prompt.len() > MAX_INPUT_CHARS {
            return Err(ProviderError::malformed(format!(
                "Prompt too large: {} chars (max {MAX_INPUT_CHARS})",
                prompt.len()
            )));
        }

        let api_req = GenerateApiRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
            generation_config: config.into(),
        };

        let mut response = self
            .client
            .post(self.generate_url())
            .json(&api_req)
            .send()
            .await?;

        let status = response.status();

        // Stream response to enforce size limit
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let new_len = bytes.len() + chunk.len();
            if new_len > MAX_RESPONSE_LEN {
                return Err(ProviderError::provider(
                    "gemini",
                    format!("Response too large: {new_len} bytes"),
                    false,
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        let body = String::from_utf8_lossy(&bytes).to_string();
        let ctx = ErrorContext::new().with_status(status.as_u16());

        if !status.is_success() {
            let parsed_error = serde_json::from_str::<GenerateApiResponse>(&body)
                .ok()
                .and_then(|r| r.error);
            let (message, code, retry_delay) = match parsed_error {
                Some(e) => (
                    e.message.unwrap_or_default(),
                    e.status,
                    e.details.iter().find_map(|d| {
                        d.retry_delay.as_deref().and_then(Self::parse_retry_delay)
                    }),
                ),
                None => (format!("HTTP {}", status.as_u16()), None, None),
            };
            let ctx = match code {
                Some(c) => ctx.with_code(c),
                None => ctx,
            };

            if self.signals.rate_limit_statuses.contains(&status.as_u16()) {
                return Err(ProviderError::rate_limited(retry_delay, ctx));
            }
            return Err(ProviderError::provider_with_context(
                "gemini",
                message,
                self.signals.retryable_statuses.contains(&status.as_u16()),
                ctx,
            ));
        }

        let parsed: GenerateApiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::malformed(format!("Invalid JSON body: {e}")))?;

        if let Some(error) = parsed.error {
            return Err(ProviderError::provider(
                "gemini",
                error.message.unwrap_or_default(),
                false,
            ));
        }

        // Prompt-level block: no content was generated at all.
        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            if self.signals.is_block_reason(&reason) {
                return Err(ProviderError::restricted_with_context(
                    reason.clone(),
                    ctx.with_code(reason),
                ));
            }
        }

        let candidate = parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| ProviderError::malformed("No candidates in response"))?;

        // Candidate-level block: generation was cut off on policy grounds.
        if let Some(reason) = candidate.finish_reason.as_deref() {
            if self.signals.is_finish_restriction(reason) {
                return Err(ProviderError::restricted_with_context(
                    reason.to_string(),
                    ctx.with_code(reason),
                ));
            }
        }

        let mut text = candidate
            .content
            .and_then(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ProviderError::malformed("Empty response text"));
        }
        if text.len() > MAX_RESPONSE_LEN {
            text.truncate(MAX_RESPONSE_LEN);
        }
        if Self::is_refusal(&text) {
            return Err(ProviderError::restricted(text));
        }

        let usage = parsed.usage_metadata;
        let input_tokens = usage
            .as_ref()
            .and_then(|u| u.prompt_token_count)
            .unwrap_or(0);
        let output_tokens = usage
            .as_ref()
            .and_then(|u| u.candidates_token_count)
            .unwrap_or(0);

        Ok(ModelReply {
            text,
            input_tokens,
            output_tokens,
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
