//! Core types for the model gateway.

use serde::Serialize;

/// Which configured model a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Primary,
    Secondary,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Primary => "primary",
            ModelRole::Secondary => "secondary",
        }
    }
}

/// Sampling configuration for one generation call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl GenerationConfig {
    /// Conservative settings for first-pass annotation.
    pub fn annotation() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 4096,
        }
    }

    /// Tighter settings for the fallback model after a restriction.
    pub fn fallback() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.9,
            top_k: 20,
            max_output_tokens: 2048,
        }
    }

    /// Low-randomness settings for second-pass validation calls.
    pub fn validation() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.9,
            top_k: 20,
            max_output_tokens: 512,
        }
    }
}

/// Successful output of one generation call.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    /// Raw response text, exactly as the provider returned it.
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}
