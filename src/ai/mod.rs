//! LLM-powered function evolution
//!
//! This module wraps an external text-transformation capability (an LLM
//! chat endpoint) with a content-addressed cache, a FIFO concurrency gate,
//! exponential backoff on rate limits, and output sanitization.
//!
//! # Environment Variables
//!
//! - `GROQ_API_KEY`: Required for the Groq backend (default)
//! - `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, `DEEPINFRA_API_KEY`,
//!   `OPENROUTER_API_KEY`: Required for the matching backend
//!
//! # Example
//!
//! ```rust,ignore
//! use codevolve::ai::{AiClient, AiConfig, Evolver, RetryPolicy};
//!
//! let client = AiClient::from_env_with_config(AiConfig::default())?;
//! let evolver = Evolver::new(Arc::new(client), 2, RetryPolicy::default());
//! let evolution = evolver.evolve("load", body).await?;
//! ```

mod client;
mod evolver;
mod prompts;

pub use client::{AiClient, AiConfig, LlmBackend};
pub use evolver::{
    is_balanced, is_cosmetic_change, sanitize_code, EvolveOutcome, Evolution, Evolver,
    RetryPolicy,
};
pub use prompts::PromptTemplate;

use thiserror::Error;

/// Errors that can occur in the AI module
#[derive(Error, Debug)]
pub enum AiError {
    #[error("Missing API key: {env_var} not set. Get your key at {signup_url}")]
    MissingApiKey { env_var: String, signup_url: String },

    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Transform task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AiError {
    /// Classify an HTTP error status into the retry taxonomy
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => AiError::RateLimited { message },
            401 | 403 => AiError::Unauthorized { message },
            500..=599 => AiError::Server { status, message },
            _ => AiError::ApiError { status, message },
        }
    }

    /// Only authentication failures abort a run
    pub fn is_fatal(&self) -> bool {
        matches!(self, AiError::Unauthorized { .. })
    }
}

pub type AiResult<T> = Result<T, AiError>;

/// The external rewrite capability: prompt in, raw model text out.
///
/// Implementations are blocking; the evolver runs them on the blocking pool.
pub trait TextTransform: Send + Sync {
    fn transform(&self, prompt: &str) -> AiResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_taxonomy() {
        assert!(matches!(
            AiError::from_status(429, "slow down"),
            AiError::RateLimited { .. }
        ));
        assert!(matches!(
            AiError::from_status(401, "bad key"),
            AiError::Unauthorized { .. }
        ));
        assert!(matches!(
            AiError::from_status(503, "down"),
            AiError::Server { status: 503, .. }
        ));
        assert!(matches!(
            AiError::from_status(400, "bad request"),
            AiError::ApiError { status: 400, .. }
        ));
    }

    #[test]
    fn test_only_unauthorized_is_fatal() {
        assert!(AiError::from_status(401, "").is_fatal());
        assert!(!AiError::from_status(429, "").is_fatal());
        assert!(!AiError::from_status(500, "").is_fatal());
        assert!(!AiError::ParseError("x".into()).is_fatal());
    }
}
