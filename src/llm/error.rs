use thiserror::Error;

use super::prompts::PromptError;
use crate::budget::BudgetError;

/// Failure issuing a completion request. Fatal to the chunk, never to the run.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("failed to send request to completion API: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse completion API response: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("no message content in completion response")]
    EmptyResponse,

    #[error("failed to render prompt: {0}")]
    Prompt(#[from] PromptError),

    #[error("rate budget unavailable: {0}")]
    Budget(#[from] BudgetError),
}

/// Startup configuration problems; these abort the process before any chunk is read
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the environment variable {0} is not set, please check your environment file")]
    MissingEnv(&'static str),

    #[error("invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to load tokenizer for model {model}: {reason}")]
    Tokenizer { model: String, reason: String },
}
