//! examforge-providers: service integrations.
//!
//! Implements the `CompletionService` trait for OpenAI-compatible and
//! Anthropic APIs and the `MathService` trait for the Wolfram|Alpha query
//! API, plus configuration loading and in-memory doubles for tests.

pub mod anthropic;
pub mod config;
mod http;
pub mod mock;
pub mod openai;
pub mod wolfram;

pub use config::{
    create_completion_service, create_math_service, load_config, load_config_from,
    ExamforgeConfig, MathConfig, ProviderConfig,
};
