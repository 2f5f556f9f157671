//! examforge-core: Exam generation, answer verification, and scoring.
//!
//! This crate defines the data model, the service traits, and the engine
//! that turns a free-text completion into an exam attempt and grades it.

pub mod engine;
pub mod error;
pub mod feedback;
pub mod mathquery;
pub mod model;
pub mod parser;
pub mod prompt;
pub mod report;
pub mod scoring;
pub mod session;
pub mod traits;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;
