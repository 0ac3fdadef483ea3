#![deny(missing_docs)]

//! Core library for the Rusty RAG document indexing and retrieval tooling.

/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Index and query metrics helpers.
pub mod metrics;
/// Chunking, corpus building, and index management.
pub mod processing;
/// Search service integration.
pub mod search;
