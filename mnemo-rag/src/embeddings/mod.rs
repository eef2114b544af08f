//! Embedding providers
//!
//! `HttpEmbeddingClient` is the production path: an OpenAI-compatible HTTP
//! endpoint with batching, retries, and dimension validation.
//! `DeterministicEmbedder` backs tests and in-memory development setups.

pub mod client;
pub mod deterministic;

pub use client::{EmbeddingClientConfig, HttpEmbeddingClient};
pub use deterministic::DeterministicEmbedder;
