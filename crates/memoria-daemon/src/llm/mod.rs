//! HTTP-backed LLM client for the daemon binary.
//!
//! `memoria-core` only defines the [`memoria_core::llm::LlmClient`] seam plus
//! a null stub; this module supplies the real network-facing implementation
//! wired in when an `LLM_ENDPOINT` is configured.

mod http_client;

pub use http_client::HttpLlmClient;
