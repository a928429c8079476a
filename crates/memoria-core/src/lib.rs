//! # memoria-core
//!
//! The reliability-maintenance engine behind an agent-memory daemon: a
//! reflection pipeline that turns raw session transcripts into structured,
//! embedded memories and keeps that memory set trustworthy over time by
//! deduplicating, detecting contradictions, reinforcing confidence, decaying
//! unused memories, and materializing the graph of relations between them.
//!
//! This crate is transport-agnostic and has no process state of its own: no
//! networking, no HTTP, no configuration parsing. Everything it needs —
//! embeddings, LLM completions, persistence — arrives as a trait object
//! supplied by a caller (see [`embedding::Embedder`], [`llm::LlmClient`],
//! [`store::Store`]). `memoria-daemon` wires concrete implementations of each
//! to this engine and exposes it over HTTP.
//!
//! ## Layout
//!
//! - [`model`] — the persisted domain types: memories, graph edges,
//!   contradictions, entities, episodes, pending edges, reflection jobs.
//! - [`decay`] — the pure temporal-decay calculator.
//! - [`confidence`] — the pure confidence-arithmetic transitions.
//! - [`contradiction`] — the contradiction detector.
//! - [`store`] — the abstract document-store contract plus an
//!   in-memory implementation used by every test in this crate.
//! - [`embedding`] — the embedding-provider seam plus a deterministic
//!   mock.
//! - [`llm`] — the LLM-completion seam used only to enrich contradiction
//!   explanations.
//! - [`queue`] — the job queue: persists reflection jobs and exposes
//!   the atomic per-stage upsert protocol.
//! - [`pipeline`] — the ten-stage reflection pipeline and its executor.

pub mod confidence;
pub mod contradiction;
pub mod decay;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod queue;
pub mod store;

pub use error::{CoreError, Result};
pub use pipeline::{PipelineContext, PipelineExecutor};
pub use queue::JobQueue;
