//! HTTP-backed embedding providers for the daemon binary.
//!
//! `memoria-core` only defines the [`memoria_core::embedding::Embedder`] seam
//! plus a deterministic mock; this module supplies the real network-facing
//! implementation the daemon wires in when a Voyage API key is configured.

mod voyage;

pub use voyage::VoyageEmbedder;
