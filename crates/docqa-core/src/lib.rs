//! # docqa core
//!
//! Storage-agnostic logic for docqa: data models, chunking, the vector
//! index and its store abstraction, retrieval, prompt construction, and
//! the embedding and synthesis service traits.
//!
//! This crate does no network, filesystem, or database I/O. Concrete
//! services and the SQLite store live in the `docqa` app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod synthesis;

pub use error::{RagError, Result};
