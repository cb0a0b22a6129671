//! # docqa
//!
//! **Answer questions from a private document corpus.**
//!
//! docqa chunks a directory of text documents, embeds the chunks into a
//! persistent vector index, and answers questions by retrieving the most
//! similar chunks and asking a language model to answer from them alone.
//! When the corpus does not hold the answer, the model is instructed to
//! reply with a fixed refusal.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Corpus  │──▶│  Ingestion   │──▶│ Vector index │
//! │  *.txt   │   │ Chunk+Embed  │   │   (SQLite)   │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │
//!                  ┌───────────────────────┤
//!                  ▼                       ▼
//!            ┌──────────┐           ┌────────────┐
//!            │   CLI    │           │    HTTP    │
//!            │ (docqa)  │           │ /ask       │
//!            └──────────┘           │ /upload    │
//!                                   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`corpus`] | Corpus directory scanning, text decoding, filename sanitizing |
//! | [`embedding`] | Embedding backends: OpenAI, Ollama, fastembed |
//! | [`synthesis`] | Synthesis backends: Ollama, OpenAI chat completions |
//! | [`service`] | Retrying HTTP client and timeouts shared by the backends |
//! | [`ingest`] | Ingestion pipeline: chunk → embed → insert |
//! | [`query`] | Query pipeline: embed → retrieve → prompt → synthesize |
//! | [`engine`] | Index lifecycle and pipeline ownership |
//! | [`server`] | HTTP server (Axum) with CORS |
//! | [`sqlite_store`] | SQLite persistence for the vector index |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Index schema (idempotent) |

pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod ingest;
pub mod migrate;
pub mod query;
pub mod server;
pub mod service;
pub mod sqlite_store;
pub mod synthesis;

pub use engine::Engine;
