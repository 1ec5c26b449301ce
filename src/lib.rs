//! # docrag
//!
//! Retrieval-augmented question answering over a document collection.
//!
//! docrag loads documents (Markdown, text, PDF, DOCX, PPTX, XLSX, local or
//! fetched over HTTP), splits them into chunks that keep their page and
//! heading provenance, embeds the chunks into a SQLite-backed vector store,
//! and answers questions by retrieving the most similar chunks and handing
//! them to a generative model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────────┐
//! │  Loader  │──▶│ Splitter │──▶│  Indexer  │──▶│ Vector store │
//! │ file/URI │   │  chunks  │   │ embed + D │   │   (SQLite)   │
//! └──────────┘   └──────────┘   └───────────┘   └──────┬───────┘
//!                                                      │
//!                                 ┌────────────────────┘
//!                                 ▼
//!                          ┌──────────────┐   ┌────────────┐
//!                          │ Query engine │──▶│ Generation │
//!                          │   top-k      │   │  provider  │
//!                          └──────────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docrag ingest ./docs/atlas.pdf        # load, split, embed, index
//! docrag query "What is the capital of France?"
//! docrag stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error kinds |
//! | [`loader`] | Source resolution and conversion |
//! | [`extract`] | Binary format text extraction |
//! | [`structure`] | Page and block layout analysis |
//! | [`chunk`] | Lossless chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector stores (in-memory, SQLite) |
//! | [`indexer`] | Dimension probe and index build |
//! | [`prompt`] | Prompt templates |
//! | [`generation`] | Generative model providers |
//! | [`query`] | Retrieval and answer generation |
//! | [`pipeline`] | CLI command wiring |
//! | [`stats`] | Store statistics |
//! | [`db`] | Database connection |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod indexer;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod query;
pub mod stats;
pub mod store;
pub mod structure;
