//! Reading Copilot Server Library
//!
//! PDF annotation service with relevance-scored auto-highlighting. The
//! binary in main.rs serves these modules over HTTP; integration tests and
//! benches drive them directly.
//!
//! # Modules
//!
//! - `extraction`: page-bounded text lines from PDFs via MuPDF, cached per document
//! - `chunker`: groups lines into paragraph-like chunks
//! - `scorer`: relevance scoring contract and the Azure OpenAI client
//! - `selector`: threshold and word-budget selection of scored chunks
//! - `engine`: the auto-highlight run state machine
//! - `registry`: active and recently finished runs

pub mod annotations;
pub mod chunker;
pub mod config;
pub mod documents;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod registry;
pub mod routes;
pub mod scorer;
pub mod selector;
pub mod state;
