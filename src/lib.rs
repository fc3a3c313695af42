//! # resembl
//!
//! Local similarity search over a corpus of assembly-language snippets.
//! Given a query snippet, resembl returns the most similar stored snippets
//! ranked by a composite score, and can compare two stored snippets in
//! detail, including approximate control-flow similarity.
//!
//! The pipeline: an architecture-aware tokenizer canonicalizes the code,
//! weighted n-gram shingling feeds a MinHash fingerprint, and a banded LSH
//! index (cached on disk) retrieves candidates in sub-linear time. Snippets
//! are content-addressed by the SHA-256 of their normalized form, with
//! alias, tag, collection, and version side-tables in SQLite.
//!
//! ```no_run
//! use resembl::core::config::ResemblConfig;
//! use resembl::core::engine::ResemblEngine;
//! use resembl::storage::SqliteStore;
//!
//! fn main() -> resembl::Result<()> {
//!     let store = SqliteStore::open(std::path::Path::new("assembly.db"))?;
//!     let mut engine = ResemblEngine::new(
//!         store,
//!         ResemblConfig::default(),
//!         std::env::temp_dir().join("resembl-cache"),
//!     )?;
//!
//!     engine.add("memcpy_inner", "rep movsb\nret")?;
//!     let matches = engine.find("rep movsb\nret", 5, 0.5, true)?;
//!     println!("{} matches", matches.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

// Core engine modules
pub mod core {
    //! Configuration, errors, scoring, and the search orchestrator.

    pub mod config;
    pub mod engine;
    pub mod errors;
    pub mod scoring;
}

// Assembly-language processing
pub mod lang {
    //! Tokenization, normalization, and control-flow extraction.

    pub mod cfg;
    pub mod registers;
    pub mod tokenizer;
}

// Similarity detection
pub mod detectors {
    //! MinHash fingerprinting and the banded LSH index.

    pub mod lsh;
    pub mod minhash;
}

// Persistence
pub mod storage;

// Re-export primary types for convenience
pub use crate::core::config::ResemblConfig;
pub use crate::core::engine::{CancelFlag, ResemblEngine, SnippetMatch};
pub use crate::core::errors::{ResemblError, Result};
pub use crate::storage::{Snippet, SnippetStore, SqliteStore};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
