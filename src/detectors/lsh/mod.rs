//! Banded Locality-Sensitive Hashing: the in-memory index and its on-disk
//! cache.

pub mod cache;
pub mod index;

pub use cache::{cache_dir, index_path, invalidate, load, save, CacheLock, CACHE_DIR_ENV};
pub use index::{fingerprint_for, LshIndex, LshParams};
