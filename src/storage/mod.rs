//! Storage model: content-addressed snippets with alias, tag, collection,
//! and version side-tables, behind an abstract store trait.

pub mod schema;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::errors::Result;

pub use sqlite::SqliteStore;

/// Environment variable selecting the storage backend path.
pub const DATABASE_ENV: &str = "RESEMBL_DATABASE";

/// Default on-disk database file.
pub const DEFAULT_DATABASE: &str = "assembly.db";

/// One stored assembly snippet. Identity is the SHA-256 of the normalized
/// code; the raw code is preserved verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct Snippet {
    /// Hex SHA-256 of the normalized code; primary key
    pub checksum: String,
    /// Original assembly text, verbatim
    pub code: String,
    /// Ordered alias set; never empty, insertion order preserved
    pub names: Vec<String>,
    /// Unordered label set
    pub tags: Vec<String>,
    /// Optional owning collection, by name
    pub collection: Option<String>,
    /// Serialized MinHash signature
    #[serde(skip)]
    pub minhash: Vec<u8>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Snippet {
    /// The first alias, used as the snippet's display name.
    pub fn primary_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or("")
    }
}

/// A named grouping of snippets.
#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    /// Collection name; primary key
    pub name: String,
    /// Free-text description
    pub description: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// One entry in the append-only name-rebinding log.
#[derive(Debug, Clone, Serialize)]
pub struct SnippetVersion {
    /// Auto-assigned log id
    pub id: i64,
    /// The alias that was re-bound
    pub name: String,
    /// The checksum the name now points to
    pub checksum: String,
    /// The code at that checksum
    pub code: String,
    /// The signature at that checksum
    #[serde(skip)]
    pub minhash: Vec<u8>,
    /// When the rebinding happened
    pub created_at: DateTime<Utc>,
}

/// Result of an upsert: a fresh row, or a new alias on an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row matched the checksum; a new snippet was inserted
    Created,
    /// A row existed; the name was added to its alias set (idempotently)
    Aliased,
}

/// Abstract transactional snippet store.
///
/// Implementations provide per-operation ACID semantics; the orchestrator
/// never sees a half-applied mutation. `for_each_snippet` iterates lazily in
/// checksum order and is restartable by calling it again.
pub trait SnippetStore {
    /// Insert a snippet, or add `initial_name` as an alias when the
    /// checksum already exists.
    fn upsert_snippet(
        &mut self,
        checksum: &str,
        code: &str,
        minhash: &[u8],
        initial_name: &str,
    ) -> Result<UpsertOutcome>;

    /// Point lookup by full checksum.
    fn get_by_checksum(&self, checksum: &str) -> Result<Snippet>;

    /// Prefix lookup; succeeds only when exactly one row matches.
    fn get_by_checksum_prefix(&self, prefix: &str) -> Result<Snippet>;

    /// The snippet carrying `name` as an alias, if any.
    fn get_by_name(&self, name: &str) -> Result<Option<Snippet>>;

    /// Snippets where any alias contains `pattern`, case-insensitively.
    fn search_by_name(&self, pattern: &str) -> Result<Vec<Snippet>>;

    /// Add an alias. Fails with `AlreadyExists` when the name is taken,
    /// on this snippet or another.
    fn add_name(&mut self, checksum: &str, name: &str) -> Result<Snippet>;

    /// Remove an alias. Fails with `EmptyAliasSet` when it is the last one.
    fn remove_name(&mut self, checksum: &str, name: &str) -> Result<Snippet>;

    /// Add a tag; idempotent.
    fn add_tag(&mut self, checksum: &str, tag: &str) -> Result<Snippet>;

    /// Remove a tag; idempotent.
    fn remove_tag(&mut self, checksum: &str, tag: &str) -> Result<Snippet>;

    /// Assign or clear a snippet's collection.
    fn set_collection(&mut self, checksum: &str, collection: Option<&str>) -> Result<Snippet>;

    /// Create a collection.
    fn create_collection(&mut self, name: &str, description: &str) -> Result<Collection>;

    /// Delete a collection, nulling `collection` on its members. The
    /// snippets themselves survive.
    fn delete_collection(&mut self, name: &str) -> Result<()>;

    /// All collections with their member counts.
    fn collections(&self) -> Result<Vec<(Collection, usize)>>;

    /// Members of one collection.
    fn snippets_in_collection(&self, name: &str) -> Result<Vec<Snippet>>;

    /// Append a rebinding entry to the version log.
    fn append_version(&mut self, name: &str, checksum: &str, code: &str, minhash: &[u8])
        -> Result<i64>;

    /// The checksum the version log most recently recorded for `name`.
    fn latest_version_binding(&self, name: &str) -> Result<Option<String>>;

    /// Full version history for a name, oldest first.
    fn versions_for_name(&self, name: &str) -> Result<Vec<SnippetVersion>>;

    /// Delete a snippet outright.
    fn delete_snippet(&mut self, checksum: &str) -> Result<()>;

    /// Replace a snippet's stored signature (used by reindex).
    fn update_minhash(&mut self, checksum: &str, minhash: &[u8]) -> Result<()>;

    /// Visit every snippet in ascending checksum order.
    fn for_each_snippet(&self, f: &mut dyn FnMut(Snippet) -> Result<()>) -> Result<()>;

    /// All checksums, sorted ascending.
    fn all_checksums(&self) -> Result<Vec<String>>;

    /// Number of stored snippets.
    fn count(&self) -> Result<usize>;

    /// List snippets by checksum order, with an optional `[start, end)`
    /// window (`end == 0` means unbounded).
    fn list(&self, start: usize, end: usize) -> Result<Vec<Snippet>>;

    /// Reclaim storage space.
    fn vacuum(&mut self) -> Result<()>;

    /// Read a store-level metadata value.
    fn get_meta(&self, key: &str) -> Result<Option<String>>;

    /// Upsert a store-level metadata value.
    fn set_meta(&mut self, key: &str, value: &str) -> Result<()>;
}
