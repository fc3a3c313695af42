//! SQLite implementation of the snippet store.
//!
//! One connection per store, WAL journal mode, foreign keys on. Multi-row
//! mutations run inside explicit transactions so each trait operation is
//! atomic on its own.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::core::errors::{ResemblError, Result};
use crate::storage::schema::SCHEMA_STATEMENTS;
use crate::storage::{Collection, Snippet, SnippetStore, SnippetVersion, UpsertOutcome};

const SNIPPET_COLUMNS: &str = "checksum, code, names, tags, collection, minhash, created_at";

/// SQLite-backed snippet store.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ResemblError::io(format!("failed to create {}", parent.display()), e)
                })?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        store.init()?;
        Ok(store)
    }

    /// Open an in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        store.init()?;
        Ok(store)
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init(&self) -> Result<()> {
        // journal_mode returns a row; ignore the value.
        let _: String = self
            .conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        self.conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;")?;
        for statement in SCHEMA_STATEMENTS {
            self.conn.execute_batch(statement)?;
        }
        debug!("opened snippet store at {}", self.path.display());
        Ok(())
    }

    fn snippet_from_row(row: &Row<'_>) -> rusqlite::Result<RawSnippet> {
        Ok(RawSnippet {
            checksum: row.get(0)?,
            code: row.get(1)?,
            names: row.get(2)?,
            tags: row.get(3)?,
            collection: row.get(4)?,
            minhash: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn fetch_optional(&self, checksum: &str) -> Result<Option<Snippet>> {
        let sql = format!("SELECT {SNIPPET_COLUMNS} FROM snippets WHERE checksum = ?1;");
        let raw = self
            .conn
            .query_row(&sql, params![checksum], Self::snippet_from_row)
            .optional()?;
        raw.map(RawSnippet::decode).transpose()
    }

    fn require(&self, checksum: &str) -> Result<Snippet> {
        self.fetch_optional(checksum)?
            .ok_or_else(|| ResemblError::not_found(format!("snippet {checksum}")))
    }

    fn store_names(&self, checksum: &str, names: &[String]) -> Result<()> {
        self.conn.execute(
            "UPDATE snippets SET names = ?1 WHERE checksum = ?2;",
            params![serde_json::to_string(names)?, checksum],
        )?;
        Ok(())
    }

    fn store_tags(&self, checksum: &str, tags: &[String]) -> Result<()> {
        self.conn.execute(
            "UPDATE snippets SET tags = ?1 WHERE checksum = ?2;",
            params![serde_json::to_string(tags)?, checksum],
        )?;
        Ok(())
    }
}

/// Raw column values before JSON and timestamp decoding.
struct RawSnippet {
    checksum: String,
    code: String,
    names: String,
    tags: String,
    collection: Option<String>,
    minhash: Vec<u8>,
    created_at: String,
}

impl RawSnippet {
    fn decode(self) -> Result<Snippet> {
        Ok(Snippet {
            checksum: self.checksum,
            code: self.code,
            names: serde_json::from_str(&self.names)?,
            tags: serde_json::from_str(&self.tags)?,
            collection: self.collection,
            minhash: self.minhash,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ResemblError::permanent_storage(format!("bad timestamp '{raw}': {e}")))
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

impl SnippetStore for SqliteStore {
    fn upsert_snippet(
        &mut self,
        checksum: &str,
        code: &str,
        minhash: &[u8],
        initial_name: &str,
    ) -> Result<UpsertOutcome> {
        if let Some(existing) = self.fetch_optional(checksum)? {
            if !initial_name.is_empty() && !existing.names.iter().any(|n| n == initial_name) {
                let mut names = existing.names;
                names.push(initial_name.to_string());
                self.store_names(checksum, &names)?;
            }
            return Ok(UpsertOutcome::Aliased);
        }

        let names = serde_json::to_string(&[initial_name])?;
        self.conn.execute(
            "INSERT INTO snippets (checksum, code, names, tags, minhash, created_at)
             VALUES (?1, ?2, ?3, '[]', ?4, ?5);",
            params![checksum, code, names, minhash, now()],
        )?;
        info!("stored snippet {} as '{}'", &checksum[..12.min(checksum.len())], initial_name);
        Ok(UpsertOutcome::Created)
    }

    fn get_by_checksum(&self, checksum: &str) -> Result<Snippet> {
        self.require(checksum)
    }

    fn get_by_checksum_prefix(&self, prefix: &str) -> Result<Snippet> {
        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ResemblError::bad_input(format!(
                "'{prefix}' is not a hex checksum prefix"
            )));
        }
        if prefix.len() == 64 {
            return self.require(prefix);
        }

        let sql = format!(
            "SELECT {SNIPPET_COLUMNS} FROM snippets WHERE checksum LIKE ?1 || '%'
             ORDER BY checksum ASC LIMIT 2;"
        );
        let mut statement = self.conn.prepare(&sql)?;
        let rows: Vec<RawSnippet> = statement
            .query_map(params![prefix.to_ascii_lowercase()], Self::snippet_from_row)?
            .collect::<rusqlite::Result<_>>()?;

        match rows.len() {
            0 => Err(ResemblError::not_found(format!("snippet with prefix {prefix}"))),
            1 => rows.into_iter().next().expect("one row").decode(),
            _ => {
                // LIMIT 2 keeps the probe cheap; report the real count.
                let count: usize = self.conn.query_row(
                    "SELECT COUNT(*) FROM snippets WHERE checksum LIKE ?1 || '%';",
                    params![prefix.to_ascii_lowercase()],
                    |row| row.get(0),
                )?;
                Err(ResemblError::ambiguous(format!("checksum prefix {prefix}"), count))
            }
        }
    }

    fn get_by_name(&self, name: &str) -> Result<Option<Snippet>> {
        let sql = format!(
            "SELECT {SNIPPET_COLUMNS} FROM snippets WHERE names LIKE '%' || ?1 || '%';"
        );
        let mut statement = self.conn.prepare(&sql)?;
        let rows: Vec<RawSnippet> = statement
            .query_map(params![name], Self::snippet_from_row)?
            .collect::<rusqlite::Result<_>>()?;

        for raw in rows {
            let snippet = raw.decode()?;
            if snippet.names.iter().any(|n| n == name) {
                return Ok(Some(snippet));
            }
        }
        Ok(None)
    }

    fn search_by_name(&self, pattern: &str) -> Result<Vec<Snippet>> {
        let needle = pattern.to_lowercase();
        let mut matches = Vec::new();
        self.for_each_snippet(&mut |snippet| {
            if snippet.names.iter().any(|n| n.to_lowercase().contains(&needle)) {
                matches.push(snippet);
            }
            Ok(())
        })?;
        Ok(matches)
    }

    fn add_name(&mut self, checksum: &str, name: &str) -> Result<Snippet> {
        if name.trim().is_empty() {
            return Err(ResemblError::bad_input("name cannot be empty"));
        }
        if let Some(holder) = self.get_by_name(name)? {
            return Err(ResemblError::already_exists(format!(
                "name '{name}' on snippet {}",
                &holder.checksum[..12]
            )));
        }

        let mut snippet = self.require(checksum)?;
        snippet.names.push(name.to_string());
        self.store_names(checksum, &snippet.names)?;
        Ok(snippet)
    }

    fn remove_name(&mut self, checksum: &str, name: &str) -> Result<Snippet> {
        let mut snippet = self.require(checksum)?;
        let Some(position) = snippet.names.iter().position(|n| n == name) else {
            return Err(ResemblError::not_found(format!(
                "name '{name}' on snippet {}",
                &checksum[..12.min(checksum.len())]
            )));
        };
        if snippet.names.len() == 1 {
            return Err(ResemblError::empty_alias_set(checksum));
        }

        snippet.names.remove(position);
        self.store_names(checksum, &snippet.names)?;
        Ok(snippet)
    }

    fn add_tag(&mut self, checksum: &str, tag: &str) -> Result<Snippet> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ResemblError::bad_input("tag cannot be empty"));
        }

        let mut snippet = self.require(checksum)?;
        if !snippet.tags.iter().any(|t| t == tag) {
            snippet.tags.push(tag.to_string());
            self.store_tags(checksum, &snippet.tags)?;
        }
        Ok(snippet)
    }

    fn remove_tag(&mut self, checksum: &str, tag: &str) -> Result<Snippet> {
        let tag = tag.trim();
        let mut snippet = self.require(checksum)?;
        if let Some(position) = snippet.tags.iter().position(|t| t == tag) {
            snippet.tags.remove(position);
            self.store_tags(checksum, &snippet.tags)?;
        }
        Ok(snippet)
    }

    fn set_collection(&mut self, checksum: &str, collection: Option<&str>) -> Result<Snippet> {
        if let Some(name) = collection {
            let exists: bool = self
                .conn
                .query_row(
                    "SELECT 1 FROM collections WHERE name = ?1;",
                    params![name],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if !exists {
                return Err(ResemblError::not_found(format!("collection '{name}'")));
            }
        }

        let affected = self.conn.execute(
            "UPDATE snippets SET collection = ?1 WHERE checksum = ?2;",
            params![collection, checksum],
        )?;
        if affected == 0 {
            return Err(ResemblError::not_found(format!("snippet {checksum}")));
        }
        self.require(checksum)
    }

    fn create_collection(&mut self, name: &str, description: &str) -> Result<Collection> {
        if name.trim().is_empty() {
            return Err(ResemblError::bad_input("collection name cannot be empty"));
        }
        let created_at = now();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO collections (name, description, created_at)
             VALUES (?1, ?2, ?3);",
            params![name, description, created_at],
        )?;
        if inserted == 0 {
            return Err(ResemblError::already_exists(format!("collection '{name}'")));
        }
        Ok(Collection {
            name: name.to_string(),
            description: description.to_string(),
            created_at: parse_timestamp(&created_at)?,
        })
    }

    fn delete_collection(&mut self, name: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE snippets SET collection = NULL WHERE collection = ?1;",
            params![name],
        )?;
        let deleted = tx.execute("DELETE FROM collections WHERE name = ?1;", params![name])?;
        tx.commit()?;
        if deleted == 0 {
            return Err(ResemblError::not_found(format!("collection '{name}'")));
        }
        Ok(())
    }

    fn collections(&self) -> Result<Vec<(Collection, usize)>> {
        let mut statement = self.conn.prepare(
            "SELECT c.name, c.description, c.created_at,
                    (SELECT COUNT(*) FROM snippets s WHERE s.collection = c.name)
             FROM collections c ORDER BY c.name ASC;",
        )?;
        let rows: Vec<(String, String, String, usize)> = statement
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<rusqlite::Result<_>>()?;

        rows.into_iter()
            .map(|(name, description, created_at, count)| {
                Ok((
                    Collection {
                        name,
                        description,
                        created_at: parse_timestamp(&created_at)?,
                    },
                    count,
                ))
            })
            .collect()
    }

    fn snippets_in_collection(&self, name: &str) -> Result<Vec<Snippet>> {
        let sql = format!(
            "SELECT {SNIPPET_COLUMNS} FROM snippets WHERE collection = ?1
             ORDER BY checksum ASC;"
        );
        let mut statement = self.conn.prepare(&sql)?;
        let rows: Vec<RawSnippet> = statement
            .query_map(params![name], Self::snippet_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        rows.into_iter().map(RawSnippet::decode).collect()
    }

    fn append_version(
        &mut self,
        name: &str,
        checksum: &str,
        code: &str,
        minhash: &[u8],
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO snippet_versions (name, checksum, code, minhash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![name, checksum, code, minhash, now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn latest_version_binding(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT checksum FROM snippet_versions WHERE name = ?1
                 ORDER BY id DESC LIMIT 1;",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn versions_for_name(&self, name: &str) -> Result<Vec<SnippetVersion>> {
        let mut statement = self.conn.prepare(
            "SELECT id, name, checksum, code, minhash, created_at
             FROM snippet_versions WHERE name = ?1 ORDER BY id ASC;",
        )?;
        let rows: Vec<(i64, String, String, String, Vec<u8>, String)> = statement
            .query_map(params![name], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<rusqlite::Result<_>>()?;

        rows.into_iter()
            .map(|(id, name, checksum, code, minhash, created_at)| {
                Ok(SnippetVersion {
                    id,
                    name,
                    checksum,
                    code,
                    minhash,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    fn delete_snippet(&mut self, checksum: &str) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM snippets WHERE checksum = ?1;", params![checksum])?;
        if deleted == 0 {
            return Err(ResemblError::not_found(format!("snippet {checksum}")));
        }
        info!("deleted snippet {}", &checksum[..12.min(checksum.len())]);
        Ok(())
    }

    fn update_minhash(&mut self, checksum: &str, minhash: &[u8]) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE snippets SET minhash = ?1 WHERE checksum = ?2;",
            params![minhash, checksum],
        )?;
        if affected == 0 {
            return Err(ResemblError::not_found(format!("snippet {checksum}")));
        }
        Ok(())
    }

    fn for_each_snippet(&self, f: &mut dyn FnMut(Snippet) -> Result<()>) -> Result<()> {
        let sql = format!("SELECT {SNIPPET_COLUMNS} FROM snippets ORDER BY checksum ASC;");
        let mut statement = self.conn.prepare(&sql)?;
        let mut rows = statement.query([])?;
        while let Some(row) = rows.next()? {
            let snippet = Self::snippet_from_row(row)?.decode()?;
            f(snippet)?;
        }
        Ok(())
    }

    fn all_checksums(&self) -> Result<Vec<String>> {
        let mut statement = self
            .conn
            .prepare("SELECT checksum FROM snippets ORDER BY checksum ASC;")?;
        let rows: Vec<String> = statement
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    fn count(&self) -> Result<usize> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM snippets;", [], |row| row.get(0))?)
    }

    fn list(&self, start: usize, end: usize) -> Result<Vec<Snippet>> {
        let limit: i64 = if end > start { (end - start) as i64 } else { -1 };
        let sql = format!(
            "SELECT {SNIPPET_COLUMNS} FROM snippets ORDER BY checksum ASC
             LIMIT ?1 OFFSET ?2;"
        );
        let mut statement = self.conn.prepare(&sql)?;
        let rows: Vec<RawSnippet> = statement
            .query_map(params![limit, start as i64], Self::snippet_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        rows.into_iter().map(RawSnippet::decode).collect()
    }

    fn vacuum(&mut self) -> Result<()> {
        self.conn.execute_batch("VACUUM;")?;
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1;",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_meta(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_checksum(tag: u8) -> String {
        let mut checksum = String::new();
        for _ in 0..32 {
            checksum.push_str(&format!("{tag:02x}"));
        }
        checksum
    }

    fn insert(store: &mut SqliteStore, tag: u8, name: &str) -> String {
        let checksum = sample_checksum(tag);
        store
            .upsert_snippet(&checksum, "mov eax, ebx\nret", b"sig", name)
            .unwrap();
        checksum
    }

    #[test]
    fn test_upsert_then_alias() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let checksum = sample_checksum(0xab);

        let first = store
            .upsert_snippet(&checksum, "ret", b"sig", "f1")
            .unwrap();
        assert_eq!(first, UpsertOutcome::Created);

        let second = store
            .upsert_snippet(&checksum, "ret", b"sig", "f2")
            .unwrap();
        assert_eq!(second, UpsertOutcome::Aliased);

        // Idempotent for an existing alias.
        let third = store.upsert_snippet(&checksum, "ret", b"sig", "f2").unwrap();
        assert_eq!(third, UpsertOutcome::Aliased);

        let snippet = store.get_by_checksum(&checksum).unwrap();
        assert_eq!(snippet.names, vec!["f1", "f2"]);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_prefix_lookup_disambiguation() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        // Checksums abab...ab and abcd...cd share the prefix "ab".
        let near = format!("ab{}", "cd".repeat(31));
        store.upsert_snippet(&near, "push ebp", b"sig", "g").unwrap();
        let full = insert(&mut store, 0xab, "f");

        let err = store.get_by_checksum_prefix("ab").unwrap_err();
        assert!(matches!(err, ResemblError::Ambiguous { count: 2, .. }));

        let hit = store.get_by_checksum_prefix("abab").unwrap();
        assert_eq!(hit.checksum, full);

        assert!(matches!(
            store.get_by_checksum_prefix("ffff").unwrap_err(),
            ResemblError::NotFound { .. }
        ));
        assert!(store.get_by_checksum_prefix("zz").is_err());
    }

    #[test]
    fn test_alias_commutativity() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = insert(&mut store, 0x01, "base_a");
        store.add_name(&a, "n1").unwrap();
        store.add_name(&a, "n2").unwrap();
        let names_forward: std::collections::HashSet<String> =
            store.get_by_checksum(&a).unwrap().names.into_iter().collect();

        let mut other = SqliteStore::open_in_memory().unwrap();
        let b = {
            let checksum = sample_checksum(0x01);
            other
                .upsert_snippet(&checksum, "mov eax, ebx\nret", b"sig", "base_a")
                .unwrap();
            checksum
        };
        other.add_name(&b, "n2").unwrap();
        other.add_name(&b, "n1").unwrap();
        let names_reverse: std::collections::HashSet<String> =
            other.get_by_checksum(&b).unwrap().names.into_iter().collect();

        assert_eq!(names_forward, names_reverse);
    }

    #[test]
    fn test_add_name_conflicts() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = insert(&mut store, 0x01, "first");
        let _b = insert(&mut store, 0x02, "second");

        // Taken by another snippet.
        assert!(matches!(
            store.add_name(&a, "second").unwrap_err(),
            ResemblError::AlreadyExists { .. }
        ));
        // Already on this snippet.
        assert!(matches!(
            store.add_name(&a, "first").unwrap_err(),
            ResemblError::AlreadyExists { .. }
        ));
    }

    #[test]
    fn test_empty_alias_guard() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let checksum = insert(&mut store, 0x07, "only");

        let err = store.remove_name(&checksum, "only").unwrap_err();
        assert!(matches!(err, ResemblError::EmptyAliasSet { .. }));

        // Row unchanged.
        let snippet = store.get_by_checksum(&checksum).unwrap();
        assert_eq!(snippet.names, vec!["only"]);
    }

    #[test]
    fn test_tags_idempotent() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let checksum = insert(&mut store, 0x03, "f");

        store.add_tag(&checksum, "crypto").unwrap();
        store.add_tag(&checksum, "crypto").unwrap();
        assert_eq!(store.get_by_checksum(&checksum).unwrap().tags, vec!["crypto"]);

        store.remove_tag(&checksum, "crypto").unwrap();
        store.remove_tag(&checksum, "crypto").unwrap();
        assert!(store.get_by_checksum(&checksum).unwrap().tags.is_empty());
    }

    #[test]
    fn test_collection_lifecycle() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let checksum = insert(&mut store, 0x04, "f");

        store.create_collection("malware", "suspicious loaders").unwrap();
        assert!(matches!(
            store.create_collection("malware", "").unwrap_err(),
            ResemblError::AlreadyExists { .. }
        ));

        store.set_collection(&checksum, Some("malware")).unwrap();
        let listed = store.collections().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].1, 1);

        // Deleting the collection detaches members but keeps them.
        store.delete_collection("malware").unwrap();
        let snippet = store.get_by_checksum(&checksum).unwrap();
        assert!(snippet.collection.is_none());
        assert!(store.set_collection(&checksum, Some("gone")).is_err());
    }

    #[test]
    fn test_version_log_appends() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = sample_checksum(0x0a);
        let b = sample_checksum(0x0b);

        assert!(store.latest_version_binding("f").unwrap().is_none());
        store.append_version("f", &a, "ret", b"sig-a").unwrap();
        store.append_version("f", &b, "nop\nret", b"sig-b").unwrap();

        assert_eq!(store.latest_version_binding("f").unwrap(), Some(b.clone()));
        let versions = store.versions_for_name("f").unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].checksum, a);
        assert_eq!(versions[1].checksum, b);
        assert!(versions[0].id < versions[1].id);
    }

    #[test]
    fn test_iteration_is_checksum_ordered() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        insert(&mut store, 0xcc, "c");
        insert(&mut store, 0x11, "a");
        insert(&mut store, 0x77, "b");

        let mut seen = Vec::new();
        store
            .for_each_snippet(&mut |snippet| {
                seen.push(snippet.checksum);
                Ok(())
            })
            .unwrap();
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
        assert_eq!(store.all_checksums().unwrap(), seen);

        let window = store.list(1, 2).unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].checksum, seen[1]);
    }

    #[test]
    fn test_search_by_name() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        insert(&mut store, 0x21, "decrypt_loop");
        insert(&mut store, 0x22, "init_table");

        let hits = store.search_by_name("CRYPT").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].primary_name(), "decrypt_loop");
        assert!(store.search_by_name("zzz").unwrap().is_empty());
    }
}
