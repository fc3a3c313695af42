//! End-to-end scenarios over the engine: deduplication by normalization,
//! rare-shingle amplification, cache invalidation, prefix resolution, and
//! the alias guard.

use resembl::core::config::ResemblConfig;
use resembl::core::engine::{CancelFlag, ResemblEngine};
use resembl::core::errors::ResemblError;
use resembl::detectors::lsh;
use resembl::lang::tokenizer::string_checksum;
use resembl::storage::{SnippetStore, SqliteStore};
use tempfile::TempDir;

fn engine_with_cache() -> (ResemblEngine<SqliteStore>, TempDir) {
    let cache = TempDir::new().unwrap();
    let engine = ResemblEngine::new(
        SqliteStore::open_in_memory().unwrap(),
        ResemblConfig::default(),
        cache.path().to_path_buf(),
    )
    .unwrap();
    (engine, cache)
}

#[test]
fn exact_duplicate_via_formatting() {
    let (mut engine, _cache) = engine_with_cache();

    let first = engine.add("f1", "mov eax, ebx ; hi\n ret").unwrap();
    assert!(first.created);

    let second = engine.add("f2", "MOV EAX, EBX\nRET").unwrap();
    assert!(!second.created);
    assert_eq!(first.checksum, second.checksum);

    assert_eq!(engine.store().count().unwrap(), 1);
    let row = engine.get(&first.checksum).unwrap();
    assert_eq!(row.names, vec!["f1", "f2"]);
}

#[test]
fn rare_shingle_amplification() {
    let (mut engine, _cache) = engine_with_cache();

    // A shares its two all-rare shingles with C; B shares two all-common
    // shingles with C. Equal structural overlap, so the rare pair only
    // scores higher because rare shingles are inserted with weight 3.
    let a = engine.add("a", "cpuid\nrdtsc\nwrmsr\nrdmsr").unwrap();
    let b = engine.add("b", "push ebp\npop ebp\nret").unwrap();
    let c = engine
        .add("c", "cpuid\nrdtsc\nwrmsr\nrdmsr\npush ebp\npop ebp")
        .unwrap();

    // Three distinct snippets; the comparisons below are not self-matches.
    assert!(a.created && b.created && c.created);
    assert_ne!(a.checksum, c.checksum);
    assert_ne!(b.checksum, c.checksum);

    let ac = engine.compare(&a.checksum, &c.checksum).unwrap().report.jaccard;
    let bc = engine.compare(&b.checksum, &c.checksum).unwrap().report.jaccard;
    assert!(bc > 0.0, "B and C share common shingles, J(B,C)={bc}");
    assert!(ac > bc, "J(A,C)={ac} should exceed J(B,C)={bc}");
}

#[test]
fn add_is_immediately_findable() {
    let (mut engine, _cache) = engine_with_cache();
    let code = "push ebp\nmov ebp, esp\nsub esp, 0x20\nleave\nret";

    engine.add("prologue", code).unwrap();
    let expected = string_checksum(code);

    let matches = engine.find(code, 10, 0.0, true).unwrap();
    assert!(
        matches.iter().any(|m| m.snippet.checksum == expected),
        "freshly added snippet must be in its own find results"
    );
}

#[test]
fn cache_invalidation_preserves_results() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("corpus.db");
    let query = "xor eax, eax\ncpuid\nret";

    let before = {
        let mut engine = ResemblEngine::new(
            SqliteStore::open(&db).unwrap(),
            ResemblConfig::default(),
            dir.path().to_path_buf(),
        )
        .unwrap();
        engine.add("probe", query).unwrap();
        engine.add("other", "push ebp\npop ebp\nret").unwrap();
        let matches = engine.find(query, 5, 0.0, true).unwrap();
        matches
            .into_iter()
            .map(|m| m.snippet.checksum)
            .collect::<Vec<_>>()
    };
    assert!(lsh::index_path(dir.path()).exists());

    // Remove the cache file out from under the engine; the next find
    // rebuilds it with identical query results.
    std::fs::remove_file(lsh::index_path(dir.path())).unwrap();

    let mut engine = ResemblEngine::new(
        SqliteStore::open(&db).unwrap(),
        ResemblConfig::default(),
        dir.path().to_path_buf(),
    )
    .unwrap();
    let after: Vec<String> = engine
        .find(query, 5, 0.0, true)
        .unwrap()
        .into_iter()
        .map(|m| m.snippet.checksum)
        .collect();

    assert_eq!(before, after);
    assert!(lsh::index_path(dir.path()).exists());
}

#[test]
fn corrupt_cache_is_rebuilt_not_fatal() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("corpus.db");
    let code = "mov eax, 1\nret";

    {
        let mut engine = ResemblEngine::new(
            SqliteStore::open(&db).unwrap(),
            ResemblConfig::default(),
            dir.path().to_path_buf(),
        )
        .unwrap();
        engine.add("one", code).unwrap();
        engine.find(code, 5, 0.0, true).unwrap();
    }

    // Flip a byte in the middle of the cache file.
    let path = lsh::index_path(dir.path());
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x55;
    std::fs::write(&path, bytes).unwrap();

    let mut engine = ResemblEngine::new(
        SqliteStore::open(&db).unwrap(),
        ResemblConfig::default(),
        dir.path().to_path_buf(),
    )
    .unwrap();
    let matches = engine.find(code, 5, 0.0, true).unwrap();
    assert_eq!(matches.len(), 1);
}

#[test]
fn prefix_ambiguity_is_an_error() {
    let (mut engine, _cache) = engine_with_cache();

    // Store snippets until two checksums share a hex first digit.
    let mut by_first: std::collections::HashMap<char, Vec<String>> = std::collections::HashMap::new();
    for i in 0..40 {
        let code = format!("mov eax, {i}\nadd ebx, {i}\nret");
        let report = engine.add(&format!("fn_{i}"), &code).unwrap();
        by_first
            .entry(report.checksum.chars().next().unwrap())
            .or_default()
            .push(report.checksum);
    }
    let (digit, group) = by_first
        .iter()
        .find(|(_, v)| v.len() >= 2)
        .expect("40 snippets must share a leading hex digit");

    let err = engine.get(&digit.to_string()).unwrap_err();
    assert!(matches!(err, ResemblError::Ambiguous { .. }));

    // A long-enough prefix resolves.
    let full = &group[0];
    let hit = engine.get(&full[..24]).unwrap();
    assert_eq!(&hit.checksum, full);
}

#[test]
fn empty_alias_guard_leaves_row_unchanged() {
    let (mut engine, _cache) = engine_with_cache();
    let report = engine.add("only", "nop\nret").unwrap();

    let err = engine
        .store_mut()
        .remove_name(&report.checksum, "only")
        .unwrap_err();
    assert!(matches!(err, ResemblError::EmptyAliasSet { .. }));

    let row = engine.get(&report.checksum).unwrap();
    assert_eq!(row.names, vec!["only"]);
}

#[test]
fn import_cancellation_keeps_partial_progress() {
    let (mut engine, _cache) = engine_with_cache();
    let src = TempDir::new().unwrap();
    std::fs::write(src.path().join("a.asm"), "mov eax, 1\nret").unwrap();
    std::fs::write(src.path().join("b.asm"), "mov ebx, 2\nret").unwrap();

    let cancel = CancelFlag::new();
    cancel.cancel();
    let err = engine.import_dir(src.path(), &cancel).unwrap_err();
    assert!(matches!(err, ResemblError::Cancelled { completed: 0 }));
    assert_eq!(err.exit_code(), 3);

    // A clean run picks everything up.
    let report = engine.import_dir(src.path(), &CancelFlag::new()).unwrap();
    assert_eq!(report.created, 2);
}

#[test]
fn stale_signatures_demand_reindex() {
    let (mut engine, _cache) = engine_with_cache();
    let report = engine.add("f", "mov eax, 1\nret").unwrap();

    // Overwrite the stored signature with one of the wrong width, as a
    // parameter change would leave behind.
    let narrow = resembl::detectors::minhash::MinHashGenerator::new(32).signature(&[]);
    engine
        .store_mut()
        .update_minhash(&report.checksum, &narrow.to_bytes())
        .unwrap();
    engine.clean().unwrap();

    let err = engine.find("mov eax, 1\nret", 5, 0.0, true).unwrap_err();
    assert!(matches!(err, ResemblError::StaleIndex { .. }));

    // Reindex recomputes signatures and recovers.
    engine.reindex(&CancelFlag::new()).unwrap();
    assert_eq!(engine.find("mov eax, 1\nret", 5, 0.0, true).unwrap().len(), 1);
}
