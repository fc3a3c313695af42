//! Search orchestrator: end-to-end `add`/`find`/`compare`/`reindex`
//! pipelines and the index cache lifecycle.
//!
//! The engine is the single writer. Every mutation runs storage commit,
//! index mutation, and cache write as one logical critical section, so an
//! observer never sees a storage commit without a matching index update
//! (other than through the rebuild-from-scratch path). Bulk operations fan
//! MinHash computation out over a rayon pool; only the engine touches
//! storage and the index.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::config::ResemblConfig;
use crate::core::errors::{ResemblError, Result};
use crate::core::scoring::{hybrid_score, levenshtein_ratio, shared_tokens, ComparisonReport};
use crate::detectors::lsh::{self, CacheLock, LshIndex, LshParams};
use crate::detectors::minhash::{create_shingles, MinHashGenerator, MinHashSignature};
use crate::lang::cfg;
use crate::lang::tokenizer::{normalize, string_checksum, tokenize, TokenizationMode};
use crate::storage::{Snippet, SnippetStore, SnippetVersion, UpsertOutcome};

/// Seed for the deterministic stats pair sample.
const STATS_SAMPLE_SEED: u64 = 0xA55E_77B1;

/// Default number of sampled pairs for the mean-Jaccard statistic.
const STATS_SAMPLE_PAIRS: usize = 256;

/// File extensions picked up by bulk import.
const IMPORT_EXTENSIONS: &[&str] = &["asm", "s"];

/// Meta key recording the parameters stored fingerprints were computed
/// under. Invariant: every stored MinHash matches this record.
const SIGNATURE_PARAMS_KEY: &str = "signature_params";

/// Cooperative cancellation flag, checked between items of long operations.
#[derive(Debug, Default, Clone)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One ranked match from `find`.
#[derive(Debug, Clone, Serialize)]
pub struct SnippetMatch {
    /// The matched snippet
    pub snippet: Snippet,
    /// Hybrid composite score, 0..100
    pub hybrid: f64,
    /// MinHash-estimated Jaccard similarity, 0..1
    pub jaccard: f64,
    /// Levenshtein ratio against the raw query, 0..100
    pub levenshtein: f64,
}

/// Outcome of `add`.
#[derive(Debug, Clone, Serialize)]
pub struct AddReport {
    /// Checksum the name is now bound to
    pub checksum: String,
    /// Whether a new row was created or an alias added
    pub created: bool,
}

/// Outcome of `reindex`.
#[derive(Debug, Clone, Serialize)]
pub struct ReindexReport {
    /// Snippets whose MinHash was recomputed
    pub num_reindexed: usize,
    /// Wall time in seconds
    pub elapsed_secs: f64,
}

/// Outcome of `import`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// New snippets created
    pub created: usize,
    /// Files that aliased an existing snippet
    pub aliased: usize,
    /// Files skipped (unreadable or not UTF-8)
    pub skipped: usize,
}

/// Outcome of `export`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    /// Snippets written
    pub num_exported: usize,
}

/// Outcome of `merge`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    /// Snippets inserted
    pub added: usize,
    /// Existing snippets that gained names or tags
    pub updated: usize,
    /// Source snippets already fully present
    pub skipped: usize,
}

/// Corpus statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Number of stored snippets
    pub num_snippets: usize,
    /// Mean normalized token count per snippet
    pub mean_token_count: f64,
    /// Distinct normalized tokens across the corpus
    pub vocabulary_size: usize,
    /// Mean pairwise Jaccard over a bounded deterministic sample
    pub mean_pairwise_jaccard: f64,
}

/// Pairwise comparison output.
#[derive(Debug, Clone, Serialize)]
pub struct CompareOutput {
    /// Left snippet summary
    pub a: CompareSide,
    /// Right snippet summary
    pub b: CompareSide,
    /// Similarity metrics
    pub report: ComparisonReport,
}

/// One side of a comparison.
#[derive(Debug, Clone, Serialize)]
pub struct CompareSide {
    /// Snippet checksum
    pub checksum: String,
    /// Alias set
    pub names: Vec<String>,
    /// Distinct normalized token count
    pub token_count: usize,
}

/// The search orchestrator. Owns the store, the in-memory LSH index, and
/// the cache directory; holds the advisory cache lock when available.
pub struct ResemblEngine<S: SnippetStore> {
    config: ResemblConfig,
    store: S,
    cache_dir: PathBuf,
    params: LshParams,
    generator: MinHashGenerator,
    index: Option<LshIndex>,
    lock: Option<CacheLock>,
}

impl<S: SnippetStore> ResemblEngine<S> {
    /// Create an engine over `store`, caching under `cache_dir`.
    pub fn new(store: S, config: ResemblConfig, cache_dir: PathBuf) -> Result<Self> {
        config.validate()?;
        let params = LshParams::tune(
            config.num_permutations,
            config.ngram_size,
            config.lsh_threshold,
            true,
        )?;
        let generator = MinHashGenerator::new(config.num_permutations as usize);
        let lock = CacheLock::acquire(&cache_dir)?;
        if lock.is_none() {
            warn!(
                "cache directory {} is locked by another process; cache writes degrade to invalidation",
                cache_dir.display()
            );
        }
        Ok(Self {
            config,
            store,
            cache_dir,
            params,
            generator,
            index: None,
            lock,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &ResemblConfig {
        &self.config
    }

    /// Borrow the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutably borrow the underlying store. Callers that mutate snippets
    /// directly must invalidate the index afterwards.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    // ------------------------------------------------------------------
    // Fingerprinting helpers
    // ------------------------------------------------------------------

    fn signature_for(&self, code: &str, mode: TokenizationMode) -> MinHashSignature {
        let tokens = tokenize(code, mode);
        let shingles = create_shingles(&tokens, self.config.ngram_size as usize);
        self.generator.signature(&shingles)
    }

    fn stored_signature(&self, snippet: &Snippet) -> Result<MinHashSignature> {
        let signature = MinHashSignature::from_bytes(&snippet.minhash)
            .map_err(|_| ResemblError::stale_index(format!(
                "snippet {} carries an unreadable signature",
                &snippet.checksum[..12]
            )))?;
        if signature.num_permutations() != self.params.num_permutations as usize {
            return Err(ResemblError::stale_index(format!(
                "snippet {} was fingerprinted at {} permutations, index expects {}",
                &snippet.checksum[..12],
                signature.num_permutations(),
                self.params.num_permutations
            )));
        }
        Ok(signature)
    }

    fn signature_params_value(&self) -> String {
        format!(
            "{}:{}:{}",
            self.config.num_permutations,
            self.config.ngram_size,
            u8::from(self.params.generalize)
        )
    }

    /// Verify that stored fingerprints were produced under the current
    /// parameters, claiming them on first write.
    fn claim_signature_params(&mut self) -> Result<()> {
        let value = self.signature_params_value();
        match self.store.get_meta(SIGNATURE_PARAMS_KEY)? {
            None => self.store.set_meta(SIGNATURE_PARAMS_KEY, &value),
            Some(recorded) if recorded == value => Ok(()),
            Some(recorded) => Err(ResemblError::stale_index(format!(
                "stored fingerprints use parameters {recorded}, configuration is {value}"
            ))),
        }
    }

    /// Read-only variant of the parameter check for query paths.
    fn verify_signature_params(&self) -> Result<()> {
        let value = self.signature_params_value();
        match self.store.get_meta(SIGNATURE_PARAMS_KEY)? {
            Some(recorded) if recorded != value => Err(ResemblError::stale_index(format!(
                "stored fingerprints use parameters {recorded}, configuration is {value}"
            ))),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Index lifecycle
    // ------------------------------------------------------------------

    /// Load or rebuild the LSH index so it reflects current storage.
    fn ensure_index(&mut self) -> Result<()> {
        self.verify_signature_params()?;
        let expected = self.expected_fingerprint()?;

        if let Some(index) = &self.index {
            if index.params() == &self.params && index.fingerprint() == expected {
                return Ok(());
            }
            self.index = None;
        }

        let path = lsh::index_path(&self.cache_dir);
        match lsh::load(&path) {
            Ok(Some(index)) => {
                if index.params() == &self.params && index.fingerprint() == expected {
                    debug!("loaded LSH cache from {}", path.display());
                    self.index = Some(index);
                    return Ok(());
                }
                debug!("cached index is stale; rebuilding");
            }
            Ok(None) => {}
            Err(e) if matches!(e, ResemblError::CorruptCache { .. }) => {
                warn!("discarding corrupt LSH cache: {e}");
                lsh::invalidate(&self.cache_dir);
            }
            Err(e) => return Err(e),
        }

        self.rebuild_index()
    }

    fn expected_fingerprint(&self) -> Result<u64> {
        let checksums = self.store.all_checksums()?;
        let refs: Vec<&str> = checksums.iter().map(String::as_str).collect();
        Ok(lsh::fingerprint_for(&self.params, &refs))
    }

    fn rebuild_index(&mut self) -> Result<()> {
        let start = Instant::now();
        let mut index = LshIndex::new(self.params);
        let mut entries: Vec<(String, MinHashSignature)> = Vec::new();

        self.store.for_each_snippet(&mut |snippet| {
            let signature = MinHashSignature::from_bytes(&snippet.minhash).map_err(|_| {
                ResemblError::stale_index(format!(
                    "snippet {} carries an unreadable signature",
                    &snippet.checksum[..12]
                ))
            })?;
            entries.push((snippet.checksum, signature));
            Ok(())
        })?;

        for (checksum, signature) in entries {
            index.insert(&checksum, signature)?;
        }

        info!(
            "rebuilt LSH index over {} snippets in {:.1?}",
            index.len(),
            start.elapsed()
        );
        self.persist_cache(&index)?;
        self.index = Some(index);
        Ok(())
    }

    /// Write the cache if this process holds the advisory lock; otherwise
    /// make sure no stale file survives.
    fn persist_cache(&self, index: &LshIndex) -> Result<()> {
        if self.lock.is_some() {
            lsh::save(index, &lsh::index_path(&self.cache_dir))
        } else {
            lsh::invalidate(&self.cache_dir);
            Ok(())
        }
    }

    /// Apply one index mutation and keep the disk cache in step.
    fn mutate_index(&mut self, apply: impl FnOnce(&mut LshIndex) -> Result<()>) -> Result<()> {
        if let Some(mut index) = self.index.take() {
            apply(&mut index)?;
            self.persist_cache(&index)?;
            self.index = Some(index);
        } else {
            // Nothing in memory to update incrementally; the next find
            // rebuilds from storage.
            lsh::invalidate(&self.cache_dir);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Core operations
    // ------------------------------------------------------------------

    /// Add `code` under `name`: create a snippet or alias an existing one.
    pub fn add(&mut self, name: &str, code: &str) -> Result<AddReport> {
        if name.trim().is_empty() {
            return Err(ResemblError::bad_input("name cannot be empty"));
        }
        if code.trim().is_empty() {
            return Err(ResemblError::bad_input("code cannot be empty"));
        }

        self.claim_signature_params()?;

        let checksum = string_checksum(code);
        let signature = self.signature_for(code, TokenizationMode::Generalize);
        let signature_bytes = signature.to_bytes();

        // A name that previously resolved to different code is being
        // re-bound; that is what the version log records.
        let prior = match self.store.get_by_name(name)? {
            Some(snippet) => Some(snippet.checksum),
            None => self.store.latest_version_binding(name)?,
        };

        let outcome = self
            .store
            .upsert_snippet(&checksum, code, &signature_bytes, name)?;

        if let Some(previous) = prior {
            if previous != checksum {
                self.store
                    .append_version(name, &checksum, code, &signature_bytes)?;
                debug!("logged rebinding of '{name}' to {}", &checksum[..12]);
            }
        }

        if outcome == UpsertOutcome::Created {
            let checksum_for_index = checksum.clone();
            self.mutate_index(move |index| index.insert(&checksum_for_index, signature))?;
        }

        Ok(AddReport {
            checksum,
            created: outcome == UpsertOutcome::Created,
        })
    }

    /// Find the stored snippets most similar to `query`.
    pub fn find(
        &mut self,
        query: &str,
        top_n: usize,
        threshold: f64,
        normalize_query: bool,
    ) -> Result<Vec<SnippetMatch>> {
        self.ensure_index()?;
        let index = self.index.as_ref().expect("index ensured");

        let mode = if normalize_query {
            TokenizationMode::Generalize
        } else {
            TokenizationMode::Raw
        };
        let query_signature = self.signature_for(query, mode);

        // Snapshot of candidates at this point; ranking never drops any
        // before scoring.
        let candidates = index.query(&query_signature);
        debug!("LSH produced {} candidates", candidates.len());

        let mut matches = Vec::with_capacity(candidates.len());
        for checksum in candidates {
            let snippet = self.store.get_by_checksum(&checksum)?;
            let stored = self.stored_signature(&snippet)?;
            let jaccard = query_signature.jaccard(&stored)?;
            if jaccard < threshold {
                continue;
            }
            let levenshtein = levenshtein_ratio(query, &snippet.code);
            let hybrid = hybrid_score(jaccard, levenshtein, self.config.jaccard_weight);
            matches.push(SnippetMatch {
                snippet,
                hybrid,
                jaccard,
                levenshtein,
            });
        }

        matches.sort_by(|a, b| {
            b.hybrid
                .total_cmp(&a.hybrid)
                .then_with(|| b.levenshtein.total_cmp(&a.levenshtein))
                .then_with(|| a.snippet.checksum.cmp(&b.snippet.checksum))
        });
        matches.truncate(top_n);
        Ok(matches)
    }

    /// Compare two stored snippets by unambiguous checksum prefix.
    pub fn compare(&self, prefix_a: &str, prefix_b: &str) -> Result<CompareOutput> {
        let a = self.store.get_by_checksum_prefix(prefix_a)?;
        let b = self.store.get_by_checksum_prefix(prefix_b)?;

        let jaccard = self.stored_signature(&a)?.jaccard(&self.stored_signature(&b)?)?;
        let levenshtein = levenshtein_ratio(&a.code, &b.code);
        let hybrid = hybrid_score(jaccard, levenshtein, self.config.jaccard_weight);
        let cfg_similarity = cfg::cfg_similarity(&cfg::extract(&a.code), &cfg::extract(&b.code));
        let shared = shared_tokens(&a.code, &b.code);

        let side = |snippet: &Snippet| CompareSide {
            checksum: snippet.checksum.clone(),
            names: snippet.names.clone(),
            token_count: {
                let tokens: std::collections::HashSet<String> =
                    tokenize(&snippet.code, TokenizationMode::Generalize)
                        .into_iter()
                        .collect();
                tokens.len()
            },
        };

        Ok(CompareOutput {
            a: side(&a),
            b: side(&b),
            report: ComparisonReport {
                jaccard,
                levenshtein,
                hybrid,
                cfg_similarity,
                shared_tokens: shared,
            },
        })
    }

    /// Resolve a checksum prefix to a stored snippet.
    pub fn get(&self, prefix: &str) -> Result<Snippet> {
        self.store.get_by_checksum_prefix(prefix)
    }

    /// Delete a snippet by unambiguous prefix.
    pub fn delete(&mut self, prefix: &str) -> Result<Snippet> {
        let snippet = self.store.get_by_checksum_prefix(prefix)?;
        self.store.delete_snippet(&snippet.checksum)?;
        let checksum = snippet.checksum.clone();
        self.mutate_index(move |index| {
            index.remove(&checksum);
            Ok(())
        })?;
        Ok(snippet)
    }

    /// Recompute every stored MinHash under the current parameters, then
    /// rebuild the cache from scratch.
    pub fn reindex(&mut self, cancel: &CancelFlag) -> Result<ReindexReport> {
        let start = Instant::now();

        let mut rows: Vec<(String, String)> = Vec::new();
        self.store.for_each_snippet(&mut |snippet| {
            rows.push((snippet.checksum, snippet.code));
            Ok(())
        })?;

        // CPU-bound fingerprinting fans out; storage writes stay here.
        let ngram = self.config.ngram_size as usize;
        let generator = &self.generator;
        let signatures: Vec<(String, Vec<u8>, MinHashSignature)> = rows
            .into_par_iter()
            .map(|(checksum, code)| {
                let tokens = tokenize(&code, TokenizationMode::Generalize);
                let signature = generator.signature(&create_shingles(&tokens, ngram));
                let bytes = signature.to_bytes();
                (checksum, bytes, signature)
            })
            .collect();

        let mut index = LshIndex::new(self.params);
        let mut completed = 0usize;
        for (checksum, bytes, signature) in signatures {
            if cancel.is_cancelled() {
                // Partial progress is durable; force a clean rebuild next run.
                self.index = None;
                lsh::invalidate(&self.cache_dir);
                return Err(ResemblError::Cancelled { completed });
            }
            self.store.update_minhash(&checksum, &bytes)?;
            index.insert(&checksum, signature)?;
            completed += 1;
        }

        let params_value = self.signature_params_value();
        self.store.set_meta(SIGNATURE_PARAMS_KEY, &params_value)?;
        self.persist_cache(&index)?;
        self.index = Some(index);

        Ok(ReindexReport {
            num_reindexed: completed,
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }

    /// Delete all cache files and vacuum storage.
    pub fn clean(&mut self) -> Result<()> {
        self.index = None;
        lsh::invalidate(&self.cache_dir);
        self.store.vacuum()?;
        info!("cleaned cache directory and vacuumed storage");
        Ok(())
    }

    /// Merge every snippet and collection from `other` into this store.
    pub fn merge_from(&mut self, other: &dyn SnippetStore) -> Result<MergeReport> {
        self.claim_signature_params()?;
        if let Some(source_params) = other.get_meta(SIGNATURE_PARAMS_KEY)? {
            let value = self.signature_params_value();
            if source_params != value {
                return Err(ResemblError::stale_index(format!(
                    "source database fingerprints use parameters {source_params}, configuration is {value}"
                )));
            }
        }

        let mut report = MergeReport::default();

        for (collection, _) in other.collections()? {
            match self
                .store
                .create_collection(&collection.name, &collection.description)
            {
                Ok(_) => {}
                Err(ResemblError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let mut incoming: Vec<Snippet> = Vec::new();
        other.for_each_snippet(&mut |snippet| {
            incoming.push(snippet);
            Ok(())
        })?;

        for source in incoming {
            let existing = match self.store.get_by_checksum(&source.checksum) {
                Ok(snippet) => Some(snippet),
                Err(ResemblError::NotFound { .. }) => None,
                Err(e) => return Err(e),
            };

            let mut changed = false;
            for name in &source.names {
                // Rebinding a name that lives elsewhere is logged, exactly
                // as it would be for a direct add.
                let prior = match self.store.get_by_name(name)? {
                    Some(holder) => Some(holder.checksum),
                    None => self.store.latest_version_binding(name)?,
                };
                if let Some(previous) = &prior {
                    if previous != &source.checksum {
                        self.store.append_version(
                            name,
                            &source.checksum,
                            &source.code,
                            &source.minhash,
                        )?;
                    }
                }

                let already_present = existing
                    .as_ref()
                    .is_some_and(|s| s.names.iter().any(|n| n == name));
                self.store
                    .upsert_snippet(&source.checksum, &source.code, &source.minhash, name)?;
                if !already_present && existing.is_some() {
                    changed = true;
                }
            }

            for tag in &source.tags {
                let had = existing
                    .as_ref()
                    .is_some_and(|s| s.tags.iter().any(|t| t == tag));
                self.store.add_tag(&source.checksum, tag)?;
                if !had && existing.is_some() {
                    changed = true;
                }
            }

            if let Some(collection) = &source.collection {
                let local_has = existing.as_ref().and_then(|s| s.collection.as_ref());
                if local_has.is_none() {
                    self.store
                        .set_collection(&source.checksum, Some(collection))?;
                }
            }

            match existing {
                None => report.added += 1,
                Some(_) if changed => report.updated += 1,
                Some(_) => report.skipped += 1,
            }
        }

        // Membership changed wholesale; rebuild lazily on the next find.
        self.index = None;
        lsh::invalidate(&self.cache_dir);
        Ok(report)
    }

    /// Import every `.asm`/`.s` file under `dir` (recursively), one snippet
    /// per file, named by file stem.
    pub fn import_dir(&mut self, dir: &Path, cancel: &CancelFlag) -> Result<ImportReport> {
        self.claim_signature_params()?;

        let mut files = Vec::new();
        collect_import_files(dir, &mut files)?;
        files.sort();

        // Fan out fingerprinting; unreadable files are skipped, not fatal.
        let ngram = self.config.ngram_size as usize;
        let generator = &self.generator;
        let prepared: Vec<Option<(String, String, String, Vec<u8>)>> = files
            .par_iter()
            .map(|path| {
                let code = std::fs::read_to_string(path).ok()?;
                if code.trim().is_empty() {
                    return None;
                }
                let name = path.file_stem()?.to_string_lossy().into_owned();
                let checksum = string_checksum(&code);
                let tokens = tokenize(&code, TokenizationMode::Generalize);
                let bytes = generator.signature(&create_shingles(&tokens, ngram)).to_bytes();
                Some((name, code, checksum, bytes))
            })
            .collect();

        let mut report = ImportReport::default();
        let mut completed = 0usize;
        for item in prepared {
            if cancel.is_cancelled() {
                self.index = None;
                lsh::invalidate(&self.cache_dir);
                return Err(ResemblError::Cancelled { completed });
            }
            let Some((name, code, checksum, bytes)) = item else {
                report.skipped += 1;
                continue;
            };
            match self.store.upsert_snippet(&checksum, &code, &bytes, &name)? {
                UpsertOutcome::Created => report.created += 1,
                UpsertOutcome::Aliased => report.aliased += 1,
            }
            completed += 1;
        }

        self.index = None;
        lsh::invalidate(&self.cache_dir);
        info!(
            "imported {} snippets ({} aliases, {} skipped) from {}",
            report.created,
            report.aliased,
            report.skipped,
            dir.display()
        );
        Ok(report)
    }

    /// Export every snippet to `<dir>/<first-name>.asm`.
    pub fn export_dir(&self, dir: &Path) -> Result<ExportReport> {
        std::fs::create_dir_all(dir)
            .map_err(|e| ResemblError::io(format!("failed to create {}", dir.display()), e))?;

        let mut report = ExportReport::default();
        self.store.for_each_snippet(&mut |snippet| {
            let stem = sanitize_file_stem(snippet.primary_name());
            let stem = if stem.is_empty() {
                snippet.checksum[..12].to_string()
            } else {
                stem
            };
            let path = dir.join(format!("{stem}.asm"));

            // The sanitized stem contains no separators, so the target
            // cannot escape the export directory.
            std::fs::write(&path, &snippet.code)
                .map_err(|e| ResemblError::io(format!("failed to write {}", path.display()), e))?;
            report.num_exported += 1;
            Ok(())
        })?;
        Ok(report)
    }

    /// Render every snippet as a YARA string-match rule.
    pub fn write_yara_rules(&self, out: &mut dyn Write) -> Result<usize> {
        let mut exported = 0usize;

        self.store.for_each_snippet(&mut |snippet| {
            let rule_name = yara_rule_name(snippet.primary_name(), &snippet.checksum);
            let escaped = snippet
                .code
                .replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\r', "\\r")
                .replace('\n', "\\n");

            let rule = format!(
                "rule {rule_name} {{\n    meta:\n        description = \"resembl exported snippet: {}\"\n        checksum = \"{}\"\n    strings:\n        $asm = \"{escaped}\" nocase ascii wide\n    condition:\n        $asm\n}}\n\n",
                snippet.primary_name(),
                snippet.checksum,
            );
            out.write_all(rule.as_bytes())
                .map_err(|e| ResemblError::io("failed to write YARA rule", e))?;
            exported += 1;
            Ok(())
        })?;

        Ok(exported)
    }

    /// Corpus statistics over a deterministic sample.
    pub fn stats(&self) -> Result<EngineStats> {
        let mut num_snippets = 0usize;
        let mut total_tokens = 0usize;
        let mut vocabulary = std::collections::HashSet::new();
        let mut signatures = Vec::new();

        self.store.for_each_snippet(&mut |snippet| {
            num_snippets += 1;
            let tokens = tokenize(&snippet.code, TokenizationMode::Generalize);
            total_tokens += tokens.len();
            vocabulary.extend(tokens);
            if let Ok(signature) = MinHashSignature::from_bytes(&snippet.minhash) {
                signatures.push(signature);
            }
            Ok(())
        })?;

        let mean_token_count = if num_snippets == 0 {
            0.0
        } else {
            total_tokens as f64 / num_snippets as f64
        };

        Ok(EngineStats {
            num_snippets,
            mean_token_count,
            vocabulary_size: vocabulary.len(),
            mean_pairwise_jaccard: mean_pairwise_jaccard(&signatures),
        })
    }

    /// Version history for a name, oldest first.
    pub fn versions(&self, name: &str) -> Result<Vec<SnippetVersion>> {
        self.store.versions_for_name(name)
    }
}

/// Mean Jaccard over up to [`STATS_SAMPLE_PAIRS`] deterministic random
/// pairs. Fewer than two signatures yields 1.0.
fn mean_pairwise_jaccard(signatures: &[MinHashSignature]) -> f64 {
    if signatures.len() < 2 {
        return 1.0;
    }

    let mut rng = StdRng::seed_from_u64(STATS_SAMPLE_SEED);
    let mut total = 0.0;
    let mut pairs = 0usize;

    for _ in 0..STATS_SAMPLE_PAIRS {
        let i = rng.gen_range(0..signatures.len());
        let j = rng.gen_range(0..signatures.len());
        if i == j {
            continue;
        }
        if let Ok(jaccard) = signatures[i].jaccard(&signatures[j]) {
            total += jaccard;
            pairs += 1;
        }
    }

    if pairs == 0 {
        1.0
    } else {
        total / pairs as f64
    }
}

fn collect_import_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ResemblError::io(format!("failed to read {}", dir.display()), e))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| ResemblError::io(format!("failed to read {}", dir.display()), e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_import_files(&path, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMPORT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Reduce a snippet name to a safe file stem: path separators and parent
/// references stripped, everything else preserved.
fn sanitize_file_stem(name: &str) -> String {
    name.replace("..", "_")
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .collect()
}

/// YARA identifier for a snippet: `resembl_<name>_<checksum8>` with
/// non-alphanumeric characters replaced.
fn yara_rule_name(name: &str, checksum: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        cleaned = format!("snippet_{}", &checksum[..16.min(checksum.len())]);
    }
    if !cleaned.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        cleaned = format!("r_{cleaned}");
    }
    format!("resembl_{cleaned}_{}", &checksum[..8.min(checksum.len())])
}

/// Normalized view of a snippet, exposed for callers that need the
/// canonical form (diagnostics, external indexing).
pub fn normalized_form(code: &str) -> String {
    normalize(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use tempfile::TempDir;

    fn engine() -> (ResemblEngine<SqliteStore>, TempDir) {
        let cache = TempDir::new().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        let engine = ResemblEngine::new(
            store,
            ResemblConfig::default(),
            cache.path().to_path_buf(),
        )
        .unwrap();
        (engine, cache)
    }

    #[test]
    fn test_add_then_find_self() {
        let (mut engine, _cache) = engine();
        let code = "push ebp\nmov ebp, esp\nmov eax, [ebp+8]\nadd eax, 1\npop ebp\nret";
        let report = engine.add("inc_arg", code).unwrap();
        assert!(report.created);

        let matches = engine.find(code, 5, 0.0, true).unwrap();
        assert!(matches
            .iter()
            .any(|m| m.snippet.checksum == report.checksum));
        assert!(matches[0].hybrid > 99.0);
    }

    #[test]
    fn test_formatting_duplicate_aliases() {
        let (mut engine, _cache) = engine();
        let first = engine.add("f1", "mov eax, ebx ; hi\n ret").unwrap();
        assert!(first.created);
        let second = engine.add("f2", "MOV EAX, EBX\nRET").unwrap();
        assert!(!second.created);
        assert_eq!(first.checksum, second.checksum);

        let snippet = engine.get(&first.checksum).unwrap();
        assert_eq!(snippet.names, vec!["f1", "f2"]);
        assert_eq!(engine.store().count().unwrap(), 1);
    }

    #[test]
    fn test_find_threshold_filters() {
        let (mut engine, _cache) = engine();
        engine.add("a", "push ebp\nmov ebp, esp\nret").unwrap();

        let matches = engine
            .find("push ebp\nmov ebp, esp\nret", 5, 0.99, true)
            .unwrap();
        assert_eq!(matches.len(), 1);

        let matches = engine
            .find("cpuid\nrdtsc\nwrmsr\nhlt", 5, 0.5, true)
            .unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_cache_survives_and_rebuilds() {
        let cache = TempDir::new().unwrap();
        let db = cache.path().join("test.db");
        let code = "xor eax, eax\ninc eax\nret";

        let checksum = {
            let store = SqliteStore::open(&db).unwrap();
            let mut engine = ResemblEngine::new(
                store,
                ResemblConfig::default(),
                cache.path().to_path_buf(),
            )
            .unwrap();
            let report = engine.add("zero_one", code).unwrap();
            engine.find(code, 5, 0.0, true).unwrap();
            report.checksum
        };
        assert!(lsh::index_path(cache.path()).exists());

        // Removing the cache file changes nothing about the results.
        std::fs::remove_file(lsh::index_path(cache.path())).unwrap();
        let store = SqliteStore::open(&db).unwrap();
        let mut engine = ResemblEngine::new(
            store,
            ResemblConfig::default(),
            cache.path().to_path_buf(),
        )
        .unwrap();
        let matches = engine.find(code, 5, 0.0, true).unwrap();
        assert!(matches.iter().any(|m| m.snippet.checksum == checksum));
    }

    #[test]
    fn test_delete_updates_index() {
        let (mut engine, _cache) = engine();
        let code = "mov eax, 1\nret";
        let report = engine.add("one", code).unwrap();
        assert_eq!(engine.find(code, 5, 0.0, true).unwrap().len(), 1);

        engine.delete(&report.checksum[..8]).unwrap();
        assert!(engine.find(code, 5, 0.0, true).unwrap().is_empty());
        assert!(matches!(
            engine.get(&report.checksum).unwrap_err(),
            ResemblError::NotFound { .. }
        ));
    }

    #[test]
    fn test_compare_architecture_parity() {
        let (mut engine, _cache) = engine();
        // Same move-and-return shape on x86 and AArch64: the normalized
        // token streams agree entirely, so Jaccard saturates and the hybrid
        // clears 70 despite the register-spelling differences.
        let a = engine.add("x86", "mov eax, ebx\nret").unwrap();
        let b = engine.add("arm", "mov x0, x1\nret").unwrap();

        let output = engine.compare(&a.checksum[..10], &b.checksum[..10]).unwrap();
        assert!(output.report.jaccard > 0.95, "jaccard {}", output.report.jaccard);
        assert!(output.report.hybrid >= 70.0, "hybrid {}", output.report.hybrid);
        assert!(output.report.cfg_similarity > 0.99);
        assert_eq!(output.a.names, vec!["x86"]);
    }

    #[test]
    fn test_compare_memory_operands_across_dialects() {
        let (mut engine, _cache) = engine();
        let a = engine.add("x86_load", "mov eax, [ebp+8]\nret").unwrap();
        let b = engine.add("arm_load", "ldr w0, [x29, #8]\nret").unwrap();

        let output = engine.compare(&a.checksum[..10], &b.checksum[..10]).unwrap();
        // Both normalize to streams dominated by REG/IMM with identical
        // control flow; the raw-text Levenshtein keeps the hybrid modest.
        assert!(output.report.shared_tokens >= 4);
        assert!(output.report.cfg_similarity > 0.99);
        assert!(output.report.jaccard > 0.1);
        assert!(output.report.hybrid > 30.0);
    }

    #[test]
    fn test_version_log_on_rebinding() {
        let (mut engine, _cache) = engine();
        engine.add("f", "mov eax, 1\nret").unwrap();
        assert!(engine.versions("f").unwrap().is_empty());

        // Same name, different code: the rebinding is logged.
        let second = engine.add("f", "mov eax, 2\nxor ebx, ebx\nret").unwrap();
        let versions = engine.versions("f").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].checksum, second.checksum);

        // Re-adding identical code is not a rebinding.
        engine.add("f", "mov eax, 2\nxor ebx, ebx\nret").unwrap();
        assert_eq!(engine.versions("f").unwrap().len(), 1);
    }

    #[test]
    fn test_parameter_drift_requires_reindex() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("drift.db");

        {
            let mut engine = ResemblEngine::new(
                SqliteStore::open(&db).unwrap(),
                ResemblConfig::default(),
                dir.path().to_path_buf(),
            )
            .unwrap();
            engine.add("f", "mov eax, 1\nret").unwrap();
        }

        // Same width, different shingle size: byte-level checks cannot see
        // this, the recorded parameters can.
        let mut wider = ResemblConfig::default();
        wider.ngram_size = 4;
        let mut engine = ResemblEngine::new(
            SqliteStore::open(&db).unwrap(),
            wider,
            dir.path().to_path_buf(),
        )
        .unwrap();

        let err = engine.find("mov eax, 1\nret", 5, 0.0, true).unwrap_err();
        assert!(matches!(err, ResemblError::StaleIndex { .. }));
        let err = engine.add("g", "nop\nret").unwrap_err();
        assert!(matches!(err, ResemblError::StaleIndex { .. }));

        // Reindex re-records the parameters and recovers both paths.
        engine.reindex(&CancelFlag::new()).unwrap();
        engine.add("g", "nop\nret").unwrap();
        assert_eq!(engine.find("mov eax, 1\nret", 5, 0.0, true).unwrap().len(), 1);
    }

    #[test]
    fn test_reindex_rewrites_signatures() {
        let (mut engine, _cache) = engine();
        engine.add("a", "mov eax, 1\nret").unwrap();
        engine.add("b", "push ebp\npop ebp\nret").unwrap();

        let report = engine.reindex(&CancelFlag::new()).unwrap();
        assert_eq!(report.num_reindexed, 2);

        // Results unchanged after reindex.
        let matches = engine.find("mov eax, 1\nret", 5, 0.0, true).unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_reindex_cancellation() {
        let (mut engine, _cache) = engine();
        engine.add("a", "mov eax, 1\nret").unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = engine.reindex(&cancel).unwrap_err();
        assert!(matches!(err, ResemblError::Cancelled { completed: 0 }));
        // The store is intact and the next find rebuilds cleanly.
        assert_eq!(engine.find("mov eax, 1\nret", 5, 0.0, true).unwrap().len(), 1);
    }

    #[test]
    fn test_merge_unions_names_and_tags() {
        let (mut engine, _cache) = engine();
        engine.add("shared", "mov eax, 1\nret").unwrap();

        let mut other = SqliteStore::open_in_memory().unwrap();
        {
            let cache = TempDir::new().unwrap();
            let mut source_engine = ResemblEngine::new(
                SqliteStore::open_in_memory().unwrap(),
                ResemblConfig::default(),
                cache.path().to_path_buf(),
            )
            .unwrap();
            source_engine.add("alias2", "mov eax, 1\nret").unwrap();
            source_engine.add("unique", "cpuid\nret").unwrap();
            let report = source_engine.add("tagged", "cpuid\nret").unwrap();
            source_engine
                .store_mut()
                .add_tag(&report.checksum, "rare")
                .unwrap();

            // Copy the source store content into `other`.
            source_engine
                .store()
                .for_each_snippet(&mut |snippet| {
                    for name in &snippet.names {
                        other
                            .upsert_snippet(&snippet.checksum, &snippet.code, &snippet.minhash, name)
                            .unwrap();
                    }
                    for tag in &snippet.tags {
                        other.add_tag(&snippet.checksum, tag).unwrap();
                    }
                    Ok(())
                })
                .unwrap();
        }

        let report = engine.merge_from(&other).unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.updated, 1);

        let local = engine.store().get_by_name("alias2").unwrap().unwrap();
        assert!(local.names.contains(&"shared".to_string()));
        let rare = engine.store().get_by_name("unique").unwrap().unwrap();
        assert!(rare.tags.contains(&"rare".to_string()));

        // Merge idempotence: a second merge changes nothing.
        let again = engine.merge_from(&other).unwrap();
        assert_eq!(again.added, 0);
        assert_eq!(again.updated, 0);
        assert_eq!(again.skipped, 2);
    }

    #[test]
    fn test_import_and_export_roundtrip() {
        let (mut engine, _cache) = engine();
        let src = TempDir::new().unwrap();
        std::fs::write(src.path().join("alpha.asm"), "mov eax, 1\nret").unwrap();
        std::fs::write(src.path().join("beta.s"), "push ebp\npop ebp\nret").unwrap();
        std::fs::write(src.path().join("notes.txt"), "ignored").unwrap();

        let report = engine.import_dir(src.path(), &CancelFlag::new()).unwrap();
        assert_eq!(report.created, 2);

        let out = TempDir::new().unwrap();
        let export = engine.export_dir(out.path()).unwrap();
        assert_eq!(export.num_exported, 2);
        assert!(out.path().join("alpha.asm").exists());
        assert!(out.path().join("beta.asm").exists());
    }

    #[test]
    fn test_stats_shape() {
        let (mut engine, _cache) = engine();
        let empty = engine.stats().unwrap();
        assert_eq!(empty.num_snippets, 0);
        assert_eq!(empty.vocabulary_size, 0);

        engine.add("a", "mov eax, 1\nret").unwrap();
        engine.add("b", "mov ebx, 2\nret").unwrap();
        let stats = engine.stats().unwrap();
        assert_eq!(stats.num_snippets, 2);
        assert!(stats.mean_token_count > 0.0);
        assert!(stats.vocabulary_size >= 4);
        assert!((0.0..=1.0).contains(&stats.mean_pairwise_jaccard));
    }

    #[test]
    fn test_yara_rule_rendering() {
        let (mut engine, _cache) = engine();
        engine.add("weird name!", "mov eax, 1 ; \"quoted\"\nret").unwrap();

        let mut buffer = Vec::new();
        let count = engine.write_yara_rules(&mut buffer).unwrap();
        assert_eq!(count, 1);
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("rule resembl_weird_name_"));
        assert!(text.contains("nocase ascii wide"));
        assert!(text.contains("\\\"quoted\\\""));
        // The snippet body is escaped onto one line.
        assert!(text.contains("\\n"));
    }
}
