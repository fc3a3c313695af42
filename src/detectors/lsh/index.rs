//! Banded LSH index over MinHash signatures.
//!
//! Signatures are split into `bands` contiguous slices of `rows_per_band`
//! u64s; each slice hashes to a bucket key. Two snippets collide when any
//! band agrees. Inserts and removals are O(bands); removal is possible
//! because the index retains every member's signature.

use ahash::{AHashMap, AHashSet};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::core::errors::{ResemblError, Result};
use crate::detectors::minhash::MinHashSignature;

/// Seed for band-bucket hashing and index fingerprints.
const BAND_HASH_SEED: u64 = 0x4c53_4842_414e_4400;

/// Parameters an index was built under. A change in any field invalidates
/// every signature and bucket derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LshParams {
    /// Signature width
    pub num_permutations: u32,
    /// Number of bands
    pub bands: u32,
    /// Rows (u64 slots) per band; `bands * rows_per_band == num_permutations`
    pub rows_per_band: u32,
    /// Shingle size the signatures were generated with
    pub ngram_size: u32,
    /// Whether tokenization ran with generalization on
    pub generalize: bool,
}

impl LshParams {
    /// Pick the `(bands, rows)` factorisation of `num_permutations` whose
    /// collision curve `1 - (1 - s^r)^b` is closest to 0.5 at
    /// `s = threshold`. Ties break toward more bands (higher recall).
    pub fn tune(num_permutations: u32, ngram_size: u32, threshold: f64, generalize: bool) -> Result<Self> {
        let p = num_permutations;
        let mut best: Option<(f64, u32, u32)> = None;

        for bands in 2..=p / 2 {
            if p % bands != 0 {
                continue;
            }
            let rows = p / bands;
            if rows < 2 || bands > u32::from(u8::MAX) {
                continue;
            }
            let probability = 1.0 - (1.0 - threshold.powi(rows as i32)).powi(bands as i32);
            let distance = (probability - 0.5).abs();
            let candidate = (distance, bands, rows);
            best = match best {
                None => Some(candidate),
                Some(current) => {
                    // Strictly better distance, or equal distance with more bands.
                    if distance < current.0 - 1e-12
                        || ((distance - current.0).abs() <= 1e-12 && bands > current.1)
                    {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            };
        }

        let (_, bands, rows_per_band) = best.ok_or_else(|| {
            ResemblError::bad_input(format!(
                "num_permutations ({p}) admits no bands x rows factorisation"
            ))
        })?;

        Ok(Self {
            num_permutations: p,
            bands,
            rows_per_band,
            ngram_size,
            generalize,
        })
    }
}

/// In-memory banded LSH index.
#[derive(Debug, Clone)]
pub struct LshIndex {
    params: LshParams,
    /// `(band_index, bucket_key)` to member checksums
    buckets: AHashMap<(u8, u64), AHashSet<String>>,
    /// Member checksum to signature, retained for O(bands) removal and
    /// re-banding without a storage round trip
    signatures: AHashMap<String, MinHashSignature>,
}

impl LshIndex {
    /// Create an empty index.
    pub fn new(params: LshParams) -> Self {
        Self {
            params,
            buckets: AHashMap::new(),
            signatures: AHashMap::new(),
        }
    }

    /// Reassemble an index from previously serialised parts. Bucket
    /// contents are trusted as-is; used by the cache loader.
    pub fn from_parts(
        params: LshParams,
        signatures: AHashMap<String, MinHashSignature>,
        buckets: AHashMap<(u8, u64), AHashSet<String>>,
    ) -> Self {
        Self {
            params,
            buckets,
            signatures,
        }
    }

    /// Index parameters.
    pub fn params(&self) -> &LshParams {
        &self.params
    }

    /// Number of indexed snippets.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// True when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Member checksums in unspecified order.
    pub fn checksums(&self) -> impl Iterator<Item = &str> {
        self.signatures.keys().map(String::as_str)
    }

    /// The retained signature for a member, if indexed.
    pub fn signature(&self, checksum: &str) -> Option<&MinHashSignature> {
        self.signatures.get(checksum)
    }

    /// Bucket map, for serialisation.
    pub fn buckets(&self) -> &AHashMap<(u8, u64), AHashSet<String>> {
        &self.buckets
    }

    /// Insert a snippet. Re-inserting an existing checksum first removes the
    /// stale entry, so the index never holds two signatures for one key.
    pub fn insert(&mut self, checksum: &str, signature: MinHashSignature) -> Result<()> {
        if signature.num_permutations() != self.params.num_permutations as usize {
            return Err(ResemblError::stale_index(format!(
                "signature width {} does not match index width {}",
                signature.num_permutations(),
                self.params.num_permutations
            )));
        }

        if self.signatures.contains_key(checksum) {
            self.remove(checksum);
        }

        for (band, key) in band_keys(&self.params, &signature) {
            self.buckets
                .entry((band, key))
                .or_default()
                .insert(checksum.to_string());
        }
        self.signatures.insert(checksum.to_string(), signature);
        Ok(())
    }

    /// Remove a snippet. O(bands) thanks to the retained signature. Returns
    /// whether the checksum was present.
    pub fn remove(&mut self, checksum: &str) -> bool {
        let Some(signature) = self.signatures.remove(checksum) else {
            return false;
        };
        for (band, key) in band_keys(&self.params, &signature) {
            if let Some(members) = self.buckets.get_mut(&(band, key)) {
                members.remove(checksum);
                if members.is_empty() {
                    self.buckets.remove(&(band, key));
                }
            }
        }
        true
    }

    /// Candidate checksums for a query signature: the union of bucket
    /// members across all bands. No candidate is dropped before ranking.
    pub fn query(&self, signature: &MinHashSignature) -> AHashSet<String> {
        let mut candidates = AHashSet::new();
        if signature.num_permutations() != self.params.num_permutations as usize {
            return candidates;
        }
        for (band, key) in band_keys(&self.params, signature) {
            if let Some(members) = self.buckets.get(&(band, key)) {
                candidates.extend(members.iter().cloned());
            }
        }
        candidates
    }

    /// Fingerprint over `(params, sorted member checksums, count)`, used to
    /// detect divergence between a cached index and current storage.
    pub fn fingerprint(&self) -> u64 {
        let mut checksums: Vec<&str> = self.checksums().collect();
        checksums.sort_unstable();
        fingerprint_for(&self.params, &checksums)
    }
}

/// Band bucket keys of a signature under the given parameters.
fn band_keys(params: &LshParams, signature: &MinHashSignature) -> Vec<(u8, u64)> {
    signature
        .values()
        .chunks_exact(params.rows_per_band as usize)
        .enumerate()
        .map(|(band, slice)| (band as u8, hash_band(slice)))
        .collect()
}

/// Hash one band slice into a bucket key.
fn hash_band(slice: &[u64]) -> u64 {
    let mut bytes = Vec::with_capacity(slice.len() * 8);
    for v in slice {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    xxh3_64_with_seed(&bytes, BAND_HASH_SEED)
}

/// Expected fingerprint for `params` and an already-sorted checksum list.
pub fn fingerprint_for(params: &LshParams, sorted_checksums: &[&str]) -> u64 {
    let mut bytes = Vec::with_capacity(24 + sorted_checksums.len() * 64);
    bytes.extend_from_slice(&params.num_permutations.to_le_bytes());
    bytes.extend_from_slice(&params.bands.to_le_bytes());
    bytes.extend_from_slice(&params.rows_per_band.to_le_bytes());
    bytes.extend_from_slice(&params.ngram_size.to_le_bytes());
    bytes.push(params.generalize as u8);
    for checksum in sorted_checksums {
        bytes.extend_from_slice(checksum.as_bytes());
    }
    bytes.extend_from_slice(&(sorted_checksums.len() as u64).to_le_bytes());
    xxh3_64_with_seed(&bytes, BAND_HASH_SEED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::minhash::{create_shingles, MinHashGenerator};

    fn params() -> LshParams {
        LshParams::tune(128, 3, 0.5, true).unwrap()
    }

    fn sig_for(words: &[&str]) -> MinHashSignature {
        let tokens: Vec<String> = words.iter().map(|s| s.to_string()).collect();
        MinHashGenerator::new(128).signature(&create_shingles(&tokens, 3))
    }

    #[test]
    fn test_tuned_factorisation() {
        let p = params();
        assert_eq!(p.bands * p.rows_per_band, 128);
        assert!(p.bands >= 2 && p.rows_per_band >= 2);
    }

    #[test]
    fn test_identical_signature_always_collides() {
        let mut index = LshIndex::new(params());
        let sig = sig_for(&["MOV", "REG", ",", "REG", "RET"]);
        index.insert("aa11", sig.clone()).unwrap();

        let candidates = index.query(&sig);
        assert!(candidates.contains("aa11"));
    }

    #[test]
    fn test_dissimilar_signatures_do_not_collide() {
        let mut index = LshIndex::new(params());
        index
            .insert("aa11", sig_for(&["CPUID", "RDTSC", "WRMSR", "HLT"]))
            .unwrap();

        let query = sig_for(&["PUSH", "REG", "POP", "REG", "LEA"]);
        assert!(!index.query(&query).contains("aa11"));
    }

    #[test]
    fn test_remove_is_complete() {
        let mut index = LshIndex::new(params());
        let sig = sig_for(&["MOV", "REG", "IMM"]);
        index.insert("aa11", sig.clone()).unwrap();
        assert!(index.remove("aa11"));
        assert!(!index.remove("aa11"));
        assert!(index.query(&sig).is_empty());
        assert!(index.buckets().is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_reinsert_replaces() {
        let mut index = LshIndex::new(params());
        index.insert("aa11", sig_for(&["MOV", "REG", "IMM"])).unwrap();
        index.insert("aa11", sig_for(&["CPUID", "HLT", "UD2"])).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.query(&sig_for(&["CPUID", "HLT", "UD2"])).contains("aa11"));
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let mut index = LshIndex::new(params());
        let narrow = MinHashGenerator::new(64)
            .signature(&create_shingles(&["A".to_string(), "B".to_string()], 3));
        assert!(index.insert("aa11", narrow).is_err());
    }

    #[test]
    fn test_fingerprint_tracks_membership_and_params() {
        let mut index = LshIndex::new(params());
        let empty = index.fingerprint();
        index.insert("aa11", sig_for(&["MOV", "REG", "IMM"])).unwrap();
        let one = index.fingerprint();
        assert_ne!(empty, one);

        // Same membership, same fingerprint, regardless of insertion order.
        let mut other = LshIndex::new(params());
        other.insert("aa11", sig_for(&["MOV", "REG", "IMM"])).unwrap();
        assert_eq!(other.fingerprint(), one);

        // Parameter change shifts the expected fingerprint.
        let other_params = LshParams::tune(128, 4, 0.5, true).unwrap();
        assert_ne!(fingerprint_for(&other_params, &["aa11"]), one);
    }
}
