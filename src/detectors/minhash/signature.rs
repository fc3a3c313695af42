//! MinHash signatures: generation, Jaccard estimation, and the wire codec.
//!
//! Each signature is a fixed array of `P` u64 slots. Slot `i` holds the
//! minimum of `h_i(x) = (a_i * H(x) + b_i) mod M` over all input elements,
//! where `H` is xxh3 of the shingle bytes and `M = 2^61 - 1`. The
//! permutation parameters derive deterministically from [`MINHASH_SEED`],
//! so two runs over the same input are bit-identical.

use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::core::errors::{ResemblError, Result};
use crate::detectors::minhash::shingles::Shingle;

/// Default number of permutations.
pub const NUM_PERMUTATIONS: usize = 128;

/// Fixed seed for element hashing and permutation derivation.
pub const MINHASH_SEED: u64 = 0x5245_534D_424c_0001;

/// The Mersenne prime `2^61 - 1` used as the permutation modulus.
const MERSENNE_PRIME: u64 = (1 << 61) - 1;

/// Magic prefix of a serialised signature.
const SIGNATURE_MAGIC: &[u8; 4] = b"MHSG";

/// Separator between a shingle and its weight-variant counter. Cannot occur
/// inside a token.
const VARIANT_SEPARATOR: u8 = 0x1f;

/// A fixed-width MinHash signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinHashSignature {
    values: Vec<u64>,
}

impl MinHashSignature {
    /// Wrap precomputed slot values.
    pub fn from_values(values: Vec<u64>) -> Self {
        Self { values }
    }

    /// Number of permutations this signature was generated with.
    pub fn num_permutations(&self) -> usize {
        self.values.len()
    }

    /// Raw slot values.
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    /// Estimate Jaccard similarity as the fraction of agreeing slots.
    pub fn jaccard(&self, other: &Self) -> Result<f64> {
        if self.values.len() != other.values.len() {
            return Err(ResemblError::bad_input(format!(
                "signature width mismatch: {} vs {}",
                self.values.len(),
                other.values.len()
            )));
        }
        if self.values.is_empty() {
            return Ok(1.0);
        }

        let matching = self
            .values
            .iter()
            .zip(&other.values)
            .filter(|(a, b)| a == b)
            .count();
        Ok(matching as f64 / self.values.len() as f64)
    }

    /// Serialise: 4-byte magic, little-endian u32 `P`, then `P` little-endian
    /// u64 slots.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.values.len() * 8);
        out.extend_from_slice(SIGNATURE_MAGIC);
        out.extend_from_slice(&(self.values.len() as u32).to_le_bytes());
        for v in &self.values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Parse a serialised signature. Malformed input is a hard error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 || bytes[..4] != SIGNATURE_MAGIC[..] {
            return Err(ResemblError::bad_input("not a MinHash signature"));
        }
        let p = u32::from_le_bytes(bytes[4..8].try_into().expect("4 bytes")) as usize;
        let expected = 8 + p * 8;
        if bytes.len() != expected {
            return Err(ResemblError::bad_input(format!(
                "truncated signature: expected {expected} bytes, got {}",
                bytes.len()
            )));
        }

        let mut values = Vec::with_capacity(p);
        for chunk in bytes[8..].chunks_exact(8) {
            values.push(u64::from_le_bytes(chunk.try_into().expect("8 bytes")));
        }
        Ok(Self { values })
    }
}

/// Deterministic generator of MinHash signatures at a fixed width.
#[derive(Debug, Clone)]
pub struct MinHashGenerator {
    /// Per-permutation `(a_i, b_i)` parameters
    perms: Vec<(u64, u64)>,
}

impl MinHashGenerator {
    /// Create a generator for `num_permutations` slots. Parameters are drawn
    /// from [`MINHASH_SEED`]; `a_i` is always non-zero.
    pub fn new(num_permutations: usize) -> Self {
        let perms = (0..num_permutations as u64)
            .map(|i| {
                let a = xxh3_64_with_seed(&i.to_le_bytes(), MINHASH_SEED) % (MERSENNE_PRIME - 1) + 1;
                let b = xxh3_64_with_seed(&i.to_le_bytes(), MINHASH_SEED ^ u64::MAX)
                    % MERSENNE_PRIME;
                (a, b)
            })
            .collect();
        Self { perms }
    }

    /// Signature width.
    pub fn num_permutations(&self) -> usize {
        self.perms.len()
    }

    /// Compute the signature of a weighted shingle multiset.
    ///
    /// A shingle of weight `w` contributes `w` distinct variants (the
    /// shingle bytes, a `0x1F` separator, and a counter), amplifying its
    /// share of the variant-expanded set without defeating min idempotence.
    pub fn signature(&self, shingles: &[Shingle]) -> MinHashSignature {
        let mut values = vec![u64::MAX; self.perms.len()];

        for shingle in shingles {
            for variant in 0..shingle.weight {
                let element = self.element_hash(&shingle.text, variant);
                for (slot, &(a, b)) in values.iter_mut().zip(&self.perms) {
                    let h = permute(a, b, element);
                    if h < *slot {
                        *slot = h;
                    }
                }
            }
        }

        MinHashSignature::from_values(values)
    }

    fn element_hash(&self, text: &str, variant: u32) -> u64 {
        let mut bytes = Vec::with_capacity(text.len() + 5);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(VARIANT_SEPARATOR);
        bytes.extend_from_slice(&variant.to_le_bytes());
        xxh3_64_with_seed(&bytes, MINHASH_SEED)
    }
}

/// `(a * x + b) mod M` without overflow.
fn permute(a: u64, b: u64, x: u64) -> u64 {
    ((a as u128 * x as u128 + b as u128) % MERSENNE_PRIME as u128) as u64
}
