//! MinHash fingerprinting: weighted shingling and signature generation.

pub mod shingles;
pub mod signature;

pub use shingles::{
    create_shingles, shingle_weight, Shingle, COMMON_INSTRUCTIONS, DEFAULT_NGRAM_SIZE,
    RARE_INSTRUCTIONS, SHINGLE_SEPARATOR,
};
pub use signature::{MinHashGenerator, MinHashSignature, MINHASH_SEED, NUM_PERMUTATIONS};
