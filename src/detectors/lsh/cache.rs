//! On-disk LSH index cache.
//!
//! Single binary file, little-endian throughout, with a trailing CRC64 of
//! everything before it. Readers tolerate a missing file (rebuild) but never
//! a partial one: writes go to `<path>.tmp`, are fsynced, then renamed into
//! place. Any integrity failure is reported as `CorruptCache` and treated as
//! a missing cache by the orchestrator.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use ahash::{AHashMap, AHashSet};
use tracing::{debug, warn};

use crate::core::errors::{ResemblError, Result};
use crate::detectors::lsh::index::{LshIndex, LshParams};
use crate::detectors::minhash::MinHashSignature;

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "RESEMBL_CACHE_DIR";

/// Cache file magic.
const MAGIC: &[u8; 4] = b"RSMB";

/// Cache format version.
const VERSION: u16 = 1;

/// File name of the serialized index inside the cache directory.
const INDEX_FILE: &str = "lsh_index.bin";

/// File name of the advisory lock inside the cache directory.
const LOCK_FILE: &str = "resembl.lock";

/// CRC-64/XZ polynomial, reflected form.
const CRC64_POLY: u64 = 0xC96C_5795_D787_0F42;

/// Return the cache directory, respecting `RESEMBL_CACHE_DIR`.
pub fn cache_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("resembl")
}

/// Path of the index cache file under `dir`.
pub fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

/// Delete all cache files under `dir`. Missing files are fine.
pub fn invalidate(dir: &Path) {
    for name in [INDEX_FILE, &format!("{INDEX_FILE}.tmp")] {
        let path = dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => debug!("removed cache file {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("could not remove {}: {e}", path.display()),
        }
    }
}

/// Advisory lock on the cache directory. The holder may rewrite the cache
/// file; without it, writers degrade to invalidation only.
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
}

impl CacheLock {
    /// Try to acquire the lock. `None` means another process holds it.
    pub fn acquire(dir: &Path) -> Result<Option<Self>> {
        fs::create_dir_all(dir)
            .map_err(|e| ResemblError::io(format!("failed to create {}", dir.display()), e))?;
        let path = dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                Ok(Some(Self { path }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(ResemblError::io(
                format!("failed to create lock {}", path.display()),
                e,
            )),
        }
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Serialise `index` to `path` atomically: tmp file, fsync, rename.
pub fn save(index: &LshIndex, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ResemblError::io(format!("failed to create {}", parent.display()), e))?;
    }

    let bytes = encode(index)?;
    let tmp = path.with_extension("bin.tmp");

    let mut file = File::create(&tmp)
        .map_err(|e| ResemblError::io(format!("failed to create {}", tmp.display()), e))?;
    file.write_all(&bytes)
        .map_err(|e| ResemblError::io(format!("failed to write {}", tmp.display()), e))?;
    file.sync_all()
        .map_err(|e| ResemblError::io(format!("failed to sync {}", tmp.display()), e))?;
    drop(file);

    fs::rename(&tmp, path)
        .map_err(|e| ResemblError::io(format!("failed to rename into {}", path.display()), e))?;
    debug!("wrote LSH cache to {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Load the cached index from `path`. `Ok(None)` when the file does not
/// exist; `CorruptCache` on any integrity failure.
pub fn load(path: &Path) -> Result<Option<LshIndex>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ResemblError::io(format!("failed to read {}", path.display()), e)),
    };
    decode(&bytes).map(Some)
}

fn encode(index: &LshIndex) -> Result<Vec<u8>> {
    let params = index.params();
    let p = params.num_permutations as usize;

    let mut out = Vec::with_capacity(64 + index.len() * (32 + p * 8));
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&u16::from(params.generalize).to_le_bytes());
    out.extend_from_slice(&params.num_permutations.to_le_bytes());
    out.extend_from_slice(&params.ngram_size.to_le_bytes());
    out.extend_from_slice(&params.bands.to_le_bytes());
    out.extend_from_slice(&params.rows_per_band.to_le_bytes());
    out.extend_from_slice(&index.fingerprint().to_le_bytes());

    // Signature entries, keyed by raw checksum bytes, in sorted order so the
    // encoding is canonical.
    let mut checksums: Vec<&str> = index.checksums().collect();
    checksums.sort_unstable();
    out.extend_from_slice(&(checksums.len() as u64).to_le_bytes());
    for checksum in &checksums {
        out.extend_from_slice(&decode_checksum(checksum)?);
        let signature = index.signature(checksum).expect("member signature");
        for v in signature.values() {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    // Bucket map.
    let mut buckets: Vec<(&(u8, u64), &AHashSet<String>)> = index.buckets().iter().collect();
    buckets.sort_unstable_by_key(|((band, key), _)| (*band, *key));
    out.extend_from_slice(&(buckets.len() as u64).to_le_bytes());
    for ((band, key), members) in buckets {
        out.push(*band);
        out.extend_from_slice(&key.to_le_bytes());
        out.extend_from_slice(&(members.len() as u32).to_le_bytes());
        let mut sorted: Vec<&String> = members.iter().collect();
        sorted.sort_unstable();
        for member in sorted {
            out.extend_from_slice(&decode_checksum(member)?);
        }
    }

    let crc = crc64(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

fn decode(bytes: &[u8]) -> Result<LshIndex> {
    let mut reader = Reader::new(bytes);

    // The CRC trailer guards everything before it.
    if bytes.len() < 8 {
        return Err(ResemblError::corrupt_cache("file shorter than CRC trailer"));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - 8);
    let stored_crc = u64::from_le_bytes(trailer.try_into().expect("8 bytes"));
    if crc64(body) != stored_crc {
        return Err(ResemblError::corrupt_cache("CRC64 mismatch"));
    }
    reader.limit(body.len());

    if reader.take(4)? != MAGIC.as_slice() {
        return Err(ResemblError::corrupt_cache("bad magic"));
    }
    let version = reader.u16()?;
    if version != VERSION {
        return Err(ResemblError::corrupt_cache(format!(
            "unsupported cache version {version}"
        )));
    }
    let flags = reader.u16()?;
    let num_permutations = reader.u32()?;
    let ngram_size = reader.u32()?;
    let bands = reader.u32()?;
    let rows_per_band = reader.u32()?;
    if bands
        .checked_mul(rows_per_band)
        .map_or(true, |product| product != num_permutations)
    {
        return Err(ResemblError::corrupt_cache("bands * rows != num_permutations"));
    }
    let params = LshParams {
        num_permutations,
        bands,
        rows_per_band,
        ngram_size,
        generalize: flags & 1 != 0,
    };
    let stored_fingerprint = reader.u64()?;

    let n_entries = reader.u64()? as usize;
    let mut signatures = AHashMap::with_capacity(n_entries);
    for _ in 0..n_entries {
        let checksum = encode_checksum(reader.take(32)?);
        let mut values = Vec::with_capacity(num_permutations as usize);
        for _ in 0..num_permutations {
            values.push(reader.u64()?);
        }
        signatures.insert(checksum, MinHashSignature::from_values(values));
    }

    let n_buckets = reader.u64()? as usize;
    let mut buckets: AHashMap<(u8, u64), AHashSet<String>> = AHashMap::with_capacity(n_buckets);
    for _ in 0..n_buckets {
        let band = reader.u8()?;
        let key = reader.u64()?;
        let count = reader.u32()? as usize;
        let mut members = AHashSet::with_capacity(count);
        for _ in 0..count {
            let checksum = encode_checksum(reader.take(32)?);
            if !signatures.contains_key(&checksum) {
                return Err(ResemblError::corrupt_cache(
                    "bucket references an unknown checksum",
                ));
            }
            members.insert(checksum);
        }
        buckets.insert((band, key), members);
    }

    if !reader.is_exhausted() {
        return Err(ResemblError::corrupt_cache("trailing bytes after bucket table"));
    }

    let index = LshIndex::from_parts(params, signatures, buckets);
    if index.fingerprint() != stored_fingerprint {
        return Err(ResemblError::corrupt_cache(
            "fingerprint does not match membership",
        ));
    }
    Ok(index)
}

/// Bitwise CRC-64/XZ (reflected), in the manner of a table-free zlib CRC.
pub fn crc64(data: &[u8]) -> u64 {
    let mut crc: u64 = !0;
    for &byte in data {
        crc ^= u64::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC64_POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

fn decode_checksum(hex: &str) -> Result<[u8; 32]> {
    if hex.len() != 64 {
        return Err(ResemblError::bad_input(format!(
            "checksum must be 64 hex characters, got {}",
            hex.len()
        )));
    }
    let mut out = [0u8; 32];
    for (i, chunk) in hex.as_bytes().chunks_exact(2).enumerate() {
        let high = hex_nibble(chunk[0])?;
        let low = hex_nibble(chunk[1])?;
        out[i] = (high << 4) | low;
    }
    Ok(out)
}

fn hex_nibble(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(ResemblError::bad_input("invalid hex digit in checksum")),
    }
}

fn encode_checksum(bytes: &[u8]) -> String {
    crate::lang::tokenizer::hex_encode(bytes)
}

/// Little-endian cursor over a byte slice.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            end: bytes.len(),
        }
    }

    fn limit(&mut self, end: usize) {
        self.end = end;
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.end {
            return Err(ResemblError::corrupt_cache("unexpected end of cache file"));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("2 bytes")))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("4 bytes")))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("8 bytes")))
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.end
    }
}
