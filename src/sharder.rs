//! Sharder implementation.

/// Maps an input to a deterministic integer bucket in `[0, total_shards)`.
///
/// Determinism is the load-bearing property: the same subject must land in the same bucket
/// across SDK implementations in every language, otherwise experiment membership disagrees
/// across platforms.
pub trait Sharder {
    /// Return the bucket for `input` in `[0, total_shards)`.
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u64) -> u64;
}

/// The default (and only) sharder.
///
/// Hashes the input with md5 and reduces the first four digest bytes (big-endian) modulo the
/// total. The digest is bit-stable across platforms.
pub struct Md5Sharder;

impl Sharder for Md5Sharder {
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u64) -> u64 {
        let hash = md5::compute(input);
        let value = u32::from_be_bytes(hash[0..4].try_into().unwrap());
        (value as u64) % total_shards
    }
}
