//! User-key + timestamp encoding shared by the memtable, block codec, and
//! table iterators.
//!
//! A stored key is always `user_key || big_endian_u64(!timestamp)`. Inverting
//! the timestamp before appending means ascending byte order on the combined
//! key sorts by `(user_key asc, timestamp desc)` — the newest version of a
//! user key comes first among entries that share it, which is exactly the
//! order the merge iterator (`crate::table::merge`) relies on to let the
//! earliest (newest) source win on a tie.

const TS_LEN: usize = 8;

/// Appends the inverted-timestamp suffix to `user_key`, producing the key
/// actually stored in blocks and memtables.
pub fn key_with_ts(user_key: &[u8], timestamp: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(user_key.len() + TS_LEN);
    out.extend_from_slice(user_key);
    out.extend_from_slice(&(!timestamp).to_be_bytes());
    out
}

/// Strips the 8-byte timestamp suffix, returning the user-visible key.
///
/// Panics if `stored_key` is shorter than 8 bytes — callers only ever pass
/// keys produced by [`key_with_ts`], which are never that short.
pub fn parse_key(stored_key: &[u8]) -> &[u8] {
    &stored_key[..stored_key.len() - TS_LEN]
}

/// Recovers the original (non-inverted) timestamp from a stored key.
pub fn parse_ts(stored_key: &[u8]) -> u64 {
    let mut buf = [0u8; TS_LEN];
    buf.copy_from_slice(&stored_key[stored_key.len() - TS_LEN..]);
    !u64::from_be_bytes(buf)
}

/// Length, in bytes, of the user-key portion of a stored key.
pub fn user_key_len(stored_key: &[u8]) -> usize {
    stored_key.len() - TS_LEN
}

/// Length of the longest common prefix of two stored keys, used by the
/// block codec's prefix compression (§4.A).
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
