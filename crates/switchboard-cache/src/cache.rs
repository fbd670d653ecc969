use std::collections::HashMap;

use crate::CacheError;

/// Tuning knobs for [`StagingCache`].
///
/// `max_entries` mirrors the source's total preallocated slab size; this
/// rendition backs the cache with a plain `HashMap` instead of a slab, so
/// the bound actually enforced against incoming keys is `max_active`
/// (the live working-set size). `max_entries` is kept on the struct for
/// parity with the source's tuning knobs and as headroom for a future
/// slab-backed implementation.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_active: usize,
    pub max_entry_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 100_000, max_active: 20_000, max_entry_bytes: 2048 }
    }
}

/// A fixed-capacity key (`i64`) → bytes store for per-connection residual
/// send/receive buffers.
///
/// `put` appends logically: a second `put` for the same key concatenates
/// onto whatever bytes are already staged rather than replacing them. This
/// is the append semantics the source's read-then-write callers rely on,
/// made explicit (see the open question in the spec this crate implements).
pub struct StagingCache {
    entries: HashMap<i64, Vec<u8>>,
    config: CacheConfig,
}

impl StagingCache {
    pub fn new(config: CacheConfig) -> Self {
        Self { entries: HashMap::with_capacity(config.max_active.min(1024)), config }
    }

    /// Appends `bytes` to whatever is staged under `key`, creating the
    /// entry if absent.
    ///
    /// Fails without mutating the cache if the append would push the
    /// entry past `max_entry_bytes`, or if `key` is new and the cache is
    /// already holding `max_active` distinct keys.
    pub fn put(&mut self, key: i64, bytes: &[u8]) -> Result<(), CacheError> {
        if bytes.is_empty() && self.entries.contains_key(&key) {
            return Ok(());
        }

        if let Some(existing) = self.entries.get(&key) {
            if existing.len() + bytes.len() > self.config.max_entry_bytes {
                return Err(CacheError::EntryTooLarge);
            }
        } else {
            if bytes.len() > self.config.max_entry_bytes {
                return Err(CacheError::EntryTooLarge);
            }
            if self.entries.len() >= self.config.max_active {
                return Err(CacheError::ActiveSetFull);
            }
        }

        self.entries.entry(key).or_default().extend_from_slice(bytes);
        Ok(())
    }

    /// Removes and returns all bytes staged for `key`, if any.
    pub fn take(&mut self, key: i64) -> Option<Vec<u8>> {
        self.entries.remove(&key)
    }

    /// Drops the entry for `key` if present, discarding its bytes.
    pub fn del(&mut self, key: i64) {
        self.entries.remove(&key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
