use thiserror::Error;

/// Failure modes of [`crate::StagingCache`].
///
/// Mirrors the capacity failures the source's `KVCache` reports; the
/// connection-level fallout (reconnect vs. teardown) is decided by the
/// caller, not by this crate.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("entry would grow past the per-key byte bound")]
    EntryTooLarge,
    #[error("active key set is at capacity")]
    ActiveSetFull,
}
