//! Cache invalidator: purge an artifact whose configuration drifted.

use gitlayer_core::ConfigFingerprint;

use crate::guard::{CommitError, Transaction};
use crate::store::{Store, StoreError};

/// How the stored fingerprint relates to the current configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Fingerprints match; cached payloads stay valid.
    Current,
    /// Nothing recorded yet.
    Initial,
    /// The configuration changed since the payloads were cut.
    Drifted,
    /// A flush was requested.
    Flushed,
}

impl Verdict {
    pub fn check(
        stored: Option<&ConfigFingerprint>,
        current: &ConfigFingerprint,
        force_flush: bool,
    ) -> Self {
        match stored {
            _ if force_flush => Verdict::Flushed,
            None => Verdict::Initial,
            Some(stored) if stored == current => Verdict::Current,
            Some(_) => Verdict::Drifted,
        }
    }

    pub fn needs_purge(self) -> bool {
        self != Verdict::Current
    }
}

/// Queue removal of every file of the artifact except its lock, and record
/// `fingerprint` as the new configuration.
pub fn purge(
    store: &Store,
    tx: &mut Transaction<'_>,
    fingerprint: &ConfigFingerprint,
) -> Result<(), PurgeError> {
    for path in store.owned_files()? {
        tx.remove(&path);
    }
    tx.stage(&store.paramshash_path(), format!("{fingerprint}\n").as_bytes())?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PurgeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Commit(#[from] CommitError),
}
