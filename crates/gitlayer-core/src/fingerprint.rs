use std::fmt;

use sha2::{Digest, Sha256};

use crate::config::ArtifactConfig;

/// SHA-256 over the artifact options that shape the shipped payloads.
///
/// `interlayer_period` and `flush_cache` are deliberately left out: they
/// change scheduling, not content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigFingerprint(String);

impl ConfigFingerprint {
    pub fn of(config: &ArtifactConfig) -> Self {
        let mut hasher = Sha256::new();
        field(&mut hasher, Some(&config.target));
        field(&mut hasher, config.cwd.as_deref());
        hasher.update((config.paths.len() as u64).to_le_bytes());
        for path in &config.paths {
            field(&mut hasher, Some(path));
        }
        field(&mut hasher, config.owner.as_deref());
        field(&mut hasher, config.group.as_deref());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a previously persisted fingerprint.
    pub fn from_stored(value: &str) -> Self {
        Self(value.trim().to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Presence tag plus length prefix, so no two field lists share an encoding.
fn field(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        None => hasher.update([0u8]),
        Some(value) => {
            hasher.update([1u8]);
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
    }
}

impl fmt::Display for ConfigFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
