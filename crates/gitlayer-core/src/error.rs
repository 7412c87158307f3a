use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    // ── Artifact configuration ──
    #[error("invalid target path {target:?}: {reason}")]
    InvalidTarget { target: String, reason: &'static str },

    #[error("invalid {field} {value:?}: {reason}")]
    InvalidAccount {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("invalid path filter {pattern:?}: {reason}")]
    InvalidFilter { pattern: String, reason: String },

    #[error("invalid artifact {component} {value:?}: {reason}")]
    InvalidIdentity {
        component: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error(
        "artifact key '{key}' is configured more than once; set distinct `name`s in gitlayer.toml"
    )]
    DuplicateArtifact { key: String },
}
