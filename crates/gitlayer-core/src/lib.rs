//! Core types and configuration for gitlayer.
//!
//! This crate defines the `gitlayer.toml` schema ([`GitlayerConfig`]),
//! artifact identity and options ([`ArtifactIdentity`], [`ArtifactConfig`],
//! [`ConfigFingerprint`]), the collaborator traits the artifact state
//! machine consumes ([`SourceRepo`], [`BuildDriver`]), and shared error types.

pub mod config;
pub mod driver;
pub mod error;
pub mod fingerprint;
pub mod identity;
pub mod source;

pub use config::{
    ArtifactConfig, ArtifactEntry, GitlayerConfig, ImageConfig, ProjectConfig, ensure_distinct,
};
pub use driver::{BuildDriver, BuildStep, Registration};
pub use error::{Error, Result};
pub use fingerprint::ConfigFingerprint;
pub use identity::ArtifactIdentity;
pub use source::{PathFilter, SourceError, SourceRepo};
