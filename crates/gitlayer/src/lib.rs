//! Ship git branches into container images as incremental layers.
//!
//! This is the unified facade crate that re-exports all gitlayer sub-crates.
//! Use feature flags to control which components are included.
//!
//! # Feature flags
//!
//! | Feature | Default | Crate | Description |
//! |---------|---------|-------|-------------|
//! | `core` | yes | [`gitlayer-core`](https://crates.io/crates/gitlayer-core) | Configuration, identity, and collaborator traits |
//! | `build` | yes | [`gitlayer-build`](https://crates.io/crates/gitlayer-build) | Artifact cache, layer scheduling, Dockerfile generation |
//! | `docker` | yes | [`gitlayer-docker`](https://crates.io/crates/gitlayer-docker) | Docker CLI client |
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use gitlayer::{ArtifactConfig, ArtifactIdentity, Registration};
//! use gitlayer::build::{CacheDir, GitArtifact, GitRepo};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = GitRepo::open(Path::new("."))?;
//! let identity = ArtifactIdentity::new(repo.name(), None, "master")?;
//! let cache = CacheDir::new(".gitlayer/cache");
//!
//! let mut artifact = GitArtifact::open(repo, identity, ArtifactConfig::new("/app"), &cache)?;
//! let mut registrations: Vec<Registration> = Vec::new();
//! let outcome = artifact.materialize(&mut registrations)?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

// Core types flattened into root namespace for convenience.
#[cfg(feature = "core")]
pub use gitlayer_core::*;

/// Artifact cache, layer scheduling, and build context generation.
///
/// See [`gitlayer-build`](https://crates.io/crates/gitlayer-build) for details.
#[cfg(feature = "build")]
pub mod build {
    pub use gitlayer_build::*;
}

/// Docker CLI operations.
///
/// See [`gitlayer-docker`](https://crates.io/crates/gitlayer-docker) for details.
#[cfg(feature = "docker")]
pub mod docker {
    pub use gitlayer_docker::*;
}
