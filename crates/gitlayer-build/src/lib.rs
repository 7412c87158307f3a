//! Incremental git artifacts for container image builds.
//!
//! # Materialize pipeline
//!
//! ```text
//! GitArtifact::materialize
//!   1. Guard        ── flock <key>.atomizer, roll back an interrupted commit
//!   2. Invalidate   ── <key>.paramshash differs (or flush) → purge everything
//!   3. Read state   ── snapshot, layers 0001..N, latest
//!   4. Decide       ── snapshot | layer | latest | no-op
//!   5. Package      ── tar.gz snapshot or gzipped patch
//!   6. Commit       ── journal, rename *.partial into place, remove superseded
//!   7. Register     ── copy-in + apply command at prepare/build/setup
//! ```
//!
//! # Layering
//!
//! The first run ships the whole tree as a snapshot (`prepare` step).
//! Later changes become a *latest* patch against the newest checkpoint
//! (`setup` step) until the newest checkpoint is older than the
//! interlayer period; the next change is then cut as a numbered *layer*
//! (`build` step) and the latest patch is dropped.
//!
//! # Build context
//!
//! [`create_context`] copies every registered payload into a directory and
//! writes a Dockerfile rendered by [`DockerfileGenerator`].

pub mod artifact;
pub mod clock;
pub mod context;
pub mod differ;
pub mod dockerfile;
pub mod git;
pub mod guard;
pub mod invalidator;
pub mod packager;
pub mod scheduler;
pub mod store;

pub use artifact::{ArtifactError, GitArtifact, Outcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::create_context;
pub use dockerfile::DockerfileGenerator;
pub use git::GitRepo;
pub use store::{ArtifactState, CacheDir, Checkpoint, Record, Store};
