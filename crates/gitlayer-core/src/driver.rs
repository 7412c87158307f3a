//! Container build driver collaborator.
//!
//! Artifacts do not talk to a container engine. They describe what must
//! happen at which build step as [`Registration`]s, and a driver turns those
//! into engine instructions.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Named build phases, in the order they run inside an image build.
///
/// Full snapshots go to `Prepare`, durable layer patches to `Build`, and
/// the ever-changing latest patch to `Setup`, so a source change only
/// invalidates the image layers after the earliest step it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStep {
    Prepare,
    Build,
    Setup,
}

impl BuildStep {
    pub const ALL: [BuildStep; 3] = [BuildStep::Prepare, BuildStep::Build, BuildStep::Setup];

    pub fn as_str(self) -> &'static str {
        match self {
            BuildStep::Prepare => "prepare",
            BuildStep::Build => "build",
            BuildStep::Setup => "setup",
        }
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instruction for the build driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Registration {
    /// Copy a payload from the cache into the image.
    CopyIn {
        /// Payload file in the cache directory
        source: PathBuf,
        /// File name the payload travels under
        destination: String,
        /// Directory inside the image the payload lands in
        target: String,
        step: BuildStep,
    },
    /// Run a command inside the image.
    Run {
        apply: String,
        cleanup: String,
        step: BuildStep,
    },
}

impl Registration {
    pub fn step(&self) -> BuildStep {
        match self {
            Registration::CopyIn { step, .. } | Registration::Run { step, .. } => *step,
        }
    }
}

/// Receives registrations from artifacts.
pub trait BuildDriver {
    fn register_copy_in(&mut self, source: PathBuf, destination: String, target: String, step: BuildStep);

    fn register_run(&mut self, apply: String, cleanup: String, step: BuildStep);
}

/// Collects registrations in order, for rendering later.
impl BuildDriver for Vec<Registration> {
    fn register_copy_in(&mut self, source: PathBuf, destination: String, target: String, step: BuildStep) {
        self.push(Registration::CopyIn {
            source,
            destination,
            target,
            step,
        });
    }

    fn register_run(&mut self, apply: String, cleanup: String, step: BuildStep) {
        self.push(Registration::Run {
            apply,
            cleanup,
            step,
        });
    }
}
