pub mod client;
pub mod docker;
pub mod executor;

pub use client::{BuildError, CheckResult, DockerClient, DoctorReport, InspectError};
pub use executor::{DockerExecutor, RealExecutor};
