use std::path::{Path, PathBuf};

use gitlayer_core::Registration;

use crate::dockerfile::DockerfileGenerator;

/// Prepares a Docker build context from artifact registrations.
///
/// The context directory is recreated from scratch: every copy-in payload is
/// copied in under its destination name, and the generated Dockerfile is
/// written next to them.
pub fn create_context(
    context_dir: &Path,
    base_image: &str,
    registrations: &[Registration],
) -> Result<PathBuf, ContextError> {
    // Clean previous context
    if context_dir.exists() {
        std::fs::remove_dir_all(context_dir).map_err(|e| ContextError::Cleanup {
            path: context_dir.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::create_dir_all(context_dir).map_err(|e| ContextError::Create {
        path: context_dir.to_path_buf(),
        source: e,
    })?;

    for registration in registrations {
        let Registration::CopyIn {
            source,
            destination,
            ..
        } = registration
        else {
            continue;
        };
        std::fs::copy(source, context_dir.join(destination)).map_err(|e| {
            ContextError::CopyFile {
                path: source.clone(),
                source: e,
            }
        })?;
    }

    let dockerfile = DockerfileGenerator::new(base_image, registrations).render();
    let dockerfile_path = context_dir.join("Dockerfile");
    std::fs::write(&dockerfile_path, dockerfile).map_err(|e| ContextError::WriteDockerfile {
        path: dockerfile_path.clone(),
        source: e,
    })?;

    tracing::debug!(
        dir = %context_dir.display(),
        registrations = registrations.len(),
        "build context written"
    );
    Ok(context_dir.to_path_buf())
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("failed to clean up context directory {path}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create directory {path}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to copy payload {path}")]
    CopyFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write Dockerfile at {path}")]
    WriteDockerfile {
        path: PathBuf,
        source: std::io::Error,
    },
}
