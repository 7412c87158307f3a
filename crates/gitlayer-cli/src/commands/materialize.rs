use std::path::PathBuf;

use gitlayer_build::{GitArtifact, create_context};
use gitlayer_core::Registration;

/// Materialize every artifact, then render the build context.
///
/// Returns the context directory.
pub async fn materialize() -> anyhow::Result<PathBuf> {
    let (project_dir, config) = super::load_project()?;

    // git and the cache are driven synchronously
    let context_dir = tokio::task::spawn_blocking(move || -> anyhow::Result<PathBuf> {
        let cache = super::cache_dir(&project_dir, &config);
        let mut registrations: Vec<Registration> = Vec::new();

        let resolved = super::resolve_artifacts(&project_dir, &config)?;
        for (entry, (repo, identity)) in config.artifacts.iter().zip(resolved) {
            let key = identity.key();
            let mut artifact = GitArtifact::open(repo, identity, entry.config.clone(), &cache)?;

            let mut published: Vec<Registration> = Vec::new();
            let outcome = artifact.materialize(&mut published)?;
            println!("{key}: {outcome}");

            artifact.register_all(&mut registrations)?;
        }

        let context_dir = project_dir.join(&config.project.context_dir);
        let dir = create_context(&context_dir, &config.image.base_image, &registrations)?;
        tracing::debug!(dir = %dir.display(), registrations = registrations.len(), "rendered build context");
        Ok(dir)
    })
    .await??;

    println!("Build context: {}", context_dir.display());
    Ok(context_dir)
}
