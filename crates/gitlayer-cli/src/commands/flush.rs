use gitlayer_build::GitArtifact;

/// Purge cached payloads of every artifact, or only the one keyed `only`.
pub async fn flush(only: Option<String>) -> anyhow::Result<()> {
    let (project_dir, config) = super::load_project()?;

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let cache = super::cache_dir(&project_dir, &config);
        let mut flushed = 0usize;

        let resolved = super::resolve_artifacts(&project_dir, &config)?;
        for (entry, (repo, identity)) in config.artifacts.iter().zip(resolved) {
            let key = identity.key();
            if only.as_deref().is_some_and(|k| k != key) {
                continue;
            }

            let mut artifact = GitArtifact::open(repo, identity, entry.config.clone(), &cache)?;
            artifact.flush()?;
            println!("Flushed {key}");
            flushed += 1;
        }

        if let (Some(key), 0) = (&only, flushed) {
            anyhow::bail!("no artifact with key {key} — see `gitlayer status`");
        }
        Ok(())
    })
    .await?
}
