use std::time::{SystemTime, UNIX_EPOCH};

use gitlayer_build::guard::Guard;
use gitlayer_build::{ArtifactState, Checkpoint, Record};
use gitlayer_core::{ArtifactEntry, ConfigFingerprint};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ArtifactStatus {
    key: String,
    branch: String,
    target: String,
    /// `current`, `drifted`, or `unrecorded`
    config: &'static str,
    snapshot: Option<CheckpointStatus>,
    layers: Vec<CheckpointStatus>,
    latest: Option<CheckpointStatus>,
    stale_files: usize,
}

#[derive(Debug, Serialize)]
struct CheckpointStatus {
    record: String,
    commit: String,
    /// Seconds since the Unix epoch
    recorded_at: u64,
}

/// Print the committed cache state of every artifact without modifying it.
pub async fn status(json: bool) -> anyhow::Result<()> {
    let (project_dir, config) = super::load_project()?;

    let statuses = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<ArtifactStatus>> {
        let cache = super::cache_dir(&project_dir, &config);
        let resolved = super::resolve_artifacts(&project_dir, &config)?;
        config
            .artifacts
            .iter()
            .zip(&resolved)
            .map(|(entry, (_, identity))| {
                let store = cache.store(identity);
                let state = {
                    let _guard = Guard::acquire(&store.atomizer_path(), cache.lock_timeout())?;
                    store.read()?
                };
                describe(entry, store.key(), &state)
            })
            .collect()
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    for (i, status) in statuses.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{} -> {}", status.key, status.target);
        println!("  {:<12} {}", "config", status.config);
        let checkpoints = status
            .snapshot
            .iter()
            .chain(&status.layers)
            .chain(&status.latest);
        let mut any = false;
        for checkpoint in checkpoints {
            any = true;
            println!(
                "  {:<12} {}  {}",
                checkpoint.record,
                short(&checkpoint.commit),
                age(now.saturating_sub(checkpoint.recorded_at))
            );
        }
        if !any {
            println!("  (empty, next materialize ships a snapshot)");
        }
        if status.stale_files > 0 {
            println!("  {} stale file(s), removed on next materialize", status.stale_files);
        }
    }

    Ok(())
}

fn describe(entry: &ArtifactEntry, key: &str, state: &ArtifactState) -> anyhow::Result<ArtifactStatus> {
    let current = ConfigFingerprint::of(&entry.config);
    let config = match &state.config_hash {
        None => "unrecorded",
        Some(stored) if *stored == current => "current",
        Some(_) => "drifted",
    };

    Ok(ArtifactStatus {
        key: key.to_owned(),
        branch: entry.branch.clone(),
        target: entry.config.target.clone(),
        config,
        snapshot: state.snapshot.as_ref().map(checkpoint_status).transpose()?,
        layers: state
            .layers
            .iter()
            .map(checkpoint_status)
            .collect::<anyhow::Result<_>>()?,
        latest: state.latest.as_ref().map(checkpoint_status).transpose()?,
        stale_files: state.stale.len(),
    })
}

fn checkpoint_status(checkpoint: &Checkpoint) -> anyhow::Result<CheckpointStatus> {
    let record = match checkpoint.record {
        Record::Snapshot => "snapshot".to_owned(),
        Record::Layer(n) => format!("layer {n:04}"),
        Record::Latest => "latest".to_owned(),
    };
    Ok(CheckpointStatus {
        record,
        commit: checkpoint.commit.clone(),
        recorded_at: checkpoint.recorded_at.duration_since(UNIX_EPOCH)?.as_secs(),
    })
}

fn short(commit: &str) -> &str {
    &commit[..commit.len().min(12)]
}

/// Coarse human-readable age, e.g. `3d 4h ago`.
fn age(secs: u64) -> String {
    let (days, hours, minutes) = (secs / 86_400, secs % 86_400 / 3_600, secs % 3_600 / 60);
    match (days, hours, minutes) {
        (0, 0, 0) => "just now".to_owned(),
        (0, 0, m) => format!("{m}m ago"),
        (0, h, _) => format!("{h}h ago"),
        (d, h, _) => format!("{d}d {h}h ago"),
    }
}
