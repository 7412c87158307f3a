//! [`GitArtifact`]: one tracked tree and the cache records that ship it.

use std::fmt;
use std::time::{Duration, SystemTime};

use gitlayer_core::{
    ArtifactConfig, ArtifactIdentity, BuildDriver, BuildStep, ConfigFingerprint, SourceRepo,
};

use crate::clock::{Clock, SystemClock};
use crate::differ::DiffError;
use crate::guard::{CommitError, Guard, LockError, Transaction};
use crate::invalidator::{self, PurgeError, Verdict};
use crate::packager::{PackageError, Packager};
use crate::scheduler::{Decision, Scheduler};
use crate::store::{ArtifactState, CacheDir, Record, Store, StoreError};

/// Where patches are unpacked inside the image before they are applied.
const PATCH_STAGING_DIR: &str = "/tmp";

/// What one [`GitArtifact::materialize`] call published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Snapshot { commit: String },
    Layer { number: u32, commit: String },
    Latest { commit: String },
    NoOp,
}

impl Outcome {
    fn record(&self) -> Option<Record> {
        match self {
            Outcome::Snapshot { .. } => Some(Record::Snapshot),
            Outcome::Layer { number, .. } => Some(Record::Layer(*number)),
            Outcome::Latest { .. } => Some(Record::Latest),
            Outcome::NoOp => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Snapshot { commit } => write!(f, "snapshot at {}", short(commit)),
            Outcome::Layer { number, commit } => {
                write!(f, "layer {number:04} at {}", short(commit))
            }
            Outcome::Latest { commit } => write!(f, "latest patch at {}", short(commit)),
            Outcome::NoOp => f.write_str("up to date"),
        }
    }
}

fn short(commit: &str) -> &str {
    &commit[..commit.len().min(12)]
}

/// A tree from a git branch, shipped into an image as a snapshot followed
/// by layer patches and a latest patch.
///
/// Every operation runs under the artifact's [`Guard`], so concurrent
/// processes working on the same identity are serialized.
pub struct GitArtifact<S, C = SystemClock> {
    source: S,
    identity: ArtifactIdentity,
    config: ArtifactConfig,
    fingerprint: ConfigFingerprint,
    store: Store,
    lock_timeout: Duration,
    clock: C,
    state: ArtifactState,
}

impl<S: SourceRepo> GitArtifact<S, SystemClock> {
    /// Validate `config`, then purge cached payloads if the configuration
    /// changed or `flush_cache` is set.
    pub fn open(
        source: S,
        identity: ArtifactIdentity,
        config: ArtifactConfig,
        cache: &CacheDir,
    ) -> Result<Self, ArtifactError> {
        Self::open_with_clock(source, identity, config, cache, SystemClock)
    }
}

impl<S: SourceRepo, C: Clock> GitArtifact<S, C> {
    pub fn open_with_clock(
        source: S,
        identity: ArtifactIdentity,
        config: ArtifactConfig,
        cache: &CacheDir,
        clock: C,
    ) -> Result<Self, ArtifactError> {
        config.validate()?;

        let mut artifact = Self {
            source,
            store: cache.store(&identity),
            identity,
            fingerprint: ConfigFingerprint::of(&config),
            config,
            lock_timeout: cache.lock_timeout(),
            clock,
            state: ArtifactState::default(),
        };
        let mut guard = artifact.lock()?;
        artifact.state = artifact.reconcile(&mut guard, artifact.config.flush_cache)?;
        Ok(artifact)
    }

    pub fn identity(&self) -> &ArtifactIdentity {
        &self.identity
    }

    pub fn config(&self) -> &ArtifactConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// State as of this artifact's last committed operation.
    pub fn state(&self) -> &ArtifactState {
        &self.state
    }

    /// Bring the cache up to the branch head and register the new payload.
    ///
    /// At most one payload is published per call: a snapshot when there is
    /// none, otherwise a layer or latest patch against the highest checkpoint.
    pub fn materialize<D: BuildDriver + ?Sized>(
        &mut self,
        driver: &mut D,
    ) -> Result<Outcome, ArtifactError> {
        let mut guard = self.lock()?;
        let state = self.reconcile(&mut guard, false)?;

        let branch = self.identity.branch();
        let head = self
            .source
            .latest_commit(branch)
            .map_err(|e| DiffError::Source {
                reference: branch.to_owned(),
                source: e,
            })?;
        let now = self.clock.now();
        let filter = self.config.filter();
        let decision = Scheduler::new(&self.source, &filter, self.config.interlayer_period)
            .decide(&state, &head, now)?;
        let packager = Packager::new(self.config.owner.as_deref(), self.config.group.as_deref());

        let mut tx = guard.transaction();
        for path in &state.stale {
            tx.remove(path);
        }
        let outcome = match decision {
            Decision::Snapshot { commit, payload } => {
                self.publish(&mut tx, Record::Snapshot, &commit, &packager.package(&payload)?, now)?;
                for checkpoint in state.layers.iter().chain(&state.latest) {
                    self.retire(&mut tx, checkpoint.record);
                }
                Outcome::Snapshot { commit }
            }
            Decision::LayerPatch {
                number,
                commit,
                payload,
            } => {
                let record = Record::Layer(number);
                self.publish(&mut tx, record, &commit, &packager.package(&payload)?, now)?;
                if state.latest.is_some() {
                    self.retire(&mut tx, Record::Latest);
                }
                Outcome::Layer { number, commit }
            }
            Decision::LatestPatch { commit, payload } => {
                self.publish(&mut tx, Record::Latest, &commit, &packager.package(&payload)?, now)?;
                Outcome::Latest { commit }
            }
            Decision::NoOp { drop_latest } => {
                if drop_latest {
                    tracing::debug!(key = %self.store.key(), "latest patch superseded");
                    self.retire(&mut tx, Record::Latest);
                }
                Outcome::NoOp
            }
        };
        tx.commit()?;
        self.state = self.store.read()?;

        if let Some(record) = outcome.record() {
            self.register(driver, record);
        }
        tracing::info!(key = %self.store.key(), outcome = %outcome, "materialized");
        Ok(outcome)
    }

    /// Register every committed payload in application order.
    pub fn register_all<D: BuildDriver + ?Sized>(
        &mut self,
        driver: &mut D,
    ) -> Result<(), ArtifactError> {
        let _guard = self.lock()?;
        self.state = self.store.read()?;
        for checkpoint in self.state.checkpoints() {
            self.register(driver, checkpoint.record);
        }
        Ok(())
    }

    /// Drop every cached payload; the next materialize starts from a snapshot.
    pub fn flush(&mut self) -> Result<(), ArtifactError> {
        let mut guard = self.lock()?;
        self.state = self.reconcile(&mut guard, true)?;
        Ok(())
    }

    fn lock(&self) -> Result<Guard, LockError> {
        Guard::acquire(&self.store.atomizer_path(), self.lock_timeout)
    }

    /// Read the stored state, purging it first when the configuration drifted.
    fn reconcile(&self, guard: &mut Guard, force_flush: bool) -> Result<ArtifactState, ArtifactError> {
        let state = self.store.read()?;
        let verdict = Verdict::check(state.config_hash.as_ref(), &self.fingerprint, force_flush);
        if !verdict.needs_purge() {
            return Ok(state);
        }

        match verdict {
            Verdict::Initial => tracing::debug!(key = %self.store.key(), "recording configuration"),
            _ => tracing::info!(key = %self.store.key(), ?verdict, "purging cached payloads"),
        }
        let mut tx = guard.transaction();
        invalidator::purge(&self.store, &mut tx, &self.fingerprint)?;
        tx.commit()?;
        Ok(self.store.read()?)
    }

    fn publish(
        &self,
        tx: &mut Transaction<'_>,
        record: Record,
        commit: &str,
        payload: &[u8],
        now: SystemTime,
    ) -> Result<(), CommitError> {
        let paths = self.store.paths(record);
        tx.stage(&paths.payload, payload)?;
        tx.stage_reference(&paths.reference, commit, now)
    }

    fn retire(&self, tx: &mut Transaction<'_>, record: Record) {
        let paths = self.store.paths(record);
        tx.remove(&paths.payload);
        tx.remove(&paths.reference);
    }

    fn register<D: BuildDriver + ?Sized>(&self, driver: &mut D, record: Record) {
        let source = self.store.paths(record).payload;
        let file = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let step = match record {
            Record::Snapshot => {
                driver.register_copy_in(source, file, self.config.target.clone(), BuildStep::Prepare);
                if let Some(chown) = chown_command(&self.config) {
                    driver.register_run(chown, String::new(), BuildStep::Prepare);
                }
                return;
            }
            Record::Layer(_) => BuildStep::Build,
            Record::Latest => BuildStep::Setup,
        };
        driver.register_copy_in(source, file.clone(), PATCH_STAGING_DIR.to_owned(), step);
        driver.register_run(
            apply_command(&file, &self.config),
            format!("rm {PATCH_STAGING_DIR}/{file}"),
            step,
        );
    }
}

/// Shell command applying a staged patch at the artifact's target.
fn apply_command(file: &str, config: &ArtifactConfig) -> String {
    let mut sudo = String::new();
    if config.owner.is_some() || config.group.is_some() {
        sudo.push_str("sudo ");
        if let Some(owner) = &config.owner {
            sudo.push_str(&format!("-u {} ", sudo_account(owner)));
        }
        if let Some(group) = &config.group {
            sudo.push_str(&format!("-g {} ", sudo_account(group)));
        }
    }
    format!(
        "zcat {PATCH_STAGING_DIR}/{file} | {sudo}git apply --whitespace=nowarn --directory={}",
        config.target
    )
}

/// `ADD` keeps only the numeric ids of tar entries, so accounts given by
/// name are applied after the snapshot is unpacked.
fn chown_command(config: &ArtifactConfig) -> Option<String> {
    let named = [&config.owner, &config.group]
        .into_iter()
        .flatten()
        .any(|account| !is_numeric_id(account));
    if !named {
        return None;
    }

    let owner = config.owner.as_deref().unwrap_or_default();
    let accounts = match &config.group {
        Some(group) => format!("{owner}:{group}"),
        None => owner.to_owned(),
    };
    Some(format!("sudo chown -R {accounts} {}", config.target))
}

fn is_numeric_id(account: &str) -> bool {
    account.bytes().all(|b| b.is_ascii_digit())
}

/// sudo takes numeric ids as `#<id>`, quoted so the shell keeps the `#`.
fn sudo_account(account: &str) -> String {
    if is_numeric_id(account) {
        format!("'#{account}'")
    } else {
        account.to_owned()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("invalid artifact configuration")]
    Configuration(#[from] gitlayer_core::Error),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Packaging(#[from] PackageError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Commit(#[from] CommitError),
}

impl From<PurgeError> for ArtifactError {
    fn from(err: PurgeError) -> Self {
        match err {
            PurgeError::Store(e) => ArtifactError::Store(e),
            PurgeError::Commit(e) => ArtifactError::Commit(e),
        }
    }
}
