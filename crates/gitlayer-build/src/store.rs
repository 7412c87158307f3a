//! Fingerprint store: the on-disk records of one artifact.
//!
//! Every file lives directly in the cache directory and is named
//! `<key><suffix>`:
//!
//! | Suffix | Record |
//! |---|---|
//! | `.paramshash` | configuration fingerprint |
//! | `.atomizer` | lock file and commit journal |
//! | `.commit` + `.tar.gz` | snapshot checkpoint + full archive |
//! | `_layer_%04d.commit` + `_layer_%04d.patch.gz` | layer checkpoint + patch |
//! | `_latest.commit` + `_latest.patch.gz` | latest patch checkpoint + patch |
//!
//! A record exists only when both its reference and its payload are
//! present and the reference holds a commit id. Anything else is reported
//! as stale and removed by the next committed transaction.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use gitlayer_core::{ArtifactIdentity, ConfigFingerprint};

pub const PARAMSHASH_SUFFIX: &str = ".paramshash";
pub const ATOMIZER_SUFFIX: &str = ".atomizer";
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Location and locking policy of the artifact cache.
#[derive(Debug, Clone)]
pub struct CacheDir {
    root: PathBuf,
    lock_timeout: Duration,
}

impl CacheDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn store(&self, identity: &ArtifactIdentity) -> Store {
        Store::new(&self.root, identity)
    }
}

/// Which checkpoint/payload pair a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Record {
    Snapshot,
    Layer(u32),
    Latest,
}

impl Record {
    fn payload_suffix(self) -> String {
        match self {
            Record::Snapshot => ".tar.gz".to_owned(),
            Record::Layer(n) => format!("_layer_{n:04}.patch.gz"),
            Record::Latest => "_latest.patch.gz".to_owned(),
        }
    }

    fn reference_suffix(self) -> String {
        match self {
            Record::Snapshot => ".commit".to_owned(),
            Record::Layer(n) => format!("_layer_{n:04}.commit"),
            Record::Latest => "_latest.commit".to_owned(),
        }
    }
}

/// Payload file plus the reference file that vouches for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPaths {
    pub payload: PathBuf,
    pub reference: PathBuf,
}

/// A committed record: the commit it was cut at and when it was published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub record: Record,
    pub commit: String,
    pub recorded_at: SystemTime,
}

/// Everything persisted for one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactState {
    pub config_hash: Option<ConfigFingerprint>,
    pub snapshot: Option<Checkpoint>,
    /// Layer checkpoints `0001..N`, in order
    pub layers: Vec<Checkpoint>,
    pub latest: Option<Checkpoint>,
    /// Files of this artifact that belong to no valid record
    pub stale: Vec<PathBuf>,
}

impl ArtifactState {
    /// The checkpoint new deltas are computed against.
    pub fn base(&self) -> Option<&Checkpoint> {
        self.layers.last().or(self.snapshot.as_ref())
    }

    pub fn next_layer(&self) -> u32 {
        self.layers
            .last()
            .map_or(1, |layer| match layer.record {
                Record::Layer(n) => n + 1,
                _ => 1,
            })
    }

    /// Committed records in application order.
    pub fn checkpoints(&self) -> impl Iterator<Item = &Checkpoint> {
        self.snapshot
            .iter()
            .chain(self.layers.iter())
            .chain(self.latest.iter())
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    ParamsHash,
    Atomizer,
    Payload(Record),
    Reference(Record),
    Partial,
}

#[derive(Default)]
struct Pair {
    payload: Option<PathBuf>,
    reference: Option<PathBuf>,
}

impl Store {
    pub fn new(root: &Path, identity: &ArtifactIdentity) -> Self {
        Self {
            root: root.to_path_buf(),
            key: identity.key(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paramshash_path(&self) -> PathBuf {
        self.path(PARAMSHASH_SUFFIX)
    }

    pub fn atomizer_path(&self) -> PathBuf {
        self.path(ATOMIZER_SUFFIX)
    }

    pub fn paths(&self, record: Record) -> RecordPaths {
        RecordPaths {
            payload: self.path(&record.payload_suffix()),
            reference: self.path(&record.reference_suffix()),
        }
    }

    fn path(&self, suffix: &str) -> PathBuf {
        self.root.join(format!("{}{suffix}", self.key))
    }

    /// Read every record of this artifact.
    ///
    /// A missing cache directory is an empty state, not an error.
    pub fn read(&self) -> Result<ArtifactState, StoreError> {
        let mut state = ArtifactState::default();
        let mut pairs: BTreeMap<Record, Pair> = BTreeMap::new();

        for (path, kind) in self.list()? {
            match kind {
                FileKind::ParamsHash => {
                    let content = fs::read_to_string(&path)
                        .map_err(|e| StoreError::Read { path: path.clone(), source: e })?;
                    if !content.trim().is_empty() {
                        state.config_hash = Some(ConfigFingerprint::from_stored(&content));
                    }
                }
                FileKind::Atomizer => {}
                FileKind::Partial => state.stale.push(path),
                FileKind::Payload(record) => pairs.entry(record).or_default().payload = Some(path),
                FileKind::Reference(record) => {
                    pairs.entry(record).or_default().reference = Some(path)
                }
            }
        }

        let mut resolve = |record: Record, pairs: &mut BTreeMap<Record, Pair>| {
            pairs.remove(&record).and_then(|pair| {
                let checkpoint = load_checkpoint(record, &pair);
                if checkpoint.is_none() {
                    state.stale.extend(pair.payload.into_iter().chain(pair.reference));
                }
                checkpoint
            })
        };

        let snapshot = resolve(Record::Snapshot, &mut pairs);
        let latest = resolve(Record::Latest, &mut pairs);
        let mut layers = Vec::new();
        for n in 1.. {
            if !pairs.contains_key(&Record::Layer(n)) {
                break;
            }
            match resolve(Record::Layer(n), &mut pairs) {
                Some(layer) => layers.push(layer),
                None => break,
            }
        }
        // layers after a gap cannot be applied
        for (_, pair) in pairs {
            state.stale.extend(pair.payload.into_iter().chain(pair.reference));
        }

        if snapshot.is_none() {
            for orphan in layers.iter().chain(latest.iter()) {
                let paths = self.paths(orphan.record);
                state.stale.push(paths.payload);
                state.stale.push(paths.reference);
            }
        } else {
            state.snapshot = snapshot;
            state.layers = layers;
            state.latest = latest;
        }

        if !state.stale.is_empty() {
            tracing::warn!(
                key = %self.key,
                files = state.stale.len(),
                "stale cache files will be removed on next commit"
            );
        }
        state.stale.sort();
        Ok(state)
    }

    /// Every file of this artifact except the lock file.
    pub fn owned_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|(_, kind)| *kind != FileKind::Atomizer)
            .map(|(path, _)| path)
            .collect())
    }

    fn list(&self) -> Result<Vec<(PathBuf, FileKind)>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::List {
                    path: self.root.clone(),
                    source: e,
                });
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::List {
                path: self.root.clone(),
                source: e,
            })?;
            let name = entry.file_name();
            let Some(suffix) = name.to_str().and_then(|n| n.strip_prefix(self.key.as_str())) else {
                continue;
            };
            if let Some(kind) = classify(suffix) {
                files.push((entry.path(), kind));
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }
}

fn classify(suffix: &str) -> Option<FileKind> {
    if let Some(inner) = suffix.strip_suffix(PARTIAL_SUFFIX) {
        return classify(inner).map(|_| FileKind::Partial);
    }
    match suffix {
        PARAMSHASH_SUFFIX => return Some(FileKind::ParamsHash),
        ATOMIZER_SUFFIX => return Some(FileKind::Atomizer),
        ".commit" => return Some(FileKind::Reference(Record::Snapshot)),
        ".tar.gz" => return Some(FileKind::Payload(Record::Snapshot)),
        "_latest.commit" => return Some(FileKind::Reference(Record::Latest)),
        "_latest.patch.gz" => return Some(FileKind::Payload(Record::Latest)),
        _ => {}
    }

    let rest = suffix.strip_prefix("_layer_")?;
    let (digits, kind) = if let Some(d) = rest.strip_suffix(".commit") {
        (d, FileKind::Reference as fn(Record) -> FileKind)
    } else if let Some(d) = rest.strip_suffix(".patch.gz") {
        (d, FileKind::Payload as fn(Record) -> FileKind)
    } else {
        return None;
    };
    if digits.len() < 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u32 = digits.parse().ok()?;
    // the canonical spelling only, so one layer maps to one file name
    (n > 0 && format!("{n:04}") == digits).then(|| kind(Record::Layer(n)))
}

fn load_checkpoint(record: Record, pair: &Pair) -> Option<Checkpoint> {
    let (Some(_), Some(reference)) = (&pair.payload, &pair.reference) else {
        return None;
    };

    let commit = match fs::read_to_string(reference) {
        Ok(content) => content.trim().to_owned(),
        Err(e) => {
            tracing::warn!(path = %reference.display(), error = %e, "unreadable checkpoint reference");
            return None;
        }
    };
    if commit.is_empty() || !commit.bytes().all(|b| b.is_ascii_hexdigit()) {
        tracing::warn!(path = %reference.display(), "malformed checkpoint reference");
        return None;
    }

    let recorded_at = fs::metadata(reference).and_then(|m| m.modified());
    match recorded_at {
        Ok(recorded_at) => Some(Checkpoint {
            record,
            commit,
            recorded_at,
        }),
        Err(e) => {
            tracing::warn!(path = %reference.display(), error = %e, "checkpoint timestamp unavailable");
            None
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to list cache directory {path}")]
    List {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const COMMIT_A: &str = "0123456789abcdef0123456789abcdef01234567";
    const COMMIT_B: &str = "89abcdef0123456789abcdef0123456789abcdef";

    fn store(dir: &TempDir) -> Store {
        let id = ArtifactIdentity::new("repo", None, "master").unwrap();
        Store::new(dir.path(), &id)
    }

    fn write_record(store: &Store, record: Record, commit: &str) {
        let paths = store.paths(record);
        fs::write(paths.payload, b"payload").unwrap();
        fs::write(paths.reference, format!("{commit}\n")).unwrap();
    }

    #[test]
    fn missing_directory_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let id = ArtifactIdentity::new("repo", None, "master").unwrap();
        let store = Store::new(&dir.path().join("absent"), &id);
        assert_eq!(store.read().unwrap(), ArtifactState::default());
    }

    #[test]
    fn file_names_follow_key() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let name = |p: PathBuf| p.file_name().unwrap().to_str().unwrap().to_owned();

        assert_eq!(name(store.paramshash_path()), "repo.master.paramshash");
        assert_eq!(name(store.atomizer_path()), "repo.master.atomizer");
        assert_eq!(name(store.paths(Record::Snapshot).payload), "repo.master.tar.gz");
        assert_eq!(name(store.paths(Record::Snapshot).reference), "repo.master.commit");
        assert_eq!(
            name(store.paths(Record::Layer(3)).payload),
            "repo.master_layer_0003.patch.gz"
        );
        assert_eq!(name(store.paths(Record::Latest).reference), "repo.master_latest.commit");
    }

    #[test]
    fn reads_complete_records() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.paramshash_path(), "abc\n").unwrap();
        write_record(&store, Record::Snapshot, COMMIT_A);
        write_record(&store, Record::Layer(1), COMMIT_B);
        write_record(&store, Record::Latest, COMMIT_A);

        let state = store.read().unwrap();
        assert_eq!(state.config_hash.as_ref().map(|h| h.as_str()), Some("abc"));
        assert_eq!(state.snapshot.as_ref().unwrap().commit, COMMIT_A);
        assert_eq!(state.layers.len(), 1);
        assert_eq!(state.base().unwrap().commit, COMMIT_B);
        assert_eq!(state.next_layer(), 2);
        assert_eq!(state.latest.as_ref().unwrap().record, Record::Latest);
        assert!(state.stale.is_empty());
    }

    #[test]
    fn payload_without_reference_is_stale() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        write_record(&store, Record::Snapshot, COMMIT_A);
        fs::write(store.paths(Record::Latest).payload, b"orphan").unwrap();

        let state = store.read().unwrap();
        assert!(state.latest.is_none());
        assert_eq!(state.stale, vec![store.paths(Record::Latest).payload]);
    }

    #[test]
    fn malformed_reference_is_stale() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        write_record(&store, Record::Snapshot, "not a commit");

        let state = store.read().unwrap();
        assert!(state.snapshot.is_none());
        assert_eq!(state.stale.len(), 2);
    }

    #[test]
    fn layers_after_gap_are_stale() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        write_record(&store, Record::Snapshot, COMMIT_A);
        write_record(&store, Record::Layer(1), COMMIT_A);
        write_record(&store, Record::Layer(3), COMMIT_B);

        let state = store.read().unwrap();
        assert_eq!(state.layers.len(), 1);
        assert_eq!(state.next_layer(), 2);
        assert!(state.stale.contains(&store.paths(Record::Layer(3)).reference));
    }

    #[test]
    fn records_without_snapshot_are_stale() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        write_record(&store, Record::Layer(1), COMMIT_A);
        write_record(&store, Record::Latest, COMMIT_B);

        let state = store.read().unwrap();
        assert!(state.base().is_none());
        assert!(state.layers.is_empty());
        assert!(state.latest.is_none());
        assert_eq!(state.stale.len(), 4);
    }

    #[test]
    fn other_identities_are_ignored() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let other = Store::new(
            dir.path(),
            &ArtifactIdentity::new("repo", None, "master2").unwrap(),
        );
        let named = Store::new(
            dir.path(),
            &ArtifactIdentity::new("repo", Some("a"), "master").unwrap(),
        );
        write_record(&other, Record::Snapshot, COMMIT_A);
        write_record(&named, Record::Snapshot, COMMIT_A);

        let state = store.read().unwrap();
        assert_eq!(state, ArtifactState::default());
        assert!(store.owned_files().unwrap().is_empty());
    }

    #[test]
    fn partial_files_are_stale() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(dir.path().join("repo.master.tar.gz.partial"), b"half").unwrap();

        let state = store.read().unwrap();
        assert_eq!(state.stale, vec![dir.path().join("repo.master.tar.gz.partial")]);
    }

    #[test]
    fn owned_files_exclude_atomizer() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.atomizer_path(), b"").unwrap();
        fs::write(store.paramshash_path(), b"abc").unwrap();
        write_record(&store, Record::Snapshot, COMMIT_A);

        let owned = store.owned_files().unwrap();
        assert_eq!(owned.len(), 3);
        assert!(!owned.contains(&store.atomizer_path()));
    }

    #[test]
    fn classify_rejects_noncanonical_layers() {
        assert_eq!(classify("_layer_1.commit"), None);
        assert_eq!(classify("_layer_0000.commit"), None);
        assert_eq!(
            classify("_layer_12345.patch.gz"),
            Some(FileKind::Payload(Record::Layer(12345)))
        );
        assert_eq!(classify("2.commit"), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn layer_file_names_parse_back(n in 1u32..10_000_000) {
                let record = Record::Layer(n);
                prop_assert_eq!(classify(&record.payload_suffix()), Some(FileKind::Payload(record)));
                prop_assert_eq!(classify(&record.reference_suffix()), Some(FileKind::Reference(record)));
            }

            #[test]
            fn foreign_suffixes_are_ignored(suffix in "[a-z_.]{0,12}") {
                let known = [
                    ".paramshash", ".atomizer", ".commit", ".tar.gz",
                    "_latest.commit", "_latest.patch.gz",
                ];
                prop_assume!(!known.iter().any(|k| suffix == *k || suffix == format!("{k}.partial")));
                prop_assert_eq!(classify(&suffix), None);
            }
        }
    }
}
