//! Transactional guard: per-artifact exclusive lock plus commit journal.
//!
//! The `.atomizer` file is both the lock and the journal. Before a commit
//! publishes anything it records every path the commit will publish
//! (`stage <path>`) or remove (`remove <path>`). If the process dies
//! mid-commit, the next [`Guard::acquire`] replays the journal:
//!
//! - no staged file was renamed yet: the temporaries are discarded and the
//!   prior files stay as they were
//! - every staged file was renamed: the pending removals are finished
//! - otherwise every journaled path is deleted, so the affected records
//!   become absent instead of half-written
//!
//! A completed commit truncates the journal.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use filetime::FileTime;

use crate::store::PARTIAL_SUFFIX;

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Exclusive hold on one artifact's cache files. Released on drop.
#[derive(Debug)]
pub struct Guard {
    file: File,
    path: PathBuf,
}

impl Guard {
    /// Lock `path`, waiting up to `timeout` for another holder to release it.
    ///
    /// Replays the journal of an interrupted commit before returning.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LockError::Open {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| LockError::Open {
                path: path.to_path_buf(),
                source: e,
            })?;

        let started = Instant::now();
        loop {
            match try_lock(&file) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(LockError::Timeout {
                            path: path.to_path_buf(),
                            waited,
                        });
                    }
                    tracing::debug!(path = %path.display(), "waiting for artifact lock");
                    std::thread::sleep(RETRY_INTERVAL.min(timeout - waited));
                }
                Err(e) => {
                    return Err(LockError::Lock {
                        path: path.to_path_buf(),
                        source: e,
                    });
                }
            }
        }

        let mut guard = Self {
            file,
            path: path.to_path_buf(),
        };
        guard.recover().map_err(|e| LockError::Recover {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start collecting changes to publish atomically.
    pub fn transaction(&mut self) -> Transaction<'_> {
        Transaction {
            guard: self,
            staged: Vec::new(),
            removals: Vec::new(),
            committed: false,
        }
    }

    fn recover(&mut self) -> io::Result<()> {
        let mut journal = String::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_string(&mut journal)?;
        if journal.is_empty() {
            return Ok(());
        }

        let entries = parse_journal(&journal);
        let pending = entries
            .iter()
            .filter(|e| e.op == JournalOp::Stage && partial_path(&e.path).exists())
            .count();
        let staged = entries.iter().filter(|e| e.op == JournalOp::Stage).count();

        let (action, doomed): (&str, Vec<PathBuf>) = if staged > 0 && pending == staged {
            let partials = entries.iter().filter(|e| e.op == JournalOp::Stage);
            ("discarded unpublished commit", partials.map(|e| partial_path(&e.path)).collect())
        } else if pending == 0 {
            let removals = entries.iter().filter(|e| e.op == JournalOp::Remove);
            ("finished interrupted commit", removals.map(|e| e.path.clone()).collect())
        } else {
            let all = entries
                .iter()
                .flat_map(|e| [e.path.clone(), partial_path(&e.path)]);
            ("rolled back interrupted commit", all.collect())
        };

        let mut removed = 0usize;
        for path in &doomed {
            if remove_if_exists(path)? {
                removed += 1;
            }
        }
        tracing::warn!(path = %self.path.display(), removed, action, "replayed commit journal");
        self.write_journal("")
    }

    fn write_journal(&mut self, content: &str) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(content.as_bytes())?;
        self.file.sync_all()
    }
}

#[derive(Debug)]
struct Staged {
    partial: PathBuf,
    destination: PathBuf,
}

/// Pending file creations and removals.
///
/// Nothing is visible until [`Transaction::commit`]. Dropping an
/// uncommitted transaction discards its temporaries.
#[derive(Debug)]
pub struct Transaction<'a> {
    guard: &'a mut Guard,
    staged: Vec<Staged>,
    removals: Vec<PathBuf>,
    committed: bool,
}

impl Transaction<'_> {
    /// Write `bytes` beside `destination`, to be renamed into place on commit.
    ///
    /// Stage payloads before the reference that vouches for them; commit
    /// publishes in staging order.
    pub fn stage(&mut self, destination: &Path, bytes: &[u8]) -> Result<(), CommitError> {
        self.stage_file(destination, bytes, None)
    }

    /// Stage a checkpoint reference holding `commit`, stamped `recorded_at`.
    pub fn stage_reference(
        &mut self,
        destination: &Path,
        commit: &str,
        recorded_at: SystemTime,
    ) -> Result<(), CommitError> {
        self.stage_file(destination, format!("{commit}\n").as_bytes(), Some(recorded_at))
    }

    fn stage_file(
        &mut self,
        destination: &Path,
        bytes: &[u8],
        mtime: Option<SystemTime>,
    ) -> Result<(), CommitError> {
        let partial = partial_path(destination);
        let stage_err = |e| CommitError::Stage {
            path: partial.clone(),
            source: e,
        };

        let mut file = File::create(&partial).map_err(stage_err)?;
        // registered first so a failed write is still cleaned up on drop
        self.staged.push(Staged {
            partial: partial.clone(),
            destination: destination.to_path_buf(),
        });
        file.write_all(bytes).map_err(stage_err)?;
        file.sync_all().map_err(stage_err)?;
        drop(file);

        if let Some(mtime) = mtime {
            filetime::set_file_mtime(&partial, FileTime::from_system_time(mtime))
                .map_err(stage_err)?;
        }
        Ok(())
    }

    /// Remove `path` on commit. Missing files are fine.
    pub fn remove(&mut self, path: &Path) {
        self.removals.push(path.to_path_buf());
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.removals.is_empty()
    }

    /// Publish every staged file and apply every removal.
    pub fn commit(mut self) -> Result<(), CommitError> {
        if self.is_empty() {
            self.committed = true;
            return Ok(());
        }
        // a staged file replaces its destination on rename
        self.removals
            .retain(|path| !self.staged.iter().any(|s| &s.destination == path));

        let mut journal = String::new();
        let entries = self
            .staged
            .iter()
            .map(|s| (JournalOp::Stage, &s.destination))
            .chain(self.removals.iter().map(|p| (JournalOp::Remove, p)));
        for (op, path) in entries {
            journal.push_str(op.as_str());
            journal.push(' ');
            journal.push_str(&path.to_string_lossy());
            journal.push('\n');
        }
        let journal_path = self.guard.path.clone();
        self.guard
            .write_journal(&journal)
            .map_err(|e| CommitError::Journal {
                path: journal_path.clone(),
                source: e,
            })?;

        for staged in &self.staged {
            fs::rename(&staged.partial, &staged.destination).map_err(|e| CommitError::Publish {
                path: staged.destination.clone(),
                source: e,
            })?;
        }
        for path in &self.removals {
            remove_if_exists(path).map_err(|e| CommitError::Remove {
                path: path.clone(),
                source: e,
            })?;
        }
        self.committed = true;

        if let Some(dir) = journal_path.parent() {
            sync_dir(dir);
        }
        self.guard
            .write_journal("")
            .map_err(|e| CommitError::Journal {
                path: journal_path.clone(),
                source: e,
            })?;

        tracing::debug!(
            journal = %journal_path.display(),
            published = self.staged.len(),
            removed = self.removals.len(),
            "committed"
        );
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for staged in &self.staged {
            if let Err(e) = remove_if_exists(&staged.partial) {
                tracing::warn!(path = %staged.partial.display(), error = %e, "failed to discard staged file");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JournalOp {
    Stage,
    Remove,
}

impl JournalOp {
    fn as_str(self) -> &'static str {
        match self {
            JournalOp::Stage => "stage",
            JournalOp::Remove => "remove",
        }
    }
}

#[derive(Debug)]
struct JournalEntry {
    op: JournalOp,
    path: PathBuf,
}

/// Entries of a journal. Only newline-terminated lines were flushed by a
/// commit; a torn trailing line is ignored.
fn parse_journal(journal: &str) -> Vec<JournalEntry> {
    let complete = journal.rfind('\n').map_or("", |end| &journal[..end]);
    complete
        .lines()
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            let (op, path) = line.split_once(' ')?;
            let op = match op {
                "stage" => JournalOp::Stage,
                "remove" => JournalOp::Remove,
                _ => {
                    tracing::warn!(line, "skipping unrecognized journal entry");
                    return None;
                }
            };
            Some(JournalEntry {
                op,
                path: PathBuf::from(path),
            })
        })
        .collect()
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Whether a file was removed. A missing file is not an error.
fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Persist renames in `dir`. Not every platform can open a directory.
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|handle| handle.sync_all()) {
        tracing::debug!(dir = %dir.display(), error = %e, "directory sync skipped");
    }
}

#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<()> {
    use rustix::fs::{FlockOperation, flock};
    use std::os::unix::io::AsFd;

    flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
        .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "artifact locking requires flock",
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("failed to open lock file {path}")]
    Open {
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to lock {path}")]
    Lock {
        path: PathBuf,
        source: io::Error,
    },

    #[error("timed out after {waited:?} waiting for {path}; another gitlayer process holds it")]
    Timeout { path: PathBuf, waited: Duration },

    #[error("failed to roll back the interrupted commit journaled in {path}")]
    Recover {
        path: PathBuf,
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("failed to stage {path}")]
    Stage {
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to write commit journal {path}")]
    Journal {
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to publish {path}")]
    Publish {
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to remove {path}")]
    Remove {
        path: PathBuf,
        source: io::Error,
    },
}
