use crate::state::LedgerState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const STATE_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Integrity check failed: expected {expected} accounts, found {found}")]
    IntegrityMismatch { expected: usize, found: usize },

    #[error("Save timed out after {0:?}")]
    Timeout(Duration),

    #[error("Save task failed: {0}")]
    Join(String),

    #[error("Restore from backup failed ({restore}) after save error: {original}")]
    RestoreFailed { original: String, restore: String },

    #[error("State file {} is held by another process", .0.display())]
    Locked(PathBuf),
}

/// Where a loaded state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Primary,
    Backup,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub accounts: usize,
    pub bytes: usize,
    pub duration: Duration,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    integrity_check: usize,
    state: &'a LedgerState,
}

/// On-disk document: the state plus enough metadata to verify it.
#[derive(Debug, Deserialize)]
pub struct StateEnvelope {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub integrity_check: usize,
    pub state: LedgerState,
}

impl StateEnvelope {
    pub fn encode(state: &LedgerState) -> Result<Vec<u8>, PersistenceError> {
        let envelope = EnvelopeRef {
            version: STATE_FORMAT_VERSION,
            saved_at: Utc::now(),
            integrity_check: state.balances.len(),
            state,
        };
        Ok(serde_json::to_vec_pretty(&envelope)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PersistenceError> {
        let envelope: StateEnvelope = serde_json::from_slice(bytes)?;
        envelope.verify(envelope.integrity_check)?;
        Ok(envelope)
    }

    /// Declared count, `expected`, and the decoded balance count must agree.
    pub fn verify(&self, expected: usize) -> Result<(), PersistenceError> {
        if self.integrity_check != expected {
            return Err(PersistenceError::IntegrityMismatch {
                expected,
                found: self.integrity_check,
            });
        }
        let found = self.state.balances.len();
        if found != expected {
            return Err(PersistenceError::IntegrityMismatch { expected, found });
        }
        Ok(())
    }
}

/// Durable home of the ledger state. Saves are whole-document writes.
pub trait StateStore: Send + Sync {
    fn load_with_source(&self) -> (LedgerState, LoadSource);

    fn load(&self) -> LedgerState {
        self.load_with_source().0
    }

    fn save(&self, state: &LedgerState) -> Result<SaveReport, PersistenceError>;

    fn describe(&self) -> String;
}

/// Keeps the last saved document in memory. Used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStateStore {
    document: Mutex<Option<Vec<u8>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_snapshot(&self) -> bool {
        self.document
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl StateStore for MemoryStateStore {
    fn load_with_source(&self) -> (LedgerState, LoadSource) {
        let document = self.document.lock().unwrap_or_else(|e| e.into_inner());
        match document.as_deref().map(StateEnvelope::decode) {
            Some(Ok(envelope)) => (envelope.state, LoadSource::Primary),
            Some(Err(e)) => {
                warn!(error = %e, "In-memory snapshot unreadable, starting empty");
                (LedgerState::default(), LoadSource::Default)
            }
            None => (LedgerState::default(), LoadSource::Default),
        }
    }

    fn save(&self, state: &LedgerState) -> Result<SaveReport, PersistenceError> {
        let start = Instant::now();
        let bytes = StateEnvelope::encode(state)?;
        StateEnvelope::decode(&bytes)?.verify(state.balances.len())?;

        let len = bytes.len();
        *self.document.lock().unwrap_or_else(|e| e.into_inner()) = Some(bytes);
        Ok(SaveReport {
            accounts: state.balances.len(),
            bytes: len,
            duration: start.elapsed(),
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// JSON file with a rotated backup. Each save writes a temporary file,
/// verifies it, then renames it over the primary.
///
/// An exclusive lock on `<primary>.lock` is held for the lifetime of the
/// store, so only one process writes a given state file.
pub struct FileStateStore {
    primary: PathBuf,
    backup: PathBuf,
    write_lock: Mutex<()>,
    _lock_file: File,
}

impl FileStateStore {
    /// Takes the single-writer lock. Fails with [`PersistenceError::Locked`]
    /// while another store holds it.
    pub fn open(
        primary: impl Into<PathBuf>,
        backup: impl Into<PathBuf>,
    ) -> Result<Self, PersistenceError> {
        let primary = primary.into();
        if let Some(parent) = primary.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lock_path = lock_path(&primary);
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        if let Err(e) = lock_file.try_lock_exclusive() {
            debug!(path = %lock_path.display(), error = %e, "State lock is taken");
            return Err(PersistenceError::Locked(primary));
        }
        debug!(path = %lock_path.display(), "🔒 State lock acquired");

        Ok(Self {
            primary,
            backup: backup.into(),
            write_lock: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    pub fn temp_path(&self) -> PathBuf {
        let mut name = self.primary.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn read(path: &Path) -> Result<LedgerState, PersistenceError> {
        let bytes = fs::read(path)?;
        Ok(StateEnvelope::decode(&bytes)?.state)
    }

    /// The backup always holds the last snapshot that read back cleanly, so an
    /// unreadable primary never replaces it.
    fn rotate_backup(&self) {
        match Self::read(&self.primary) {
            Ok(_) => {}
            Err(PersistenceError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(
                    primary = %self.primary.display(),
                    backup = %self.backup.display(),
                    error = %e,
                    "⚠️ Primary state file unreadable, keeping existing backup"
                );
                return;
            }
        }
        if let Err(e) = fs::copy(&self.primary, &self.backup) {
            warn!(
                primary = %self.primary.display(),
                backup = %self.backup.display(),
                error = %e,
                "⚠️ Could not refresh backup before save"
            );
        }
    }

    fn write_verified(&self, state: &LedgerState, tmp: &Path) -> Result<usize, PersistenceError> {
        let bytes = StateEnvelope::encode(state)?;
        self.write_document(&bytes, state.balances.len(), tmp)
    }

    /// Writes `bytes` to `tmp` and renames it over the primary only if the
    /// file reads back with `accounts` balances.
    fn write_document(
        &self,
        bytes: &[u8],
        accounts: usize,
        tmp: &Path,
    ) -> Result<usize, PersistenceError> {
        {
            let mut file = File::create(tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }

        let written = fs::read(tmp)?;
        StateEnvelope::decode(&written)?.verify(accounts)?;

        fs::rename(tmp, &self.primary)?;
        if let Some(parent) = self.primary.parent() {
            sync_directory(parent)?;
        }
        Ok(bytes.len())
    }

    /// Only touches the primary when it no longer reads back cleanly.
    fn restore_from_backup(&self) -> std::io::Result<()> {
        if !self.backup.exists() || Self::read(&self.primary).is_ok() {
            return Ok(());
        }
        fs::copy(&self.backup, &self.primary).map(|_| ())
    }
}

impl StateStore for FileStateStore {
    fn load_with_source(&self) -> (LedgerState, LoadSource) {
        match Self::read(&self.primary) {
            Ok(state) => {
                info!(path = %self.primary.display(), accounts = state.balances.len(), "📂 State loaded");
                return (state, LoadSource::Primary);
            }
            Err(PersistenceError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.primary.display(), "No primary state file");
            }
            Err(e) => {
                warn!(path = %self.primary.display(), error = %e, "Primary state file unreadable");
            }
        }

        match Self::read(&self.backup) {
            Ok(state) => {
                warn!(
                    path = %self.backup.display(),
                    accounts = state.balances.len(),
                    "📂 State loaded from backup"
                );
                (state, LoadSource::Backup)
            }
            Err(e) => {
                info!(error = %e, "No usable state file, starting with empty ledger");
                (LedgerState::default(), LoadSource::Default)
            }
        }
    }

    fn save(&self, state: &LedgerState) -> Result<SaveReport, PersistenceError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let start = Instant::now();

        self.rotate_backup();

        let tmp = self.temp_path();
        match self.write_verified(state, &tmp) {
            Ok(bytes) => {
                let report = SaveReport {
                    accounts: state.balances.len(),
                    bytes,
                    duration: start.elapsed(),
                };
                debug!(
                    path = %self.primary.display(),
                    accounts = report.accounts,
                    bytes = report.bytes,
                    duration_ms = report.duration.as_millis() as u64,
                    "💾 State saved"
                );
                Ok(report)
            }
            Err(original) => {
                if tmp.is_file() {
                    let _ = fs::remove_file(&tmp);
                }
                if let Err(restore) = self.restore_from_backup() {
                    error!(
                        path = %self.primary.display(),
                        error = %original,
                        restore_error = %restore,
                        "🔥 CRITICAL: save failed and backup could not be restored"
                    );
                    return Err(PersistenceError::RestoreFailed {
                        original: original.to_string(),
                        restore: restore.to_string(),
                    });
                }
                error!(path = %self.primary.display(), error = %original, "❌ State save failed");
                Err(original)
            }
        }
    }

    fn describe(&self) -> String {
        self.primary.display().to_string()
    }
}

fn lock_path(primary: &Path) -> PathBuf {
    let mut name = primary.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> std::io::Result<()> {
    let path = if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    };
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
