// ── Session resumption ──
//
// Batch fetches that may outlive the process are recorded durably before
// dispatch and erased on completion. On the next start the recorded
// sessions are rehydrated: their cache entries are re-registered and the
// recorded request is handed back to the caller instead of being re-sent.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::store::ValueCache;
use crate::value::ValueKind;

/// One value a recorded session was fetching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSpec {
    pub path: String,
    pub kind: ValueKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<String>,
}

/// A dispatched-but-unfinished batch fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSession {
    /// Unique id, assigned at dispatch.
    pub id: String,
    /// The connection the session belongs to (multiple servers may share
    /// one backing file).
    pub connection: String,
    /// Caller-defined discriminator selecting the completion handler on
    /// resumption.
    pub kind: String,
    pub specs: Vec<ValueSpec>,
}

/// On-disk shape. The version gate lets the format evolve without
/// misreading old files; a mismatch discards the recorded sessions,
/// since resumption is best-effort.
#[derive(Debug, Serialize, Deserialize)]
struct SessionDocument {
    version: u32,
    sessions: Vec<PendingSession>,
}

const DOCUMENT_VERSION: u32 = 1;

/// Where pending sessions are persisted.
pub trait SessionBackend: Send + Sync {
    fn load(&self) -> Result<Vec<PendingSession>, CoreError>;
    fn store(&self, sessions: &[PendingSession]) -> Result<(), CoreError>;
    fn clear(&self) -> Result<(), CoreError>;
}

/// JSON file backend. The file holds one [`SessionDocument`].
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Backend writing `tidewatch.pending-sessions.json` under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join("tidewatch.pending-sessions.json"),
        }
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SessionBackend for FileBackend {
    fn load(&self) -> Result<Vec<PendingSession>, CoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(CoreError::Session {
                    message: format!("reading {}: {err}", self.path.display()),
                })
            }
        };
        let doc: SessionDocument = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "unreadable session file, discarding");
                return Ok(Vec::new());
            }
        };
        if doc.version != DOCUMENT_VERSION {
            warn!(
                found = doc.version,
                expected = DOCUMENT_VERSION,
                "session file version mismatch, discarding"
            );
            return Ok(Vec::new());
        }
        Ok(doc.sessions)
    }

    fn store(&self, sessions: &[PendingSession]) -> Result<(), CoreError> {
        let doc = SessionDocument {
            version: DOCUMENT_VERSION,
            sessions: sessions.to_vec(),
        };
        let raw = serde_json::to_string_pretty(&doc).map_err(|err| CoreError::Session {
            message: format!("serializing sessions: {err}"),
        })?;
        fs::write(&self.path, raw).map_err(|err| CoreError::Session {
            message: format!("writing {}: {err}", self.path.display()),
        })
    }

    fn clear(&self) -> Result<(), CoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CoreError::Session {
                message: format!("removing {}: {err}", self.path.display()),
            }),
        }
    }
}

/// In-memory view of pending sessions, persisted through a backend on
/// every change.
pub struct SessionStore {
    backend: Box<dyn SessionBackend>,
    inner: Mutex<HashMap<String, PendingSession>>,
}

impl SessionStore {
    /// Open the store, loading any sessions a previous run left behind.
    pub fn open(backend: Box<dyn SessionBackend>) -> Result<Self, CoreError> {
        let sessions = backend.load()?;
        debug!(count = sessions.len(), "loaded pending sessions");
        let inner = sessions.into_iter().map(|s| (s.id.clone(), s)).collect();
        Ok(Self {
            backend,
            inner: Mutex::new(inner),
        })
    }

    /// Record a session before its request is dispatched.
    pub fn record(&self, session: PendingSession) -> Result<(), CoreError> {
        let snapshot = {
            let mut inner = self.lock();
            inner.insert(session.id.clone(), session);
            inner.values().cloned().collect::<Vec<_>>()
        };
        self.backend.store(&snapshot)
    }

    /// Erase a session once its request has settled.
    pub fn complete(&self, id: &str) -> Result<(), CoreError> {
        let snapshot = {
            let mut inner = self.lock();
            inner.remove(id);
            inner.values().cloned().collect::<Vec<_>>()
        };
        if snapshot.is_empty() {
            self.backend.clear()
        } else {
            self.backend.store(&snapshot)
        }
    }

    /// Currently recorded sessions.
    pub fn pending(&self) -> Vec<PendingSession> {
        self.lock().values().cloned().collect()
    }

    /// Take every recorded session, re-registering its cache entries.
    ///
    /// Entries are stamped as freshly fetched so the next poll cycle does
    /// not immediately duplicate the in-flight request. The backing file is
    /// cleared; the returned sessions are the caller's to finish.
    pub fn rehydrate(&self, cache: &ValueCache) -> Result<Vec<PendingSession>, CoreError> {
        let sessions = {
            let mut inner = self.lock();
            inner.drain().map(|(_, s)| s).collect::<Vec<_>>()
        };
        for session in &sessions {
            for spec in &session.specs {
                let entry = cache.get_or_create(spec.kind, &spec.path, spec.source.as_deref());
                entry.mark_fetched();
            }
        }
        self.backend.clear()?;
        Ok(sessions)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingSession>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn session(id: &str) -> PendingSession {
        PendingSession {
            id: id.into(),
            connection: "default".into(),
            kind: "poll".into(),
            specs: vec![ValueSpec {
                path: "navigation.speedOverGround".into(),
                kind: ValueKind::Float,
                source: None,
            }],
        }
    }

    #[test]
    fn file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::in_dir(dir.path());

        backend.store(&[session("s1"), session("s2")]).unwrap();
        let mut loaded = FileBackend::in_dir(dir.path()).load().unwrap();
        loaded.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(loaded, vec![session("s1"), session("s2")]);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileBackend::in_dir(dir.path()).load().unwrap().is_empty());
    }

    #[test]
    fn version_mismatch_discards_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidewatch.pending-sessions.json");
        fs::write(&path, r#"{"version": 99, "sessions": [{"bogus": true}]}"#).unwrap();

        assert!(FileBackend::at(path).load().unwrap().is_empty());
    }

    #[test]
    fn complete_removes_file_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(Box::new(FileBackend::in_dir(dir.path()))).unwrap();

        store.record(session("s1")).unwrap();
        assert!(dir.path().join("tidewatch.pending-sessions.json").exists());

        store.complete("s1").unwrap();
        assert!(!dir.path().join("tidewatch.pending-sessions.json").exists());
        assert!(store.pending().is_empty());
    }

    #[test]
    fn rehydrate_registers_fresh_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(Box::new(FileBackend::in_dir(dir.path()))).unwrap();
        store.record(session("s1")).unwrap();

        let cache = ValueCache::new();
        let resumed = store.rehydrate(&cache).unwrap();

        assert_eq!(resumed.len(), 1);
        let entry = cache
            .get(ValueKind::Float, "navigation.speedOverGround", None)
            .unwrap();
        assert!(!entry.is_stale(Duration::from_secs(30)));
        assert!(store.pending().is_empty());
        assert!(!dir.path().join("tidewatch.pending-sessions.json").exists());
    }

    #[test]
    fn reopen_restores_recorded_sessions() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SessionStore::open(Box::new(FileBackend::in_dir(dir.path()))).unwrap();
            store.record(session("s1")).unwrap();
        }
        let store = SessionStore::open(Box::new(FileBackend::in_dir(dir.path()))).unwrap();
        assert_eq!(store.pending(), vec![session("s1")]);
    }
}
