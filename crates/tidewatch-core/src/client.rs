// ── Client facade ──
//
// Full lifecycle management for one SignalK server connection: lazy value
// registration, staleness-driven batch refresh, durable write tracking,
// and the background poll task. Consumers hold a `SignalKClient` (cheaply
// cloneable via `Arc`) and read values through the cache handles it vends.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tidewatch_api::{PathSpec, RestClient, TransportConfig, ValueEnvelope};

use crate::config::ClientConfig;
use crate::error::CoreError;
use crate::session::{PendingSession, SessionStore, ValueSpec};
use crate::store::{ValueCache, ValueHandle};
use crate::value::{Value, ValueKind};
use crate::write::{WriteTracker, WriteUpdate};

/// The main entry point for consumers.
///
/// Construction does not touch the network; the first successful fetch
/// starts the background poll (when enabled). Cloneable -- all clones share
/// the same cache and connection.
#[derive(Clone)]
pub struct SignalKClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    cache: Arc<ValueCache>,
    rest: Arc<RestClient>,
    writes: WriteTracker,
    cancel: CancellationToken,
    /// Set once the poll task has been spawned; the poll starts lazily on
    /// the first successful fetch.
    poll_started: AtomicBool,
    /// Cleared permanently when the server answers the batch endpoint with
    /// 404; all later fetches go per-path.
    batch_supported: AtomicBool,
    sessions: Option<SessionStore>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SignalKClient {
    /// Create a client from configuration. Does NOT connect -- the first
    /// fetch establishes whether the server is reachable.
    pub fn new(config: ClientConfig) -> Result<Self, CoreError> {
        Self::build(config, None)
    }

    /// As [`new`](Self::new), with durable session resumption backed by
    /// `sessions`. Call [`rehydrate_sessions`](Self::rehydrate_sessions)
    /// once after construction to recover fetches a previous run recorded.
    pub fn with_sessions(config: ClientConfig, sessions: SessionStore) -> Result<Self, CoreError> {
        Self::build(config, Some(sessions))
    }

    fn build(config: ClientConfig, sessions: Option<SessionStore>) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            timeout: config.timeout,
            token: config.token.clone(),
            ..TransportConfig::default()
        };
        let rest = Arc::new(RestClient::new(config.endpoint.clone(), &transport)?);
        let cache = Arc::new(ValueCache::new());
        let writes = WriteTracker::new(
            Arc::clone(&rest),
            Arc::clone(&cache),
            config.write_poll_delay,
            config.write_poll_retries,
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                cache,
                rest,
                writes,
                cancel: CancellationToken::new(),
                poll_started: AtomicBool::new(false),
                batch_supported: AtomicBool::new(true),
                sessions,
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Access the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Access the underlying value cache.
    pub fn cache(&self) -> &Arc<ValueCache> {
        &self.inner.cache
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Fetch the current value of a path and return its cache handle.
    ///
    /// The handle is identity-stable: later calls for the same
    /// (kind, path, source) return the same entry, kept fresh by the
    /// background poll.
    pub async fn get_self_path(
        &self,
        kind: ValueKind,
        path: &str,
        source: Option<&str>,
    ) -> Result<ValueHandle, CoreError> {
        let entry = self.inner.cache.get_or_create(kind, path, source);
        self.refresh_entry(&entry).await?;
        self.ensure_poll_started();
        Ok(entry)
    }

    /// Return a path's cache handle immediately, refreshing it in the
    /// background if it is stale.
    ///
    /// The caller observes the refresh through the handle's watch channel;
    /// a fetch failure is logged and leaves the last known value in place.
    pub fn observe_self_path(
        &self,
        kind: ValueKind,
        path: &str,
        source: Option<&str>,
    ) -> ValueHandle {
        let entry = self.inner.cache.get_or_create(kind, path, source);
        if self.inner.config.updating_enabled && entry.is_stale(self.inner.config.stale_after) {
            let client = self.clone();
            let entry_bg = Arc::clone(&entry);
            tokio::spawn(async move {
                match client.refresh_entry(&entry_bg).await {
                    Ok(()) => client.ensure_poll_started(),
                    Err(err) => warn!(path = entry_bg.path(), %err, "background fetch failed"),
                }
            });
        } else {
            self.ensure_poll_started();
        }
        entry
    }

    async fn refresh_entry(&self, entry: &ValueHandle) -> Result<(), CoreError> {
        entry.mark_fetched();
        let env = self.inner.rest.get_self_path(entry.path()).await?;
        self.apply_envelope(entry.path(), &env);
        Ok(())
    }

    /// Merge a response envelope into the cache.
    ///
    /// Per-source entries take their source's value; the unsourced entry
    /// mirrors the `$source`-designated primary, falling back to the
    /// envelope's top-level value. Metadata lands on the shared path info.
    fn apply_envelope(&self, path: &str, env: &ValueEnvelope) {
        let cache = &self.inner.cache;
        cache.path_info(path).update_meta(env.meta.as_ref());

        if let Some(values) = &env.values {
            for (source, sv) in values {
                if let Some(raw) = &sv.value {
                    let ts = sv.parsed_timestamp().or_else(|| env.parsed_timestamp());
                    cache.set(raw, path, Some(source), ts, None);
                }
            }
            let primary = env
                .primary_source
                .as_ref()
                .and_then(|s| values.get(s))
                .and_then(|sv| sv.value.as_ref())
                .or(env.value.as_ref());
            if let Some(raw) = primary {
                cache.set(raw, path, None, env.parsed_timestamp(), None);
            }
        } else if let Some(raw) = &env.value {
            cache.set(raw, path, None, env.parsed_timestamp(), None);
        }
    }

    // ── Batch refresh ────────────────────────────────────────────────

    /// Fetch every stale entry among `handles` in one round trip.
    ///
    /// Fresh entries are skipped; due entries are stamped at dispatch so a
    /// concurrent cycle does not request them again. Uses the batch
    /// endpoint until the server proves it absent, then per-path requests.
    pub async fn fetch_paths(&self, handles: &[ValueHandle]) -> Result<(), CoreError> {
        let threshold = self.inner.config.stale_after;
        let due: Vec<&ValueHandle> = handles.iter().filter(|h| h.is_stale(threshold)).collect();
        if due.is_empty() {
            return Ok(());
        }
        for handle in &due {
            handle.mark_fetched();
        }

        let specs: Vec<PathSpec> = due
            .iter()
            .map(|h| PathSpec {
                path: h.path().to_owned(),
                kind: h.kind().wire_name().to_owned(),
                source: h.source().map(String::from),
            })
            .collect();

        let session_id = self.record_session(&due);
        let result = self.dispatch(&specs).await;
        if let Some(id) = session_id {
            self.complete_session(&id);
        }
        result
    }

    async fn dispatch(&self, specs: &[PathSpec]) -> Result<(), CoreError> {
        if self.inner.batch_supported.load(Ordering::Relaxed) {
            match self.inner.rest.get_paths(specs).await {
                Ok(batch) => {
                    debug!(paths = batch.len(), "batch refresh applied");
                    for (path, env) in &batch {
                        self.apply_envelope(path, env);
                    }
                    return Ok(());
                }
                Err(tidewatch_api::Error::CapabilityMissing { capability }) => {
                    warn!(%capability, "server lacks batch reads, using per-path requests");
                    self.inner.batch_supported.store(false, Ordering::Relaxed);
                }
                Err(err) => return Err(err.into()),
            }
        }

        // Per-path fallback: one GET per distinct path. Individual failures
        // keep the rest of the cycle alive.
        let paths: HashSet<&str> = specs.iter().map(|s| s.path.as_str()).collect();
        let fetches = paths.into_iter().map(|path| {
            let rest = Arc::clone(&self.inner.rest);
            async move { (path, rest.get_self_path(path).await) }
        });
        for (path, result) in futures_util::future::join_all(fetches).await {
            match result {
                Ok(env) => self.apply_envelope(path, &env),
                Err(err) => warn!(path, %err, "path fetch failed"),
            }
        }
        Ok(())
    }

    /// Refresh every value anyone has ever registered, one entry per path.
    pub async fn refresh_all(&self) -> Result<(), CoreError> {
        let handles: Vec<ValueHandle> = self
            .inner
            .cache
            .unique_cached_values()
            .into_values()
            .collect();
        self.fetch_paths(&handles).await
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Write a value to a path on the server.
    ///
    /// Returns a channel of [`WriteUpdate`]s; the final update always
    /// carries a terminal state, after at most the configured number of
    /// status polls. `notify_pending` forwards intermediate PENDING states.
    pub async fn put_self_path(
        &self,
        path: &str,
        value: &Value,
        source: Option<&str>,
        notify_pending: bool,
    ) -> Result<mpsc::Receiver<WriteUpdate>, CoreError> {
        let ack = self.inner.rest.put_self_path(path, &value.to_json()).await?;
        Ok(self
            .inner
            .writes
            .track(path.to_owned(), source.map(String::from), ack, notify_pending))
    }

    // ── Session resumption ───────────────────────────────────────────

    /// Recover fetches recorded by a previous run.
    ///
    /// Re-registers their cache entries (stamped fresh, so the next poll
    /// does not duplicate the request) and returns the recorded sessions
    /// for the caller's completion handlers.
    pub fn rehydrate_sessions(&self) -> Result<Vec<PendingSession>, CoreError> {
        match &self.inner.sessions {
            Some(sessions) => sessions.rehydrate(&self.inner.cache),
            None => Ok(Vec::new()),
        }
    }

    fn record_session(&self, due: &[&ValueHandle]) -> Option<String> {
        let sessions = self.inner.sessions.as_ref()?;
        let session = PendingSession {
            id: uuid::Uuid::new_v4().to_string(),
            connection: self.inner.config.connection_name.clone(),
            kind: "poll".into(),
            specs: due
                .iter()
                .map(|h| ValueSpec {
                    path: h.path().to_owned(),
                    kind: h.kind(),
                    source: h.source().map(String::from),
                })
                .collect(),
        };
        let id = session.id.clone();
        if let Err(err) = sessions.record(session) {
            warn!(%err, "failed to record pending session");
            return None;
        }
        Some(id)
    }

    fn complete_session(&self, id: &str) {
        if let Some(sessions) = &self.inner.sessions {
            if let Err(err) = sessions.complete(id) {
                warn!(%err, "failed to erase completed session");
            }
        }
    }

    // ── Background poll ──────────────────────────────────────────────

    /// Start the poll task if it is not running yet. Idempotent; a no-op
    /// when updating is disabled or the rate is zero.
    fn ensure_poll_started(&self) {
        if !self.inner.config.updating_enabled || self.inner.config.update_rate.is_zero() {
            return;
        }
        if self
            .inner
            .poll_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let client = self.clone();
        let cancel = self.inner.cancel.clone();
        let rate = self.inner.config.update_rate;
        debug!(?rate, "starting background poll");
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(rate);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await; // first tick fires immediately
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(err) = client.refresh_all().await {
                            warn!(%err, "background refresh failed");
                        }
                    }
                }
            }
        });
        self.task_handles().push(handle);
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = self.task_handles().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn task_handles(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner
            .task_handles
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
