// ── Write request tracking ──
//
// A PUT is acknowledged with a request record that may still be PENDING.
// The tracker owns the follow-up: it polls the request status on a fixed
// delay, bounded by a retry budget, and delivers exactly one terminal
// update per write. Every acknowledgement also invalidates the cache entry
// so the next read observes the server's post-write value.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use tidewatch_api::{RequestState, RestClient, WriteAck};

use crate::store::ValueCache;

/// Progress of one tracked write, delivered over the channel returned by
/// [`crate::SignalKClient::put_self_path`]. The final update always carries
/// a terminal state.
#[derive(Debug, Clone)]
pub struct WriteUpdate {
    /// The path the write targeted.
    pub path: String,
    pub state: RequestState,
    /// HTTP-style status from the acknowledgement, when present.
    pub status_code: Option<u16>,
    pub message: Option<String>,
}

pub(crate) struct WriteTracker {
    rest: Arc<RestClient>,
    cache: Arc<ValueCache>,
    poll_delay: Duration,
    poll_retries: u32,
}

impl WriteTracker {
    pub(crate) fn new(
        rest: Arc<RestClient>,
        cache: Arc<ValueCache>,
        poll_delay: Duration,
        poll_retries: u32,
    ) -> Self {
        Self {
            rest,
            cache,
            poll_delay,
            poll_retries,
        }
    }

    /// Drive a write to completion in the background.
    ///
    /// `notify_pending` controls whether intermediate PENDING states are
    /// forwarded on the channel; the terminal state is always forwarded,
    /// exactly once. A malformed acknowledgement (missing state, status
    /// code, or request id) is treated as an immediate failure.
    pub(crate) fn track(
        &self,
        path: String,
        source: Option<String>,
        ack: WriteAck,
        notify_pending: bool,
    ) -> mpsc::Receiver<WriteUpdate> {
        let (tx, rx) = mpsc::channel(16);
        let rest = Arc::clone(&self.rest);
        let cache = Arc::clone(&self.cache);
        let poll_delay = self.poll_delay;
        let poll_retries = self.poll_retries;

        tokio::spawn(async move {
            // The entry is re-fetchable from the moment the server has the
            // write, regardless of how the acknowledgement turns out.
            cache.clear(&path, source.as_deref());

            let Some((state, request_id)) = well_formed(&ack) else {
                warn!(%path, "malformed write acknowledgement, failing write");
                let _ = tx.send(failed_malformed(&path, &ack)).await;
                return;
            };

            if state.is_terminal() {
                let _ = tx.send(update_from(&path, &ack, state)).await;
                return;
            }
            if notify_pending {
                let _ = tx.send(update_from(&path, &ack, state)).await;
            }

            for attempt in 1..=poll_retries {
                tokio::time::sleep(poll_delay).await;
                debug!(%path, %request_id, attempt, "polling write status");

                let ack = match rest.get_request_status(&request_id).await {
                    Ok(ack) => ack,
                    Err(err) => {
                        warn!(%path, %request_id, attempt, %err, "status poll failed");
                        continue;
                    }
                };
                cache.clear(&path, source.as_deref());

                let Some((state, _)) = well_formed(&ack) else {
                    warn!(%path, %request_id, "malformed status response, failing write");
                    let _ = tx.send(failed_malformed(&path, &ack)).await;
                    return;
                };
                if state.is_terminal() {
                    let _ = tx.send(update_from(&path, &ack, state)).await;
                    return;
                }
                if notify_pending {
                    let _ = tx.send(update_from(&path, &ack, state)).await;
                }
            }

            // Retry budget exhausted: the write is declared lost. The server
            // may still apply it, which the next refresh will surface.
            warn!(%path, poll_retries, "write still pending, giving up");
            let _ = tx
                .send(WriteUpdate {
                    path,
                    state: RequestState::Failed,
                    status_code: None,
                    message: Some(format!(
                        "write not acknowledged after {poll_retries} status polls"
                    )),
                })
                .await;
        });

        rx
    }
}

fn well_formed(ack: &WriteAck) -> Option<(RequestState, String)> {
    if !ack.is_well_formed() {
        return None;
    }
    Some((ack.state?, ack.request_id.clone()?))
}

fn update_from(path: &str, ack: &WriteAck, state: RequestState) -> WriteUpdate {
    WriteUpdate {
        path: path.to_owned(),
        state,
        status_code: ack.status_code,
        message: ack.message.clone(),
    }
}

fn failed_malformed(path: &str, ack: &WriteAck) -> WriteUpdate {
    WriteUpdate {
        path: path.to_owned(),
        state: RequestState::Failed,
        status_code: ack.status_code,
        message: Some("malformed write acknowledgement".into()),
    }
}
