// Signal K REST client
//
// Wraps `reqwest::Client` with Signal K URL construction (dot-separated
// paths become URL segments) and envelope parsing. Status codes carry
// meaning beyond success/failure and are mapped to distinct error
// variants -- see `parse_response`.

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::envelope::{BatchResponse, PathSpec, ValueEnvelope, WriteAck};
use crate::error::Error;
use crate::transport::TransportConfig;

/// Raw HTTP client for a Signal K server's REST API.
///
/// The `endpoint` is the API root, e.g. `http://boat.local:3000/signalk/v1/api/`.
/// All methods translate hierarchical dot-separated paths into URL segments
/// and return parsed envelopes; callers apply them to the cache.
pub struct RestClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl RestClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// A trailing slash is appended to `endpoint` if missing so that
    /// relative joins behave.
    pub fn new(endpoint: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, endpoint))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, endpoint: Url) -> Self {
        let endpoint = if endpoint.path().ends_with('/') {
            endpoint
        } else {
            let mut url = endpoint;
            url.set_path(&format!("{}/", url.path()));
            url
        };
        Self { http, endpoint }
    }

    /// The API root this client talks to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build the resource URL for a vessel path:
    /// `{endpoint}vessels/self/{path-with-/-separators}`.
    fn self_url(&self, path: &str) -> Result<Url, Error> {
        let resource = path.replace('.', "/");
        Ok(self.endpoint.join(&format!("vessels/self/{resource}"))?)
    }

    // ── Read operations ──────────────────────────────────────────────

    /// Fetch the envelope for a single vessel path.
    pub async fn get_self_path(&self, path: &str) -> Result<ValueEnvelope, Error> {
        let url = self.self_url(path)?;
        debug!(%url, "GET value");

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        parse_response(resp, path, None).await
    }

    /// Batch read: `POST {endpoint}wsk/paths` with `[{path, type, source?}…]`.
    ///
    /// Served by an optional server plugin; a 404 here means the capability
    /// is absent, not that any requested path is unknown.
    pub async fn get_paths(&self, specs: &[PathSpec]) -> Result<BatchResponse, Error> {
        let url = self.endpoint.join("wsk/paths")?;
        debug!(%url, count = specs.len(), "POST batch read");

        let resp = self
            .http
            .post(url)
            .json(specs)
            .send()
            .await
            .map_err(Error::Transport)?;
        parse_response(resp, "wsk/paths", Some("batch reads (wsk plugin)")).await
    }

    // ── Write operations ─────────────────────────────────────────────

    /// Submit a durable write: `PUT {endpoint}vessels/self/{path}` with
    /// `{value}`. The acknowledgement starts the completion state machine.
    pub async fn put_self_path(
        &self,
        path: &str,
        value: &serde_json::Value,
    ) -> Result<WriteAck, Error> {
        let url = self.self_url(path)?;
        debug!(%url, "PUT value");

        let body = serde_json::json!({ "value": value });
        let resp = self
            .http
            .put(url)
            .json(&body)
            .send()
            .await
            .map_err(Error::Transport)?;
        parse_response(resp, path, None).await
    }

    /// Poll the status of an in-flight write request.
    pub async fn get_request_status(&self, request_id: &str) -> Result<WriteAck, Error> {
        let url = self.endpoint.join(&format!("requests/{request_id}"))?;
        debug!(%url, "GET request status");

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        parse_response(resp, request_id, None).await
    }
}

/// Map the response status, then deserialize the body.
///
/// 401 → `Unauthorized`; 404 → `CapabilityMissing` when the request hit an
/// optional-capability surface, `NotFound` otherwise; any other non-2xx →
/// `Server` with the status code in the message. A 2xx body that fails to
/// deserialize is `InvalidResponse`.
async fn parse_response<T: DeserializeOwned>(
    resp: reqwest::Response,
    context: &str,
    capability: Option<&str>,
) -> Result<T, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::Unauthorized);
    }

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(match capability {
            Some(cap) => Error::CapabilityMissing {
                capability: cap.into(),
            },
            None => Error::NotFound {
                path: context.into(),
            },
        });
    }

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Server {
            status: status.as_u16(),
            message: preview(&body).into(),
        });
    }

    let body = resp.text().await.map_err(Error::Transport)?;
    serde_json::from_str(&body).map_err(|e| {
        let preview = preview(&body);
        Error::InvalidResponse {
            message: format!("{e} (body preview: {preview:?})"),
        }
    })
}

/// First 200 bytes of a body, truncated on a char boundary so a multi-byte
/// character straddling the cut is dropped rather than split.
fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
