//! Revalidating HTTP client.
//!
//! Every network call of the crate goes through [`RevalidatingClient`]. For
//! idempotent reads it keeps a [`ValidatorCache`] slot per `(method, url)`:
//!
//! - a remembered `ETag` is sent as `If-None-Match`;
//! - `304 Not Modified` is answered from the slot, byte for byte;
//! - a `2xx` with a new `ETag` overwrites the slot, one without drops it.
//!
//! Mutations never read or write slots. A successful mutation, or a
//! `404`/`410` on anything, clears the slot of the resource together with
//! the listings above it and the sub-resources below it. Listings that live
//! elsewhere (`/api/projects/{id}/tasks` for `/api/tasks/{id}`) are named
//! through [`RequestOptions::invalidating`].
//!
//! A `304` for which no slot exists is a cache inconsistency: it is logged
//! as an error and answered by exactly one unconditional retry.
//!
//! Every call is bounded by a timeout and can be tied to a
//! [`CancellationToken`]; a call whose token fires returns
//! [`SyncError::Aborted`] and its response, if any, is dropped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use context_sync_core::models::Method;
use context_sync_core::validators::ValidatorCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::transport::{HttpRequest, HttpResponse, Transport};

pub const IF_NONE_MATCH: &str = "If-None-Match";
pub const ETAG: &str = "ETag";

/// Per-call options for [`RevalidatingClient::request`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<serde_json::Value>,
    pub abort: Option<CancellationToken>,
    /// Overrides the client-wide timeout.
    pub timeout: Option<Duration>,
    /// Extra paths cleared alongside the target when it changes or is gone.
    pub invalidates: Vec<String>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::method(Method::Get)
    }

    pub fn method(method: Method) -> Self {
        Self {
            method,
            body: None,
            abort: None,
            timeout: None,
            invalidates: Vec::new(),
        }
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn abort_on(mut self, token: CancellationToken) -> Self {
        self.abort = Some(token);
        self
    }

    pub fn invalidating(mut self, path: impl Into<String>) -> Self {
        self.invalidates.push(path.into());
        self
    }
}

pub struct RevalidatingClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    timeout: Duration,
    validators: Mutex<ValidatorCache>,
}

impl RevalidatingClient {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, timeout: Duration) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            validators: Mutex::new(ValidatorCache::new()),
        }
    }

    pub fn url(&self, path: &str) -> String {
        if Url::parse(path).is_ok() {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Issue a request and return the response body.
    pub async fn request(&self, path: &str, options: RequestOptions) -> SyncResult<Vec<u8>> {
        let url = self.url(path);
        match self.request_once(&url, &options, true).await {
            Err(SyncError::CacheInconsistency { method, url }) => {
                error!(
                    method = %method,
                    url = %url,
                    "304 Not Modified without a cached body; retrying unconditionally"
                );
                self.lock().remove(method, &url);
                self.request_once(&url, &options, false).await
            }
            other => other,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let body = self.request(path, RequestOptions::get()).await?;
        parse_json(&body)
    }

    pub async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> SyncResult<T> {
        let value = serde_json::to_value(body)
            .map_err(|e| SyncError::Validation(format!("unserializable request body: {}", e)))?;
        let bytes = self
            .request(path, RequestOptions::method(method).json(value))
            .await?;
        parse_json(&bytes)
    }

    /// Issue a request whose response body is irrelevant.
    pub async fn send(&self, method: Method, path: &str) -> SyncResult<()> {
        self.request(path, RequestOptions::method(method)).await?;
        Ok(())
    }

    /// Drop the slot for a read, as if the cache had been cleared externally.
    pub fn forget(&self, method: Method, path: &str) {
        let url = self.url(path);
        self.lock().remove(method, &url);
    }

    /// Number of remembered responses.
    pub fn cached_entries(&self) -> usize {
        self.lock().len()
    }

    pub fn validator_for(&self, method: Method, path: &str) -> Option<String> {
        let url = self.url(path);
        self.lock().get(method, &url).map(|e| e.validator.clone())
    }

    async fn request_once(
        &self,
        url: &str,
        options: &RequestOptions,
        conditional: bool,
    ) -> SyncResult<Vec<u8>> {
        let method = options.method;
        let mut request = HttpRequest::new(method, url);
        request
            .headers
            .push(("Accept".to_string(), "application/json".to_string()));

        if conditional && method.is_read() {
            if let Some(entry) = self.lock().get(method, url) {
                request
                    .headers
                    .push((IF_NONE_MATCH.to_string(), entry.validator.clone()));
            }
        }
        if let Some(body) = &options.body {
            request
                .headers
                .push(("Content-Type".to_string(), "application/json".to_string()));
            request.body = Some(serde_json::to_vec(body).map_err(|e| {
                SyncError::Validation(format!("unserializable request body: {}", e))
            })?);
        }

        let timeout = options.timeout.unwrap_or(self.timeout);
        let response = self.dispatch(request, timeout, options.abort.as_ref()).await?;
        debug!(method = %method, url = %url, status = response.status, "response");
        let related: Vec<String> = options.invalidates.iter().map(|p| self.url(p)).collect();
        self.absorb(method, url, &related, response)
    }

    async fn dispatch(
        &self,
        request: HttpRequest,
        timeout: Duration,
        abort: Option<&CancellationToken>,
    ) -> SyncResult<HttpResponse> {
        let url = request.url.clone();
        let send = tokio::time::timeout(timeout, self.transport.send(request));
        let outcome = match abort {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => return Err(SyncError::Aborted),
                    outcome = send => outcome,
                }
            }
            None => send.await,
        };
        if abort.is_some_and(|t| t.is_cancelled()) {
            return Err(SyncError::Aborted);
        }
        outcome.map_err(|_| SyncError::timeout(&url))?
    }

    fn absorb(
        &self,
        method: Method,
        url: &str,
        related: &[String],
        response: HttpResponse,
    ) -> SyncResult<Vec<u8>> {
        let status = response.status;

        if status == 304 {
            if !method.is_read() {
                return Err(SyncError::InvalidResponse(format!(
                    "304 Not Modified for {} {}",
                    method, url
                )));
            }
            // Look the slot up again: it may have been cleared while the
            // request was in flight.
            return match self.lock().get(method, url) {
                Some(entry) => Ok(entry.body.clone()),
                None => Err(SyncError::CacheInconsistency {
                    method,
                    url: url.to_string(),
                }),
            };
        }

        if response.is_success() {
            let mut cache = self.lock();
            if method.is_read() {
                match response.header(ETAG) {
                    Some(etag) => {
                        cache.store(method, url, etag, response.body.clone());
                    }
                    None => {
                        cache.remove(method, url);
                    }
                }
            } else {
                let cleared = cache.invalidate_resource(url)
                    + related
                        .iter()
                        .map(|r| cache.invalidate_resource(r))
                        .sum::<usize>();
                debug!(method = %method, url = %url, cleared, "mutation invalidated cached reads");
            }
            return Ok(response.body);
        }

        if status == 404 || status == 410 {
            let mut cache = self.lock();
            cache.invalidate_resource(url);
            for r in related {
                cache.invalidate_resource(r);
            }
            return Err(SyncError::NotFound {
                resource: url.to_string(),
            });
        }

        Err(SyncError::ServerRejected {
            status,
            message: error_message(&response.body),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ValidatorCache> {
        self.validators.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> SyncResult<T> {
    serde_json::from_slice(body).map_err(|e| SyncError::InvalidResponse(e.to_string()))
}

/// Pull a readable message out of an error body: `{"error": ...}`,
/// `{"detail": ...}`, `{"message": ...}`, or the raw text.
fn error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for field in ["error", "detail", "message"] {
            match value.get(field) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(serde_json::Value::Object(o)) => {
                    if let Some(serde_json::Value::String(s)) = o.get("error") {
                        return s.clone();
                    }
                }
                _ => {}
            }
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        "no details".to_string()
    } else {
        text.chars().take(500).collect()
    }
}
