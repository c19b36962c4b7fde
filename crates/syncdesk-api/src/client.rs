// Remote record store HTTP client
//
// Wraps `reqwest::Client` with per-table REST path construction and
// envelope unwrapping. Every method performs exactly one HTTP exchange;
// retry, timeout and caching policy belong to the executor in
// `syncdesk-core`.

use std::collections::BTreeMap;

use reqwest::header::RETRY_AFTER;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Longest body excerpt carried in error messages.
const BODY_PREVIEW_LEN: usize = 200;

/// Application-level envelope some store endpoints wrap responses in:
/// `{ "ok": bool, "data": ..., "status": 409, "message": "..." }`.
#[derive(Debug, Deserialize)]
struct StoreEnvelope {
    ok: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

/// Query parameters for a `list` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Arbitrary equality filters, sent as query parameters in key order.
    pub filters: BTreeMap<String, String>,
}

impl ListQuery {
    fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page".into(), page.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".into(), limit.to_string()));
        }
        pairs.extend(self.filters.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }
}

/// A successful remote response with the envelope stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    /// HTTP status, or the envelope's embedded status when present.
    pub status: u16,
    /// The data payload (`null` for empty bodies such as `204 No Content`).
    pub data: Value,
}

/// Raw HTTP client for the remote record store.
///
/// Handles per-table URL construction and the optional `{ ok, data }`
/// envelope. All methods return the unwrapped payload -- the envelope is
/// stripped before the caller sees it.
#[derive(Debug, Clone)]
pub struct RecordClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RecordClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the collection root, e.g. `https://store.example/api/v1`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The store base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Operations ───────────────────────────────────────────────────

    /// `GET {base}/{table}?page&limit&filters`
    pub async fn list(&self, table: &str, query: &ListQuery) -> Result<RemoteResponse, Error> {
        let mut url = self.collection_url(table)?;
        let pairs = query.pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        self.send(Method::GET, url, None).await
    }

    /// `GET {base}/{table}/{id}`
    pub async fn get(&self, table: &str, id: &str) -> Result<RemoteResponse, Error> {
        let url = self.record_url(table, id)?;
        self.send(Method::GET, url, None).await
    }

    /// `POST {base}/{table}`
    pub async fn create(&self, table: &str, body: &Value) -> Result<RemoteResponse, Error> {
        let url = self.collection_url(table)?;
        self.send(Method::POST, url, Some(body)).await
    }

    /// `PATCH {base}/{table}/{id}`
    pub async fn update(
        &self,
        table: &str,
        id: &str,
        body: &Value,
    ) -> Result<RemoteResponse, Error> {
        let url = self.record_url(table, id)?;
        self.send(Method::PATCH, url, Some(body)).await
    }

    /// `DELETE {base}/{table}/{id}`
    pub async fn delete(&self, table: &str, id: &str) -> Result<RemoteResponse, Error> {
        let url = self.record_url(table, id)?;
        self.send(Method::DELETE, url, None).await
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/{table}` with the table as a single encoded path segment.
    pub(crate) fn collection_url(&self, table: &str) -> Result<Url, Error> {
        self.join_segments(&[table])
    }

    /// `{base}/{table}/{id}`
    pub(crate) fn record_url(&self, table: &str, id: &str) -> Result<Url, Error> {
        self.join_segments(&[table, id])
    }

    fn join_segments(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<RemoteResponse, Error> {
        debug!("{method} {url}");

        let mut builder = self.http.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let resp = builder.send().await?;

        parse_response(resp).await
    }
}

/// Map an HTTP response to a [`RemoteResponse`] or a typed [`Error`].
async fn parse_response(resp: reqwest::Response) -> Result<RemoteResponse, Error> {
    let status = resp.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        return Err(Error::RateLimited { retry_after_secs });
    }

    let body = resp.text().await?;
    trace!(status = status.as_u16(), len = body.len(), "response body received");

    if !status.is_success() {
        return Err(Error::Status {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    if body.trim().is_empty() {
        return Ok(RemoteResponse {
            status: status.as_u16(),
            data: Value::Null,
        });
    }

    let value: Value = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(&body)),
        body: body.clone(),
    })?;

    if is_envelope(&value) {
        let envelope: StoreEnvelope =
            serde_json::from_value(value).map_err(|e| Error::Deserialization {
                message: format!("malformed envelope: {e}"),
                body: body.clone(),
            })?;
        if !envelope.ok {
            return Err(Error::Envelope {
                status: envelope.status,
                message: envelope
                    .message
                    .unwrap_or_else(|| "request rejected by record store".into()),
            });
        }
        return Ok(RemoteResponse {
            status: envelope.status.unwrap_or(status.as_u16()),
            data: envelope.data.unwrap_or(Value::Null),
        });
    }

    Ok(RemoteResponse {
        status: status.as_u16(),
        data: value,
    })
}

/// An object carrying a boolean `ok` key is treated as an envelope.
fn is_envelope(value: &Value) -> bool {
    value.get("ok").is_some_and(Value::is_boolean)
}

/// Prefer a JSON `message` / `error` field, fall back to a body preview.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| preview(body).to_owned())
}

fn preview(body: &str) -> &str {
    let mut end = body.len().min(BODY_PREVIEW_LEN);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
