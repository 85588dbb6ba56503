//! Outbound request execution.
//!
//! Once the policy engine approves a request, the executor turns the final
//! [`RequestContext`] into a real HTTP call and normalizes whatever comes
//! back into a [`NormalizedResponse`]. Upstream failures (DNS, refused
//! connections, timeouts) surface as errors; an upstream 4xx or 5xx is a
//! normal response like any other.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{FetchgateError, Result};
use crate::policy::engine::RequestContext;

/// An upstream response flattened into a JSON-friendly shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

/// Performs approved requests over a shared HTTP client.
#[derive(Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
}

impl RequestExecutor {
    /// Build an executor. Without a timeout, requests wait as long as the
    /// upstream takes.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Execute the request described by `ctx` and normalize the response.
    pub async fn execute(&self, ctx: &RequestContext) -> Result<NormalizedResponse> {
        let method = Method::from_bytes(ctx.method.as_bytes())
            .map_err(|_| FetchgateError::InvalidMethod(ctx.method.clone()))?;
        let url = build_url(&ctx.url, &ctx.query_params)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &ctx.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FetchgateError::InvalidHeader(name.clone()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| FetchgateError::InvalidHeader(name.clone()))?;
            headers.insert(header_name, header_value);
        }

        let body = render_body(&method, ctx.body.as_ref(), &ctx.headers)?;
        if matches!(body, Some((_, true))) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        debug!("executing {} {}", method, url);
        let mut request = self.client.request(method, url).headers(headers);
        if let Some((text, _)) = body {
            request = request.body(text);
        }

        let response = request.send().await?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let headers = fold_headers(response.headers());
        let content_type = headers.get("content-type").cloned().unwrap_or_default();
        let text = response.text().await?;

        Ok(NormalizedResponse {
            status: status.as_u16(),
            status_text,
            headers,
            body: normalize_body(&content_type, text),
        })
    }
}

/// Parse the target URL and append the context's query parameters after any
/// already present in the URL string, which stay untouched even when
/// duplicated.
fn build_url(raw: &str, params: &BTreeMap<String, String>) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if !params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

/// Decide what body text goes on the wire.
///
/// Returns the payload plus a flag saying whether a default
/// `application/json` content type should be set. GET and HEAD requests
/// never carry a body. String bodies go out verbatim with no default;
/// anything else is serialized as JSON, with the default applied unless the
/// caller already set a content type.
fn render_body(
    method: &Method,
    body: Option<&Value>,
    headers: &BTreeMap<String, String>,
) -> Result<Option<(String, bool)>> {
    if *method == Method::GET || *method == Method::HEAD {
        return Ok(None);
    }
    let Some(body) = body else {
        return Ok(None);
    };
    match body {
        Value::String(text) => Ok(Some((text.clone(), false))),
        other => {
            let text = serde_json::to_string(other)?;
            let has_content_type =
                headers.contains_key("Content-Type") || headers.contains_key("content-type");
            Ok(Some((text, !has_content_type)))
        }
    }
}

/// Flatten response headers into a plain map. Repeated headers are joined
/// with `", "`; values that are not valid UTF-8 are replaced lossily.
fn fold_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut folded: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        folded
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    folded
}

/// Parse JSON response bodies into structured values; keep everything else,
/// including JSON that fails to parse, as plain text.
fn normalize_body(content_type: &str, text: String) -> Value {
    if content_type.contains("application/json") {
        match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) => Value::String(text),
        }
    } else {
        Value::String(text)
    }
}
