//! Rate-limited WebDAV transport: all remote I/O goes through here so
//! throttling, retry, and error normalization happen in one place.

use std::str::FromStr;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::TransportError;
use crate::transport::limiter::ConcurrencyLimiter;
use crate::transport::retry;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDepth {
    Zero,
    One,
    Infinity,
}

impl ListDepth {
    fn header_value(self) -> &'static str {
        match self {
            ListDepth::Zero => "0",
            ListDepth::One => "1",
            ListDepth::Infinity => "infinity",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DavEntry {
    pub href: String,
    pub is_directory: bool,
}

/// A rate-limited, retrying HTTP client speaking just enough WebDAV for
/// this crate's needs. One instance's limiter state is shared by every
/// call made through it.
pub struct WebDavClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    retry_attempts: u32,
    limiter: ConcurrencyLimiter,
}

impl WebDavClient {
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>, max_concurrency: usize, request_delay_ms: u64, retry_attempts: u32) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with default TLS backend");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            retry_attempts,
            limiter: ConcurrencyLimiter::new(max_concurrency.min(3).max(1), Duration::from_millis(request_delay_ms)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>, content_type: Option<&str>, extra_headers: &[(&str, &str)]) -> Result<(StatusCode, Vec<u8>), TransportError> {
        let url = self.url(path);

        retry::with_retry(self.retry_attempts, || async {
            let _slot = self.limiter.acquire().await;

            let mut request = self
                .http
                .request(method.clone(), &url)
                .basic_auth(&self.username, Some(&self.password));

            if let Some(ct) = content_type {
                request = request.header(reqwest::header::CONTENT_TYPE, ct);
            }
            for (k, v) in extra_headers {
                request = request.header(*k, *v);
            }
            if let Some(b) = &body {
                request = request.body(b.clone());
            }

            let result = request.send().await;
            self.limiter.record_completed().await;

            let response = result.map_err(classify_reqwest_error)?;
            let status = response.status();
            let bytes = response.bytes().await.map_err(classify_reqwest_error)?.to_vec();

            if status.is_success() {
                Ok((status, bytes))
            } else {
                Err(classify_status(status))
            }
        })
        .await
    }

    pub async fn test_connection(&self) -> Result<(), TransportError> {
        self.send(propfind(), "", None, None, &[("Depth", "0")]).await.map(|_| ())
    }

    /// Treats `NotFound` as "does not exist" rather than a failure;
    /// `RemoteConflict` (often a missing parent collection) is absorbed
    /// the same way.
    pub async fn exists(&self, path: &str) -> Result<bool, TransportError> {
        match self.send(propfind(), path, None, None, &[("Depth", "0")]).await {
            Ok(_) => Ok(true),
            Err(TransportError::NotFound | TransportError::RemoteConflict) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Treats `MethodNotAllowed` and `RemoteConflict` as "already
    /// exists" rather than a failure.
    pub async fn create_directory(&self, path: &str) -> Result<(), TransportError> {
        match self.send(mkcol(), path, None, None, &[]).await {
            Ok(_) => Ok(()),
            Err(TransportError::MethodNotAllowed | TransportError::RemoteConflict) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn upload_text(&self, path: &str, body: &str, content_type: Option<&str>) -> Result<(), TransportError> {
        self.send(Method::PUT, path, Some(body.as_bytes().to_vec()), Some(content_type.unwrap_or("text/plain; charset=utf-8")), &[])
            .await
            .map(|_| ())
    }

    pub async fn upload_json<T: Serialize + Sync>(&self, path: &str, value: &T) -> Result<(), TransportError> {
        let body = serde_json::to_vec(value).map_err(|e| TransportError::DeserializationError(e.to_string()))?;
        self.send(Method::PUT, path, Some(body), Some("application/json"), &[]).await.map(|_| ())
    }

    pub async fn upload_binary(&self, path: &str, bytes: &[u8]) -> Result<(), TransportError> {
        self.send(Method::PUT, path, Some(bytes.to_vec()), Some("application/octet-stream"), &[]).await.map(|_| ())
    }

    pub async fn download_text(&self, path: &str) -> Result<String, TransportError> {
        let (_, bytes) = self.send(Method::GET, path, None, None, &[]).await?;
        String::from_utf8(bytes).map_err(|e| TransportError::DeserializationError(e.to_string()))
    }

    pub async fn download_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let (_, bytes) = self.send(Method::GET, path, None, None, &[]).await?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::DeserializationError(e.to_string()))
    }

    pub async fn download_json_value(&self, path: &str) -> Result<Value, TransportError> {
        self.download_json(path).await
    }

    pub async fn download_binary(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        let (_, bytes) = self.send(Method::GET, path, None, None, &[]).await?;
        Ok(bytes)
    }

    /// Swallows `NotFound`.
    pub async fn delete(&self, path: &str) -> Result<(), TransportError> {
        match self.send(Method::DELETE, path, None, None, &[]).await {
            Ok(_) => Ok(()),
            Err(TransportError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn list(&self, path: &str, depth: ListDepth) -> Result<Vec<DavEntry>, TransportError> {
        let (_, bytes) = self.send(propfind(), path, None, Some("application/xml"), &[("Depth", depth.header_value())]).await?;
        let body = String::from_utf8(bytes).map_err(|e| TransportError::DeserializationError(e.to_string()))?;
        Ok(parse_multistatus(&body, path))
    }
}

fn propfind() -> Method {
    Method::from_str("PROPFIND").expect("PROPFIND is a valid extension method token")
}

fn mkcol() -> Method {
    Method::from_str("MKCOL").expect("MKCOL is a valid extension method token")
}

fn classify_status(status: StatusCode) -> TransportError {
    match status.as_u16() {
        401 => TransportError::AuthFailure,
        403 => TransportError::PermissionDenied,
        404 => TransportError::NotFound,
        405 => TransportError::MethodNotAllowed,
        409 => TransportError::RemoteConflict,
        507 => TransportError::QuotaExceeded,
        500..=599 => TransportError::ServerError(status.to_string()),
        other => TransportError::ServerError(format!("unexpected status {}", other)),
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() || err.is_connect() {
        TransportError::NetworkError(err.to_string())
    } else if let Some(status) = err.status() {
        classify_status(status)
    } else {
        TransportError::NetworkError(err.to_string())
    }
}

/// Hand-rolled multistatus parser: the corpus carries no XML crate, so
/// this scans for `<D:href>`/`<d:href>` and a same-response
/// `resourcetype` collection marker rather than pulling in a full XML
/// dependency for one response shape.
fn parse_multistatus(body: &str, queried_path: &str) -> Vec<DavEntry> {
    let mut entries = Vec::new();
    let queried = queried_path.trim_end_matches('/');

    for response_block in split_responses(body) {
        let Some(href) = extract_tag_text(&response_block, "href") else {
            continue;
        };
        let href_trimmed = href.trim_end_matches('/').to_string();
        if href_trimmed.ends_with(queried) && (href_trimmed.len() == queried.len() || queried.is_empty()) {
            continue;
        }

        let is_directory = response_block.contains("<D:collection") || response_block.contains("<d:collection") || response_block.contains("resourcetype><collection");

        entries.push(DavEntry { href, is_directory });
    }

    entries
}

fn split_responses(body: &str) -> Vec<String> {
    let lower = body.to_lowercase();
    let mut out = Vec::new();
    let mut search_from = 0usize;

    while let Some(start) = lower[search_from..].find("<d:response") .or_else(|| lower[search_from..].find("<response")) {
        let abs_start = search_from + start;
        let tail = &lower[abs_start..];
        let Some(end_rel) = tail.find("</d:response>").or_else(|| tail.find("</response>")) else {
            break;
        };
        let abs_end = abs_start + end_rel;
        out.push(body[abs_start..abs_end].to_string());
        search_from = abs_end + 1;
    }

    out
}

fn extract_tag_text(block: &str, tag: &str) -> Option<String> {
    let lower = block.to_lowercase();
    let open_variants = [format!("<d:{}>", tag), format!("<{}>", tag)];
    for open in &open_variants {
        if let Some(start) = lower.find(open.as_str()) {
            let content_start = start + open.len();
            let close_variants = [format!("</d:{}>", tag), format!("</{}>", tag)];
            for close in &close_variants {
                if let Some(end_rel) = lower[content_start..].find(close.as_str()) {
                    return Some(block[content_start..content_start + end_rel].trim().to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_statuses() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), TransportError::AuthFailure);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), TransportError::NotFound);
        assert_eq!(classify_status(StatusCode::CONFLICT), TransportError::RemoteConflict);
        assert_eq!(classify_status(StatusCode::INSUFFICIENT_STORAGE), TransportError::QuotaExceeded);
    }

    #[test]
    fn parses_multistatus_entries_excluding_queried_path() {
        let body = r#"
        <?xml version="1.0"?>
        <D:multistatus xmlns:D="DAV:">
          <D:response>
            <D:href>/FlashNote/notes/</D:href>
            <D:propstat><D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop></D:propstat>
          </D:response>
          <D:response>
            <D:href>/FlashNote/notes/abc.md</D:href>
            <D:propstat><D:prop><D:resourcetype/></D:prop></D:propstat>
          </D:response>
        </D:multistatus>
        "#;

        let entries = parse_multistatus(body, "/FlashNote/notes/");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].href, "/FlashNote/notes/abc.md");
        assert!(!entries[0].is_directory);
    }
}
