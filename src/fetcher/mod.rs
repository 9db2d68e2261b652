//! Dual-mode page acquisition
//!
//! Phase one issues a plain HTTP GET with the configured User-Agent,
//! timeout, and a streamed body-size cap, accepting only allow-listed MIME
//! types. Network errors and non-success statuses fall back to phase two,
//! a headless-browser render; a disallowed Content-Type or an oversized
//! body is terminal and never falls back. Either phase's success returns
//! immediately.

pub mod browser;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, LAST_MODIFIED};

use crate::config::CrawlerConfig;
use crate::error::FetchError;
use crate::metrics;

use browser::BrowserFetcher;

/// A successfully acquired page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: String,
    /// MIME type without parameters, lowercased
    pub content_type: String,
    pub status_code: u16,
    pub last_modified: Option<DateTime<Utc>>,
    pub headers: HashMap<String, String>,
}

/// Dual-mode page fetcher
///
/// Owns no persistent state beyond the shared browser handle, which is
/// initialized on first use and torn down through [`PageFetcher::shutdown`].
pub struct PageFetcher {
    client: reqwest::Client,
    browser: BrowserFetcher,
    allowed_types: Vec<String>,
    max_page_size: usize,
    render_wait: Duration,
}

impl PageFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/json;q=0.9,text/plain;q=0.8,*/*;q=0.5",
            ),
        );

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .default_headers(headers)
            .gzip(true)
            .cookie_store(true)
            .build()?;

        let browser = BrowserFetcher::new(
            &config.user_agent,
            Duration::from_millis(config.request_timeout_ms),
        );

        Ok(Self {
            client,
            browser,
            allowed_types: config
                .allowed_content_types
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            max_page_size: config.max_page_size,
            render_wait: Duration::from_millis(config.render_wait_ms),
        })
    }

    /// Acquire a page, trying plain HTTP first and the rendered phase on
    /// transport-level failure
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        match self.fetch_http(url).await {
            Ok(page) => Ok(page),
            // Guard rejections are terminal for the URL, not transport
            // failures; do not burn a browser render on them
            Err(err @ FetchError::UnsupportedContentType(_))
            | Err(err @ FetchError::TooLarge { .. }) => Err(err),
            Err(http_err) => {
                tracing::debug!(url, error = %http_err, "HTTP phase failed; trying rendered phase");
                metrics::FETCH_FALLBACKS.inc();
                self.fetch_rendered(url).await
            }
        }
    }

    /// Plain HTTP phase
    async fn fetch_http(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let started = Instant::now();
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = resp.status().as_u16();
        if status >= 400 {
            return Err(FetchError::Status(status));
        }

        let content_type_header = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        let mime = mime_essence(&content_type_header);

        if !self.allowed_types.iter().any(|t| *t == mime) {
            return Err(FetchError::UnsupportedContentType(mime));
        }

        let last_modified = resp
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);

        let headers: HashMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        if let Some(len) = resp.content_length() {
            if len as usize > self.max_page_size {
                return Err(FetchError::TooLarge {
                    size: len as usize,
                    limit: self.max_page_size,
                });
            }
        }

        // Stream the body so the cap holds even without a Content-Length
        let mut resp = resp;
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Http(e)
            }
        })? {
            if bytes.len() + chunk.len() > self.max_page_size {
                return Err(FetchError::TooLarge {
                    size: bytes.len() + chunk.len(),
                    limit: self.max_page_size,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        let body = decode_body(&bytes, &content_type_header);
        metrics::observe_fetch("http", started.elapsed().as_secs_f64());

        Ok(FetchedPage {
            body,
            content_type: mime,
            status_code: status,
            last_modified,
            headers,
        })
    }

    /// Rendered phase: headless-browser fallback
    async fn fetch_rendered(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let started = Instant::now();
        let body = self
            .browser
            .render(url, self.render_wait)
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        metrics::observe_fetch("rendered", started.elapsed().as_secs_f64());

        Ok(FetchedPage {
            body,
            content_type: String::from("text/html"),
            status_code: 200,
            last_modified: None,
            headers: HashMap::new(),
        })
    }

    /// Tear down the shared browser, if one was ever launched
    pub async fn shutdown(&self) {
        self.browser.shutdown().await;
    }
}

/// MIME type without parameters, lowercased
fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Parse an HTTP date header (IMF-fixdate)
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Decode a response body to text using the declared charset
///
/// Falls back to UTF-8 (lossy) when the charset is absent or unknown; the
/// web is messy and a mojibake page is still worth extracting links from.
fn decode_body(bytes: &[u8], content_type: &str) -> String {
    let charset = content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().strip_prefix("charset="))
        .next()
        .map(|c| c.trim_matches('"'));

    if let Some(label) = charset {
        if let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) {
            let (text, _, _) = encoding.decode(bytes);
            return text.into_owned();
        }
    }

    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_essence() {
        assert_eq!(mime_essence("text/html; charset=utf-8"), "text/html");
        assert_eq!(mime_essence("TEXT/HTML"), "text/html");
        assert_eq!(mime_essence("application/json"), "application/json");
    }

    #[test]
    fn test_parse_http_date() {
        let parsed = parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2015-10-21T07:28:00+00:00");
        assert!(parse_http_date("not a date").is_none());
    }

    #[test]
    fn test_decode_body_utf8() {
        let text = "héllo wörld";
        assert_eq!(
            decode_body(text.as_bytes(), "text/html; charset=utf-8"),
            text
        );
    }

    #[test]
    fn test_decode_body_latin1() {
        // "café" in ISO-8859-1
        let bytes: &[u8] = &[0x63, 0x61, 0x66, 0xE9];
        assert_eq!(
            decode_body(bytes, "text/html; charset=iso-8859-1"),
            "café"
        );
    }

    #[test]
    fn test_decode_body_no_charset() {
        assert_eq!(decode_body(b"plain ascii", "text/html"), "plain ascii");
    }

    #[test]
    fn test_decode_body_quoted_charset() {
        let text = "ok";
        assert_eq!(
            decode_body(text.as_bytes(), "text/html; charset=\"utf-8\""),
            text
        );
    }
}
