use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use url::Url;

use crate::error::Result;

const USER_AGENT_STRING: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Content shorter than this is treated as a stub even without a marker.
const MIN_COMPLETE_LENGTH: usize = 500;

/// Extracted text shorter than this is treated as an extraction failure.
const MIN_EXTRACTED_LENGTH: usize = 200;

static TRUNCATION_RE: OnceLock<Regex> = OnceLock::new();

/// Whether the provider elided content past a character count, e.g.
/// `"...story continues [+1234 chars]"`.
pub fn is_truncated(content: &str) -> bool {
    let re = TRUNCATION_RE
        .get_or_init(|| Regex::new(r"\[\+\d+ chars\]").expect("valid truncation regex"));
    re.is_match(content)
}

/// Whether stored content should be replaced with the full article body
/// before fact extraction. Unmarked content above the minimum length is
/// considered complete and never triggers a network call.
pub fn needs_backfill(content: &str) -> bool {
    is_truncated(content) || content.len() <= MIN_COMPLETE_LENGTH
}

pub struct ContentFetcher {
    client: Client,
}

impl ContentFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    /// Fetch the full article body from its canonical URL. Returns `None`
    /// when the page cannot be fetched or yields no usable text; the
    /// caller keeps whatever content it already has.
    pub async fn fetch_full_content(&self, article_url: &str) -> Result<Option<String>> {
        if Url::parse(article_url).is_err() {
            return Ok(None);
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));

        let response = self
            .client
            .get(article_url)
            .headers(headers)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!("Failed to fetch {}: {}", article_url, response.status());
            return Ok(None);
        }

        let html = response.text().await?;

        Ok(extract_content(&html))
    }
}

impl Default for ContentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract readable text from HTML: strip markup, collapse whitespace, trim.
fn extract_content(html: &str) -> Option<String> {
    let text = match html2text::from_read(html.as_bytes(), 80) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            return None;
        }
    };

    let cleaned: String = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if cleaned.len() > MIN_EXTRACTED_LENGTH {
        Some(cleaned)
    } else {
        tracing::debug!("Extracted content too short ({} chars)", cleaned.len());
        None
    }
}
