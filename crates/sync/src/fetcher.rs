//! Candidate sources.
//!
//! A fetcher never fails: any transport or parse problem is logged and
//! yields an empty batch, which the reconciler treats as "nothing new".

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use newswire_core::config::FetcherConfig;
use newswire_core::Candidate;

/// Title used when a scraped headline has no text.
const MISSING_TITLE: &str = "No title";

#[derive(Debug, Error)]
pub enum FetcherError {
    #[error("invalid fetch url '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("unknown fetch mode '{0}' (expected 'html' or 'static')")]
    UnknownMode(String),
}

/// Produces candidate records from an external source.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Return at most `limit` candidates, in source order.
    async fn fetch(&self, limit: usize) -> Vec<Candidate>;
}

/// Build the fetcher selected by `config.mode`.
pub fn from_config(config: &FetcherConfig) -> Result<Arc<dyn Fetcher>, FetcherError> {
    match config.mode.as_str() {
        "html" => Ok(Arc::new(HtmlFetcher::new(config)?)),
        "static" => Ok(Arc::new(StaticFetcher::fallback(&config.base_url))),
        other => Err(FetcherError::UnknownMode(other.to_string())),
    }
}

// ── Static ────────────────────────────────────────────────────

/// Serves a fixed candidate list.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    candidates: Vec<Candidate>,
}

impl StaticFetcher {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    /// Single placeholder headline pointing at the front page, for
    /// deployments that cannot reach the source.
    pub fn fallback(base_url: &str) -> Self {
        Self::new(vec![Candidate {
            published_text: Some(Utc::now().to_rfc3339()),
            ..Candidate::new(base_url, "Fallback news (scraping disabled)")
        }])
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, limit: usize) -> Vec<Candidate> {
        self.candidates.iter().take(limit).cloned().collect()
    }
}

// ── HTML front page ───────────────────────────────────────────

/// Scrapes the headline list from a news front page.
///
/// Each `a.newsline.article` anchor becomes one candidate:
///
/// | source                     | field            |
/// |----------------------------|------------------|
/// | `href` (joined on base)    | `url`            |
/// | `.newstext` text           | `title`          |
/// | `.newsflag[title]`         | `country`        |
/// | `.newsrecent` text         | `published_text` |
/// | digits of last `.newstc` div | `comments`     |
pub struct HtmlFetcher {
    client: reqwest::Client,
    base_url: Url,
}

impl HtmlFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, FetcherError> {
        let base_url = Url::parse(&config.base_url).map_err(|source| FetcherError::InvalidUrl {
            url: config.base_url.clone(),
            source,
        })?;
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client, base_url })
    }

    async fn fetch_page(&self) -> Result<String, reqwest::Error> {
        let response = self
            .client
            .get(self.base_url.clone())
            .send()
            .await?
            .error_for_status()?;
        info!(status = %response.status(), url = %response.url(), "front page fetched");
        response.text().await
    }
}

#[async_trait]
impl Fetcher for HtmlFetcher {
    async fn fetch(&self, limit: usize) -> Vec<Candidate> {
        match self.fetch_page().await {
            Ok(html) => {
                let candidates = parse_front_page(&html, &self.base_url, limit);
                info!(count = candidates.len(), "headlines parsed");
                candidates
            }
            Err(e) => {
                warn!(error = %e, url = %self.base_url, "front page fetch failed");
                Vec::new()
            }
        }
    }
}

macro_rules! lazy_regex {
    ($pattern:expr) => {
        LazyLock::new(|| Regex::new($pattern).unwrap_or_else(|_| unreachable!()))
    };
}

static ANCHOR: LazyLock<Regex> = lazy_regex!(r#"(?is)<a\s([^>]*)>(.*?)</a>"#);
static CLASS_ATTR: LazyLock<Regex> = lazy_regex!(r#"(?i)\bclass\s*=\s*"([^"]*)""#);
static HREF_ATTR: LazyLock<Regex> = lazy_regex!(r#"(?i)\bhref\s*=\s*"([^"]*)""#);
static TITLE_ATTR: LazyLock<Regex> = lazy_regex!(r#"(?i)\btitle\s*=\s*"([^"]*)""#);
static OPEN_TAG: LazyLock<Regex> = lazy_regex!(r#"(?is)<(\w+)(\s[^>]*)?>"#);
static INNER_DIV: LazyLock<Regex> = lazy_regex!(r#"(?is)<div[^>]*>([^<]*)</div>"#);
static ANY_TAG: LazyLock<Regex> = lazy_regex!(r#"(?s)<[^>]+>"#);
static ENTITY: LazyLock<Regex> =
    lazy_regex!(r#"&(?:#([0-9]{1,7})|#[xX]([0-9a-fA-F]{1,6})|([a-zA-Z]+));"#);

/// Extract up to `limit` candidates from front-page markup.
pub fn parse_front_page(html: &str, base: &Url, limit: usize) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for anchor in ANCHOR.captures_iter(html) {
        if candidates.len() >= limit {
            break;
        }
        let attrs = &anchor[1];
        let body = &anchor[2];
        if !has_classes(attrs, &["newsline", "article"]) {
            continue;
        }
        let href = HREF_ATTR
            .captures(attrs)
            .map(|c| decode_entities(&c[1]))
            .unwrap_or_default();
        let url = match base.join(href.trim()) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!(error = %e, href = %href, "skipping headline with bad href");
                continue;
            }
        };

        let title = element_text(body, "newstext")
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| MISSING_TITLE.to_string());
        let country = find_tag(body, "newsflag")
            .and_then(|(attrs, _)| TITLE_ATTR.captures(attrs).map(|c| decode_entities(&c[1])));
        let published_text = element_text(body, "newsrecent");
        let comments = find_tag(body, "newstc").and_then(|(_, rest)| last_div_digits(rest));

        candidates.push(Candidate {
            id: None,
            url: Some(url),
            title: Some(title),
            country,
            published_text,
            comments,
        });
    }
    candidates
}

fn has_classes(attrs: &str, wanted: &[&str]) -> bool {
    CLASS_ATTR
        .captures(attrs)
        .map(|c| {
            let classes: Vec<&str> = c[1].split_whitespace().collect();
            wanted.iter().all(|w| classes.contains(w))
        })
        .unwrap_or(false)
}

/// First element carrying `class`: its attribute string and the markup after
/// its opening tag.
fn find_tag<'a>(html: &'a str, class: &str) -> Option<(&'a str, &'a str)> {
    OPEN_TAG.captures_iter(html).find_map(|c| {
        let attrs = c.get(2)?;
        if !has_classes(attrs.as_str(), &[class]) {
            return None;
        }
        let end = c.get(0)?.end();
        Some((attrs.as_str(), &html[end..]))
    })
}

/// Text content of the first element carrying `class`, up to its closing tag.
fn element_text(html: &str, class: &str) -> Option<String> {
    let (_, rest) = find_tag(html, class)?;
    let inner = rest.split("</").next().unwrap_or_default();
    Some(text(inner))
}

fn last_div_digits(html: &str) -> Option<u32> {
    let raw = INNER_DIV.captures_iter(html).last()?;
    let digits: String = raw[1].chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn text(fragment: &str) -> String {
    let stripped = ANY_TAG.replace_all(fragment, "");
    decode_entities(stripped.trim())
}

/// Decode numeric references and the common named entities in one pass.
/// Unknown names and invalid code points are left as written.
fn decode_entities(s: &str) -> String {
    ENTITY
        .replace_all(s, |caps: &regex::Captures| {
            let decoded = if let Some(dec) = caps.get(1) {
                dec.as_str().parse().ok().and_then(char::from_u32)
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16).ok().and_then(char::from_u32)
            } else {
                match &caps[3] {
                    "amp" => Some('&'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "nbsp" => Some(' '),
                    "ndash" => Some('\u{2013}'),
                    "mdash" => Some('\u{2014}'),
                    "hellip" => Some('\u{2026}'),
                    "lsquo" => Some('\u{2018}'),
                    "rsquo" => Some('\u{2019}'),
                    "ldquo" => Some('\u{201C}'),
                    "rdquo" => Some('\u{201D}'),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
