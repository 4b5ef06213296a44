//! Inlining external images so an SVG rasterizes without network access.

use crate::fetch::{FetchError, ImageFetcher, to_data_uri};
use futures::StreamExt as _;
use futures::stream;
use indexmap::IndexSet;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::OnceLock;
use std::time::Duration;


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedOptions {
    /// Maximum number of fetches in flight at once. Zero is treated as one.
    pub concurrency: usize,
    pub timeout: Duration,
    /// Fail the whole operation when any image cannot be fetched.
    pub throw_on_error: bool,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            timeout: Duration::from_secs(10),
            throw_on_error: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("failed to embed image {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
}

/// One external image reference found in an SVG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// The exact matched substring.
    pub full_match: String,
    pub url: String,
    /// Byte offset of `full_match` in the SVG.
    pub index: usize,
}

fn image_href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<image\b[^>]*?\s(?:xlink:)?href\s*=\s*["'](https?://[^"']+)["']"#)
            .expect("valid regex")
    })
}

fn css_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"url\(\s*["']?(https?://[^"')\s]+)["']?\s*\)"#).expect("valid regex")
    })
}

/// Finds `<image href>` / `xlink:href` and CSS `url(...)` references to `http(s)` URLs, in
/// document order. Relative paths and `data:` URIs are ignored.
pub fn find_external_images(svg: &str) -> Vec<ImageReference> {
    let mut refs: Vec<ImageReference> = [image_href_regex(), css_url_regex()]
        .into_iter()
        .flat_map(|re| re.captures_iter(svg))
        .filter_map(|caps| {
            let full = caps.get(0)?;
            let url = caps.get(1)?;
            Some(ImageReference {
                full_match: full.as_str().to_string(),
                url: url.as_str().to_string(),
                index: full.start(),
            })
        })
        .collect();
    refs.sort_by_key(|r| r.index);
    refs
}

pub fn has_external_images(svg: &str) -> bool {
    image_href_regex().is_match(svg) || css_url_regex().is_match(svg)
}

async fn fetch_data_uri(
    fetcher: &dyn ImageFetcher,
    url: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    // Attribute values carry XML-escaped ampersands.
    let target = url.replace("&amp;", "&");
    let image = tokio::time::timeout(timeout, fetcher.fetch(&target))
        .await
        .map_err(|_| FetchError::Timeout(timeout))??;
    to_data_uri(&image)
}

/// Replaces every external image reference in `svg` with an inline base64 data URI.
///
/// Each unique URL is fetched once, with at most `options.concurrency` fetches in flight and
/// `options.timeout` per fetch. All fetches settle before anything is substituted, so a failure
/// with `throw_on_error` never leaves a half-rewritten SVG. Without `throw_on_error`, URLs that
/// fail stay as they are (and will not render).
///
/// Returns the input unchanged, without calling the fetcher, when there is nothing to embed.
///
/// # Panics
///
/// Fetch timeouts use `tokio::time`, so once there is something to fetch this must be polled
/// inside a Tokio runtime with the time driver enabled. SVGs without external images return
/// before any timer is created.
pub async fn embed_images<'a>(
    svg: &'a str,
    fetcher: &dyn ImageFetcher,
    options: &EmbedOptions,
) -> Result<Cow<'a, str>, EmbedError> {
    let refs = find_external_images(svg);
    if refs.is_empty() {
        return Ok(Cow::Borrowed(svg));
    }

    let urls: IndexSet<String> = refs.into_iter().map(|r| r.url).collect();
    let concurrency = options.concurrency.max(1);
    let timeout = options.timeout;
    tracing::debug!(
        references = urls.len(),
        concurrency,
        "embedding external images"
    );

    let mut settled: Vec<(usize, Result<String, FetchError>)> =
        stream::iter(urls.iter().enumerate())
            .map(move |(idx, url)| async move {
                (idx, fetch_data_uri(fetcher, url, timeout).await)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
    settled.sort_by_key(|(idx, _)| *idx);

    let mut embedded: HashMap<&str, String> = HashMap::with_capacity(settled.len());
    let mut first_error: Option<EmbedError> = None;
    for (idx, result) in settled {
        let url = urls[idx].as_str();
        match result {
            Ok(data_uri) => {
                embedded.insert(url, data_uri);
            }
            Err(err) => {
                tracing::warn!(url, error = %err, "failed to embed external image");
                if options.throw_on_error && first_error.is_none() {
                    first_error = Some(EmbedError::Fetch {
                        url: url.to_string(),
                        source: err,
                    });
                }
            }
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }
    if embedded.is_empty() {
        return Ok(Cow::Borrowed(svg));
    }

    let out = substitute_urls(svg, &embedded);
    tracing::debug!(
        embedded = embedded.len(),
        failed = urls.len() - embedded.len(),
        "embedded external images"
    );
    Ok(Cow::Owned(out))
}

/// Byte ranges of every matched URL value, in order and without overlaps.
fn url_spans(svg: &str) -> Vec<Range<usize>> {
    let mut spans: Vec<Range<usize>> = [image_href_regex(), css_url_regex()]
        .into_iter()
        .flat_map(|re| re.captures_iter(svg))
        .filter_map(|caps| caps.get(1).map(|m| m.range()))
        .collect();
    spans.sort_by_key(|span| span.start);
    let mut end = 0;
    spans.retain(|span| {
        let keep = span.start >= end;
        if keep {
            end = span.end;
        }
        keep
    });
    spans
}

/// Rewrites only the matched URL values; text outside them, including URLs that failed, stays
/// byte-for-byte intact.
fn substitute_urls(svg: &str, embedded: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(svg.len());
    let mut last = 0;
    for span in url_spans(svg) {
        if let Some(data_uri) = embedded.get(&svg[span.clone()]) {
            out.push_str(&svg[last..span.start]);
            out.push_str(data_uri);
            last = span.end;
        }
    }
    out.push_str(&svg[last..]);
    out
}
