//! Request-level PNG export, as served by the `/export` endpoint.

use crate::embed::{EmbedError, EmbedOptions, embed_images, has_external_images};
use crate::fetch::ImageFetcher;
use crate::raster::{PngOptions, RasterError, svg_to_png};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

const DEFAULT_FILENAME: &str = "card";
const MAX_FILENAME_CHARS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Raster(#[from] RasterError),
}

impl ExportError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Raster(err) => err.status_code(),
            Self::Embed(_) => 500,
        }
    }

    /// Message safe to return to clients; server-side failures stay generic.
    pub fn public_message(&self) -> String {
        if self.status_code() >= 500 {
            "Failed to generate PNG".to_string()
        } else {
            self.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub svg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl ExportRequest {
    pub fn new(svg: impl Into<String>) -> Self {
        Self {
            svg: svg.into(),
            filename: None,
        }
    }

    /// Parses a JSON request body, reporting a missing or non-string `svg` as a bad request.
    pub fn from_json(body: &[u8]) -> Result<Self, ExportError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ExportError::BadRequest(format!("invalid JSON body: {e}")))?;
        let svg = value
            .get("svg")
            .and_then(Value::as_str)
            .ok_or_else(|| ExportError::BadRequest("missing or invalid svg".to_string()))?;
        let filename = value
            .get("filename")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            svg: svg.to_string(),
            filename,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResponse {
    pub content_type: &'static str,
    pub content_disposition: String,
    /// Sanitized file name including the `.png` extension.
    pub filename: String,
    pub body: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Keeps ASCII letters, digits, `_`, `-` and spaces so the name is safe inside a
/// `Content-Disposition` header and as a path component.
pub fn sanitize_filename(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' '))
        .take(MAX_FILENAME_CHARS)
        .collect();
    let trimmed = kept.trim();
    if trimmed.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Embeds external images (when there are any) and rasterizes the request's SVG.
///
/// Needs a Tokio runtime when the SVG references external images; see [`embed_images`].
pub async fn export_png(
    request: &ExportRequest,
    fetcher: &dyn ImageFetcher,
    embed: &EmbedOptions,
    png: &PngOptions,
) -> Result<ExportResponse, ExportError> {
    if request.svg.trim().is_empty() {
        return Err(ExportError::BadRequest("svg is empty".to_string()));
    }
    let stem = sanitize_filename(request.filename.as_deref().unwrap_or(DEFAULT_FILENAME));

    let svg: Cow<'_, str> = if has_external_images(&request.svg) {
        embed_images(&request.svg, fetcher, embed).await?
    } else {
        Cow::Borrowed(request.svg.as_str())
    };
    let rendered = svg_to_png(&svg, png).await?;

    let filename = format!("{stem}.png");
    tracing::debug!(%filename, bytes = rendered.buffer.len(), "exported card PNG");
    Ok(ExportResponse {
        content_type: "image/png",
        content_disposition: format!("attachment; filename=\"{filename}\""),
        filename,
        body: rendered.buffer,
        width: rendered.width,
        height: rendered.height,
    })
}
