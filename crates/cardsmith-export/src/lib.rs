#![forbid(unsafe_code)]

//! Server-side export pipeline for card SVGs.
//!
//! `render → SVG string → embed_images() → svg_to_png() → PNG bytes`
//!
//! - [`embed`]: inlines external `<image>` / CSS `url(...)` references as base64 data URIs,
//!   fetching each unique URL once with bounded concurrency and a per-fetch timeout.
//! - [`raster`]: validates and rasterizes a self-contained SVG to PNG with `resvg`.
//! - [`handler`]: the request-level export operation used by HTTP endpoints and the CLI.
//!
//! # Features
//!
//! - `http` (default): [`fetch::HttpFetcher`], a `reqwest`-backed [`ImageFetcher`].

pub mod embed;
pub mod fetch;
pub mod handler;
pub mod raster;
pub mod validate;

pub use embed::{
    EmbedError, EmbedOptions, ImageReference, embed_images, find_external_images,
    has_external_images,
};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use fetch::{FetchError, FetchedImage, ImageFetcher};
pub use handler::{ExportError, ExportRequest, ExportResponse, export_png, sanitize_filename};
pub use raster::{
    PngOptions, PngResult, RasterError, svg_to_png, svg_to_png_data_url, svg_to_png_sync,
};
pub use validate::{SvgValidationError, ValidationLimits, validate_svg};
