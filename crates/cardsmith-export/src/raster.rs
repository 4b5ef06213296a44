//! SVG → PNG rasterization with `resvg`.

use crate::validate::{SvgValidationError, ValidationLimits, validate_output_size, validate_svg};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
#[cfg(not(feature = "system-fonts"))]
use std::sync::OnceLock;

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error(transparent)]
    Validation(#[from] SvgValidationError),
    #[error("invalid raster option: {0}")]
    InvalidOption(String),
    #[error("failed to parse SVG: {0}")]
    SvgParse(#[from] usvg::Error),
    #[error("failed to allocate {width}x{height} pixmap for raster rendering")]
    PixmapAlloc { width: u32, height: u32 },
    #[error("failed to encode PNG")]
    PngEncode,
    #[error("raster task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl RasterError {
    /// True when the input or options were rejected, as opposed to the rasterizer failing.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidOption(_))
    }

    pub fn status_code(&self) -> u16 {
        if self.is_validation() { 400 } else { 500 }
    }
}

pub type Result<T> = std::result::Result<T, RasterError>;

#[derive(Debug, Clone, Default)]
pub struct PngOptions {
    /// Target width in px; the SVG's aspect ratio is kept.
    pub width: Option<u32>,
    /// Target height in px. With `width` set too, the image is fitted inside both.
    pub height: Option<u32>,
    /// CSS color painted beneath the SVG; transparent when unset.
    pub background_color: Option<String>,
    /// Extra pixels on every side, painted with the background.
    pub bleed: u32,
    pub skip_validation: bool,
    pub limits: ValidationLimits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PngResult {
    pub buffer: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// With `system-fonts` the database is the one text measurement already loaded, so a process
/// that both fits and rasterizes card text scans the system fonts once.
#[cfg(feature = "system-fonts")]
fn shared_fontdb() -> Arc<usvg::fontdb::Database> {
    cardsmith_text::measure::system::system_font_database()
}

#[cfg(not(feature = "system-fonts"))]
fn shared_fontdb() -> Arc<usvg::fontdb::Database> {
    static DB: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();
    DB.get_or_init(|| {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        tracing::debug!(faces = db.len(), "loaded system fonts for rasterization");
        Arc::new(db)
    })
    .clone()
}

fn usvg_options() -> usvg::Options<'static> {
    let mut opt = usvg::Options::default();
    opt.fontdb = shared_fontdb();
    // Keep output stable-ish across environments while still using system fonts.
    opt.font_family = "Arial".to_string();
    // Only inline data URIs resolve; never read files or URLs named by the input.
    opt.image_href_resolver = usvg::ImageHrefResolver {
        resolve_data: usvg::ImageHrefResolver::default_data_resolver(),
        resolve_string: Box::new(skip_string_href),
    };
    opt
}

fn skip_string_href(_href: &str, _opts: &usvg::Options) -> Option<usvg::ImageKind> {
    None
}

fn fit_scale(intrinsic_w: f32, intrinsic_h: f32, width: Option<u32>, height: Option<u32>) -> f32 {
    let sx = width.map(|w| w as f32 / intrinsic_w);
    let sy = height.map(|h| h as f32 / intrinsic_h);
    match (sx, sy) {
        (Some(sx), Some(sy)) => sx.min(sy),
        (Some(s), None) | (None, Some(s)) => s,
        (None, None) => 1.0,
    }
}

/// Rasterizes `svg` to PNG on the current thread.
///
/// The SVG must be self-contained: run [`crate::embed_images`] first, since external references
/// are never resolved here.
pub fn svg_to_png_sync(svg: &str, options: &PngOptions) -> Result<PngResult> {
    if !options.skip_validation {
        validate_svg(svg, &options.limits)?;
    }
    for (name, value) in [("width", options.width), ("height", options.height)] {
        if value == Some(0) {
            return Err(RasterError::InvalidOption(format!("{name} must be positive")));
        }
    }
    let background = options
        .background_color
        .as_deref()
        .map(|raw| {
            parse_tiny_skia_color(raw)
                .ok_or_else(|| RasterError::InvalidOption(format!("background color {raw:?}")))
        })
        .transpose()?;

    let tree = usvg::Tree::from_str(svg, &usvg_options())?;
    let size = tree.size();
    let scale = fit_scale(size.width(), size.height(), options.width, options.height);

    let content_w = (size.width() * scale).ceil().max(1.0) as u32;
    let content_h = (size.height() * scale).ceil().max(1.0) as u32;
    let width = content_w.saturating_add(options.bleed.saturating_mul(2));
    let height = content_h.saturating_add(options.bleed.saturating_mul(2));
    if !options.skip_validation {
        validate_output_size(width, height, &options.limits)?;
    }

    let mut pixmap =
        tiny_skia::Pixmap::new(width, height).ok_or(RasterError::PixmapAlloc { width, height })?;
    if let Some(color) = background {
        pixmap.fill(color);
    }

    let offset = options.bleed as f32;
    let transform = tiny_skia::Transform::from_row(scale, 0.0, 0.0, scale, offset, offset);
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let buffer = pixmap.encode_png().map_err(|_| RasterError::PngEncode)?;
    tracing::debug!(width, height, scale, bytes = buffer.len(), "rasterized SVG");
    Ok(PngResult {
        buffer,
        width,
        height,
    })
}

/// Rasterizes `svg` to PNG on Tokio's blocking thread pool.
///
/// Outside a Tokio runtime (for example under `futures::executor::block_on`) there is no pool
/// to hand the work to, so it runs inline on the polling thread like [`svg_to_png_sync`].
pub async fn svg_to_png(svg: &str, options: &PngOptions) -> Result<PngResult> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return svg_to_png_sync(svg, options);
    };
    let svg = svg.to_string();
    let options = options.clone();
    runtime
        .spawn_blocking(move || svg_to_png_sync(&svg, &options))
        .await?
}

/// Like [`svg_to_png`], returning a `data:image/png;base64,...` URL.
pub async fn svg_to_png_data_url(svg: &str, options: &PngOptions) -> Result<String> {
    let png = svg_to_png(svg, options).await?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(&png.buffer)))
}

/// Parses `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa` and a few keywords.
pub fn parse_tiny_skia_color(text: &str) -> Option<tiny_skia::Color> {
    let s = text.trim().to_ascii_lowercase();
    match s.as_str() {
        "transparent" | "none" => return Some(tiny_skia::Color::from_rgba8(0, 0, 0, 0)),
        "white" => return Some(tiny_skia::Color::from_rgba8(255, 255, 255, 255)),
        "black" => return Some(tiny_skia::Color::from_rgba8(0, 0, 0, 255)),
        _ => {}
    }

    let hex = s.strip_prefix('#')?;
    let nibble = |b: u8| (b as char).to_digit(16).map(|v| v as u8);
    let digits: Vec<u8> = hex.bytes().map(nibble).collect::<Option<_>>()?;
    let channels: Vec<u8> = match digits.len() {
        3 | 4 => digits.iter().map(|v| (v << 4) | v).collect(),
        6 | 8 => digits.chunks_exact(2).map(|p| (p[0] << 4) | p[1]).collect(),
        _ => return None,
    };
    let alpha = channels.get(3).copied().unwrap_or(255);
    Some(tiny_skia::Color::from_rgba8(
        channels[0],
        channels[1],
        channels[2],
        alpha,
    ))
}
