//! Fetching external images and turning them into data URIs.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::future::BoxFuture;
use image::ImageFormat;
use std::io::Cursor;
use std::time::Duration;

#[cfg(feature = "http")]
const USER_AGENT: &str = concat!("cardsmith-export/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP status {status}")]
    Status { status: u16 },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[cfg(feature = "http")]
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to convert WebP image to PNG: {0}")]
    Convert(#[from] image::ImageError),
}

/// Raw bytes of a fetched image plus the `Content-Type` the server declared, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchedImage {
    pub fn new(bytes: Vec<u8>, content_type: Option<&str>) -> Self {
        Self {
            bytes,
            content_type: content_type.map(str::to_string),
        }
    }
}

/// Retrieves the bytes behind an absolute `http(s)` URL.
///
/// Implementations report non-2xx responses and transport failures as [`FetchError`]s; the
/// embedding step applies timeouts and decides whether a failure is fatal.
pub trait ImageFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<FetchedImage, FetchError>>;
}

#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
impl ImageFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<FetchedImage, FetchError>> {
        Box::pin(async move {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                });
            }
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let bytes = response.bytes().await?.to_vec();
            Ok(FetchedImage {
                bytes,
                content_type,
            })
        })
    }
}

/// Resolves the MIME type of a fetched image.
///
/// A declared `image/*` type wins (parameters stripped); anything else is sniffed from the
/// payload, defaulting to `image/png`.
pub fn resolve_mime_type(content_type: Option<&str>, bytes: &[u8]) -> String {
    let declared = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| ct.starts_with("image/"));
    if let Some(mime) = declared {
        return mime;
    }
    sniff_mime_type(bytes).unwrap_or("image/png").to_string()
}

fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if let Ok(format) = image::guess_format(bytes) {
        return Some(format.to_mime_type());
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let head = head.trim_start();
    if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
        return Some("image/svg+xml");
    }
    None
}

/// Re-encodes WebP bytes as PNG; the rasterizer does not decode WebP reliably.
pub fn webp_to_png(bytes: &[u8]) -> Result<Vec<u8>, FetchError> {
    let decoded = image::load_from_memory_with_format(bytes, ImageFormat::WebP)?;
    let mut out = Cursor::new(Vec::new());
    decoded.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Encodes a fetched image as a `data:<mime>;base64,...` URI, converting WebP to PNG first.
pub fn to_data_uri(image: &FetchedImage) -> Result<String, FetchError> {
    let mime = resolve_mime_type(image.content_type.as_deref(), &image.bytes);
    if mime == "image/webp" {
        let png = webp_to_png(&image.bytes)?;
        return Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)));
    }
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(&image.bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(format: ImageFormat) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([200, 30, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, format)
            .expect("encode fixture");
        out.into_inner()
    }

    #[test]
    fn declared_type_wins_and_drops_parameters() {
        assert_eq!(
            resolve_mime_type(Some("image/JPEG; charset=binary"), b"whatever"),
            "image/jpeg"
        );
    }

    #[test]
    fn generic_type_is_sniffed() {
        let png = encode(ImageFormat::Png);
        assert_eq!(
            resolve_mime_type(Some("application/octet-stream"), &png),
            "image/png"
        );
        assert_eq!(
            resolve_mime_type(None, b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>"),
            "image/svg+xml"
        );
        assert_eq!(resolve_mime_type(None, b"????"), "image/png");
    }

    #[test]
    fn webp_is_converted_to_png_data_uri() {
        let webp = encode(ImageFormat::WebP);
        let uri = to_data_uri(&FetchedImage::new(webp, Some("image/webp"))).expect("convert");
        let payload = uri
            .strip_prefix("data:image/png;base64,")
            .expect("png data uri");
        let bytes = STANDARD.decode(payload).expect("base64");
        assert!(bytes.starts_with(b"\x89PNG\r\n\x1a\n"));
    }

    #[test]
    fn sniffed_webp_is_converted_too() {
        let webp = encode(ImageFormat::WebP);
        let uri = to_data_uri(&FetchedImage::new(webp, None)).expect("convert");
        assert!(uri.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn broken_webp_reports_conversion_error() {
        let err = to_data_uri(&FetchedImage::new(b"RIFFnope".to_vec(), Some("image/webp")))
            .expect_err("invalid webp");
        assert!(matches!(err, FetchError::Convert(_)));
    }

    #[test]
    fn png_passes_through_unchanged() {
        let png = encode(ImageFormat::Png);
        let uri = to_data_uri(&FetchedImage::new(png.clone(), Some("image/png"))).expect("uri");
        assert_eq!(uri, format!("data:image/png;base64,{}", STANDARD.encode(png)));
    }
}
