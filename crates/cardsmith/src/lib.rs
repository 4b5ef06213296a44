#![forbid(unsafe_code)]

//! `cardsmith` is the engine behind trading card graphics: it fits card text into its boxes and
//! turns finished card SVGs into PNG files.
//!
//! The text engine (`cardsmith-text`) is re-exported at the crate root. The export pipeline
//! lives under [`export`] when the `export` feature is enabled.
//!
//! # Features
//!
//! - `export`: external image embedding and SVG to PNG rasterization (`cardsmith::export`)
//! - `http`: `export` plus a `reqwest`-backed image fetcher
//! - `system-fonts`: measure text with installed fonts instead of the width heuristic

pub use cardsmith_text::*;

#[cfg(feature = "export")]
pub mod export {
    pub use cardsmith_export::embed::{
        EmbedError, EmbedOptions, ImageReference, embed_images, find_external_images,
        has_external_images,
    };
    #[cfg(feature = "http")]
    pub use cardsmith_export::fetch::HttpFetcher;
    pub use cardsmith_export::fetch::{FetchError, FetchedImage, ImageFetcher};
    pub use cardsmith_export::handler::{
        ExportError, ExportRequest, ExportResponse, export_png, sanitize_filename,
    };
    pub use cardsmith_export::raster::{
        PngOptions, PngResult, RasterError, svg_to_png, svg_to_png_data_url, svg_to_png_sync,
    };
    pub use cardsmith_export::validate::{SvgValidationError, ValidationLimits, validate_svg};

    use std::borrow::Cow;
    use std::sync::Arc;

    /// Bundles a fetcher with embed and raster options, so callers exporting many cards pass
    /// one value around instead of four.
    #[derive(Clone)]
    pub struct CardExporter {
        pub fetcher: Arc<dyn ImageFetcher>,
        pub embed: EmbedOptions,
        pub png: PngOptions,
    }

    impl CardExporter {
        pub fn with_fetcher(fetcher: Arc<dyn ImageFetcher>) -> Self {
            Self {
                fetcher,
                embed: EmbedOptions::default(),
                png: PngOptions::default(),
            }
        }

        /// An exporter fetching over HTTP with default options.
        #[cfg(feature = "http")]
        pub fn http() -> Result<Self, FetchError> {
            Ok(Self::with_fetcher(Arc::new(HttpFetcher::new()?)))
        }

        pub fn embed_options(mut self, embed: EmbedOptions) -> Self {
            self.embed = embed;
            self
        }

        pub fn png_options(mut self, png: PngOptions) -> Self {
            self.png = png;
            self
        }

        pub async fn embed<'a>(&self, svg: &'a str) -> Result<Cow<'a, str>, EmbedError> {
            embed_images(svg, self.fetcher.as_ref(), &self.embed).await
        }

        /// Embeds external images and rasterizes in one step.
        pub async fn render_png(&self, svg: &str) -> Result<PngResult, ExportError> {
            let svg = self.embed(svg).await?;
            Ok(svg_to_png(&svg, &self.png).await?)
        }

        pub async fn export(&self, request: &ExportRequest) -> Result<ExportResponse, ExportError> {
            export_png(request, self.fetcher.as_ref(), &self.embed, &self.png).await
        }
    }
}
