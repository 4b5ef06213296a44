#![forbid(unsafe_code)]

//! Text measurement and box fitting for card layouts.
//!
//! Every text-bearing card element (titles, stat panels, ribbons, lists) asks this crate for the
//! largest font size at which its label fits the element's box, together with the wrapped lines
//! and their pixel widths.
//!
//! # Features
//!
//! - `system-fonts`: measure with glyph advances from installed fonts. Without it (or when no
//!   installed face matches), measurement uses [`HeuristicTextMeasurer`].

pub mod fit;
pub mod measure;
pub mod wrap;

pub use fit::{BoxSize, TextFitOptions, TextFitResult, fit_text, fit_text_to_box};
pub use measure::{
    HeuristicTextMeasurer, MeasureOptions, TextMeasurer, TextStyle, default_measurer,
    measure_text,
};
#[cfg(feature = "system-fonts")]
pub use measure::system::SystemFontTextMeasurer;
pub use wrap::wrap_words;
