//! Largest-font-size search for text inside a box.

use crate::measure::{TextMeasurer, TextStyle};
use crate::wrap::wrap_words;
use serde::{Deserialize, Serialize};


/// Font sizes are searched on a half-pixel lattice.
pub const SIZE_STEP: f64 = 0.5;

/// Resolved container dimensions in px.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxSize {
    pub width: f64,
    pub height: f64,
}

impl BoxSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextFitOptions {
    pub min_size: f64,
    pub max_size: f64,
    /// Padding subtracted from every side of the box.
    pub inset: f64,
    pub single_line: bool,
    pub line_height_ratio: f64,
    pub font_weight: String,
    pub font_style: String,
}

impl Default for TextFitOptions {
    fn default() -> Self {
        Self {
            min_size: 8.0,
            max_size: 72.0,
            inset: 0.0,
            single_line: false,
            line_height_ratio: 1.2,
            font_weight: "normal".to_string(),
            font_style: "normal".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextFitResult {
    pub font_size: f64,
    /// Wrapped lines; never empty.
    pub lines: Vec<String>,
    /// Measured width of each entry in `lines`.
    pub line_widths: Vec<f64>,
    pub line_height: f64,
    pub fits: bool,
}

impl TextFitResult {
    pub fn total_height(&self) -> f64 {
        self.lines.len() as f64 * self.line_height
    }

    pub fn max_line_width(&self) -> f64 {
        self.line_widths.iter().copied().fold(0.0, f64::max)
    }
}

fn round_to_step(v: f64) -> f64 {
    (v / SIZE_STEP).round() * SIZE_STEP
}

struct Available {
    width: f64,
    height: f64,
}

fn layout_at(
    text: &str,
    font_size: f64,
    available: &Available,
    font_family: &str,
    measurer: &dyn TextMeasurer,
    options: &TextFitOptions,
) -> TextFitResult {
    let style = TextStyle {
        font_family: Some(font_family.to_string()),
        font_size,
        font_weight: Some(options.font_weight.clone()),
        font_style: Some(options.font_style.clone()),
    };

    let lines = if options.single_line {
        vec![text.to_string()]
    } else {
        wrap_words(text, available.width, measurer, &style)
    };
    let line_widths: Vec<f64> = lines
        .iter()
        .map(|line| measurer.measure_width(line, &style))
        .collect();

    let line_height = font_size * options.line_height_ratio;
    let total_height = lines.len() as f64 * line_height;
    let fits =
        total_height <= available.height && line_widths.iter().all(|w| *w <= available.width);

    TextFitResult {
        font_size,
        lines,
        line_widths,
        line_height,
        fits,
    }
}

/// Finds the largest font size in `[min_size, max_size]` (on the half-pixel lattice) at which
/// `text` fits `bounds`.
///
/// `min_size` and `max_size` take precedence over the bounds in `options`. When no size fits,
/// the layout at `min_size` is returned with `fits: false`; clipping or ellipsizing is left to
/// the caller.
pub fn fit_text_to_box(
    text: &str,
    bounds: BoxSize,
    font_family: &str,
    min_size: f64,
    max_size: f64,
    measurer: &dyn TextMeasurer,
    options: &TextFitOptions,
) -> TextFitResult {
    let available = Available {
        width: (bounds.width - 2.0 * options.inset).max(1.0),
        height: (bounds.height - 2.0 * options.inset).max(1.0),
    };

    let mut best: Option<TextFitResult> = None;
    if min_size.is_finite() && max_size.is_finite() {
        let mut low = min_size;
        let mut high = max_size;
        while low <= high {
            let mid = round_to_step((low + high) / 2.0).clamp(min_size, max_size);
            let candidate = layout_at(text, mid, &available, font_family, measurer, options);
            // Past 2^52 the half step vanishes in rounding; stop once a bound no longer moves.
            if candidate.fits {
                best = Some(candidate);
                let next = mid + SIZE_STEP;
                if next <= low {
                    break;
                }
                low = next;
            } else {
                let next = mid - SIZE_STEP;
                if next >= high {
                    break;
                }
                high = next;
            }
        }
    }

    best.unwrap_or_else(|| {
        let mut fallback = layout_at(text, min_size, &available, font_family, measurer, options);
        fallback.fits = false;
        fallback
    })
}

/// [`fit_text_to_box`] using the size bounds carried by `options`.
pub fn fit_text(
    text: &str,
    bounds: BoxSize,
    font_family: &str,
    measurer: &dyn TextMeasurer,
    options: &TextFitOptions,
) -> TextFitResult {
    fit_text_to_box(
        text,
        bounds,
        font_family,
        options.min_size,
        options.max_size,
        measurer,
        options,
    )
}
