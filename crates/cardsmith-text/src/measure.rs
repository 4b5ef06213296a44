use serde::{Deserialize, Serialize};

#[cfg(feature = "system-fonts")]
pub mod system;

/// Average advance of a glyph, in em, used by the heuristic measurer.
pub const HEURISTIC_CHAR_WIDTH_EM: f64 = 0.6;
/// Widening applied by the heuristic measurer to bold text.
pub const HEURISTIC_BOLD_FACTOR: f64 = 1.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextStyle {
    pub font_family: Option<String>,
    pub font_size: f64,
    pub font_weight: Option<String>,
    pub font_style: Option<String>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: None,
            font_size: 16.0,
            font_weight: None,
            font_style: None,
        }
    }
}

impl TextStyle {
    pub fn new(font_family: &str, font_size: f64) -> Self {
        Self {
            font_family: Some(font_family.to_string()),
            font_size,
            ..Default::default()
        }
    }

    pub fn with_options(mut self, options: &MeasureOptions) -> Self {
        self.font_weight = Some(options.font_weight.clone());
        self.font_style = Some(options.font_style.clone());
        self
    }

    pub fn weight(&self) -> &str {
        self.font_weight.as_deref().unwrap_or("normal")
    }

    pub fn style(&self) -> &str {
        self.font_style.as_deref().unwrap_or("normal")
    }

    pub fn family(&self) -> &str {
        self.font_family.as_deref().unwrap_or("sans-serif")
    }

    /// Renders the CSS `font` shorthand (`style weight size family`).
    pub fn css_font(&self) -> String {
        format!(
            "{} {} {}px {}",
            self.style(),
            self.weight(),
            self.font_size,
            self.family()
        )
    }

    pub fn is_bold(&self) -> bool {
        is_bold_weight(self.weight())
    }
}

/// Returns true for `bold`, `bolder` and numeric weights of 600 or more.
pub fn is_bold_weight(weight: &str) -> bool {
    let w = weight.trim();
    if w.eq_ignore_ascii_case("bold") || w.eq_ignore_ascii_case("bolder") {
        return true;
    }
    w.parse::<u16>().is_ok_and(|n| n >= 600)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeasureOptions {
    pub font_weight: String,
    pub font_style: String,
}

impl Default for MeasureOptions {
    fn default() -> Self {
        Self {
            font_weight: "normal".to_string(),
            font_style: "normal".to_string(),
        }
    }
}

pub trait TextMeasurer {
    /// Width in device pixels of `text` rendered as a single line in `style`.
    fn measure_width(&self, text: &str, style: &TextStyle) -> f64;
}

impl<T: TextMeasurer + ?Sized> TextMeasurer for &T {
    fn measure_width(&self, text: &str, style: &TextStyle) -> f64 {
        (**self).measure_width(text, style)
    }
}

/// Approximates widths as `chars × font_size × 0.6`, widened by 10% for bold text.
///
/// This is an estimate, not a font metric: it ignores glyph shapes, kerning and the family
/// entirely. It has no dependencies and is fully deterministic, which makes it the measurer of
/// choice for tests and for servers without installed fonts.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTextMeasurer;

impl TextMeasurer for HeuristicTextMeasurer {
    fn measure_width(&self, text: &str, style: &TextStyle) -> f64 {
        let font_size = if style.font_size.is_finite() {
            style.font_size.max(0.0)
        } else {
            0.0
        };
        let base = text.chars().count() as f64 * font_size * HEURISTIC_CHAR_WIDTH_EM;
        if style.is_bold() {
            base * HEURISTIC_BOLD_FACTOR
        } else {
            base
        }
    }
}

/// The measurer used by [`measure_text`]: installed fonts when the `system-fonts` feature is
/// enabled, the heuristic otherwise.
pub fn default_measurer() -> &'static (dyn TextMeasurer + Send + Sync) {
    #[cfg(feature = "system-fonts")]
    {
        static MEASURER: system::SystemFontTextMeasurer = system::SystemFontTextMeasurer;
        &MEASURER
    }
    #[cfg(not(feature = "system-fonts"))]
    {
        static MEASURER: HeuristicTextMeasurer = HeuristicTextMeasurer;
        &MEASURER
    }
}

/// Measures `text` in the given font with the [`default_measurer`]. Never fails.
pub fn measure_text(
    text: &str,
    font_family: &str,
    font_size: f64,
    options: &MeasureOptions,
) -> f64 {
    let style = TextStyle::new(font_family, font_size).with_options(options);
    default_measurer().measure_width(text, &style)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_matches_char_count_times_size() {
        let style = TextStyle::new("Arial, sans-serif", 20.0);
        assert_eq!(HeuristicTextMeasurer.measure_width("Hello", &style), 60.0);
    }

    #[test]
    fn heuristic_widens_bold_text() {
        let options = MeasureOptions {
            font_weight: "bold".to_string(),
            ..Default::default()
        };
        let style = TextStyle::new("Arial", 20.0).with_options(&options);
        let w = HeuristicTextMeasurer.measure_width("Hello", &style);
        assert!((w - 66.0).abs() < 1e-9, "got {w}");
    }

    #[test]
    fn heuristic_empty_text_is_zero() {
        let style = TextStyle::new("Arial", 32.0);
        assert_eq!(HeuristicTextMeasurer.measure_width("", &style), 0.0);
    }

    #[test]
    fn heuristic_counts_chars_not_bytes() {
        let style = TextStyle::new("Arial", 10.0);
        assert_eq!(HeuristicTextMeasurer.measure_width("héllo", &style), 30.0);
    }

    #[test]
    fn css_font_orders_style_weight_size_family() {
        let style = TextStyle {
            font_family: Some("\"Press Start 2P\", monospace".to_string()),
            font_size: 14.5,
            font_weight: Some("700".to_string()),
            font_style: Some("italic".to_string()),
        };
        assert_eq!(style.css_font(), "italic 700 14.5px \"Press Start 2P\", monospace");
    }

    #[test]
    fn bold_weight_detection() {
        assert!(is_bold_weight("bold"));
        assert!(is_bold_weight("BOLDER"));
        assert!(is_bold_weight("600"));
        assert!(!is_bold_weight("normal"));
        assert!(!is_bold_weight("500"));
        assert!(!is_bold_weight("lighter"));
    }

    #[cfg(not(feature = "system-fonts"))]
    #[test]
    fn measure_text_uses_heuristic_without_system_fonts() {
        let w = measure_text("Hello", "Arial, sans-serif", 20.0, &MeasureOptions::default());
        assert_eq!(w, 60.0);
    }
}
