//! Greedy word wrapping.

use crate::measure::{TextMeasurer, TextStyle};

/// Wraps `text` into lines no wider than `max_width_px`, breaking only at ASCII spaces.
///
/// Words are appended to the current line while `line + " " + word` still measures within
/// `max_width_px`; otherwise the line is committed and the word starts the next one. A word that
/// is wider than `max_width_px` on its own still gets its own line (it overflows). Empty input
/// yields a single empty line.
pub fn wrap_words(
    text: &str,
    max_width_px: f64,
    measurer: &dyn TextMeasurer,
    style: &TextStyle,
) -> Vec<String> {
    let mut words = text.split(' ');
    let mut current = words.next().unwrap_or_default().to_string();
    let mut lines: Vec<String> = Vec::new();

    for word in words {
        let candidate = format!("{current} {word}");
        if measurer.measure_width(&candidate, style) <= max_width_px {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    lines.push(current);
    lines
}
