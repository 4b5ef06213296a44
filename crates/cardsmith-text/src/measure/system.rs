//! Glyph-advance measurement against installed fonts.
//!
//! The font database is loaded once per process and never torn down. Face resolution and the
//! per-face advance cache live in a thread-local context that is keyed by the current font
//! (style, weight, family), so worker threads never share mutable measurement state.

use super::{HEURISTIC_BOLD_FACTOR, HeuristicTextMeasurer, TextMeasurer, TextStyle};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use usvg::fontdb::{self, Database, Family, Query, Stretch, Style, Weight};

/// Returns the process-wide system font database, loading it on first use.
///
/// `cardsmith-export` rasterizes against this same database when its `system-fonts` feature is on.
pub fn system_font_database() -> Arc<Database> {
    static DB: OnceLock<Arc<Database>> = OnceLock::new();
    DB.get_or_init(|| {
        let mut db = Database::new();
        db.load_system_fonts();
        tracing::debug!(faces = db.len(), "loaded system fonts");
        Arc::new(db)
    })
    .clone()
}

/// Measures text with the horizontal advances of the best matching installed face.
///
/// Falls back to [`HeuristicTextMeasurer`] when no face matches the requested family list.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFontTextMeasurer;

impl TextMeasurer for SystemFontTextMeasurer {
    fn measure_width(&self, text: &str, style: &TextStyle) -> f64 {
        if text.is_empty() {
            return 0.0;
        }
        if !(style.font_size.is_finite() && style.font_size > 0.0) {
            return HeuristicTextMeasurer.measure_width(text, style);
        }

        let db = system_font_database();
        let em = CONTEXT.with(|ctx| ctx.borrow_mut().advance_em(&db, text, style));
        match em {
            Some(em) => em * style.font_size,
            None => HeuristicTextMeasurer.measure_width(text, style),
        }
    }
}

thread_local! {
    static CONTEXT: RefCell<MeasureContext> = RefCell::new(MeasureContext::default());
}

#[derive(Default)]
struct MeasureContext {
    font_key: String,
    face: Option<ResolvedFace>,
}

struct ResolvedFace {
    id: fontdb::ID,
    units_per_em: f64,
    notdef_em: f64,
    synthetic_bold: bool,
    advances_em: HashMap<char, f64>,
}

impl MeasureContext {
    fn advance_em(&mut self, db: &Database, text: &str, style: &TextStyle) -> Option<f64> {
        let key = format!("{} {} {}", style.style(), style.weight(), style.family());
        if key != self.font_key {
            self.face = resolve_face(db, style);
            self.font_key = key;
        }
        let face = self.face.as_mut()?;

        let missing: Vec<char> = text
            .chars()
            .filter(|ch| !face.advances_em.contains_key(ch))
            .collect();
        if !missing.is_empty() {
            let units_per_em = face.units_per_em;
            let notdef_em = face.notdef_em;
            let computed = db
                .with_face_data(face.id, |data, index| {
                    let parsed = ttf_parser::Face::parse(data, index).ok()?;
                    Some(
                        missing
                            .iter()
                            .map(|&ch| {
                                let em = parsed
                                    .glyph_index(ch)
                                    .and_then(|gid| parsed.glyph_hor_advance(gid))
                                    .map(|adv| f64::from(adv) / units_per_em)
                                    .unwrap_or(notdef_em);
                                (ch, em)
                            })
                            .collect::<Vec<_>>(),
                    )
                })
                .flatten()?;
            face.advances_em.extend(computed);
        }

        let sum: f64 = text
            .chars()
            .map(|ch| face.advances_em.get(&ch).copied().unwrap_or(face.notdef_em))
            .sum();
        Some(if face.synthetic_bold {
            sum * HEURISTIC_BOLD_FACTOR
        } else {
            sum
        })
    }
}

fn resolve_face(db: &Database, style: &TextStyle) -> Option<ResolvedFace> {
    let names = split_family_list(style.family());
    let mut families: Vec<Family<'_>> = names.iter().map(|n| family_for(n)).collect();
    if families.is_empty() {
        families.push(Family::SansSerif);
    }
    let weight = parse_weight(style.weight());
    let query = Query {
        families: &families,
        weight: Weight(weight),
        stretch: Stretch::Normal,
        style: parse_style(style.style()),
    };
    let id = db.query(&query)?;
    let synthetic_bold = weight >= 600 && db.face(id).is_some_and(|info| info.weight.0 < 600);

    let (units_per_em, notdef_em) = db
        .with_face_data(id, |data, index| {
            let face = ttf_parser::Face::parse(data, index).ok()?;
            let units_per_em = f64::from(face.units_per_em());
            if units_per_em <= 0.0 {
                return None;
            }
            let notdef = face
                .glyph_hor_advance(ttf_parser::GlyphId(0))
                .map(|adv| f64::from(adv) / units_per_em)
                .unwrap_or(0.5);
            Some((units_per_em, notdef))
        })
        .flatten()?;

    Some(ResolvedFace {
        id,
        units_per_em,
        notdef_em,
        synthetic_bold,
        advances_em: HashMap::new(),
    })
}

/// Splits a CSS `font-family` list into unquoted names.
pub(crate) fn split_family_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .trim_end_matches(';')
                .trim_matches(|c| c == '"' || c == '\'')
                .trim()
                .to_string()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

fn family_for(name: &str) -> Family<'_> {
    match name.to_ascii_lowercase().as_str() {
        "serif" => Family::Serif,
        "sans-serif" | "system-ui" => Family::SansSerif,
        "monospace" => Family::Monospace,
        "cursive" => Family::Cursive,
        "fantasy" => Family::Fantasy,
        _ => Family::Name(name),
    }
}

pub(crate) fn parse_weight(raw: &str) -> u16 {
    match raw.trim().to_ascii_lowercase().as_str() {
        "normal" | "" => 400,
        "bold" | "bolder" => 700,
        "lighter" => 300,
        other => other.parse::<u16>().map(|w| w.clamp(1, 1000)).unwrap_or(400),
    }
}

fn parse_style(raw: &str) -> Style {
    match raw.trim().to_ascii_lowercase().as_str() {
        "italic" => Style::Italic,
        s if s.starts_with("oblique") => Style::Oblique,
        _ => Style::Normal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_list_strips_quotes_and_blanks() {
        assert_eq!(
            split_family_list("\"Press Start 2P\", 'Segoe UI' ,sans-serif;"),
            vec!["Press Start 2P", "Segoe UI", "sans-serif"]
        );
        assert!(split_family_list(" , ").is_empty());
    }

    #[test]
    fn weight_keywords_map_to_numeric() {
        assert_eq!(parse_weight("normal"), 400);
        assert_eq!(parse_weight("bold"), 700);
        assert_eq!(parse_weight("lighter"), 300);
        assert_eq!(parse_weight("850"), 850);
        assert_eq!(parse_weight("heavy"), 400);
    }

    #[test]
    fn measures_empty_text_as_zero() {
        let style = TextStyle::new("sans-serif", 20.0);
        assert_eq!(SystemFontTextMeasurer.measure_width("", &style), 0.0);
    }

    #[test]
    fn measurement_is_positive_and_grows_with_text() {
        let style = TextStyle::new("Arial, sans-serif", 20.0);
        let short = SystemFontTextMeasurer.measure_width("Hi", &style);
        let long = SystemFontTextMeasurer.measure_width("Hi there, traveller", &style);
        assert!(short > 0.0);
        assert!(long > short);
    }

    #[test]
    fn measurement_scales_linearly_with_size() {
        let small = TextStyle::new("Arial, sans-serif", 10.0);
        let large = TextStyle::new("Arial, sans-serif", 30.0);
        let a = SystemFontTextMeasurer.measure_width("Charizard", &small);
        let b = SystemFontTextMeasurer.measure_width("Charizard", &large);
        assert!((b - 3.0 * a).abs() < 1e-6, "{a} vs {b}");
    }
}
