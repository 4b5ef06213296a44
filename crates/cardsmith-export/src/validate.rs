//! Pre-rasterization input checks.
//!
//! Validation rejects inputs that would cost unbounded memory or CPU in the rasterizer. Its
//! errors are the caller's fault (HTTP 400), unlike rasterizer failures (HTTP 500).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_bytes: usize,
    /// Upper bound for declared `width`/`height`/`viewBox` sizes and requested output sizes.
    pub max_dimension: u32,
    pub max_pixels: u64,
    pub max_depth: usize,
    pub max_elements: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_dimension: 10_000,
            max_pixels: 64 * 1024 * 1024,
            max_depth: 256,
            max_elements: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SvgValidationError {
    #[error("SVG input is empty")]
    Empty,
    #[error("SVG input is {bytes} bytes, limit is {max}")]
    TooLarge { bytes: usize, max: usize },
    #[error("SVG is not well-formed XML: {0}")]
    Malformed(String),
    #[error("root element is <{root}>, expected <svg>")]
    NotSvg { root: String },
    #[error("invalid {attribute} value {value:?}")]
    InvalidDimension { attribute: &'static str, value: String },
    #[error("{attribute} of {value} exceeds the {max}px limit")]
    DimensionTooLarge {
        attribute: &'static str,
        value: f64,
        max: u32,
    },
    #[error("element nesting exceeds depth {max}")]
    TooDeep { max: usize },
    #[error("SVG has more than {max} elements")]
    TooManyElements { max: usize },
    #[error("output of {width}x{height} exceeds the {max_pixels} pixel limit")]
    OutputTooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },
}

/// Parses a length attribute such as `630`, `630px` or `630.5`; zero and negative lengths are
/// invalid.
///
/// Returns `Ok(None)` for relative values (`%`, `em`, ...) that carry no absolute size.
fn parse_length(attribute: &'static str, raw: &str) -> Result<Option<f64>, SvgValidationError> {
    let raw = raw.trim();
    let number = raw.strip_suffix("px").unwrap_or(raw).trim();
    match number.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(Some(v)),
        Ok(_) => Err(SvgValidationError::InvalidDimension {
            attribute,
            value: raw.to_string(),
        }),
        Err(_) if raw.ends_with('%') || raw.ends_with("em") || raw.ends_with("ex") => Ok(None),
        Err(_) => Err(SvgValidationError::InvalidDimension {
            attribute,
            value: raw.to_string(),
        }),
    }
}

fn check_dimension(
    attribute: &'static str,
    value: f64,
    limits: &ValidationLimits,
) -> Result<(), SvgValidationError> {
    if value > f64::from(limits.max_dimension) {
        return Err(SvgValidationError::DimensionTooLarge {
            attribute,
            value,
            max: limits.max_dimension,
        });
    }
    Ok(())
}

fn check_view_box(raw: &str, limits: &ValidationLimits) -> Result<(), SvgValidationError> {
    let parts: Vec<f64> = raw
        .split(|c: char| c.is_ascii_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
        .map_err(|_| SvgValidationError::InvalidDimension {
            attribute: "viewBox",
            value: raw.to_string(),
        })?;
    let [_, _, width, height] = parts[..] else {
        return Err(SvgValidationError::InvalidDimension {
            attribute: "viewBox",
            value: raw.to_string(),
        });
    };
    if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
        return Err(SvgValidationError::InvalidDimension {
            attribute: "viewBox",
            value: raw.to_string(),
        });
    }
    check_dimension("viewBox width", width, limits)?;
    check_dimension("viewBox height", height, limits)
}

/// Checks payload size, XML well-formedness, the root element, declared dimensions, nesting
/// depth and element count.
pub fn validate_svg(svg: &str, limits: &ValidationLimits) -> Result<(), SvgValidationError> {
    if svg.trim().is_empty() {
        return Err(SvgValidationError::Empty);
    }
    if svg.len() > limits.max_bytes {
        return Err(SvgValidationError::TooLarge {
            bytes: svg.len(),
            max: limits.max_bytes,
        });
    }

    let options = roxmltree::ParsingOptions {
        allow_dtd: false,
        ..Default::default()
    };
    let doc = roxmltree::Document::parse_with_options(svg, options)
        .map_err(|e| SvgValidationError::Malformed(e.to_string()))?;

    let root = doc.root_element();
    if root.tag_name().name() != "svg" {
        return Err(SvgValidationError::NotSvg {
            root: root.tag_name().name().to_string(),
        });
    }

    for attribute in ["width", "height"] {
        if let Some(raw) = root.attribute(attribute) {
            if let Some(value) = parse_length(attribute, raw)? {
                check_dimension(attribute, value, limits)?;
            }
        }
    }
    if let Some(raw) = root.attribute("viewBox") {
        check_view_box(raw, limits)?;
    }

    let mut elements = 0usize;
    let mut stack = vec![(root, 1usize)];
    while let Some((node, depth)) = stack.pop() {
        elements += 1;
        if elements > limits.max_elements {
            return Err(SvgValidationError::TooManyElements {
                max: limits.max_elements,
            });
        }
        if depth > limits.max_depth {
            return Err(SvgValidationError::TooDeep {
                max: limits.max_depth,
            });
        }
        stack.extend(
            node.children()
                .filter(|child| child.is_element())
                .map(|child| (child, depth + 1)),
        );
    }

    Ok(())
}

/// Checks a requested output size against the limits.
pub fn validate_output_size(
    width: u32,
    height: u32,
    limits: &ValidationLimits,
) -> Result<(), SvgValidationError> {
    check_dimension("output width", f64::from(width), limits)?;
    check_dimension("output height", f64::from(height), limits)?;
    if u64::from(width) * u64::from(height) > limits.max_pixels {
        return Err(SvgValidationError::OutputTooLarge {
            width,
            height,
            max_pixels: limits.max_pixels,
        });
    }
    Ok(())
}
