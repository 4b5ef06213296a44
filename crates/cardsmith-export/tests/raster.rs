use cardsmith_export::{
    PngOptions, RasterError, SvgValidationError, svg_to_png, svg_to_png_data_url, svg_to_png_sync,
};
use std::io::Cursor;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

struct Decoded {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Decoded {
    fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [
            self.rgba[i],
            self.rgba[i + 1],
            self.rgba[i + 2],
            self.rgba[i + 3],
        ]
    }
}

fn decode(bytes: &[u8]) -> Decoded {
    assert!(bytes.starts_with(PNG_SIGNATURE), "output is not a PNG");
    let decoder = png::Decoder::new(Cursor::new(bytes));
    let mut reader = decoder.read_info().expect("png header");
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).expect("png frame");
    assert_eq!(info.color_type, png::ColorType::Rgba);
    assert_eq!(info.bit_depth, png::BitDepth::Eight);
    buf.truncate(info.buffer_size());
    Decoded {
        width: info.width,
        height: info.height,
        rgba: buf,
    }
}

fn red_png(size: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(size, size, image::Rgba([255, 0, 0, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

const SQUARE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><rect x="2" y="2" width="6" height="6" fill="#0000ff"/></svg>"##;
const WIDE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100" viewBox="0 0 200 100"><rect width="200" height="100" fill="#00ff00"/></svg>"##;

#[test]
fn renders_intrinsic_size_by_default() {
    let png = svg_to_png_sync(SQUARE, &PngOptions::default()).expect("render");
    assert_eq!((png.width, png.height), (10, 10));

    let decoded = decode(&png.buffer);
    assert_eq!((decoded.width, decoded.height), (10, 10));
    assert_eq!(decoded.pixel(5, 5), [0, 0, 255, 255]);
    assert_eq!(decoded.pixel(0, 0)[3], 0, "background is transparent by default");
}

#[test]
fn requested_width_keeps_aspect_ratio() {
    let png = svg_to_png_sync(
        WIDE,
        &PngOptions {
            width: Some(100),
            ..Default::default()
        },
    )
    .expect("render");
    assert_eq!((png.width, png.height), (100, 50));
    let decoded = decode(&png.buffer);
    assert_eq!((decoded.width, decoded.height), (100, 50));
}

#[test]
fn requested_height_keeps_aspect_ratio() {
    let png = svg_to_png_sync(
        WIDE,
        &PngOptions {
            height: Some(50),
            ..Default::default()
        },
    )
    .expect("render");
    assert_eq!((png.width, png.height), (100, 50));
}

#[test]
fn width_and_height_fit_inside_both() {
    let png = svg_to_png_sync(
        WIDE,
        &PngOptions {
            width: Some(400),
            height: Some(100),
            ..Default::default()
        },
    )
    .expect("render");
    assert_eq!((png.width, png.height), (200, 100));
}

#[test]
fn background_and_bleed_pad_every_side() {
    let png = svg_to_png_sync(
        SQUARE,
        &PngOptions {
            background_color: Some("#ff0000".to_string()),
            bleed: 5,
            ..Default::default()
        },
    )
    .expect("render");
    assert_eq!((png.width, png.height), (20, 20));

    let decoded = decode(&png.buffer);
    assert_eq!(decoded.pixel(0, 0), [255, 0, 0, 255]);
    assert_eq!(decoded.pixel(19, 19), [255, 0, 0, 255]);
    // Content is shifted by the bleed: the blue square now covers 7..13.
    assert_eq!(decoded.pixel(10, 10), [0, 0, 255, 255]);
    assert_eq!(decoded.pixel(6, 6), [255, 0, 0, 255]);
}

#[test]
fn oversized_declared_dimensions_are_a_validation_error() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="100000" height="10"><rect width="10" height="10"/></svg>"#;
    let err = svg_to_png_sync(svg, &PngOptions::default()).expect_err("too wide");
    assert!(err.is_validation());
    assert_eq!(err.status_code(), 400);
    assert!(matches!(
        err,
        RasterError::Validation(SvgValidationError::DimensionTooLarge {
            attribute: "width",
            ..
        })
    ));
}

#[test]
fn zero_declared_size_is_a_validation_error() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="0" height="10"><rect width="10" height="10"/></svg>"#;
    let err = svg_to_png_sync(svg, &PngOptions::default()).expect_err("empty canvas");
    assert!(matches!(
        err,
        RasterError::Validation(SvgValidationError::InvalidDimension {
            attribute: "width",
            ..
        })
    ));
    assert_eq!(err.status_code(), 400);
}

#[test]
fn skip_validation_lets_a_scaled_down_render_through() {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="16000" height="80" viewBox="0 0 16000 80"><rect width="16000" height="80" fill="#000000"/></svg>"##;
    assert!(svg_to_png_sync(svg, &PngOptions::default()).is_err());

    let png = svg_to_png_sync(
        svg,
        &PngOptions {
            width: Some(2000),
            skip_validation: true,
            ..Default::default()
        },
    )
    .expect("render without validation");
    assert_eq!((png.width, png.height), (2000, 10));
}

#[test]
fn invalid_options_are_client_errors() {
    let err = svg_to_png_sync(
        SQUARE,
        &PngOptions {
            background_color: Some("not-a-color".to_string()),
            ..Default::default()
        },
    )
    .expect_err("bad color");
    assert!(matches!(err, RasterError::InvalidOption(_)));
    assert_eq!(err.status_code(), 400);

    let err = svg_to_png_sync(
        SQUARE,
        &PngOptions {
            width: Some(0),
            ..Default::default()
        },
    )
    .expect_err("zero width");
    assert_eq!(err.status_code(), 400);
}

#[test]
fn unparsable_input_without_validation_is_a_server_error() {
    let err = svg_to_png_sync(
        "<svg><g></svg>",
        &PngOptions {
            skip_validation: true,
            ..Default::default()
        },
    )
    .expect_err("malformed");
    assert!(matches!(err, RasterError::SvgParse(_)));
    assert!(!err.is_validation());
    assert_eq!(err.status_code(), 500);
}

#[test]
fn inline_data_uri_images_are_drawn() {
    use base64::Engine as _;
    let data = base64::engine::general_purpose::STANDARD.encode(red_png(10));
    let svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><image width="10" height="10" href="data:image/png;base64,{data}"/></svg>"#
    );
    let png = svg_to_png_sync(&svg, &PngOptions::default()).expect("render");
    assert_eq!(decode(&png.buffer).pixel(5, 5), [255, 0, 0, 255]);
}

#[test]
fn unresolved_external_images_are_skipped() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><image width="10" height="10" href="https://example.com/missing.png"/></svg>"#;
    let png = svg_to_png_sync(svg, &PngOptions::default()).expect("render");
    assert_eq!(decode(&png.buffer).pixel(5, 5)[3], 0);
}

#[tokio::test]
async fn async_variants_match_the_blocking_renderer() {
    let png = svg_to_png(SQUARE, &PngOptions::default())
        .await
        .expect("render");
    assert_eq!((png.width, png.height), (10, 10));
    assert!(png.buffer.starts_with(PNG_SIGNATURE));

    let url = svg_to_png_data_url(SQUARE, &PngOptions::default())
        .await
        .expect("data url");
    assert!(url.starts_with("data:image/png;base64,iVBORw0KGgo"));
}

#[test]
fn async_render_runs_inline_without_a_tokio_runtime() {
    let png = futures::executor::block_on(svg_to_png(SQUARE, &PngOptions::default()))
        .expect("render");
    let blocking = svg_to_png_sync(SQUARE, &PngOptions::default()).expect("render");
    assert_eq!(png, blocking);
}
