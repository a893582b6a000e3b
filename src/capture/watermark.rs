use crate::config::{ImageFormat, WatermarkConfig, WatermarkKind, WatermarkPosition};
use crate::error::{LapseError, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Size of the layer text watermarks are drawn into
const TEXT_LAYER_WIDTH: u32 = 300;
const TEXT_LAYER_HEIGHT: u32 = 50;
const TEXT_MARGIN: i32 = 10;

/// Strip control characters. Everything else, markup characters included, is drawn as-is.
pub fn sanitize_watermark_text(text: &str) -> String {
    text.chars().filter(|c| !c.is_control()).collect()
}

/// Composite the configured watermark onto an encoded frame.
///
/// Returns `Ok(None)` when there is nothing to draw (no text or no image path).
pub fn apply_watermark(
    frame: &[u8],
    config: &WatermarkConfig,
    format: ImageFormat,
    jpeg_quality: u8,
) -> Result<Option<Vec<u8>>> {
    let layer = match config.kind {
        WatermarkKind::Text => {
            let text = sanitize_watermark_text(&config.text);
            if text.trim().is_empty() {
                return Ok(None);
            }
            render_text_layer(&text, config)?
        }
        WatermarkKind::Image => {
            if config.image_path.trim().is_empty() {
                return Ok(None);
            }
            load_image_layer(config)?
        }
    };

    let mut base = image::load_from_memory(frame)
        .map_err(|e| {
            LapseError::component("watermark", format!("Failed to decode frame: {}", e))
        })?
        .to_rgba8();

    let (x, y) = placement(base.dimensions(), layer.dimensions(), config.position);
    imageops::overlay(&mut base, &layer, x, y);

    debug!(
        "Applied {:?} watermark at {:?} ({}, {})",
        config.kind, config.position, x, y
    );
    encode(base, format, jpeg_quality).map(Some)
}

/// Top-left corner of the watermark for the given anchor
fn placement(base: (u32, u32), mark: (u32, u32), position: WatermarkPosition) -> (i64, i64) {
    let (bw, bh) = (base.0 as i64, base.1 as i64);
    let (mw, mh) = (mark.0 as i64, mark.1 as i64);
    match position {
        WatermarkPosition::TopLeft => (0, 0),
        WatermarkPosition::TopRight => (bw - mw, 0),
        WatermarkPosition::BottomLeft => (0, bh - mh),
        WatermarkPosition::BottomRight => (bw - mw, bh - mh),
        WatermarkPosition::Center => ((bw - mw) / 2, (bh - mh) / 2),
    }
}

/// Load, shrink to the size tier width (never enlarge) and apply opacity
fn load_image_layer(config: &WatermarkConfig) -> Result<RgbaImage> {
    let mut mark = image::open(&config.image_path)
        .map_err(|e| {
            LapseError::component(
                "watermark",
                format!("Failed to load watermark image '{}': {}", config.image_path, e),
            )
        })?
        .to_rgba8();

    let target_width = config.image_size.width();
    if mark.width() > target_width {
        let height = ((mark.height() as u64 * target_width as u64) / mark.width() as u64).max(1);
        mark = imageops::resize(&mark, target_width, height as u32, FilterType::Lanczos3);
    }

    let opacity = config.image_opacity.min(100) as u32;
    for pixel in mark.pixels_mut() {
        pixel.0[3] = (pixel.0[3] as u32 * opacity / 100) as u8;
    }
    Ok(mark)
}

#[cfg(feature = "text_watermark")]
fn render_text_layer(text: &str, config: &WatermarkConfig) -> Result<RgbaImage> {
    use image::Rgba;
    use imageproc::drawing::draw_text_mut;
    use rusttype::{Font, Scale};

    let font_data = std::fs::read(&config.font_path).map_err(|e| {
        LapseError::component(
            "watermark",
            format!("Failed to read font file '{}': {}", config.font_path, e),
        )
    })?;
    let font = Font::try_from_vec(font_data).ok_or_else(|| {
        LapseError::component(
            "watermark",
            format!("Failed to parse font file '{}'", config.font_path),
        )
    })?;

    let scale = Scale::uniform(config.font_size);
    let y = ((TEXT_LAYER_HEIGHT as f32 - config.font_size) / 2.0).max(0.0) as i32;
    let mut layer = RgbaImage::new(TEXT_LAYER_WIDTH, TEXT_LAYER_HEIGHT);

    // One pixel black outline, then white fill
    for (dx, dy) in [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)] {
        draw_text_mut(
            &mut layer,
            Rgba([0, 0, 0, 255]),
            TEXT_MARGIN + dx,
            y + dy,
            scale,
            &font,
            text,
        );
    }
    draw_text_mut(
        &mut layer,
        Rgba([255, 255, 255, 255]),
        TEXT_MARGIN,
        y,
        scale,
        &font,
        text,
    );

    Ok(layer)
}

#[cfg(not(feature = "text_watermark"))]
fn render_text_layer(_text: &str, _config: &WatermarkConfig) -> Result<RgbaImage> {
    Err(LapseError::component(
        "watermark",
        "text watermarks need the text_watermark feature",
    ))
}

fn encode(image: RgbaImage, format: ImageFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let result = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image).to_rgb8())
            .write_to(
                &mut Cursor::new(&mut output),
                ImageOutputFormat::Jpeg(jpeg_quality.clamp(1, 100)),
            ),
        ImageFormat::Png => DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut output), ImageOutputFormat::Png),
    };
    result.map_err(|e| {
        LapseError::component("watermark", format!("Failed to encode frame: {}", e))
    })?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatermarkSize;
    use image::{Rgb, RgbImage, Rgba};

    fn frame(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([0, 0, 0])))
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_sanitize_keeps_markup_characters() {
        assert_eq!(
            sanitize_watermark_text("<b>Tom & \"Jerry\"</b>\n\t"),
            "<b>Tom & \"Jerry\"</b>"
        );
        assert_eq!(sanitize_watermark_text("a\u{7}b"), "ab");
    }

    #[test]
    fn test_placement_anchors() {
        let base = (640, 480);
        let mark = (100, 50);
        assert_eq!(placement(base, mark, WatermarkPosition::TopLeft), (0, 0));
        assert_eq!(placement(base, mark, WatermarkPosition::TopRight), (540, 0));
        assert_eq!(placement(base, mark, WatermarkPosition::BottomLeft), (0, 430));
        assert_eq!(
            placement(base, mark, WatermarkPosition::BottomRight),
            (540, 430)
        );
        assert_eq!(placement(base, mark, WatermarkPosition::Center), (270, 215));
    }

    #[test]
    fn test_nothing_to_draw_returns_none() {
        let config = WatermarkConfig {
            enabled: true,
            text: "\n".to_string(),
            ..WatermarkConfig::default()
        };
        assert!(apply_watermark(&frame(4, 4), &config, ImageFormat::Png, 85)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_image_watermark_is_shrunk_and_faded() {
        let dir = tempfile::tempdir().unwrap();
        let mark_path = dir.path().join("logo.png");
        RgbaImage::from_pixel(400, 200, Rgba([255, 255, 255, 255]))
            .save(&mark_path)
            .unwrap();

        let config = WatermarkConfig {
            enabled: true,
            kind: WatermarkKind::Image,
            image_path: mark_path.to_string_lossy().into_owned(),
            image_size: WatermarkSize::Small,
            image_opacity: 50,
            position: WatermarkPosition::TopLeft,
            ..WatermarkConfig::default()
        };

        let layer = load_image_layer(&config).unwrap();
        assert_eq!(layer.dimensions(), (100, 50));
        assert!((125..=128).contains(&layer.get_pixel(50, 25).0[3]));

        let marked = apply_watermark(&frame(320, 240), &config, ImageFormat::Png, 85)
            .unwrap()
            .unwrap();
        let decoded = image::load_from_memory(&marked).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (320, 240));
        assert!(decoded.get_pixel(10, 10).0[0] > 100);
        assert_eq!(decoded.get_pixel(200, 200).0[0], 0);
    }

    #[test]
    fn test_small_image_watermark_is_not_enlarged() {
        let dir = tempfile::tempdir().unwrap();
        let mark_path = dir.path().join("dot.png");
        RgbaImage::from_pixel(20, 10, Rgba([255, 0, 0, 255]))
            .save(&mark_path)
            .unwrap();

        let config = WatermarkConfig {
            kind: WatermarkKind::Image,
            image_path: mark_path.to_string_lossy().into_owned(),
            image_size: WatermarkSize::Large,
            ..WatermarkConfig::default()
        };
        assert_eq!(load_image_layer(&config).unwrap().dimensions(), (20, 10));
    }

    #[test]
    fn test_missing_watermark_image_is_an_error() {
        let config = WatermarkConfig {
            kind: WatermarkKind::Image,
            image_path: "/nonexistent/logo.png".to_string(),
            ..WatermarkConfig::default()
        };
        assert!(apply_watermark(&frame(4, 4), &config, ImageFormat::Jpeg, 85).is_err());
    }

    #[cfg(feature = "text_watermark")]
    #[test]
    fn test_markup_characters_are_drawn_literally() {
        let config = WatermarkConfig {
            font_path: concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/fonts/DejaVuSansMono.ttf")
                .to_string(),
            ..WatermarkConfig::default()
        };

        let layer = render_text_layer("<&>", &config).unwrap();
        let white = layer
            .pixels()
            .filter(|p| p.0[0] > 200 && p.0[3] > 200)
            .count();
        assert!(white > 0, "markup characters produced no glyphs");

        let escaped = render_text_layer("&lt;&amp;&gt;", &config).unwrap();
        assert_ne!(layer, escaped);
    }
}
