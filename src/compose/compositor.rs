use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use serde::Deserialize;
use utoipa::ToSchema;

use super::geometry::{Placement, PlacementParams};
use crate::error::AppError;

const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

pub struct ComposedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub placement: Placement,
}

pub fn decode(bytes: &[u8], label: &str) -> Result<DynamicImage, AppError> {
    image::load_from_memory(bytes).map_err(|e| AppError::Unprocessable {
        message: "compose_failed".to_string(),
        details: Some(serde_json::Value::String(format!(
            "Failed to decode {label}: {e}"
        ))),
    })
}

/// Scale every pixel's alpha by `opacity` (expected in `[0, 1]`)
pub fn apply_uniform_alpha(image: &mut RgbaImage, opacity: f64) {
    for pixel in image.pixels_mut() {
        pixel[3] = (pixel[3] as f64 * opacity).round().clamp(0.0, 255.0) as u8;
    }
}

/// Resize `art` to its placement and blend it over a copy of `interior`.
/// The result always has the interior's dimensions. Placements larger than
/// `max_pixels` are refused before anything is allocated.
pub fn composite(
    interior: &DynamicImage,
    art: &DynamicImage,
    params: &PlacementParams,
    max_pixels: u64,
) -> Result<(RgbaImage, Placement), AppError> {
    let placement = Placement::compute(interior.dimensions(), art.dimensions(), params);

    if placement.pixel_count() > max_pixels {
        return Err(AppError::Unprocessable {
            message: "compose_failed".to_string(),
            details: Some(serde_json::Value::String(format!(
                "Resized art would be {}x{} px, over the {} px limit",
                placement.width, placement.height, max_pixels
            ))),
        });
    }

    let mut resized = art
        .resize_exact(placement.width, placement.height, FilterType::Lanczos3)
        .to_rgba8();

    let opacity = params.opacity();
    if opacity < 1.0 {
        apply_uniform_alpha(&mut resized, opacity);
    }

    let mut canvas = interior.to_rgba8();
    imageops::overlay(&mut canvas, &resized, placement.left, placement.top);

    Ok((canvas, placement))
}

pub fn encode(canvas: RgbaImage, format: OutputFormat) -> Result<Vec<u8>, AppError> {
    let mut output = Vec::new();

    match format {
        OutputFormat::Png => {
            DynamicImage::ImageRgba8(canvas)
                .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
                .map_err(|e| anyhow::anyhow!("Failed to encode image as PNG: {e}"))?;
        }
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
            JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY)
                .encode_image(&rgb)
                .map_err(|e| anyhow::anyhow!("Failed to encode image as JPEG: {e}"))?;
        }
    }

    Ok(output)
}

/// Decode both inputs, composite and encode. CPU bound; run off the runtime.
pub fn compose_images(
    interior_bytes: &[u8],
    art_bytes: &[u8],
    params: &PlacementParams,
    format: OutputFormat,
    max_pixels: u64,
) -> Result<ComposedImage, AppError> {
    let interior = decode(interior_bytes, "interior image")?;
    let art = decode(art_bytes, "art image")?;

    let (canvas, placement) = composite(&interior, &art, params, max_pixels)?;
    let (width, height) = canvas.dimensions();

    tracing::info!(
        "Composited {}x{} art onto {}x{} interior at ({}, {})",
        placement.width,
        placement.height,
        width,
        height,
        placement.left,
        placement.top
    );

    let bytes = encode(canvas, format)?;

    Ok(ComposedImage {
        bytes,
        mime_type: format.mime_type(),
        width,
        height,
        placement,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::consts::MAX_OUTPUT_PIXELS;
    use image::Rgba;

    pub(crate) fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_composite_keeps_interior_dimensions() {
        let interior = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            100,
            80,
            Rgba([255, 255, 255, 255]),
        ));
        let art = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 10, Rgba([255, 0, 0, 255])));

        let params = PlacementParams {
            scale: Some(0.5),
            ..Default::default()
        };
        let (canvas, placement) = composite(&interior, &art, &params, MAX_OUTPUT_PIXELS).unwrap();

        assert_eq!(canvas.dimensions(), (100, 80));
        assert_eq!(placement.width, 50);
        assert_eq!(placement.height, 25);

        // centre is covered by the art, corner is untouched
        assert_eq!(canvas.get_pixel(50, 40), &Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_art_hanging_off_the_edge_is_clipped() {
        let interior =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 40, Rgba([0, 0, 0, 255])));
        let art = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 255, 0, 255])));

        let params = PlacementParams {
            x: Some(0.0),
            y: Some(0.0),
            scale: Some(0.5),
            opacity: None,
        };
        let (canvas, placement) = composite(&interior, &art, &params, MAX_OUTPUT_PIXELS).unwrap();

        assert_eq!(placement.left, -10);
        assert_eq!(canvas.dimensions(), (40, 40));
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([0, 255, 0, 255]));
        assert_eq!(canvas.get_pixel(15, 15), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_uniform_alpha() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 200]));
        apply_uniform_alpha(&mut img, 0.5);
        assert!(img.pixels().all(|p| p[3] == 100 && p[0] == 10));
    }

    #[test]
    fn test_transparent_art_leaves_interior_untouched() {
        let interior =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([9, 9, 9, 255])));
        let art = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([250, 0, 0, 255])));

        let params = PlacementParams {
            opacity: Some(0.0),
            scale: Some(1.0),
            ..Default::default()
        };
        let (canvas, _) = composite(&interior, &art, &params, MAX_OUTPUT_PIXELS).unwrap();
        assert!(canvas.pixels().all(|p| *p == Rgba([9, 9, 9, 255])));
    }

    #[test]
    fn test_compose_images_encodes_requested_format() {
        let interior = solid_png(64, 48, [255, 255, 255, 255]);
        let art = solid_png(16, 16, [0, 0, 255, 255]);

        let composed = compose_images(
            &interior,
            &art,
            &PlacementParams::default(),
            OutputFormat::Jpeg,
            MAX_OUTPUT_PIXELS,
        )
        .unwrap();

        assert_eq!(composed.mime_type, "image/jpeg");
        assert_eq!((composed.width, composed.height), (64, 48));
        assert_eq!(
            image::guess_format(&composed.bytes).unwrap(),
            ImageFormat::Jpeg
        );

        let png = compose_images(
            &interior,
            &art,
            &PlacementParams::default(),
            OutputFormat::Png,
            MAX_OUTPUT_PIXELS,
        )
        .unwrap();
        let decoded = image::load_from_memory(&png.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn test_undecodable_input_is_unprocessable() {
        let interior = solid_png(4, 4, [0, 0, 0, 255]);
        let err = compose_images(
            &interior,
            b"definitely not an image",
            &PlacementParams::default(),
            OutputFormat::Png,
            MAX_OUTPUT_PIXELS,
        )
        .err()
        .unwrap();

        assert_eq!(err.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_narrow_art_over_pixel_budget_is_refused() {
        let interior = solid_png(40, 30, [255, 255, 255, 255]);
        let art = solid_png(1, 400, [0, 0, 0, 255]);
        let params = PlacementParams {
            scale: Some(1.0),
            ..Default::default()
        };

        // 40 x 16000 after resizing
        let err = compose_images(&interior, &art, &params, OutputFormat::Png, 100_000)
            .err()
            .unwrap();

        assert_eq!(err.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.to_string(), "compose_failed");

        let ok = compose_images(&interior, &art, &params, OutputFormat::Png, 640_000).unwrap();
        assert_eq!(ok.placement.height, 16_000);
    }
}
