//! Annotated screenshots for vision-capable models.
//!
//! Markers are drawn over every entry in the current selector map so the
//! model can pick elements by number instead of by DOM text.

use std::collections::HashMap;

use ab_glyph::{FontRef, PxScale};
use anyhow::{anyhow, Context, Result};
use base64::Engine;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use serde::Deserialize;

use crate::browser::driver::PageDriver;

const MAX_WIDTH: u32 = 1280;
const BADGE_SIZE: u32 = 18;

#[derive(Debug, Clone, Deserialize)]
struct MarkerBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Candidate font locations for marker labels. Markers are still drawn when
/// none of these exist; only the numbers are skipped.
const FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
];

fn load_label_font() -> Option<Vec<u8>> {
    FONT_PATHS.iter().find_map(|path| std::fs::read(path).ok())
}

/// Resolve viewport bounding boxes for every selector-map entry.
async fn resolve_marker_boxes(
    driver: &dyn PageDriver,
    selector_map: &HashMap<i64, String>,
) -> Result<HashMap<i64, MarkerBox>> {
    let targets = serde_json::to_string(selector_map)?;
    let script = format!(
        r#"(() => {{
    const targets = {targets};
    const boxes = {{}};
    for (const [id, xpath] of Object.entries(targets)) {{
        const node = document.evaluate(xpath, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
        if (!node || !node.getBoundingClientRect) continue;
        const r = node.getBoundingClientRect();
        if (r.width <= 0 || r.height <= 0) continue;
        boxes[id] = {{ x: r.left, y: r.top, width: r.width, height: r.height }};
    }}
    return boxes;
}})()"#
    );
    let value = driver
        .evaluate(&script)
        .await
        .map_err(|e| anyhow!("Failed to resolve marker boxes: {}", e))?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Screenshot the viewport and draw a numbered marker over every
/// selector-map entry. Returns base64 JPEG for the chat payload.
pub async fn annotated_screenshot(
    driver: &dyn PageDriver,
    selector_map: &HashMap<i64, String>,
) -> Result<String> {
    let png = driver
        .screenshot(false)
        .await
        .map_err(|e| anyhow!("Failed to capture screenshot: {}", e))?;
    let boxes = resolve_marker_boxes(driver, selector_map).await?;

    let mut image = image::load_from_memory(&png)
        .context("Failed to decode screenshot")?
        .to_rgba8();

    let font_data = load_label_font();
    let font = font_data
        .as_deref()
        .and_then(|data| FontRef::try_from_slice(data).ok());

    let outline = Rgba([255u8, 0, 0, 255]);
    let badge = Rgba([255u8, 0, 0, 255]);
    let label = Rgba([255u8, 255, 255, 255]);

    for (id, marker) in &boxes {
        draw_marker(&mut image, *id, marker, outline, badge, label, font.as_ref());
    }

    encode_jpeg_base64(DynamicImage::ImageRgba8(image))
}

fn draw_marker(
    image: &mut RgbaImage,
    id: i64,
    marker: &MarkerBox,
    outline: Rgba<u8>,
    badge: Rgba<u8>,
    label: Rgba<u8>,
    font: Option<&FontRef<'_>>,
) {
    let (img_w, img_h) = image.dimensions();
    let x = marker.x.max(0.0) as i32;
    let y = marker.y.max(0.0) as i32;
    if x >= img_w as i32 || y >= img_h as i32 {
        return;
    }
    let w = (marker.width as u32).clamp(1, img_w.saturating_sub(x as u32));
    let h = (marker.height as u32).clamp(1, img_h.saturating_sub(y as u32));

    // 2px outline
    draw_hollow_rect_mut(image, Rect::at(x, y).of_size(w, h), outline);
    if w > 2 && h > 2 {
        draw_hollow_rect_mut(
            image,
            Rect::at(x + 1, y + 1).of_size(w - 2, h - 2),
            outline,
        );
    }

    let badge_w = BADGE_SIZE + 6 * (id.max(0).to_string().len().saturating_sub(1) as u32);
    draw_filled_rect_mut(image, Rect::at(x, y).of_size(badge_w, BADGE_SIZE), badge);

    if let Some(font) = font {
        let scale = PxScale::from(BADGE_SIZE as f32 - 4.0);
        draw_text_mut(image, label, x + 3, y + 2, scale, font, &id.to_string());
    }
}

/// Plain page screenshot as base64 JPEG; used by the completion verifier.
pub async fn page_screenshot(driver: &dyn PageDriver, full_page: bool) -> Result<String> {
    let png = driver
        .screenshot(full_page)
        .await
        .map_err(|e| anyhow!("Failed to capture screenshot: {}", e))?;
    let image = image::load_from_memory(&png).context("Failed to decode screenshot")?;
    encode_jpeg_base64(image)
}

/// Resize to at most 1280px wide and encode as base64 JPEG, keeping token
/// cost for image content bounded.
pub fn encode_jpeg_base64(image: DynamicImage) -> Result<String> {
    let (width, height) = image.dimensions();
    let resized = if width > MAX_WIDTH {
        let scale = MAX_WIDTH as f32 / width as f32;
        let new_height = (height as f32 * scale) as u32;
        image.resize(MAX_WIDTH, new_height, image::imageops::FilterType::Lanczos3)
    } else {
        image
    };

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut jpeg = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut jpeg);
    rgb.write_to(&mut cursor, image::ImageFormat::Jpeg)
        .context("Failed to encode screenshot as JPEG")?;

    Ok(base64::engine::general_purpose::STANDARD.encode(jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_downscales_wide_images() {
        let wide = DynamicImage::ImageRgba8(RgbaImage::new(2560, 1440));
        let b64 = encode_jpeg_base64(wide).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD.decode(b64).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions().0, 1280);
    }

    #[test]
    fn markers_clamp_to_image_bounds() {
        let mut image = RgbaImage::new(100, 100);
        let marker = MarkerBox {
            x: 90.0,
            y: 90.0,
            width: 50.0,
            height: 50.0,
        };
        let color = Rgba([255u8, 0, 0, 255]);
        draw_marker(&mut image, 3, &marker, color, color, color, None);
        let off_screen = MarkerBox {
            x: 500.0,
            y: 500.0,
            width: 10.0,
            height: 10.0,
        };
        draw_marker(&mut image, 4, &off_screen, color, color, color, None);
    }
}
