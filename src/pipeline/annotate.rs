//! Annotated previews: detected regions drawn over the page for human review.
//!
//! Drawing works on a copy of the page image and never touches recognition
//! results. Each region gets a hollow box in the style's colour and a filled
//! label tab reading `"{class} {confidence:.2}"`. Glyphs are only drawn when
//! a TrueType font was configured.

use crate::config::AnnotationStyle;
use crate::document::Region;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::warn;

/// Load the label font, or `None` (with a warning) if it cannot be read.
pub fn load_font(path: &Path) -> Option<FontVec> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!("Annotation font '{}' unreadable: {}", path.display(), e);
            return None;
        }
    };
    match FontVec::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("Annotation font '{}' invalid: {}", path.display(), e);
            None
        }
    }
}

/// Preview label for one region.
pub fn region_label(region: &Region) -> String {
    format!("{} {:.2}", region.class.display_name(), region.confidence)
}

/// Draw every region onto a copy of `image`.
pub fn annotate_page(
    image: &RgbImage,
    regions: &[Region],
    style: &AnnotationStyle,
    font: Option<&FontVec>,
) -> RgbImage {
    let mut img = image.clone();
    let (page_w, page_h) = img.dimensions();
    let box_color = Rgb(style.box_color);
    let text_color = Rgb(style.text_color);
    let scale = PxScale::from(style.font_px);

    for region in regions {
        let (x1, y1, x2, y2) = region.bbox.pixel_bounds();
        let x = x1.max(0) as u32;
        let y = y1.max(0) as u32;
        let w = (x2.max(0) as u32).min(page_w).saturating_sub(x);
        let h = (y2.max(0) as u32).min(page_h).saturating_sub(y);
        if w == 0 || h == 0 {
            continue;
        }

        for t in 0..style.line_thickness {
            let inner_w = w.saturating_sub(2 * t);
            let inner_h = h.saturating_sub(2 * t);
            if inner_w > 0 && inner_h > 0 {
                let rect = Rect::at((x + t) as i32, (y + t) as i32).of_size(inner_w, inner_h);
                draw_hollow_rect_mut(&mut img, rect, box_color);
            }
        }

        let label = region_label(region);
        let (text_w, text_h) = match font {
            Some(f) => text_size(scale, f, &label),
            None => (
                (label.chars().count() as f32 * style.font_px * 0.6) as u32,
                style.font_px as u32,
            ),
        };
        let pad = style.text_padding;
        let tab_w = text_w + 2 * pad;
        let tab_h = text_h + 2 * pad;

        // Tab sits above the box, or inside its top edge when there is no room.
        let tab_y = if y >= tab_h { y - tab_h } else { y };
        draw_filled_rect_mut(
            &mut img,
            Rect::at(x as i32, tab_y as i32).of_size(tab_w.max(1), tab_h.max(1)),
            box_color,
        );

        if let Some(f) = font {
            draw_text_mut(
                &mut img,
                text_color,
                (x + pad) as i32,
                (tab_y + pad) as i32,
                scale,
                f,
                &label,
            );
        }
    }

    img
}
