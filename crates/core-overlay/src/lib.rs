//! Tinted preview image: an RGB rendering of a printout (burned pixels
//! black, unburned white) that callers can highlight strips or rectangular
//! areas of, used to visualize descriptor spans and glyph matches over
//! the source bitmap.

use core_bitmap::Printout;
use core_geometry::{BoundingBox, Span};
use image::{ImageError, RgbImage};
use std::path::Path;

pub type Color = (u8, u8, u8);

#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("image I/O error saving {path}: {source}")]
    ImageIo { path: String, source: ImageError },
}

pub struct Overlay {
    img: RgbImage,
}

/// `cv::addWeighted(a, 0.5, b, 0.5, 1.0)` per channel: an even blend with a
/// +1 bias, saturating to the `u8` range.
fn blend_weighted(a: u8, b: u8) -> u8 {
    let value = 0.5 * a as f32 + 0.5 * b as f32 + 1.0;
    value.round().clamp(0.0, 255.0) as u8
}

impl Overlay {
    pub fn from_printout(printout: &Printout) -> Self {
        let width = printout.width() as u32;
        let height = printout.length() as u32;
        let mut img = RgbImage::new(width, height);
        for y in 0..printout.length() {
            for x in 0..printout.width() {
                let burned = printout.pixel(x, y) != 0;
                let rgb = if burned { [0, 0, 0] } else { [255, 255, 255] };
                img.put_pixel(x as u32, y as u32, image::Rgb(rgb));
            }
        }
        Self { img }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn length(&self) -> u32 {
        self.img.height()
    }

    /// Blend the full-width row band `span` with `color` at 50% opacity.
    pub fn highlight_strip(&mut self, span: Span, color: Color) {
        let range = span.as_range();
        let beg = range.start.min(self.img.height() as usize) as u32;
        let end = range.end.min(self.img.height() as usize) as u32;
        for y in beg..end {
            for x in 0..self.img.width() {
                self.blend_pixel(x, y, color);
            }
        }
    }

    /// Blend the rectangular area `bounds` with `color` at 50% opacity.
    pub fn highlight_area(&mut self, bounds: BoundingBox, color: Color) {
        let x0 = bounds.p1.x.max(0) as u32;
        let y0 = bounds.p1.y.max(0) as u32;
        let x1 = (bounds.p2.x.max(0) as u32).min(self.img.width());
        let y1 = (bounds.p2.y.max(0) as u32).min(self.img.height());
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend_pixel(x, y, color);
            }
        }
    }

    fn blend_pixel(&mut self, x: u32, y: u32, color: Color) {
        let pixel = self.img.get_pixel(x, y);
        let blended = image::Rgb([
            blend_weighted(pixel.0[0], color.0),
            blend_weighted(pixel.0[1], color.1),
            blend_weighted(pixel.0[2], color.2),
        ]);
        self.img.put_pixel(x, y, blended);
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), OverlayError> {
        let path_ref = path.as_ref();
        self.img
            .save(path_ref)
            .map_err(|source| OverlayError::ImageIo {
                path: path_ref.display().to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_geometry::Point;

    #[test]
    fn from_printout_inverts_burn_state_to_black_and_white() {
        let mut rows = vec![vec![0u8; 4]; 2];
        rows[0][1] = 255;
        let p = Printout::new(4, rows).unwrap();
        let overlay = Overlay::from_printout(&p);
        assert_eq!(overlay.img.get_pixel(1, 0).0, [0, 0, 0]);
        assert_eq!(overlay.img.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn highlight_strip_blends_the_full_row_band() {
        let p = Printout::blank(4, 4);
        let mut overlay = Overlay::from_printout(&p);
        overlay.highlight_strip(Span::new(1, 2), (255, 0, 0));
        let pixel = overlay.img.get_pixel(0, 1).0;
        assert_eq!(pixel, [255, 129, 129]);
        assert_eq!(overlay.img.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn highlight_area_clamps_to_image_bounds() {
        let p = Printout::blank(4, 4);
        let mut overlay = Overlay::from_printout(&p);
        overlay.highlight_area(
            BoundingBox::new(Point::new(-10, -10), Point::new(100, 100)),
            (0, 255, 0),
        );
        // No panic: the area was clamped to the 4x4 image.
        assert_eq!(overlay.width(), 4);
    }
}
