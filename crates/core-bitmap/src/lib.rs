//! Monochrome printout bitmap: the 2-D image a thermal printhead would have
//! burned. Pixel values are 0 (unburned) or 255 (burned). Width is constant
//! across the lifetime of a `Printout`; height grows as rows are appended.
//!
//! `Printout` is not hard-coded to the 384-pixel printhead width so that it
//! can also hold arbitrary-width images loaded from disk (e.g. a rendered
//! font glyph sheet); the capture pipeline always constructs one at
//! [`HEAD_WIDTH`].

use core_geometry::Span;
use image::{GrayImage, ImageError};
use std::path::Path;
use tracing::{debug, warn};

/// Printhead width in pixels, fixed by the hardware this system observes.
pub const HEAD_WIDTH: usize = 384;

pub const WHITE: u8 = 255;
pub const BLACK: u8 = 0;

#[derive(Debug, thiserror::Error)]
pub enum BitmapError {
    #[error("printout buffer has {actual} rows of inconsistent width (expected {expected})")]
    Dimension { expected: usize, actual: usize },
    #[error("image I/O error loading/saving {path}: {source}")]
    ImageIo { path: String, source: ImageError },
}

/// A monochrome bitmap stored row-major as owned row buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Printout {
    width: usize,
    rows: Vec<Vec<u8>>,
}

impl Printout {
    /// Build a printout from an explicit set of equal-width rows.
    pub fn new(width: usize, rows: Vec<Vec<u8>>) -> Result<Self, BitmapError> {
        for row in &rows {
            if row.len() != width {
                return Err(BitmapError::Dimension {
                    expected: width,
                    actual: row.len(),
                });
            }
        }
        Ok(Self { width, rows })
    }

    /// An all-zero printout of the given dimensions.
    pub fn blank(width: usize, length: usize) -> Self {
        Self {
            width,
            rows: vec![vec![BLACK; width]; length],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn length(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.rows[y]
    }

    pub fn rows(&self) -> &[Vec<u8>] {
        &self.rows
    }

    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.rows[y][x]
    }

    /// Append further rows (each of matching width) to the bottom of the
    /// printout, growing it monotonically.
    pub fn extend(&mut self, extra: Printout) -> Result<(), BitmapError> {
        if extra.width != self.width && !extra.rows.is_empty() {
            return Err(BitmapError::Dimension {
                expected: self.width,
                actual: extra.width,
            });
        }
        self.rows.extend(extra.rows);
        Ok(())
    }

    /// A copy of the rows covered by `span`, clamped to the printout's
    /// bounds. Used both by the segmenter's ROI slicing and by the glyph
    /// matcher's sub-image extraction.
    pub fn slice_rows(&self, span: Span) -> Printout {
        let range = span.as_range();
        let beg = range.start.min(self.rows.len());
        let end = range.end.min(self.rows.len()).max(beg);
        Printout {
            width: self.width,
            rows: self.rows[beg..end].to_vec(),
        }
    }

    /// A copy of the sub-image `[y0..y1) x [x0..x1)`, clamped to bounds.
    pub fn slice_box(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> Printout {
        let y1 = y1.min(self.rows.len());
        let y0 = y0.min(y1);
        let x1 = x1.min(self.width);
        let x0 = x0.min(x1);
        let rows = self.rows[y0..y1]
            .iter()
            .map(|row| row[x0..x1].to_vec())
            .collect();
        Printout {
            width: x1 - x0,
            rows,
        }
    }

    /// True if no pixel in the printout is burned.
    pub fn is_blank(&self) -> bool {
        self.rows.iter().all(|row| row.iter().all(|&p| p == BLACK))
    }

    /// Load an 8-bpp grayscale PNG as a printout. Any grayscale source
    /// image is accepted verbatim (no thresholding is applied here, matching
    /// `cv2.imread(..., IMREAD_GRAYSCALE)`, which does not binarize either);
    /// thresholding, if wanted, is a caller concern.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BitmapError> {
        let path_ref = path.as_ref();
        let img = image::open(path_ref).map_err(|source| BitmapError::ImageIo {
            path: path_ref.display().to_string(),
            source,
        })?;
        let gray: GrayImage = img.into_luma8();
        let width = gray.width() as usize;
        let height = gray.height() as usize;
        let mut rows = Vec::with_capacity(height);
        for y in 0..height {
            let mut row = Vec::with_capacity(width);
            for x in 0..width {
                row.push(gray.get_pixel(x as u32, y as u32).0[0]);
            }
            rows.push(row);
        }
        debug!(target: "bitmap", path = %path_ref.display(), width, height, "printout_loaded");
        Ok(Self { width, rows })
    }

    /// Save as an 8-bpp grayscale PNG.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BitmapError> {
        let path_ref = path.as_ref();
        let mut buf = Vec::with_capacity(self.width * self.rows.len());
        for row in &self.rows {
            buf.extend_from_slice(row);
        }
        if self.rows.is_empty() {
            warn!(target: "bitmap", path = %path_ref.display(), "saving_empty_printout");
        }
        image::save_buffer(
            path_ref,
            &buf,
            self.width as u32,
            self.rows.len() as u32,
            image::ExtendedColorType::L8,
        )
        .map_err(|source| BitmapError::ImageIo {
            path: path_ref.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_printout_has_requested_dimensions() {
        let p = Printout::blank(10, 5);
        assert_eq!(p.width(), 10);
        assert_eq!(p.length(), 5);
        assert!(p.is_blank());
    }

    #[test]
    fn new_rejects_rows_of_mismatched_width() {
        let err = Printout::new(4, vec![vec![0; 4], vec![0; 3]]).unwrap_err();
        assert!(matches!(
            err,
            BitmapError::Dimension {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn extend_grows_monotonically() {
        let mut p = Printout::blank(4, 2);
        p.extend(Printout::blank(4, 3)).unwrap();
        assert_eq!(p.length(), 5);
    }

    #[test]
    fn slice_rows_clamps_to_bounds() {
        let p = Printout::new(
            2,
            vec![vec![0, 0], vec![1, 1], vec![2, 2], vec![3, 3]],
        )
        .unwrap();
        let s = p.slice_rows(Span::new(1, 100));
        assert_eq!(s.length(), 3);
        assert_eq!(s.row(0), &[1, 1]);
    }

    #[test]
    fn roundtrip_png_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("printout.png");
        let mut rows = vec![vec![0u8; 8]; 4];
        rows[1][3] = 255;
        let p = Printout::new(8, rows).unwrap();
        p.save(&path).unwrap();

        let loaded = Printout::load(&path).unwrap();
        assert_eq!(loaded.width(), 8);
        assert_eq!(loaded.length(), 4);
        assert_eq!(loaded.pixel(3, 1), 255);
        assert_eq!(loaded.pixel(0, 0), 0);
    }
}
