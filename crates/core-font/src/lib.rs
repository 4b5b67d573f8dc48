//! Bitmap font loading, contour caching and bold derivation.
//!
//! A font is constructed once from a JSON descriptor (see module docs on
//! [`FontJson`]) and is immutable afterwards: the code-point-to-glyph map,
//! each glyph's bitmap and its cached contour list never change after
//! construction. [`Font::into_bold`] produces a second, independent font
//! rather than mutating the original.

use image::GrayImage;
use imageproc::contours::{find_contours, Contour};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum FontLoadError {
    #[error("failed to read font file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed font JSON in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("glyph {code_point:#x} has {actual} bytes, expected {expected} ({glyph_height}x{row_bytes})")]
    GlyphByteCount {
        code_point: u32,
        expected: usize,
        actual: usize,
        glyph_height: usize,
        row_bytes: usize,
    },
    #[error("code point {0:?} is not valid hexadecimal")]
    BadCodePoint(String),
}

/// On-disk font representation: name, glyph dimensions, and a map from
/// hex code point to packed 1bpp glyph rows.
#[derive(Debug, Deserialize)]
struct FontJson {
    name: String,
    glyph_width: usize,
    glyph_height: usize,
    glyphs: BTreeMap<String, Vec<u8>>,
}

/// A single glyph: its expanded 0/255 bitmap and the external contours
/// extracted from that bitmap at load time.
#[derive(Debug, Clone)]
pub struct Glyph {
    pub bitmap: GrayImage,
    pub contours: Vec<Contour<i32>>,
}

/// An immutable, loaded bitmap font.
#[derive(Debug, Clone)]
pub struct Font {
    name: String,
    glyph_width: usize,
    glyph_height: usize,
    glyphs: BTreeMap<u32, Glyph>,
}

fn row_bytes(width: usize) -> usize {
    width.div_ceil(8)
}

/// Expand a 1-bit-per-pixel, MSB-first, row-padded-to-byte glyph into an
/// 8bpp 0/255 bitmap.
fn unpack_glyph(data: &[u8], width: usize, height: usize) -> GrayImage {
    let stride = row_bytes(width);
    let mut img = GrayImage::new(width as u32, height as u32);
    for y in 0..height {
        let row = &data[y * stride..(y + 1) * stride];
        for x in 0..width {
            let byte = row[x / 8];
            let bit = 7 - (x % 8);
            let value = if (byte >> bit) & 1 != 0 { 255 } else { 0 };
            img.put_pixel(x as u32, y as u32, image::Luma([value]));
        }
    }
    img
}

/// Pack an 8bpp 0/255 bitmap back into 1-bit-per-pixel, MSB-first,
/// row-padded-to-byte form (the inverse of [`unpack_glyph`]).
fn pack_glyph(img: &GrayImage) -> Vec<u8> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    let stride = row_bytes(width);
    let mut out = vec![0u8; stride * height];
    for y in 0..height {
        for x in 0..width {
            if img.get_pixel(x as u32, y as u32).0[0] != 0 {
                let byte = &mut out[y * stride + x / 8];
                *byte |= 1 << (7 - (x % 8));
            }
        }
    }
    out
}

/// Mirror every set pixel in a packed row into the pixel to its right,
/// carrying between bytes, per the printhead's own bold-rendering firmware.
/// Processed from the last byte of the row back to the first, since each
/// byte's carry-in comes from the byte to its left.
fn bolden_row(row: &mut [u8]) {
    for i in (0..row.len()).rev() {
        let carry_in = if i > 0 { row[i - 1] << 7 } else { 0 };
        row[i] |= (row[i] >> 1) | carry_in;
    }
}

impl Font {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn glyph_width(&self) -> usize {
        self.glyph_width
    }

    pub fn glyph_height(&self) -> usize {
        self.glyph_height
    }

    pub fn glyph(&self, code_point: u32) -> Option<&Glyph> {
        self.glyphs.get(&code_point)
    }

    pub fn code_points(&self) -> impl Iterator<Item = u32> + '_ {
        self.glyphs.keys().copied()
    }

    pub fn glyphs(&self) -> impl Iterator<Item = (u32, &Glyph)> {
        self.glyphs.iter().map(|(&cp, g)| (cp, g))
    }

    fn from_glyph_bitmaps(
        name: String,
        glyph_width: usize,
        glyph_height: usize,
        bitmaps: BTreeMap<u32, GrayImage>,
    ) -> Self {
        let glyphs = bitmaps
            .into_iter()
            .map(|(cp, bitmap)| {
                let contours = find_contours::<i32>(&bitmap);
                (cp, Glyph { bitmap, contours })
            })
            .collect();
        Self {
            name,
            glyph_width,
            glyph_height,
            glyphs,
        }
    }

    pub fn from_json(path: impl AsRef<Path>) -> Result<Self, FontLoadError> {
        let path_ref = path.as_ref();
        let content =
            std::fs::read_to_string(path_ref).map_err(|source| FontLoadError::Io {
                path: path_ref.display().to_string(),
                source,
            })?;
        let parsed: FontJson =
            serde_json::from_str(&content).map_err(|source| FontLoadError::Json {
                path: path_ref.display().to_string(),
                source,
            })?;

        let stride = row_bytes(parsed.glyph_width);
        let expected_len = stride * parsed.glyph_height;

        let mut bitmaps = BTreeMap::new();
        for (hex, bytes) in parsed.glyphs {
            let code_point = u32::from_str_radix(&hex, 16)
                .map_err(|_| FontLoadError::BadCodePoint(hex.clone()))?;
            if bytes.len() != expected_len {
                return Err(FontLoadError::GlyphByteCount {
                    code_point,
                    expected: expected_len,
                    actual: bytes.len(),
                    glyph_height: parsed.glyph_height,
                    row_bytes: stride,
                });
            }
            let bitmap = unpack_glyph(&bytes, parsed.glyph_width, parsed.glyph_height);
            bitmaps.insert(code_point, bitmap);
        }

        debug!(target: "font", name = %parsed.name, glyph_count = bitmaps.len(), "font_loaded");
        Ok(Self::from_glyph_bitmaps(
            parsed.name,
            parsed.glyph_width,
            parsed.glyph_height,
            bitmaps,
        ))
    }

    /// Derive a bold variant: every glyph is thickened by one column per
    /// the printhead's firmware algorithm, and contours are re-extracted
    /// from the thickened bitmaps. The source font is untouched.
    pub fn into_bold(self) -> Self {
        if self.glyph_width > 16 {
            warn!(
                target: "font",
                name = %self.name,
                glyph_width = self.glyph_width,
                "bold derivation on wide glyph rows is untested beyond 2 row-bytes"
            );
        }
        let bitmaps: BTreeMap<u32, GrayImage> = self
            .glyphs
            .iter()
            .map(|(&cp, glyph)| {
                let mut packed = pack_glyph(&glyph.bitmap);
                let stride = row_bytes(self.glyph_width);
                for row in packed.chunks_mut(stride) {
                    bolden_row(row);
                }
                let bitmap = unpack_glyph(&packed, self.glyph_width, self.glyph_height);
                (cp, bitmap)
            })
            .collect();

        Self::from_glyph_bitmaps(
            format!("{}-bold", self.name),
            self.glyph_width,
            self.glyph_height,
            bitmaps,
        )
    }
}
