//! Glyph matching: locate which (if any) font glyph a region of a printout
//! most likely corresponds to.
//!
//! Two stages keep this affordable per candidate region: a cheap Hu-moment
//! contour prefilter first discards glyphs whose silhouette can't plausibly
//! match, then a sum-of-squared-differences template match refines the
//! surviving candidates to an exact pixel offset.

use core_bitmap::Printout;
use core_font::Font;
use core_geometry::{BoundingBox, Point};
use image::GrayImage;
use imageproc::contours::Contour;
use imageproc::template_matching::{match_template, MatchTemplateMethod};
use serde::Serialize;
use tracing::trace;

/// Mean pairwise Hu-moment shape dissimilarity below which a glyph survives
/// the contour prefilter. Lower is a closer silhouette match.
pub const CONTOUR_THRESHOLD: f64 = 0.1;

/// Minimum sum-of-squared-differences below which a template match is kept.
pub const TEMPLATE_THRESHOLD: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlyphMatch {
    pub char: String,
    pub font_name: String,
    pub code_point: u32,
    pub score: f64,
    pub pos: BoundingBox,
}

fn printout_to_gray(p: &Printout) -> GrayImage {
    let mut img = GrayImage::new(p.width() as u32, p.length() as u32);
    for y in 0..p.length() {
        for x in 0..p.width() {
            img.put_pixel(x as u32, y as u32, image::Luma([p.pixel(x, y)]));
        }
    }
    img
}

fn image_bbox(p: &Printout) -> BoundingBox {
    BoundingBox::new(
        Point::new(0, 0),
        Point::new(p.width() as i32, p.length() as i32),
    )
}

/// Raw image moment `m_pq = sum x^p y^q` over a contour's boundary points,
/// used as the mass distribution fed into the Hu-moment invariants below.
/// This samples the boundary rather than the filled interior: still a valid
/// translation/scale-normalizable mass distribution, just a cheaper one to
/// compute than a full polygon-fill integral.
fn raw_moment(points: &[imageproc::point::Point<i32>], p: u32, q: u32) -> f64 {
    points
        .iter()
        .map(|pt| (pt.x as f64).powi(p as i32) * (pt.y as f64).powi(q as i32))
        .sum()
}

fn hu_moments(contour: &Contour<i32>) -> Option<[f64; 7]> {
    let n = contour.points.len();
    if n == 0 {
        return None;
    }
    let m00 = n as f64;
    let cx = raw_moment(&contour.points, 1, 0) / m00;
    let cy = raw_moment(&contour.points, 0, 1) / m00;

    let central = |p: u32, q: u32| -> f64 {
        contour
            .points
            .iter()
            .map(|pt| (pt.x as f64 - cx).powi(p as i32) * (pt.y as f64 - cy).powi(q as i32))
            .sum::<f64>()
    };

    let norm = |p: u32, q: u32| -> f64 {
        let mu = central(p, q);
        let exponent = (p + q) as f64 / 2.0 + 1.0;
        mu / m00.powf(exponent)
    };

    let eta20 = norm(2, 0);
    let eta02 = norm(0, 2);
    let eta11 = norm(1, 1);
    let eta30 = norm(3, 0);
    let eta03 = norm(0, 3);
    let eta21 = norm(2, 1);
    let eta12 = norm(1, 2);

    let h1 = eta20 + eta02;
    let h2 = (eta20 - eta02).powi(2) + 4.0 * eta11.powi(2);
    let h3 = (eta30 - 3.0 * eta12).powi(2) + (3.0 * eta21 - eta03).powi(2);
    let h4 = (eta30 + eta12).powi(2) + (eta21 + eta03).powi(2);
    let h5 = (eta30 - 3.0 * eta12)
        * (eta30 + eta12)
        * ((eta30 + eta12).powi(2) - 3.0 * (eta21 + eta03).powi(2))
        + (3.0 * eta21 - eta03)
            * (eta21 + eta03)
            * (3.0 * (eta30 + eta12).powi(2) - (eta21 + eta03).powi(2));
    let h6 = (eta20 - eta02) * ((eta30 + eta12).powi(2) - (eta21 + eta03).powi(2))
        + 4.0 * eta11 * (eta30 + eta12) * (eta21 + eta03);
    let h7 = (3.0 * eta21 - eta03)
        * (eta30 + eta12)
        * ((eta30 + eta12).powi(2) - 3.0 * (eta21 + eta03).powi(2))
        - (eta30 - 3.0 * eta12)
            * (eta21 + eta03)
            * (3.0 * (eta30 + eta12).powi(2) - (eta21 + eta03).powi(2));

    Some([h1, h2, h3, h4, h5, h6, h7])
}

/// `cv::CONTOURS_MATCH_I1`-style dissimilarity between two Hu-moment
/// vectors: sum of absolute differences of the sign-preserving log of each
/// moment's reciprocal.
fn match_shapes(a: &Contour<i32>, b: &Contour<i32>) -> f64 {
    let (Some(ha), Some(hb)) = (hu_moments(a), hu_moments(b)) else {
        return 0.0;
    };
    let mut total = 0.0;
    for i in 0..7 {
        let ma = signed_log(ha[i]);
        let mb = signed_log(hb[i]);
        if ma == 0.0 || mb == 0.0 {
            continue;
        }
        total += (1.0 / ma - 1.0 / mb).abs();
    }
    total
}

fn signed_log(v: f64) -> f64 {
    if v.abs() < f64::EPSILON {
        0.0
    } else {
        v.signum() * v.abs().log10()
    }
}

/// Mean pairwise shape dissimilarity between two contour lists, paired in
/// order. Zero if either side has no contours.
fn contour_similarity(a: &[Contour<i32>], b: &[Contour<i32>]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let sum: f64 = a.iter().zip(b.iter()).map(|(c1, c2)| match_shapes(c1, c2)).sum();
    sum / a.len() as f64
}

/// Minimum value and its top-left location in a sum-of-squared-differences
/// template match result. imageproc has no `minMaxLoc` equivalent, so this
/// scans the result buffer directly.
fn argmin(result: &image::ImageBuffer<image::Luma<f32>, Vec<f32>>) -> (f32, (u32, u32)) {
    let mut best = (f32::MAX, (0u32, 0u32));
    for y in 0..result.height() {
        for x in 0..result.width() {
            let v = result.get_pixel(x, y).0[0];
            if v < best.0 {
                best = (v, (x, y));
            }
        }
    }
    best
}

/// Match a candidate glyph region of `bitmap` against every glyph of
/// `font`, returning the surviving matches (order unspecified; callers that
/// need a ranking should sort by `score`).
pub fn match_glyphs(bitmap: &Printout, region: BoundingBox, font: &Font) -> Vec<GlyphMatch> {
    let unpadded = bitmap.slice_box(
        region.p1.x.max(0) as usize,
        region.p1.y.max(0) as usize,
        region.p2.x.max(0) as usize,
        region.p2.y.max(0) as usize,
    );

    if unpadded.is_blank() {
        let spaces = region.width().max(0) as usize / font.glyph_width().max(1);
        return vec![GlyphMatch {
            char: " ".repeat(spaces),
            font_name: font.name().to_string(),
            code_point: 0x20,
            score: 0.0,
            pos: BoundingBox::new(Point::new(0, 0), Point::new(0, 0)),
        }];
    }

    let glyph_w = font.glyph_width() as i32;
    let glyph_h = font.glyph_height() as i32;
    let xpad = if region.width() < glyph_w {
        glyph_w - region.width()
    } else {
        0
    };
    let ypad = if region.height() < glyph_h {
        glyph_h - region.height()
    } else {
        0
    };

    let bbox_image = image_bbox(bitmap);
    let bbox_padded = BoundingBox::new(
        Point::new(region.p1.x - xpad, region.p1.y - ypad),
        Point::new(region.p2.x + xpad, region.p2.y + ypad),
    )
    .clamp(&bbox_image);

    let character = bitmap.slice_box(
        bbox_padded.p1.x as usize,
        bbox_padded.p1.y as usize,
        bbox_padded.p2.x as usize,
        bbox_padded.p2.y as usize,
    );
    let character_gray = printout_to_gray(&character);

    let region_contours =
        imageproc::contours::find_contours::<i32>(&printout_to_gray(&unpadded));

    let result_width = bbox_padded.width() - glyph_w + 1;
    let result_height = bbox_padded.height() - glyph_h + 1;
    if result_width <= 0 || result_height <= 0 {
        return Vec::new();
    }

    let mut matches = Vec::new();
    for (code_point, glyph) in font.glyphs() {
        if glyph.contours.is_empty() || glyph.contours.len() != region_contours.len() {
            continue;
        }
        let cont_score = contour_similarity(&region_contours, &glyph.contours);
        if cont_score >= CONTOUR_THRESHOLD {
            continue;
        }

        let result = match_template(
            &character_gray,
            &glyph.bitmap,
            MatchTemplateMethod::SumOfSquaredErrors,
        );
        let (min_score, (tl_x, tl_y)) = argmin(&result);
        if (min_score as f64) >= TEMPLATE_THRESHOLD {
            continue;
        }

        let match_top_left = Point::new(tl_x as i32, tl_y as i32);
        let mut match_center = match_top_left + Point::new(result_width / 2, result_height / 2);

        let transform_vector = Point::new(
            region.p1.x - bbox_padded.p1.x,
            region.p1.y - bbox_padded.p1.y,
        );
        match_center = match_center - transform_vector;
        match_center = bbox_padded.center() + match_center;

        let corner_offset = Point::new(glyph_w / 2, glyph_h / 2);
        let pos = BoundingBox::new(match_center - corner_offset, match_center + corner_offset)
            .clamp(&bbox_image);

        matches.push(GlyphMatch {
            char: char::from_u32(code_point).unwrap_or('\u{FFFD}').to_string(),
            font_name: font.name().to_string(),
            code_point,
            score: min_score as f64,
            pos,
        });
    }

    trace!(target: "match", region_contours = region_contours.len(), kept = matches.len(), "glyph_match_complete");
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_bitmap::Printout;
    use std::io::Write;

    fn font_with_solid_glyph(width: usize, height: usize) -> Font {
        let row_bytes = width.div_ceil(8);
        let mut bytes = vec![0xFFu8; row_bytes * height];
        // Zero out any padding bits beyond `width` so the glyph is exactly
        // `width` columns wide, not `row_bytes * 8`.
        let trailing_bits = row_bytes * 8 - width;
        if trailing_bits > 0 {
            let mask = 0xFFu8 << trailing_bits;
            for r in 0..height {
                bytes[r * row_bytes + row_bytes - 1] &= mask;
            }
        }
        let glyph_json: String = bytes.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(",");
        let json = format!(
            r#"{{"name":"t","glyph_width":{width},"glyph_height":{height},"glyphs":{{"41":[{glyph_json}]}}}}"#
        );
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        Font::from_json(f.path()).unwrap()
    }

    #[test]
    fn blank_region_yields_synthetic_whitespace_match() {
        let font = font_with_solid_glyph(4, 4);
        let p = Printout::blank(12, 4);
        let region = BoundingBox::new(Point::new(0, 0), Point::new(12, 4));
        let matches = match_glyphs(&p, region, &font);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].char, "   ");
        assert_eq!(matches[0].score, 0.0);
    }

    #[test]
    fn solid_glyph_region_matches_itself_with_low_score() {
        let font = font_with_solid_glyph(4, 4);
        let rows = vec![vec![255u8; 4]; 4];
        let p = Printout::new(4, rows).unwrap();
        let region = BoundingBox::new(Point::new(0, 0), Point::new(4, 4));
        let matches = match_glyphs(&p, region, &font);
        assert!(matches.iter().any(|m| m.code_point == 0x41 && m.score < TEMPLATE_THRESHOLD));
    }
}
