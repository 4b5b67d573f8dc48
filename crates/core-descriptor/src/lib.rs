//! Printout descriptor: segments a printout into vertical/horizontal
//! spaces, classifies the unknown (burned) spaces against a set of fonts,
//! and propagates strong matches to tighten neighboring span boundaries.

use core_bitmap::Printout;
use core_font::Font;
use core_geometry::{BoundingBox, Point, Span};
use core_match::{match_glyphs, GlyphMatch};
use serde::Serialize;
use tracing::debug;

/// Score below which a match is "strong" enough to constrain its
/// neighbors' spans.
const STRONG_MATCH_THRESHOLD: f64 = 0.001;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum HorizontalSpace {
    WhiteSpace { span: Span },
    UnknownSpace { span: Span },
    GlyphSpace { span: Span, matches: Vec<GlyphMatch> },
}

impl HorizontalSpace {
    pub fn span(&self) -> Span {
        match self {
            HorizontalSpace::WhiteSpace { span }
            | HorizontalSpace::UnknownSpace { span }
            | HorizontalSpace::GlyphSpace { span, .. } => *span,
        }
    }

    fn set_span(&mut self, span: Span) {
        match self {
            HorizontalSpace::WhiteSpace { span: s }
            | HorizontalSpace::UnknownSpace { span: s }
            | HorizontalSpace::GlyphSpace { span: s, .. } => *s = span,
        }
    }

    fn has_volume(&self) -> bool {
        !self.span().is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerticalSpace {
    pub span: Span,
    pub contents: Vec<HorizontalSpace>,
}

impl VerticalSpace {
    fn has_volume(&self) -> bool {
        !self.span.is_empty()
    }

    fn bbox_of(&self, index: usize) -> BoundingBox {
        let hori = self.contents[index].span();
        BoundingBox::from_spans(hori, self.span)
    }
}

#[derive(Clone)]
pub struct PrintoutDescriptor {
    printout: Printout,
    contents: Vec<VerticalSpace>,
    fonts: Vec<Font>,
}

impl PrintoutDescriptor {
    pub fn new(printout: Printout, fonts: Vec<Font>) -> Self {
        let contents = build_content(&printout, None, &fonts);
        Self {
            printout,
            contents,
            fonts,
        }
    }

    pub fn printout(&self) -> &Printout {
        &self.printout
    }

    pub fn contents(&self) -> &[VerticalSpace] {
        &self.contents
    }

    /// Append new rows and re-run classification only over the ROI
    /// reopened by this extension: the previous last `VerticalSpace` is
    /// dropped (its classification may have been truncated by an
    /// in-progress row) and re-derived alongside the freshly appended rows.
    pub fn extend(&mut self, extension: Printout) {
        let extension_len = extension.length() as i32;
        self.printout.extend(extension).expect("width mismatch on extend");

        let Some(last) = self.contents.last() else {
            self.contents = build_content(&self.printout, None, &self.fonts);
            return;
        };
        let roi = Span::new(last.span.beg, last.span.end + extension_len);
        self.contents.pop();

        let fresh = build_content(&self.printout, Some(roi), &self.fonts);
        debug!(target: "descriptor", roi_beg = roi.beg, roi_end = roi.end, new_segments = fresh.len(), "descriptor_extended");
        self.contents.extend(fresh);
    }
}

fn build_content(printout: &Printout, roi: Option<Span>, fonts: &[Font]) -> Vec<VerticalSpace> {
    let segments = core_segment::segment(printout, roi);
    let mut content: Vec<VerticalSpace> = segments
        .into_iter()
        .map(|seg| VerticalSpace {
            span: seg.span,
            contents: seg
                .horizontal
                .into_iter()
                .map(|run| {
                    if run.active {
                        HorizontalSpace::UnknownSpace { span: run.span }
                    } else {
                        HorizontalSpace::WhiteSpace { span: run.span }
                    }
                })
                .collect(),
        })
        .collect();

    classify_unknowns(printout, &mut content, fonts);
    constrain(&mut content);
    content
}

/// Replace every `UnknownSpace` with a `GlyphSpace` carrying every font's
/// surviving matches, sorted ascending by score. Spaces with no surviving
/// match across any font are left as `UnknownSpace`.
fn classify_unknowns(printout: &Printout, content: &mut [VerticalSpace], fonts: &[Font]) {
    for y in 0..content.len() {
        for x in 0..content[y].contents.len() {
            if !matches!(content[y].contents[x], HorizontalSpace::UnknownSpace { .. }) {
                continue;
            }

            let bbox = content[y].bbox_of(x);
            let vert_len = content[y].span.len();
            let hori_len = content[y].contents[x].span().len();

            let mut matches: Vec<GlyphMatch> = Vec::new();
            for font in fonts {
                let h = font.glyph_height() as i32;
                let w = font.glyph_width() as i32;
                if vert_len > (h as f64 * 1.5) as i32 || hori_len > (w as f64 * 1.5) as i32 {
                    continue;
                }
                matches.extend(match_glyphs(printout, bbox, font));
            }

            if matches.is_empty() {
                continue;
            }
            matches.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap());

            let span = content[y].contents[x].span();
            content[y].contents[x] = HorizontalSpace::GlyphSpace { span, matches };
        }
    }
}

/// Propagate strong matches (score below [`STRONG_MATCH_THRESHOLD`]) to
/// tighten neighboring span boundaries, then drop anything that collapsed
/// to zero width/height as a result.
fn constrain(content: &mut Vec<VerticalSpace>) {
    for y in 0..content.len() {
        let mut vert_spans: Vec<Span> = Vec::new();
        let len = content[y].contents.len();

        for x in 0..len {
            let (is_strong, pos) = match &content[y].contents[x] {
                HorizontalSpace::GlyphSpace { matches, .. } if !matches.is_empty() => {
                    let top = &matches[0];
                    (top.score < STRONG_MATCH_THRESHOLD, Some(top.pos))
                }
                _ => (false, None),
            };
            let Some(pos) = pos.filter(|_| is_strong) else {
                continue;
            };

            let match_hori_span = pos.horizontal_span();
            let match_vert_span = pos.vertical_span();

            content[y].contents[x].set_span(match_hori_span);

            if x > 0 {
                let prev = content[y].contents[x - 1].span();
                content[y].contents[x - 1].set_span(Span::new(prev.beg, match_hori_span.beg));
            }
            if x + 1 < len {
                let next = content[y].contents[x + 1].span();
                content[y].contents[x + 1].set_span(Span::new(match_hori_span.end, next.end));
            }

            vert_spans.push(match_vert_span);
        }

        if !vert_spans.is_empty() && vert_spans.iter().all(|s| *s == vert_spans[0]) {
            let v = vert_spans[0];
            content[y].span = v;
            if y > 0 {
                let prev = content[y - 1].span;
                content[y - 1].span = Span::new(prev.beg, v.beg);
            }
            if y + 1 < content.len() {
                let next = content[y + 1].span;
                content[y + 1].span = Span::new(v.end, next.end);
            }
        }

        content[y].contents.retain(|c| c.has_volume());
    }

    content.retain(|v| v.has_volume());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_printout_yields_single_whitespace_vertical_space() {
        let p = Printout::blank(16, 4);
        let desc = PrintoutDescriptor::new(p, Vec::new());
        assert_eq!(desc.contents().len(), 1);
        assert_eq!(desc.contents()[0].contents.len(), 1);
        assert!(matches!(
            desc.contents()[0].contents[0],
            HorizontalSpace::WhiteSpace { .. }
        ));
    }

    #[test]
    fn burned_region_without_fonts_stays_unknown() {
        let mut rows = vec![vec![0u8; 8]; 4];
        rows[1][2] = 255;
        rows[1][3] = 255;
        let p = Printout::new(8, rows).unwrap();
        let desc = PrintoutDescriptor::new(p, Vec::new());
        let vert = desc
            .contents()
            .iter()
            .find(|v| v.span == Span::new(1, 2))
            .unwrap();
        assert!(matches!(
            vert.contents.iter().find(|c| !c.span().is_empty() && c.span().beg == 2),
            Some(HorizontalSpace::UnknownSpace { .. })
        ));
    }

    fn font_with_solid_glyph(width: usize, height: usize) -> Font {
        let row_bytes = width.div_ceil(8);
        let mut bytes = vec![0xFFu8; row_bytes * height];
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
        use std::io::Write;
        f.write_all(json.as_bytes()).unwrap();
        Font::from_json(f.path()).unwrap()
    }

    #[test]
    fn solid_glyph_at_an_offset_is_classified_and_refined_to_its_exact_rectangle() {
        let glyph_w = 8;
        let glyph_h = 8;
        let font = font_with_solid_glyph(glyph_w, glyph_h);

        let mut rows = vec![vec![0u8; 384]; glyph_h];
        for row in rows.iter_mut() {
            for x in 100..100 + glyph_w {
                row[x] = 255;
            }
        }
        let printout = Printout::new(384, rows).unwrap();

        let desc = PrintoutDescriptor::new(printout, vec![font]);
        assert_eq!(desc.contents().len(), 1);
        let vert = &desc.contents()[0];

        let glyph_space = vert
            .contents
            .iter()
            .find(|h| matches!(h, HorizontalSpace::GlyphSpace { .. }))
            .expect("burned region must classify as a glyph space");
        let HorizontalSpace::GlyphSpace { span, matches } = glyph_space else {
            unreachable!()
        };
        assert_eq!(matches[0].char, "A");
        assert!(matches[0].score < 1.0);
        assert_eq!(span.beg, 100);
        assert_eq!(span.end, 100 + glyph_w as i32);
    }

    #[test]
    fn extend_drops_and_rebuilds_only_the_last_vertical_space() {
        let p = Printout::blank(8, 2);
        let mut desc = PrintoutDescriptor::new(p, Vec::new());
        let before_len = desc.contents().len();
        desc.extend(Printout::blank(8, 3));
        assert_eq!(desc.printout().length(), 5);
        assert!(desc.contents().len() >= before_len);
    }
}
