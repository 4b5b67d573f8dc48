//! Run-length decomposition of a printout into vertical (row) and
//! horizontal (column) activity runs.
//!
//! This crate is deliberately classification-free: it reports where pixel
//! activity changes, not what a run *means*. `core-descriptor` turns an
//! active horizontal run into an `UnknownSpace` candidate and an inactive
//! one into a `WhiteSpace`.

use core_bitmap::Printout;
use core_geometry::Span;

/// A maximal contiguous range of indices sharing the same activity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub span: Span,
    pub active: bool,
}

/// One row-run of the printout together with the column runs found inside
/// it (i.e. the horizontal decomposition of that row band alone).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerticalSegment {
    pub span: Span,
    pub horizontal: Vec<Run>,
}

/// Collapse a boolean activity sequence into maximal same-value runs,
/// each reported as a half-open `[beg, end)` span in local indices.
fn runs_from_activity(activity: &[bool]) -> Vec<(usize, usize, bool)> {
    let mut runs = Vec::new();
    let mut iter = activity.iter().enumerate();
    let Some((_, &first)) = iter.next() else {
        return runs;
    };
    let mut start = 0usize;
    let mut current = first;
    for (i, &active) in iter {
        if active != current {
            runs.push((start, i, current));
            start = i;
            current = active;
        }
    }
    runs.push((start, activity.len(), current));
    runs
}

fn row_activity(printout: &Printout) -> Vec<bool> {
    (0..printout.length())
        .map(|y| printout.row(y).iter().any(|&p| p != 0))
        .collect()
}

fn col_activity(printout: &Printout) -> Vec<bool> {
    (0..printout.width())
        .map(|x| (0..printout.length()).any(|y| printout.pixel(x, y) != 0))
        .collect()
}

/// Segment a printout (or, if `roi` is given, the row band `[roi.beg,
/// roi.end)` of it) into vertical runs, each carrying its own horizontal
/// decomposition. Spans in the result are offset by `roi.beg` when a ROI is
/// given, so they always address the full printout's coordinate space.
pub fn segment(printout: &Printout, roi: Option<Span>) -> Vec<VerticalSegment> {
    let sliced;
    let (view, offset) = match roi {
        Some(span) => {
            sliced = printout.slice_rows(span);
            (&sliced, span.beg.max(0) as usize)
        }
        None => (printout, 0usize),
    };

    if view.is_empty() {
        return Vec::new();
    }

    let activity = row_activity(view);
    runs_from_activity(&activity)
        .into_iter()
        .map(|(beg, end, _active)| {
            let band = view.slice_rows(Span::new(beg as i32, end as i32));
            let horizontal = horizontal_runs(&band);
            VerticalSegment {
                span: Span::new((beg + offset) as i32, (end + offset) as i32),
                horizontal,
            }
        })
        .collect()
}

/// Column-activity runs for a (typically row-sliced) printout band.
fn horizontal_runs(band: &Printout) -> Vec<Run> {
    let activity = col_activity(band);
    runs_from_activity(&activity)
        .into_iter()
        .map(|(beg, end, active)| Run {
            span: Span::new(beg as i32, end as i32),
            active,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printout_from_rows(rows: &[&[u8]]) -> Printout {
        let width = rows[0].len();
        Printout::new(width, rows.iter().map(|r| r.to_vec()).collect()).unwrap()
    }

    #[test]
    fn empty_bitmap_has_no_vertical_segments() {
        let p = Printout::new(4, vec![]).unwrap();
        assert!(segment(&p, None).is_empty());
    }

    #[test]
    fn fully_blank_bitmap_is_one_whitespace_segment() {
        let p = Printout::blank(6, 3);
        let segs = segment(&p, None);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].span, Span::new(0, 3));
        assert_eq!(segs[0].horizontal.len(), 1);
        assert!(!segs[0].horizontal[0].active);
        assert_eq!(segs[0].horizontal[0].span, Span::new(0, 6));
    }

    #[test]
    fn adjacent_runs_always_differ_in_activity() {
        let p = printout_from_rows(&[
            &[0, 0, 0, 0],
            &[0, 255, 255, 0],
            &[0, 255, 255, 0],
            &[0, 0, 0, 0],
            &[0, 0, 0, 0],
        ]);
        let segs = segment(&p, None);
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].span, Span::new(0, 1));
        assert_eq!(segs[1].span, Span::new(1, 3));
        assert_eq!(segs[2].span, Span::new(3, 5));

        for i in 1..segs[1].horizontal.len() {
            assert_ne!(
                segs[1].horizontal[i - 1].active,
                segs[1].horizontal[i].active
            );
        }
        assert_eq!(segs[1].horizontal.len(), 3);
        assert!(!segs[1].horizontal[0].active);
        assert!(segs[1].horizontal[1].active);
        assert!(!segs[1].horizontal[2].active);
    }

    #[test]
    fn roi_offsets_emitted_spans() {
        let p = printout_from_rows(&[
            &[0, 0],
            &[255, 255],
            &[0, 0],
            &[255, 255],
            &[0, 0],
        ]);
        let segs = segment(&p, Some(Span::new(2, 5)));
        // Within the ROI [2,5): row2=blank, row3=burned, row4=blank.
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].span, Span::new(2, 3));
        assert_eq!(segs[1].span, Span::new(3, 4));
        assert_eq!(segs[2].span, Span::new(4, 5));
    }
}
