//! Printout builder: replays motor-advance / motor-reverse / burn-line
//! events into a row-addressed bitmap. This is the accumulation layer
//! between the frame codec and the finished [`core_bitmap::Printout`].

use core_bitmap::{Printout, HEAD_WIDTH, WHITE};
use tracing::trace;

/// Row-addressed, monotonically-accumulating bitmap builder.
///
/// Burns accumulate: once a pixel is set it remains set for the lifetime of
/// the builder. The row currently addressed by `line` is considered
/// in-progress and is excluded from [`PrintoutBuilder::get_image`] snapshots,
/// since burns keep landing on it until the next advance.
pub struct PrintoutBuilder {
    rows: Vec<[u8; HEAD_WIDTH]>,
    line: usize,
}

impl Default for PrintoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PrintoutBuilder {
    pub fn new() -> Self {
        Self {
            rows: vec![[0u8; HEAD_WIDTH]],
            line: 0,
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn line_advance(&mut self) {
        self.line += 1;
        if self.line == self.rows.len() {
            self.rows.push([0u8; HEAD_WIDTH]);
        }
        trace!(target: "capture.builder", line = self.line, rows = self.rows.len(), "line_advance");
    }

    pub fn line_reverse(&mut self) {
        if self.line == 0 {
            self.rows.insert(0, [0u8; HEAD_WIDTH]);
        } else {
            self.line -= 1;
        }
        trace!(target: "capture.builder", line = self.line, rows = self.rows.len(), "line_reverse");
    }

    /// OR a 384-element 0/1 mask into the row currently addressed by
    /// `line`. Panics if `mask.len() != HEAD_WIDTH`, which would indicate a
    /// bug upstream (the analyser is responsible for producing exactly
    /// `HEAD_WIDTH` bits before calling this).
    pub fn burn_line(&mut self, mask: &[u8]) {
        assert_eq!(mask.len(), HEAD_WIDTH, "burn mask must be HEAD_WIDTH bits");
        let row = &mut self.rows[self.line];
        for (pixel, &bit) in row.iter_mut().zip(mask.iter()) {
            *pixel |= bit & 1;
        }
    }

    /// A copy of every row except the in-progress last row, scaled from
    /// 0/1 to 0/255. Returns `None` if the buffer has at most one row (the
    /// stable prefix is still empty).
    pub fn get_image(&self) -> Option<Printout> {
        if self.rows.len() <= 1 {
            return None;
        }
        let stable = &self.rows[..self.rows.len() - 1];
        let rows = stable
            .iter()
            .map(|row| row.iter().map(|&b| if b != 0 { WHITE } else { 0 }).collect())
            .collect();
        Some(Printout::new(HEAD_WIDTH, rows).expect("rows all have HEAD_WIDTH width"))
    }

    /// Reduce the buffer to just the in-progress row and reset the cursor.
    /// Used to implement "take" semantics: the caller has already retrieved
    /// everything up to this point via [`PrintoutBuilder::get_image`].
    pub fn clear(&mut self) {
        let last = self.rows[self.rows.len() - 1];
        self.rows = vec![last];
        self.line = 0;
    }
}
