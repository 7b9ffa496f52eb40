//! Source location tracking for diagnostics.
//!
//! Provides [`Span`], a half-open byte range into a source file. Byte offsets
//! are what the analyzer stamps onto instructions and diagnostics; line and
//! column numbers are derived on demand with [`Span::line_col`].

use std::fmt;

/// A half-open byte range `start..end` into one source file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Byte offset of the first byte.
    pub start: u32,
    /// Byte offset one past the last byte.
    pub end: u32,
}

impl Span {
    /// Create a new span from a start and end offset.
    #[inline]
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Create a zero-length span at an offset.
    #[inline]
    pub fn point(offset: u32) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// Whether this span is empty (zero length).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The length of this span in bytes.
    #[inline]
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Smallest span covering both `self` and `other`.
    #[inline]
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// The bytes of `source` covered by this span.
    ///
    /// Out-of-range spans are clamped to the end of `source`.
    pub fn slice<'s>(&self, source: &'s str) -> &'s [u8] {
        let bytes = source.as_bytes();
        let end = (self.end as usize).min(bytes.len());
        let start = (self.start as usize).min(end);
        &bytes[start..end]
    }

    /// 1-indexed line and column of `start` within `source`.
    pub fn line_col(&self, source: &str) -> (u32, u32) {
        let mut line = 1;
        let mut col = 1;
        for &b in self.slice_prefix(source) {
            if b == b'\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    fn slice_prefix<'s>(&self, source: &'s str) -> &'s [u8] {
        let bytes = source.as_bytes();
        &bytes[..(self.start as usize).min(bytes.len())]
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let span = Span::new(5, 15);
        assert_eq!(span.len(), 10);
        assert!(!span.is_empty());

        let empty = Span::point(5);
        assert!(empty.is_empty());
    }

    #[test]
    fn span_display() {
        let span = Span::new(3, 8);
        assert_eq!(format!("{}", span), "3..8");
    }

    #[test]
    fn span_merge_disjoint() {
        let merged = Span::new(10, 13).merge(Span::new(2, 4));
        assert_eq!(merged, Span::new(2, 13));
    }

    #[test]
    fn span_merge_with_point_span() {
        let merged = Span::new(5, 15).merge(Span::point(8));
        assert_eq!(merged, Span::new(5, 15));
    }

    #[test]
    fn span_slice_clamps() {
        let src = "const a = 1;";
        assert_eq!(Span::new(6, 7).slice(src), b"a");
        assert_eq!(Span::new(10, 99).slice(src), b"1;");
    }

    #[test]
    fn span_line_col() {
        let src = "const a = 1;\nconst b = 2;\n";
        assert_eq!(Span::point(0).line_col(src), (1, 1));
        assert_eq!(Span::point(19).line_col(src), (2, 7));
    }
}
