//! Source code span utilities.
//!
//! Spans are half-open byte ranges into a single script's text. Line and
//! column information is derived on demand from the text itself.

/// A half-open byte range `[start, end)` within a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Span {
        Span { start, end }
    }

    /// Construct an empty span at the given position.
    pub fn empty(pos: u32) -> Span {
        Span {
            start: pos,
            end: pos,
        }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns a span covering both `self` and `other`.
    pub fn join(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Convert a byte offset to a 1-based `(line, column)` pair.
///
/// Offsets past the end of `text` clamp to the position just after the
/// last character, which is where "unexpected end of input" errors point.
pub fn line_col(text: &str, offset: u32) -> (u32, u32) {
    let offset = (offset as usize).min(text.len());
    let mut line = 1;
    let mut column = 1;
    for (index, ch) in text.char_indices() {
        if index >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_line_and_column() {
        let text = "int x = 1;\nx + y";
        assert_eq!(line_col(text, 0), (1, 1));
        assert_eq!(line_col(text, 4), (1, 5));
        assert_eq!(line_col(text, 11), (2, 1));
        assert_eq!(line_col(text, 15), (2, 5));
    }

    #[test]
    fn clamps_offsets_past_the_end() {
        assert_eq!(line_col("int x = ", 100), (1, 9));
    }

    #[test]
    fn joins_spans() {
        let joined = Span::new(4, 6).join(Span::new(1, 2));
        assert_eq!(joined, Span::new(1, 6));
        assert_eq!(joined.len(), 5);
        assert!(Span::empty(3).is_empty());
    }
}
