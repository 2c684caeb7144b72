//! Source location tracking.
//!
//! Every parse-tree and resolved-tree node carries a [`Range`]: 1-indexed
//! line/column coordinates, half-open at the end. A [`LineIndex`] converts
//! the lexer's byte offsets into these coordinates.

use serde::{Deserialize, Serialize};

/// A source region in 1-indexed line/column coordinates, end-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Default for Range {
    fn default() -> Self {
        Self {
            start_line: 1,
            start_column: 1,
            end_line: 1,
            end_column: 1,
        }
    }
}

impl Range {
    /// The region covering both `self` and `other`.
    pub fn merge(&self, other: &Range) -> Range {
        let start = if (self.start_line, self.start_column) <= (other.start_line, other.start_column)
        {
            (self.start_line, self.start_column)
        } else {
            (other.start_line, other.start_column)
        };
        let end = if (self.end_line, self.end_column) >= (other.end_line, other.end_column) {
            (self.end_line, self.end_column)
        } else {
            (other.end_line, other.end_column)
        };
        Range {
            start_line: start.0,
            start_column: start.1,
            end_line: end.0,
            end_column: end.1,
        }
    }
}

/// Merge a list of ranges into their covering region.
///
/// An empty list merges to the default (empty, position 1:1) range.
pub fn merge_ranges(ranges: &[Range]) -> Range {
    ranges
        .iter()
        .copied()
        .reduce(|merged, range| merged.merge(&range))
        .unwrap_or_default()
}

/// Byte-offset to line/column conversion for one source text.
///
/// Line starts are precomputed; columns are counted in characters so that
/// multi-byte UTF-8 literals report accurate positions.
pub struct LineIndex<'src> {
    source: &'src str,
    line_starts: Vec<usize>,
}

impl<'src> LineIndex<'src> {
    pub fn new(source: &'src str) -> Self {
        let mut line_starts = vec![0];
        for (offset, character) in source.char_indices() {
            if character == '\n' {
                line_starts.push(offset + 1);
            }
        }
        Self {
            source,
            line_starts,
        }
    }

    /// 1-indexed (line, column) of a byte offset.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        };
        let line_start = self.line_starts[line_index];
        let column = self.source[line_start..offset.min(self.source.len())]
            .chars()
            .count();
        (line_index as u32 + 1, column as u32 + 1)
    }

    /// The [`Range`] covering a byte span.
    pub fn range(&self, span: std::ops::Range<usize>) -> Range {
        let (start_line, start_column) = self.position(span.start);
        let (end_line, end_column) = self.position(span.end);
        Range {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// The range covering the entire source.
    pub fn full_range(&self) -> Range {
        self.range(0..self.source.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn range(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Range {
        Range {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    #[test]
    fn test_merge_single() {
        let single = range(2, 3, 2, 9);
        assert_eq!(merge_ranges(&[single]), single);
    }

    #[test]
    fn test_merge_takes_extremes() {
        let merged = merge_ranges(&[range(2, 5, 2, 9), range(1, 7, 3, 2), range(2, 1, 2, 4)]);
        assert_eq!(merged, range(1, 7, 3, 2));
    }

    #[test]
    fn test_merge_column_ordering_within_line() {
        let merged = merge_ranges(&[range(1, 8, 1, 9), range(1, 2, 1, 4)]);
        assert_eq!(merged, range(1, 2, 1, 9));
    }

    #[test]
    fn test_line_index_positions() {
        let index = LineIndex::new("ab\ncde\n");
        assert_eq!(index.position(0), (1, 1));
        assert_eq!(index.position(2), (1, 3));
        assert_eq!(index.position(3), (2, 1));
        assert_eq!(index.position(6), (2, 4));
        assert_eq!(index.position(7), (3, 1));
    }

    #[test]
    fn test_line_index_multibyte_columns() {
        // '日' is three bytes but one column.
        let source = "'日' x";
        let index = LineIndex::new(source);
        let x_offset = source.find('x').unwrap();
        assert_eq!(index.position(x_offset), (1, 5));
    }

    proptest! {
        #[test]
        fn prop_merge_is_order_independent(
            lines in proptest::collection::vec((1u32..10, 1u32..10, 1u32..10, 1u32..10), 1..6)
        ) {
            let ranges: Vec<Range> = lines
                .iter()
                .map(|(a, b, c, d)| range(*a, *b, a + c, *d))
                .collect();
            let mut reversed = ranges.clone();
            reversed.reverse();
            prop_assert_eq!(merge_ranges(&ranges), merge_ranges(&reversed));
        }
    }
}
