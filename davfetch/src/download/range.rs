//! Byte ranges and the range planner.
//!
//! A [`RangePlan`] decomposes `[resume_offset, total_size)` into consecutive,
//! non-overlapping inclusive ranges of at most `chunk_size` bytes. Ranges are
//! produced lazily and in strictly increasing offset order.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// An inclusive byte interval `[start, end]` of a remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Creates a range; `end` must not be below `start`.
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(end >= start, "range end {} below start {}", end, start);
        Self { start, end }
    }

    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A range always covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Offset one past the last byte.
    pub fn end_exclusive(&self) -> u64 {
        self.end + 1
    }

    /// Value for the HTTP `Range` request header.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Computes the range starting at `offset`, or `None` once `total` is reached.
pub fn range_at(offset: u64, total: u64, chunk_size: u64) -> Option<ByteRange> {
    if offset >= total {
        return None;
    }
    let chunk = chunk_size.max(1);
    let end = offset.saturating_add(chunk - 1).min(total - 1);
    Some(ByteRange::new(offset, end))
}

/// Lazily produced sequence of ranges covering `[resume_offset, total_size)`.
///
/// A plan is exhausted once every range has been claimed. It cannot be
/// rewound; resuming means creating a new plan with a new offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePlan {
    next_offset: u64,
    total_size: u64,
    chunk_size: u64,
}

impl RangePlan {
    /// Creates a plan. A zero chunk size is treated as one byte.
    pub fn new(resume_offset: u64, total_size: u64, chunk_size: u64) -> Self {
        Self {
            next_offset: resume_offset,
            total_size,
            chunk_size: chunk_size.max(1),
        }
    }

    /// First offset not yet claimed.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Total object size.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Maximum bytes per range.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Bytes not yet claimed.
    pub fn remaining(&self) -> u64 {
        self.total_size.saturating_sub(self.next_offset)
    }

    /// Whether every range has been claimed.
    pub fn is_exhausted(&self) -> bool {
        self.next_offset >= self.total_size
    }

    /// Marks every remaining range as claimed.
    pub fn exhaust(&mut self) {
        self.next_offset = self.next_offset.max(self.total_size);
    }
}

impl Iterator for RangePlan {
    type Item = ByteRange;

    fn next(&mut self) -> Option<ByteRange> {
        let range = range_at(self.next_offset, self.total_size, self.chunk_size)?;
        self.next_offset = range.end_exclusive();
        Some(range)
    }
}

/// Parsed `Content-Range` response header (`bytes start-end/total`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// Range carried by the response.
    pub range: ByteRange,
    /// Complete object length, when the server reports it.
    pub total: Option<u64>,
}

fn content_range_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*bytes\s+(\d+)-(\d+)/(\d+|\*)\s*$").expect("content-range regex is valid")
    })
}

impl ContentRange {
    /// Parses a header value; returns `None` for anything malformed.
    pub fn parse(value: &str) -> Option<Self> {
        let caps = content_range_regex().captures(value)?;
        let start: u64 = caps[1].parse().ok()?;
        let end: u64 = caps[2].parse().ok()?;
        if end < start {
            return None;
        }
        let total = match &caps[3] {
            "*" => None,
            digits => Some(digits.parse().ok()?),
        };
        Some(Self {
            range: ByteRange::new(start, end),
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_object() {
        let ranges: Vec<_> = RangePlan::new(0, 1_000_000, 1_000_000).collect();
        assert_eq!(ranges, vec![ByteRange::new(0, 999_999)]);
    }

    #[test]
    fn test_last_range_is_clipped() {
        let ranges: Vec<_> = RangePlan::new(0, 10, 4).collect();
        assert_eq!(
            ranges,
            vec![
                ByteRange::new(0, 3),
                ByteRange::new(4, 7),
                ByteRange::new(8, 9)
            ]
        );
    }

    #[test]
    fn test_plan_starts_at_resume_offset() {
        let mut plan = RangePlan::new(6, 10, 4);
        assert_eq!(plan.remaining(), 4);
        assert_eq!(plan.next(), Some(ByteRange::new(6, 9)));
        assert!(plan.is_exhausted());
        assert_eq!(plan.next(), None);
    }

    #[test]
    fn test_resume_at_or_past_end_is_empty() {
        assert_eq!(RangePlan::new(10, 10, 4).count(), 0);
        assert_eq!(RangePlan::new(11, 10, 4).count(), 0);
        assert_eq!(RangePlan::new(0, 0, 4).count(), 0);
    }

    #[test]
    fn test_zero_chunk_size_treated_as_one() {
        let plan = RangePlan::new(0, 3, 0);
        assert_eq!(plan.chunk_size(), 1);
        assert_eq!(plan.count(), 3);
    }

    #[test]
    fn test_exhaust_stops_plan() {
        let mut plan = RangePlan::new(0, 100, 10);
        plan.next();
        plan.exhaust();
        assert!(plan.is_exhausted());
        assert_eq!(plan.next(), None);
    }

    #[test]
    fn test_header_value() {
        assert_eq!(ByteRange::new(0, 0).header_value(), "bytes=0-0");
        assert_eq!(
            ByteRange::new(1_048_576, 2_097_151).header_value(),
            "bytes=1048576-2097151"
        );
        assert_eq!(ByteRange::new(5, 9).len(), 5);
    }

    #[test]
    fn test_content_range_parse() {
        let parsed = ContentRange::parse("bytes 0-0/5368709120").unwrap();
        assert_eq!(parsed.range, ByteRange::new(0, 0));
        assert_eq!(parsed.total, Some(5_368_709_120));

        let unknown = ContentRange::parse("bytes 10-19/*").unwrap();
        assert_eq!(unknown.total, None);
    }

    #[test]
    fn test_content_range_rejects_garbage() {
        assert!(ContentRange::parse("bytes */100").is_none());
        assert!(ContentRange::parse("items 0-1/2").is_none());
        assert!(ContentRange::parse("bytes 9-1/20").is_none());
        assert!(ContentRange::parse("").is_none());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_plan_covers_without_gaps_or_overlap(
                total in 0u64..5_000_000,
                chunk in 1u64..300_000,
                resume_fraction in 0.0..1.0_f64,
            ) {
                let resume = (total as f64 * resume_fraction) as u64;
                let mut expected_next = resume;
                for range in RangePlan::new(resume, total, chunk) {
                    prop_assert_eq!(range.start, expected_next, "gap or overlap at {}", range);
                    prop_assert!(range.len() <= chunk);
                    prop_assert!(range.end < total);
                    expected_next = range.end_exclusive();
                }
                prop_assert_eq!(expected_next, total.max(resume));
            }
        }
    }
}
