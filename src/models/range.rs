//! Byte ranges requested through the HTTP `Range` header.

use thiserror::Error;

/// Why a `Range` header could not be turned into a window of an object.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("malformed range header")]
    Malformed,
    #[error("multiple ranges are not supported")]
    MultipleRanges,
    #[error("range lies outside the object")]
    Unsatisfiable,
}

/// Inclusive byte window `[start, end]` of an object.
///
/// Values produced by [`ByteRange::parse`] always satisfy
/// `start <= end < size` for the size they were parsed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Resolve a `Range` header against an object of `size` bytes.
    ///
    /// Accepts `bytes=start-end`, the open form `bytes=start-` and the
    /// suffix form `bytes=-count`. An `end` past the object is clamped to
    /// the last byte; a `start` past the object is unsatisfiable.
    pub fn parse(header: &str, size: u64) -> Result<Self, RangeError> {
        let (unit, spec) = header.trim().split_once('=').ok_or(RangeError::Malformed)?;
        if !unit.trim().eq_ignore_ascii_case("bytes") {
            return Err(RangeError::Malformed);
        }
        if spec.contains(',') {
            return Err(RangeError::MultipleRanges);
        }
        let (first, last) = spec.split_once('-').ok_or(RangeError::Malformed)?;
        let (first, last) = (first.trim(), last.trim());

        if first.is_empty() {
            let count = parse_offset(last)?;
            if count == 0 || size == 0 {
                return Err(RangeError::Unsatisfiable);
            }
            return Ok(Self::new(size.saturating_sub(count), size - 1));
        }

        let start = parse_offset(first)?;
        let requested_end = if last.is_empty() {
            None
        } else {
            Some(parse_offset(last)?)
        };

        if start >= size {
            return Err(RangeError::Unsatisfiable);
        }
        let end = match requested_end {
            Some(end) if end < start => return Err(RangeError::Unsatisfiable),
            Some(end) => end.min(size - 1),
            None => size - 1,
        };
        Ok(Self::new(start, end))
    }

    /// Number of bytes in the window.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for this window of an object of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }

    /// `Range` request header value selecting exactly this window.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

fn parse_offset(raw: &str) -> Result<u64, RangeError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Malformed);
    }
    raw.parse().map_err(|_| RangeError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_range() {
        let range = ByteRange::parse("bytes=2-5", 10).unwrap();
        assert_eq!(range, ByteRange::new(2, 5));
        assert_eq!(range.len(), 4);
        assert_eq!(range.content_range(10), "bytes 2-5/10");
    }

    #[test]
    fn open_ended_range_runs_to_last_byte() {
        let range = ByteRange::parse("bytes=5-", 10).unwrap();
        assert_eq!(range, ByteRange::new(5, 9));
        assert_eq!(range.len(), 5);
        assert_eq!(range.content_range(10), "bytes 5-9/10");
    }

    #[test]
    fn end_past_object_is_clamped() {
        let range = ByteRange::parse("bytes=8-1000", 10).unwrap();
        assert_eq!(range, ByteRange::new(8, 9));
    }

    #[test]
    fn suffix_range_selects_tail() {
        assert_eq!(ByteRange::parse("bytes=-3", 10).unwrap(), ByteRange::new(7, 9));
        assert_eq!(ByteRange::parse("bytes=-50", 10).unwrap(), ByteRange::new(0, 9));
    }

    #[test]
    fn single_byte_ranges() {
        assert_eq!(ByteRange::parse("bytes=0-0", 10).unwrap().len(), 1);
        assert_eq!(ByteRange::parse("bytes=9-9", 10).unwrap().len(), 1);
        assert_eq!(ByteRange::parse("bytes=0-1", 2).unwrap().len(), 2);
    }

    #[test]
    fn unsatisfiable_windows() {
        assert_eq!(ByteRange::parse("bytes=10-", 10), Err(RangeError::Unsatisfiable));
        assert_eq!(ByteRange::parse("bytes=12-20", 10), Err(RangeError::Unsatisfiable));
        assert_eq!(ByteRange::parse("bytes=5-2", 10), Err(RangeError::Unsatisfiable));
        assert_eq!(ByteRange::parse("bytes=0-", 0), Err(RangeError::Unsatisfiable));
        assert_eq!(ByteRange::parse("bytes=-0", 10), Err(RangeError::Unsatisfiable));
    }

    #[test]
    fn malformed_headers() {
        assert_eq!(ByteRange::parse("", 10), Err(RangeError::Malformed));
        assert_eq!(ByteRange::parse("bytes=", 10), Err(RangeError::Malformed));
        assert_eq!(ByteRange::parse("bytes=abc-4", 10), Err(RangeError::Malformed));
        assert_eq!(ByteRange::parse("bytes=+1-4", 10), Err(RangeError::Malformed));
        assert_eq!(ByteRange::parse("items=0-4", 10), Err(RangeError::Malformed));
        assert_eq!(ByteRange::parse("bytes=4", 10), Err(RangeError::Malformed));
        assert_eq!(
            ByteRange::parse("bytes=0-1,4-5", 10),
            Err(RangeError::MultipleRanges)
        );
    }

    #[test]
    fn every_valid_window_round_trips() {
        let size = 16;
        for start in 0..size {
            for end in start..size {
                let header = ByteRange::new(start, end).header_value();
                let range = ByteRange::parse(&header, size).unwrap();
                assert_eq!(range, ByteRange::new(start, end));
                assert_eq!(range.len(), end - start + 1);
            }
        }
    }
}
