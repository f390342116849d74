//! HTTP Range header parsing
//!
//! Only single ranges are served. A header naming several ranges is
//! answered with its first one.

use super::StreamingError;

/// Inclusive byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Creates an inclusive range. `start` must not exceed `end`.
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; an inclusive range covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `start-end/total`, the value part of a `Content-Range` header.
    pub fn span(&self, total: u64) -> String {
        format!("{}-{}/{}", self.start, self.end, total)
    }

    /// Full `Content-Range` header value.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}", self.span(total))
    }
}

/// Parses a `Range` header against a resource of `length` bytes.
///
/// Returns `Ok(None)` when the header is malformed or not a byte range, in
/// which case the whole resource is served. Supports `a-b`, `a-` and the
/// suffix form `-n`; the end is clamped to the last byte.
///
/// # Errors
/// - `StreamingError::RangeUnsatisfiable` - The first range lies outside `[0, length)`
///
/// # Examples
/// ```
/// use magstream_core::streaming::parse_range_header;
///
/// let range = parse_range_header("bytes=0-99", 1000).unwrap().unwrap();
/// assert_eq!(range.len(), 100);
/// assert_eq!(range.span(1000), "0-99/1000");
/// ```
pub fn parse_range_header(header: &str, length: u64) -> Result<Option<ByteRange>, StreamingError> {
    let Some(specs) = header.trim().strip_prefix("bytes=") else {
        return Ok(None);
    };
    let Some(first) = specs.split(',').map(str::trim).next() else {
        return Ok(None);
    };
    let Some((start_str, end_str)) = first.split_once('-') else {
        return Ok(None);
    };
    let unsatisfiable = || StreamingError::RangeUnsatisfiable { length };

    let (start, end) = match (start_str.trim(), end_str.trim()) {
        ("", "") => return Ok(None),
        ("", suffix) => {
            let Ok(suffix_len) = suffix.parse::<u64>() else {
                return Ok(None);
            };
            if suffix_len == 0 || length == 0 {
                return Err(unsatisfiable());
            }
            (length.saturating_sub(suffix_len), length - 1)
        }
        (start, "") => {
            let Ok(start) = start.parse::<u64>() else {
                return Ok(None);
            };
            (start, length.saturating_sub(1))
        }
        (start, end) => {
            let (Ok(start), Ok(end)) = (start.parse::<u64>(), end.parse::<u64>()) else {
                return Ok(None);
            };
            (start, end.min(length.saturating_sub(1)))
        }
    };

    if start >= length || start > end {
        return Err(unsatisfiable());
    }

    Ok(Some(ByteRange::new(start, end)))
}
