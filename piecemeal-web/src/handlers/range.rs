//! HTTP Range request handling for file streaming
//!
//! Implements the single-range subset of RFC 7233 needed by media players,
//! with Content-Range headers for partial responses.

use std::ops::Range;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;

/// Byte range resolved against a known file size, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Shortens the range to at most `max_len` bytes from its start.
    pub fn clamp(self, max_len: u64) -> Self {
        Self {
            start: self.start,
            end: self.end.min(self.start.saturating_add(max_len.max(1))),
        }
    }

    pub fn as_range(&self) -> Range<u64> {
        self.start..self.end
    }
}

/// Range header that cannot be served for the file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsatisfiable {
    pub total_size: u64,
}

/// Parse HTTP Range header against `total_size`.
///
/// Handles `bytes=start-end`, `bytes=start-` and `bytes=-suffix`. Only the
/// first range of a multi-range header is honored. Headers that do not parse
/// are ignored and yield `Ok(None)`, which means the whole file.
///
/// # Errors
/// Returns `Unsatisfiable` if the range starts at or past the file end
///
/// # Examples
/// ```
/// use piecemeal_web::handlers::range::{ByteRange, parse_range_header};
/// let range = parse_range_header("bytes=100-199", 1000).unwrap();
/// assert_eq!(range, Some(ByteRange { start: 100, end: 200 }));
/// ```
pub fn parse_range_header(range: &str, total_size: u64) -> Result<Option<ByteRange>, Unsatisfiable> {
    let Some(range_spec) = range.trim().strip_prefix("bytes=") else {
        return Ok(None);
    };
    let first = range_spec.split(',').next().unwrap_or_default().trim();
    let Some((start_str, end_str)) = first.split_once('-') else {
        return Ok(None);
    };
    let unsatisfiable = Unsatisfiable { total_size };

    if start_str.is_empty() {
        let Ok(suffix) = end_str.parse::<u64>() else {
            return Ok(None);
        };
        if suffix == 0 || total_size == 0 {
            return Err(unsatisfiable);
        }
        return Ok(Some(ByteRange {
            start: total_size.saturating_sub(suffix),
            end: total_size,
        }));
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return Ok(None);
    };
    let end = if end_str.is_empty() {
        total_size
    } else {
        match end_str.parse::<u64>() {
            Ok(last) if last >= start => last.saturating_add(1).min(total_size),
            _ => return Ok(None),
        }
    };

    if start >= total_size {
        return Err(unsatisfiable);
    }
    Ok(Some(ByteRange { start, end }))
}

/// Extract Range header from HTTP headers
///
/// Returns None if no range header present or if it is not valid UTF-8.
pub fn extract_range_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::RANGE)
        .and_then(|range| range.to_str().ok())
}

/// Build a 206 response carrying `data` for `range` of a `total_size` file.
///
/// # Errors
/// Returns StatusCode error if response building fails
pub fn build_partial_response(
    data: Bytes,
    content_type: &str,
    range: ByteRange,
    total_size: u64,
) -> Result<Response<Body>, StatusCode> {
    let last = range.start + data.len().saturating_sub(1) as u64;
    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, data.len().to_string())
        .header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", range.start, last, total_size),
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(data))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Build a 200 response for a whole file.
///
/// # Errors
/// Returns StatusCode error if response building fails
pub fn build_full_response(data: Bytes, content_type: &str) -> Result<Response<Body>, StatusCode> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, data.len().to_string())
        .body(Body::from(data))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Build a 416 response naming the file size.
///
/// # Errors
/// Returns StatusCode error if response building fails
pub fn build_unsatisfiable_response(total_size: u64) -> Result<Response<Body>, StatusCode> {
    Response::builder()
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(header::CONTENT_RANGE, format!("bytes */{total_size}"))
        .body(Body::empty())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u64, end: u64) -> Option<ByteRange> {
        Some(ByteRange { start, end })
    }

    #[test]
    fn test_parse_range_header_valid() {
        assert_eq!(parse_range_header("bytes=100-199", 1000), Ok(range(100, 200)));
    }

    #[test]
    fn test_parse_range_header_open_end() {
        assert_eq!(parse_range_header("bytes=500-", 1000), Ok(range(500, 1000)));
    }

    #[test]
    fn test_parse_range_header_suffix() {
        assert_eq!(parse_range_header("bytes=-100", 1000), Ok(range(900, 1000)));
        assert_eq!(parse_range_header("bytes=-5000", 1000), Ok(range(0, 1000)));
    }

    #[test]
    fn test_parse_range_header_end_past_file() {
        assert_eq!(parse_range_header("bytes=900-5000", 1000), Ok(range(900, 1000)));
    }

    #[test]
    fn test_parse_range_header_invalid_is_ignored() {
        assert_eq!(parse_range_header("invalid", 1000), Ok(None));
        assert_eq!(parse_range_header("bytes=abc-def", 1000), Ok(None));
        assert_eq!(parse_range_header("bytes=500-100", 1000), Ok(None));
    }

    #[test]
    fn test_parse_range_header_first_of_many() {
        assert_eq!(
            parse_range_header("bytes=0-9, 20-29", 1000),
            Ok(range(0, 10))
        );
    }

    #[test]
    fn test_parse_range_header_unsatisfiable() {
        let expected = Err(Unsatisfiable { total_size: 1000 });
        assert_eq!(parse_range_header("bytes=1000-", 1000), expected);
        assert_eq!(parse_range_header("bytes=-0", 1000), expected);
        assert_eq!(
            parse_range_header("bytes=0-", 0),
            Err(Unsatisfiable { total_size: 0 })
        );
    }

    #[test]
    fn test_clamp_limits_length() {
        let clamped = ByteRange { start: 10, end: 1000 }.clamp(64);
        assert_eq!(clamped, ByteRange { start: 10, end: 74 });
        assert_eq!(clamped.len(), 64);

        let short = ByteRange { start: 10, end: 20 }.clamp(64);
        assert_eq!(short.as_range(), 10..20);
    }

    #[test]
    fn test_partial_response_headers() {
        let response = build_partial_response(
            Bytes::from_static(b"abcd"),
            "video/mp4",
            ByteRange { start: 4, end: 8 },
            100,
        )
        .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 4-7/100");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "4");
    }

    #[test]
    fn test_unsatisfiable_response_names_size() {
        let response = build_unsatisfiable_response(42).unwrap();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */42");
    }
}
