//! Header translation at the HTTP/1.x compatibility boundary.
//!
//! The engine's header blocks carry pseudo-headers; the compatibility
//! layer speaks a conventional request-line/status-line representation.
//! Translation is bidirectional and governed by one exclusion list:
//! connection-management headers never cross the boundary in either
//! direction. Cookie entries merge into a single semicolon-joined line on
//! the way out and split back into distinct entries on the way in.

use crate::error::{Error, Result};
use crate::headers::{
    is_pseudo, HeaderBlock, PSEUDO_AUTHORITY, PSEUDO_METHOD, PSEUDO_PATH, PSEUDO_SCHEME,
    PSEUDO_STATUS,
};

/// Extension header carrying the originating stream id.
///
/// Exists only at the compatibility boundary, never on the wire.
pub const EXT_STREAM_ID: &str = "x-muxed-stream-id";

/// Headers that never cross the boundary in either direction
const EXCLUDED_HEADERS: [&str; 5] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

/// HTTP/1.x-style request representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http1Request {
    /// Request method
    pub method: String,
    /// Request target path
    pub path: String,
    /// Scheme, when known
    pub scheme: Option<String>,
    /// Regular headers (no pseudo-headers)
    pub headers: HeaderBlock,
}

/// HTTP/1.x-style response representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http1Response {
    /// Status code
    pub status: u16,
    /// Regular headers (no pseudo-headers)
    pub headers: HeaderBlock,
}

/// Bidirectional header translator
pub struct HeaderTranslator;

impl HeaderTranslator {
    /// Translate an engine request header block into HTTP/1.x form.
    ///
    /// `:authority` becomes a `host` header; cookie entries merge into a
    /// single line; excluded headers are dropped.
    pub fn request_to_http1(block: &HeaderBlock) -> Result<Http1Request> {
        block.validate()?;

        let method = block
            .get(PSEUDO_METHOD)
            .ok_or_else(|| Error::Translation("Missing :method pseudo-header".to_string()))?
            .to_string();
        let path = block
            .get(PSEUDO_PATH)
            .ok_or_else(|| Error::Translation("Missing :path pseudo-header".to_string()))?
            .to_string();
        let scheme = block.get(PSEUDO_SCHEME).map(str::to_string);

        let mut headers = HeaderBlock::new();
        if let Some(authority) = block.get(PSEUDO_AUTHORITY) {
            headers.insert("host", authority);
        }
        Self::copy_regular(block, &mut headers, true)?;

        Ok(Http1Request {
            method,
            path,
            scheme,
            headers,
        })
    }

    /// Translate an HTTP/1.x-style request into an engine header block.
    ///
    /// `host` becomes `:authority`; a single cookie line splits into
    /// distinct entries; excluded headers and boundary-only extension
    /// headers are dropped.
    pub fn request_from_http1(request: &Http1Request) -> Result<HeaderBlock> {
        let mut block = HeaderBlock::new();
        block.insert(PSEUDO_METHOD, request.method.as_str());
        block.insert(PSEUDO_PATH, request.path.as_str());
        if let Some(scheme) = &request.scheme {
            block.insert(PSEUDO_SCHEME, scheme.as_str());
        }
        if let Some(host) = request.headers.get("host") {
            block.insert(PSEUDO_AUTHORITY, host);
        }
        Self::copy_regular_from_http1(&request.headers, &mut block)?;

        block.validate()?;
        Ok(block)
    }

    /// Translate an engine response header block into HTTP/1.x form
    pub fn response_to_http1(block: &HeaderBlock) -> Result<Http1Response> {
        block.validate()?;

        let status = block
            .get(PSEUDO_STATUS)
            .ok_or_else(|| Error::Translation("Missing :status pseudo-header".to_string()))?
            .parse::<u16>()
            .map_err(|_| Error::Translation("Malformed :status value".to_string()))?;

        let mut headers = HeaderBlock::new();
        Self::copy_regular(block, &mut headers, true)?;

        Ok(Http1Response { status, headers })
    }

    /// Translate an HTTP/1.x-style response into an engine header block
    pub fn response_from_http1(response: &Http1Response) -> Result<HeaderBlock> {
        let mut block = HeaderBlock::new();
        block.insert(PSEUDO_STATUS, response.status.to_string());
        Self::copy_regular_from_http1(&response.headers, &mut block)?;

        block.validate()?;
        Ok(block)
    }

    /// Copy regular headers engine -> HTTP/1.x, merging cookies
    fn copy_regular(
        from: &HeaderBlock,
        into: &mut HeaderBlock,
        merge_cookies: bool,
    ) -> Result<()> {
        let mut cookies: Vec<&str> = Vec::new();

        for (name, value) in from.iter() {
            if is_pseudo(name) || Self::is_excluded(name) {
                continue;
            }
            let lower = name.to_ascii_lowercase();
            match lower.as_str() {
                "cookie" if merge_cookies => cookies.push(value),
                "te" => {
                    // Only the literal "trailers" survives translation
                    if value.eq_ignore_ascii_case("trailers") {
                        into.insert("te", "trailers");
                    }
                }
                _ => into.insert(lower, value),
            }
        }

        if !cookies.is_empty() {
            into.insert("cookie", cookies.join("; "));
        }

        Ok(())
    }

    /// Copy regular headers HTTP/1.x -> engine, splitting cookies
    fn copy_regular_from_http1(from: &HeaderBlock, into: &mut HeaderBlock) -> Result<()> {
        for (name, value) in from.iter() {
            if Self::is_excluded(name) || name.eq_ignore_ascii_case("host") {
                continue;
            }
            if is_pseudo(name) {
                return Err(Error::Translation(format!(
                    "Pseudo-header {} in HTTP/1.x headers",
                    name
                )));
            }
            let lower = name.to_ascii_lowercase();
            match lower.as_str() {
                "cookie" => {
                    for pair in value.split("; ").filter(|p| !p.is_empty()) {
                        into.insert("cookie", pair);
                    }
                }
                "te" => {
                    if value.eq_ignore_ascii_case("trailers") {
                        into.insert("te", "trailers");
                    }
                }
                _ => into.insert(lower, value),
            }
        }
        Ok(())
    }

    /// Whether a header never crosses the compatibility boundary
    fn is_excluded(name: &str) -> bool {
        EXCLUDED_HEADERS
            .iter()
            .any(|excluded| name.eq_ignore_ascii_case(excluded))
            || name.eq_ignore_ascii_case(EXT_STREAM_ID)
    }

    /// Attach the originating stream id for the compatibility layer
    pub fn tag_stream_id(headers: &mut HeaderBlock, stream_id: u32) {
        headers.insert(EXT_STREAM_ID, stream_id.to_string());
    }

    /// Read and remove the originating stream id, if present
    pub fn take_stream_id(headers: &mut HeaderBlock) -> Option<u32> {
        let id = headers.get(EXT_STREAM_ID)?.parse().ok();
        headers.remove(EXT_STREAM_ID);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_block() -> HeaderBlock {
        let mut block = HeaderBlock::new();
        block.insert(":method", "GET");
        block.insert(":path", "/x");
        block.insert(":scheme", "https");
        block.insert(":authority", "h");
        block.insert("cookie", "a=1");
        block.insert("cookie", "b=2");
        block
    }

    #[test]
    fn test_request_round_trip() {
        let block = request_block();

        let http1 = HeaderTranslator::request_to_http1(&block).unwrap();
        assert_eq!(http1.method, "GET");
        assert_eq!(http1.path, "/x");
        assert_eq!(http1.scheme.as_deref(), Some("https"));
        assert_eq!(http1.headers.get("host"), Some("h"));
        // Cookies merged into one semicolon-joined line
        assert_eq!(http1.headers.get_all("cookie"), vec!["a=1; b=2"]);

        let back = HeaderTranslator::request_from_http1(&http1).unwrap();
        assert_eq!(back.get(":method"), Some("GET"));
        assert_eq!(back.get(":path"), Some("/x"));
        assert_eq!(back.get(":scheme"), Some("https"));
        assert_eq!(back.get(":authority"), Some("h"));
        // Cookie splitting is lossless in pair count
        assert_eq!(back.get_all("cookie"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_non_cookie_order_preserved() {
        let mut block = request_block();
        block.insert("accept", "*/*");
        block.insert("x-first", "1");
        block.insert("x-second", "2");

        let http1 = HeaderTranslator::request_to_http1(&block).unwrap();
        let names: Vec<_> = http1
            .headers
            .iter()
            .map(|(n, _)| n)
            .filter(|n| n.starts_with("x-") || *n == "accept")
            .collect();
        assert_eq!(names, vec!["accept", "x-first", "x-second"]);
    }

    #[test]
    fn test_connection_headers_never_cross() {
        let mut block = request_block();
        block.insert("connection", "keep-alive");
        block.insert("keep-alive", "timeout=5");
        block.insert("transfer-encoding", "chunked");
        block.insert("upgrade", "websocket");

        let http1 = HeaderTranslator::request_to_http1(&block).unwrap();
        assert!(!http1.headers.contains("connection"));
        assert!(!http1.headers.contains("keep-alive"));
        assert!(!http1.headers.contains("transfer-encoding"));
        assert!(!http1.headers.contains("upgrade"));

        let mut req = Http1Request {
            method: "GET".into(),
            path: "/".into(),
            scheme: None,
            headers: HeaderBlock::new(),
        };
        req.headers.insert("Proxy-Connection", "keep-alive");
        let block = HeaderTranslator::request_from_http1(&req).unwrap();
        assert!(!block.contains("proxy-connection"));
    }

    #[test]
    fn test_te_only_trailers_survives() {
        let mut block = request_block();
        block.insert("te", "trailers");
        let http1 = HeaderTranslator::request_to_http1(&block).unwrap();
        assert_eq!(http1.headers.get("te"), Some("trailers"));

        let mut block = request_block();
        block.insert("te", "gzip");
        let http1 = HeaderTranslator::request_to_http1(&block).unwrap();
        assert!(!http1.headers.contains("te"));
    }

    #[test]
    fn test_missing_method_fails() {
        let mut block = HeaderBlock::new();
        block.insert(":path", "/");
        let err = HeaderTranslator::request_to_http1(&block).unwrap_err();
        assert!(matches!(err, Error::Translation(_)));
    }

    #[test]
    fn test_response_round_trip() {
        let mut block = HeaderBlock::new();
        block.insert(":status", "204");
        block.insert("server", "h2mux");

        let http1 = HeaderTranslator::response_to_http1(&block).unwrap();
        assert_eq!(http1.status, 204);
        assert_eq!(http1.headers.get("server"), Some("h2mux"));

        let back = HeaderTranslator::response_from_http1(&http1).unwrap();
        assert_eq!(back.get(":status"), Some("204"));
    }

    #[test]
    fn test_bad_status_fails() {
        let mut block = HeaderBlock::new();
        block.insert(":status", "two hundred");
        let err = HeaderTranslator::response_to_http1(&block).unwrap_err();
        assert!(matches!(err, Error::Translation(_)));
    }

    #[test]
    fn test_stream_id_extension_is_boundary_only() {
        let mut headers = HeaderBlock::new();
        HeaderTranslator::tag_stream_id(&mut headers, 7);
        assert_eq!(headers.get(EXT_STREAM_ID), Some("7"));

        // The extension never survives translation toward the wire
        let req = Http1Request {
            method: "GET".into(),
            path: "/".into(),
            scheme: None,
            headers,
        };
        let block = HeaderTranslator::request_from_http1(&req).unwrap();
        assert!(!block.contains(EXT_STREAM_ID));

        let mut headers = HeaderBlock::new();
        HeaderTranslator::tag_stream_id(&mut headers, 9);
        assert_eq!(HeaderTranslator::take_stream_id(&mut headers), Some(9));
        assert!(headers.is_empty());
    }
}
