//! Inbound requests: construction, HTTP/1.1 parsing via [`httparse`], and
//! body buffering.

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use url::Url;

use super::{Body, BodyError, Headers, Method};

/// Errors that can occur while building or parsing a request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("malformed chunked body")]
    InvalidChunk,
}

/// An inbound HTTP request as handed over by the host.
///
/// The URL is absolute (scheme and host included) because cache keys are
/// scoped to the origin that serves them.
///
/// # Examples
///
/// ```
/// use postcache::http::{Method, Request};
///
/// let request = Request::new(Method::Post, "https://example.com/graphql?op=list")
///     .unwrap()
///     .header("Content-Type", "application/json")
///     .with_body(r#"{"query":"{ items }"}"#);
///
/// assert_eq!(request.path(), "/graphql");
/// assert_eq!(request.query_param("op").as_deref(), Some("list"));
/// assert_eq!(request.headers().get("content-type"), Some("application/json"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Body,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Creates a request with an empty body.
    ///
    /// # Errors
    ///
    /// [`RequestError::InvalidUrl`] if `url` is not an absolute URL.
    pub fn new(method: Method, url: &str) -> Result<Self, RequestError> {
        Ok(Self {
            method,
            url: Url::parse(url)?,
            version: 1,
            headers: Headers::new(),
            body: Body::empty(),
        })
    }

    /// Shorthand for `Request::new(Method::Get, url)`.
    pub fn get(url: &str) -> Result<Self, RequestError> {
        Self::new(Method::Get, url)
    }

    /// Shorthand for `Request::new(Method::Post, url)`.
    pub fn post(url: &str) -> Result<Self, RequestError> {
        Self::new(Method::Post, url)
    }

    /// Parses a raw HTTP/1.1 request from a byte slice.
    ///
    /// The absolute URL is rebuilt from `scheme`, the `Host` header, and the
    /// request target. A `Transfer-Encoding: chunked` body is decoded and the
    /// request is re-framed with a `Content-Length`. Otherwise, when
    /// `Content-Length` is present the body is exactly that many bytes, and
    /// without it the body is everything after the header block.
    ///
    /// Returns the request and the offset at which the body begins.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — headers or declared body not fully received.
    /// - [`RequestError::Parse`] — malformed request or `Content-Length`.
    /// - [`RequestError::InvalidChunk`] — malformed chunked framing.
    /// - [`RequestError::MissingField`] — method, path, version, or `Host` absent.
    /// - [`RequestError::InvalidUrl`] — `Host` and target do not form a URL.
    pub fn parse(buf: &[u8], scheme: &str) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = match raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse()
        {
            Ok(m) => m,
            Err(never) => match never {},
        };

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let host = header_map
            .get("host")
            .ok_or(RequestError::MissingField { field: "host" })?;
        let url = Url::parse(&format!("{scheme}://{host}{target}"))?;

        let rest = &buf[body_offset..];
        let body = if is_chunked(&header_map) {
            let decoded = decode_chunked(rest)?;
            header_map.remove("transfer-encoding");
            header_map.set("Content-Length", decoded.len().to_string());
            decoded
        } else {
            match declared_length(&header_map)? {
                Some(len) if rest.len() < len => return Err(RequestError::Incomplete),
                Some(len) => Bytes::copy_from_slice(&rest[..len]),
                None => Bytes::copy_from_slice(rest),
            }
        };

        Ok((
            Self {
                method,
                url,
                version,
                headers: header_map,
                body: Body::from_bytes(body),
            },
            body_offset,
        ))
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the full request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.url.query()
    }

    /// Returns the first decoded value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Moves the body out, leaving the request with a consumed body.
    pub fn take_body(&mut self) -> Body {
        self.body.take()
    }

    /// Buffers the body in place and returns the bytes. See [`Body::buffer`].
    ///
    /// # Errors
    ///
    /// Any [`BodyError`] from the underlying body.
    pub async fn buffer_body(&mut self, limit: usize) -> Result<Bytes, BodyError> {
        self.body.buffer(limit).await
    }

    /// Returns `true` if the connection should be kept alive after this request.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }
}

/// `Content-Length` as declared by the sender. An unparsable value is an error.
fn declared_length(headers: &Headers) -> Result<Option<usize>, RequestError> {
    headers
        .get("content-length")
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| RequestError::Parse(httparse::Error::HeaderValue))
        })
        .transpose()
}

/// `true` when `chunked` is the final transfer coding.
fn is_chunked(headers: &Headers) -> bool {
    headers
        .get_all("transfer-encoding")
        .flat_map(|v| v.split(','))
        .last()
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

/// Decodes a complete chunked body. Chunk extensions and trailers are discarded.
fn decode_chunked(mut rest: &[u8]) -> Result<Bytes, RequestError> {
    let mut body = BytesMut::new();
    loop {
        let (offset, size) = match httparse::parse_chunk_size(rest) {
            Ok(httparse::Status::Complete(parsed)) => parsed,
            Ok(httparse::Status::Partial) => return Err(RequestError::Incomplete),
            Err(_) => return Err(RequestError::InvalidChunk),
        };
        rest = &rest[offset..];
        if size == 0 {
            break;
        }

        let size = usize::try_from(size).map_err(|_| RequestError::InvalidChunk)?;
        let end = size.checked_add(2).ok_or(RequestError::InvalidChunk)?;
        if rest.len() < end {
            return Err(RequestError::Incomplete);
        }
        if &rest[size..end] != b"\r\n" {
            return Err(RequestError::InvalidChunk);
        }
        body.extend_from_slice(&rest[..size]);
        rest = &rest[end..];
    }

    // Trailer section: either an empty line or trailer fields ending in one.
    if !rest.starts_with(b"\r\n") && !rest.windows(4).any(|w| w == b"\r\n\r\n") {
        return Err(RequestError::Incomplete);
    }
    Ok(body.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw, "http").unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.url().as_str(), "http://localhost/");
        assert_eq!(req.version(), 1);
        assert_eq!(offset, raw.len());
    }

    #[test]
    fn parse_post_with_body_and_query() {
        let raw = b"POST /api?page=2 HTTP/1.1\r\nHost: example.com:8443\r\nContent-Length: 15\r\n\r\n{\"data\":\"test\"}";
        let (req, _) = Request::parse(raw, "https").unwrap();
        assert_eq!(req.url().as_str(), "https://example.com:8443/api?page=2");
        assert_eq!(req.query_param("page").as_deref(), Some("2"));
        assert_eq!(
            req.body().as_bytes().map(|b| &b[..]),
            Some(&b"{\"data\":\"test\"}"[..])
        );
    }

    #[test]
    fn parse_short_body_is_incomplete() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 10\r\n\r\nabc";
        assert!(matches!(
            Request::parse(raw, "http"),
            Err(RequestError::Incomplete)
        ));
    }

    #[test]
    fn parse_requires_host() {
        let raw = b"GET / HTTP/1.1\r\nAccept: */*\r\n\r\n";
        assert!(matches!(
            Request::parse(raw, "http"),
            Err(RequestError::MissingField { field: "host" })
        ));
    }

    #[test]
    fn incomplete_headers() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(
            Request::parse(raw, "http"),
            Err(RequestError::Incomplete)
        ));
    }

    #[test]
    fn unparsable_content_length_is_rejected() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: abc\r\n\r\nhello";
        assert!(matches!(
            Request::parse(raw, "http"),
            Err(RequestError::Parse(httparse::Error::HeaderValue))
        ));
    }

    #[test]
    fn chunked_body_is_decoded_regardless_of_chunking() {
        let one = b"POST /api HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n\
                    b\r\nhello world\r\n0\r\n\r\n";
        let two = b"POST /api HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n\
                    5;ext=1\r\nhello\r\n6\r\n world\r\n0\r\nX-Trailer: t\r\n\r\n";

        let (a, _) = Request::parse(one, "http").unwrap();
        let (b, _) = Request::parse(two, "http").unwrap();
        assert_eq!(a.body().as_bytes().unwrap().as_ref(), b"hello world");
        assert_eq!(a.body().as_bytes(), b.body().as_bytes());
        assert!(!a.headers().contains("transfer-encoding"));
        assert_eq!(a.headers().get("content-length"), Some("11"));
    }

    #[test]
    fn truncated_chunked_body_is_incomplete() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\na\r\nhel";
        assert!(matches!(
            Request::parse(raw, "http"),
            Err(RequestError::Incomplete)
        ));
    }

    #[test]
    fn bad_chunk_framing_is_rejected() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n\
                    zz\r\nhello\r\n0\r\n\r\n";
        assert!(matches!(
            Request::parse(raw, "http"),
            Err(RequestError::InvalidChunk)
        ));
    }

    #[test]
    fn relative_url_is_rejected() {
        assert!(matches!(
            Request::get("/relative"),
            Err(RequestError::InvalidUrl(_))
        ));
    }

    #[test]
    fn connection_close() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
        let (req, _) = Request::parse(raw, "http").unwrap();
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn take_body_leaves_consumed() {
        let mut req = Request::post("https://example.com/").unwrap().with_body("x");
        let body = req.take_body();
        assert!(req.body().is_consumed());
        assert!(body.as_bytes().is_some());
    }
}
