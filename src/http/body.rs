//! Request bodies with single-read stream semantics.
//!
//! A [`Body`] is either an addressable [`Bytes`] buffer, which can be read
//! any number of times, or a one-shot [`AsyncRead`] stream handed over by the
//! host. Reading a stream drains it; the only way to read its content twice
//! is to buffer it first with [`Body::buffer`], which swaps the stream for
//! the buffered bytes in place.

use std::fmt;
use std::io::Cursor;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Errors produced while reading a request body.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("body stream was already consumed")]
    Consumed,

    #[error("failed to read body stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("body exceeds the buffering limit of {limit} bytes")]
    TooLarge { limit: usize },
}

type Stream = Box<dyn AsyncRead + Send + Sync + Unpin>;

enum Inner {
    Buffered(Bytes),
    Stream(Stream),
    Consumed,
}

/// An HTTP message body.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use postcache::http::Body;
///
/// let mut body = Body::from_reader(&b"payload"[..]);
/// let bytes = body.buffer(1024).await.unwrap();
/// assert_eq!(&bytes[..], b"payload");
///
/// // The stream was replaced by the buffer, so the body is still readable.
/// assert_eq!(body.as_bytes().map(|b| &b[..]), Some(&b"payload"[..]));
/// # }
/// ```
pub struct Body {
    inner: Inner,
}

impl Body {
    /// An empty, buffered body.
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// A buffered body over `bytes`.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            inner: Inner::Buffered(bytes.into()),
        }
    }

    /// A single-read body over an async byte stream.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        Self {
            inner: Inner::Stream(Box::new(reader)),
        }
    }

    /// Returns the buffered bytes, or `None` for an unread stream or a consumed body.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.inner {
            Inner::Buffered(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns `true` once the stream has been read by someone else.
    pub fn is_consumed(&self) -> bool {
        matches!(self.inner, Inner::Consumed)
    }

    /// Moves the body out, leaving this one consumed.
    pub fn take(&mut self) -> Body {
        Body {
            inner: std::mem::replace(&mut self.inner, Inner::Consumed),
        }
    }

    /// Reads the whole body into memory, keeping it readable afterwards.
    ///
    /// A stream is read at most `limit + 1` bytes deep. If it turns out to be
    /// larger than `limit`, the prefix already read is put back in front of
    /// the unread remainder so the body can still be forwarded untouched.
    ///
    /// # Errors
    ///
    /// - [`BodyError::Consumed`] — the stream was taken before this call.
    /// - [`BodyError::Io`] — the stream failed mid-read; the body is left consumed.
    /// - [`BodyError::TooLarge`] — more than `limit` bytes.
    pub async fn buffer(&mut self, limit: usize) -> Result<Bytes, BodyError> {
        let mut stream = match std::mem::replace(&mut self.inner, Inner::Consumed) {
            Inner::Buffered(bytes) => {
                let len = bytes.len();
                self.inner = Inner::Buffered(bytes.clone());
                if len > limit {
                    return Err(BodyError::TooLarge { limit });
                }
                return Ok(bytes);
            }
            Inner::Stream(stream) => stream,
            Inner::Consumed => return Err(BodyError::Consumed),
        };

        let mut buf = Vec::new();
        let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
        (&mut stream).take(cap).read_to_end(&mut buf).await?;

        if buf.len() > limit {
            self.inner = Inner::Stream(Box::new(Cursor::new(buf).chain(stream)));
            return Err(BodyError::TooLarge { limit });
        }

        let bytes = Bytes::from(buf);
        self.inner = Inner::Buffered(bytes.clone());
        Ok(bytes)
    }

    /// Consumes the body and returns its full content.
    ///
    /// # Errors
    ///
    /// [`BodyError::Consumed`] or [`BodyError::Io`], as for [`buffer`](Self::buffer).
    pub async fn into_bytes(mut self) -> Result<Bytes, BodyError> {
        self.buffer(usize::MAX).await
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Self::from_bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::from_bytes(s)
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Self::from_bytes(v)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::Buffered(bytes) => f.debug_tuple("Body::Buffered").field(&bytes.len()).finish(),
            Inner::Stream(_) => f.write_str("Body::Stream"),
            Inner::Consumed => f.write_str("Body::Consumed"),
        }
    }
}
