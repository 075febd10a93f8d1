//! Span-backed HTTP request model.
//!
//! A request owns no memory: URL, headers and body all live in
//! application-provided buffers and are mutated in place. Headers are stored
//! as packed length-prefixed `(name, value)` records inside the headers
//! buffer, which is what lets the retry policy restore the header region to a
//! recorded byte offset between attempts without touching the base headers.

use azlite_core::context::Context;
use azlite_core::error::{Error, Result};
use azlite_core::span::{self, SpanWriter, url_encoded_len};

/// An HTTP method verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpMethod(&'static str);

impl HttpMethod {
    /// `GET`
    pub const GET: HttpMethod = HttpMethod("GET");
    /// `HEAD`
    pub const HEAD: HttpMethod = HttpMethod("HEAD");
    /// `POST`
    pub const POST: HttpMethod = HttpMethod("POST");
    /// `PUT`
    pub const PUT: HttpMethod = HttpMethod("PUT");
    /// `DELETE`
    pub const DELETE: HttpMethod = HttpMethod("DELETE");
    /// `PATCH`
    pub const PATCH: HttpMethod = HttpMethod("PATCH");

    /// Parses a verb, accepting only the methods the pipeline supports.
    pub fn parse(verb: &str) -> Result<HttpMethod> {
        match verb {
            "GET" => Ok(Self::GET),
            "HEAD" => Ok(Self::HEAD),
            "POST" => Ok(Self::POST),
            "PUT" => Ok(Self::PUT),
            "DELETE" => Ok(Self::DELETE),
            "PATCH" => Ok(Self::PATCH),
            _ => Err(Error::HttpInvalidMethodVerb),
        }
    }

    /// The verb as a string.
    pub fn as_str(self) -> &'static str {
        self.0
    }
}

/// Byte length of one header record with the given name/value sizes.
const fn record_len(name_len: usize, value_len: usize) -> usize {
    4 + name_len + value_len
}

/// Snapshot of the header region, used to roll appended headers back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadersMark {
    len: usize,
    count: usize,
}

/// A mutable HTTP request over caller-owned buffers.
#[derive(Debug)]
pub struct HttpRequest<'a> {
    context: &'a Context<'a>,
    method: HttpMethod,
    url: SpanWriter<'a>,
    query_start: Option<usize>,
    headers: SpanWriter<'a>,
    headers_count: usize,
    retry_headers_start: HeadersMark,
    body: &'a [u8],
}

impl<'a> HttpRequest<'a> {
    /// Initializes a request. `initial_url` is copied into `url_buffer`; the
    /// headers buffer starts empty.
    pub fn new(
        context: &'a Context<'a>,
        method: HttpMethod,
        url_buffer: &'a mut [u8],
        initial_url: &[u8],
        headers_buffer: &'a mut [u8],
        body: &'a [u8],
    ) -> Result<Self> {
        let mut url = SpanWriter::new(url_buffer);
        url.copy_from(initial_url)?;
        let query_start = span::find(initial_url, b"?");
        Ok(Self {
            context,
            method,
            url,
            query_start,
            headers: SpanWriter::new(headers_buffer),
            headers_count: 0,
            retry_headers_start: HeadersMark { len: 0, count: 0 },
            body,
        })
    }

    /// The cancellation context this request runs under.
    pub fn context(&self) -> &'a Context<'a> {
        self.context
    }

    /// The request method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// The current URL, including any appended query parameters.
    pub fn url(&self) -> &[u8] {
        self.url.as_bytes()
    }

    /// The request body.
    pub fn body(&self) -> &[u8] {
        self.body
    }

    /// Appends `?name=value` (or `&name=value` if a query string already
    /// exists), URL-encoding both name and value. All-or-nothing on
    /// overflow.
    pub fn set_query_parameter(&mut self, name: &[u8], value: &[u8]) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArg);
        }
        let required = 1 + url_encoded_len(name) + 1 + url_encoded_len(value);
        if required > self.url.remaining() {
            return Err(Error::InsufficientSpanSize);
        }
        let separator = if self.query_start.is_some() { b'&' } else { b'?' };
        if self.query_start.is_none() {
            self.query_start = Some(self.url.len());
        }
        self.url.push_byte(separator)?;
        self.url.url_encode(name)?;
        self.url.push_byte(b'=')?;
        self.url.url_encode(value)?;
        Ok(())
    }

    /// Appends one `(name, value)` header record.
    pub fn append_header(&mut self, name: &[u8], value: &[u8]) -> Result<()> {
        if name.is_empty() || name.len() > usize::from(u16::MAX) || value.len() > usize::from(u16::MAX)
        {
            return Err(Error::InvalidArg);
        }
        if record_len(name.len(), value.len()) > self.headers.remaining() {
            return Err(Error::InsufficientSpanSize);
        }
        self.headers
            .copy_from(&(name.len() as u16).to_le_bytes())?;
        self.headers
            .copy_from(&(value.len() as u16).to_le_bytes())?;
        self.headers.copy_from(name)?;
        self.headers.copy_from(value)?;
        self.headers_count += 1;
        Ok(())
    }

    /// Number of appended headers.
    pub fn headers_count(&self) -> usize {
        self.headers_count
    }

    /// Returns the header at `index` in append order.
    pub fn header_at(&self, index: usize) -> Result<(&[u8], &[u8])> {
        if index >= self.headers_count {
            return Err(Error::ItemNotFound);
        }
        let bytes = self.headers.as_bytes();
        let mut offset = 0;
        for _ in 0..index {
            let (name_len, value_len) = read_record_header(bytes, offset);
            offset += record_len(name_len, value_len);
        }
        let (name_len, value_len) = read_record_header(bytes, offset);
        let name_start = offset + 4;
        let value_start = name_start + name_len;
        Ok((
            &bytes[name_start..value_start],
            &bytes[value_start..value_start + value_len],
        ))
    }

    /// Snapshot of the header region for later rollback.
    pub fn headers_watermark(&self) -> HeadersMark {
        HeadersMark {
            len: self.headers.len(),
            count: self.headers_count,
        }
    }

    /// Rolls the header region back to a previously taken watermark.
    pub fn truncate_headers(&mut self, mark: HeadersMark) {
        self.headers.truncate(mark.len);
        self.headers_count = mark.count;
    }

    /// Records the boundary between base headers and per-attempt headers.
    /// The retry policy calls this once before the first attempt.
    pub fn mark_retry_headers_start(&mut self) {
        self.retry_headers_start = self.headers_watermark();
    }

    /// Drops every header appended after
    /// [`mark_retry_headers_start`](Self::mark_retry_headers_start),
    /// preserving the base headers byte-for-byte.
    pub fn remove_retry_headers(&mut self) {
        let mark = self.retry_headers_start;
        self.truncate_headers(mark);
    }

    /// Raw bytes of the header region (packed records).
    pub fn headers_bytes(&self) -> &[u8] {
        self.headers.as_bytes()
    }
}

fn read_record_header(bytes: &[u8], offset: usize) -> (usize, usize) {
    let name_len = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]) as usize;
    let value_len = u16::from_le_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;
    (name_len, value_len)
}
