//! Span-backed HTTP response model.
//!
//! [`HttpResponse`] is the write side: a caller-owned buffer the transport
//! fills through [`HttpResponse::append`]. [`ResponseParser`] is the read
//! side: a forward-only cursor that consumes the status line, then the
//! headers one by one, then hands out the body. The split keeps the
//! transport's exclusive write borrow and the policies' read borrows from
//! fighting over one object.

use azlite_core::error::{Error, Result};

/// A transport-filled response buffer.
#[derive(Debug)]
pub struct HttpResponse<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> HttpResponse<'a> {
    /// Wraps an empty caller-owned buffer.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Appends raw wire bytes. Fails with
    /// [`Error::InsufficientSpanSize`] when `src` does not fit; nothing is
    /// written in that case.
    pub fn append(&mut self, src: &[u8]) -> Result<()> {
        if src.len() > self.buf.len() - self.len {
            return Err(Error::InsufficientSpanSize);
        }
        self.buf[self.len..self.len + src.len()].copy_from_slice(src);
        self.len += src.len();
        Ok(())
    }

    /// Discards buffered bytes, readying the buffer for a retry attempt.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// The bytes received so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// True when nothing was received.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Parsed HTTP status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine<'r> {
    /// HTTP major version digit.
    pub major_version: u8,
    /// HTTP minor version digit.
    pub minor_version: u8,
    /// Three-digit status code.
    pub status_code: u16,
    /// Reason phrase (HTAB / SP / VCHAR / obs-text, up to CR).
    pub reason_phrase: &'r [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    StatusLine,
    Headers,
    Body,
}

/// Forward-only parser over a received response.
#[derive(Debug)]
pub struct ResponseParser<'r> {
    bytes: &'r [u8],
    read: usize,
    phase: Phase,
}

impl<'r> ResponseParser<'r> {
    /// Starts parsing at the status line.
    pub fn new(response: &'r HttpResponse<'_>) -> Self {
        Self::from_bytes(response.as_bytes())
    }

    /// Starts parsing over raw bytes (tests, transports).
    pub fn from_bytes(bytes: &'r [u8]) -> Self {
        Self {
            bytes,
            read: 0,
            phase: Phase::StatusLine,
        }
    }

    /// Consumes `HTTP/<digit>.<digit> SP <3-digit> SP <reason> CRLF` and
    /// advances to the headers.
    pub fn status_line(&mut self) -> Result<StatusLine<'r>> {
        if self.phase != Phase::StatusLine {
            return Err(Error::HttpInvalidState);
        }
        self.expect(b"HTTP/")?;
        let major_version = self.digit()?;
        self.expect(b".")?;
        let minor_version = self.digit()?;
        self.expect(b" ")?;
        let status_code =
            u16::from(self.digit()?) * 100 + u16::from(self.digit()?) * 10 + u16::from(self.digit()?);
        self.expect(b" ")?;

        let reason_start = self.read;
        loop {
            let byte = *self.bytes.get(self.read).ok_or(Error::UnexpectedEnd)?;
            match byte {
                b'\r' => break,
                // HTAB, SP, VCHAR and obs-text are legal reason bytes.
                b'\t' | b' ' | 0x21..=0x7E | 0x80..=0xFF => self.read += 1,
                _ => return Err(Error::UnexpectedChar),
            }
        }
        let reason_phrase = &self.bytes[reason_start..self.read];
        self.expect(b"\r\n")?;
        self.phase = Phase::Headers;
        Ok(StatusLine {
            major_version,
            minor_version,
            status_code,
            reason_phrase,
        })
    }

    /// Consumes one `name: OWS value OWS CRLF` header line. Returns
    /// [`Error::HttpEndOfHeaders`] at the blank line terminating the block
    /// and [`Error::HttpCorruptResponseHeader`] on malformed bytes.
    pub fn next_header(&mut self) -> Result<(&'r [u8], &'r [u8])> {
        match self.phase {
            Phase::Headers => {}
            Phase::Body => return Err(Error::HttpEndOfHeaders),
            Phase::StatusLine => return Err(Error::HttpInvalidState),
        }

        if self.peek() == Some(b'\r') {
            self.expect(b"\r\n").map_err(|_| Error::HttpCorruptResponseHeader)?;
            self.phase = Phase::Body;
            return Err(Error::HttpEndOfHeaders);
        }

        let name_start = self.read;
        loop {
            match self.peek() {
                Some(b':') => break,
                Some(byte) if is_token_byte(byte) => self.read += 1,
                Some(_) => return Err(Error::HttpCorruptResponseHeader),
                None => return Err(Error::UnexpectedEnd),
            }
        }
        if self.read == name_start {
            return Err(Error::HttpCorruptResponseHeader);
        }
        let name = &self.bytes[name_start..self.read];
        self.read += 1; // ':'
        while self.peek() == Some(b' ') || self.peek() == Some(b'\t') {
            self.read += 1;
        }

        let value_start = self.read;
        let mut value_end = self.read;
        loop {
            let byte = self.peek().ok_or(Error::UnexpectedEnd)?;
            match byte {
                b'\r' => break,
                b' ' | b'\t' => self.read += 1,
                0x21..=0x7E | 0x80..=0xFF => {
                    self.read += 1;
                    value_end = self.read;
                }
                _ => return Err(Error::HttpCorruptResponseHeader),
            }
        }
        let value = &self.bytes[value_start..value_end];
        self.expect(b"\r\n")?;
        Ok((name, value))
    }

    /// The remainder of the buffer from the current offset. Usually called
    /// after the header iterator returned
    /// [`Error::HttpEndOfHeaders`].
    pub fn body(&self) -> &'r [u8] {
        &self.bytes[self.read..]
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.read).copied()
    }

    fn expect(&mut self, literal: &[u8]) -> Result<()> {
        let end = self.read + literal.len();
        if end > self.bytes.len() {
            return Err(Error::UnexpectedEnd);
        }
        if &self.bytes[self.read..end] != literal {
            return Err(Error::UnexpectedChar);
        }
        self.read = end;
        Ok(())
    }

    fn digit(&mut self) -> Result<u8> {
        let byte = self.peek().ok_or(Error::UnexpectedEnd)?;
        if !byte.is_ascii_digit() {
            return Err(Error::UnexpectedChar);
        }
        self.read += 1;
        Ok(byte - b'0')
    }
}

fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte)
}

/// Convenience: the status code of a filled response, if parseable.
pub fn status_code_of(response: &HttpResponse<'_>) -> Result<u16> {
    ResponseParser::new(response)
        .status_line()
        .map(|line| line.status_code)
}
