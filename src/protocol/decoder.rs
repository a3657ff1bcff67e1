//! Pull-based RESP decoder.
//!
//! [`Decoder`] turns any [`BufRead`] into a finite sequence of [`Payload`]s.
//! Lines that are too short, lack a CRLF terminator, or start with an unknown
//! type byte are skipped, as are overlong lines that carry no length or
//! integer. The first error ends the sequence: after a failed
//! length-prefixed read the stream position can no longer be trusted.

use crate::error::{Error, Result};
use crate::protocol::Reply;
use bytes::Bytes;
use memchr::memchr;
use std::io::{self, BufRead, Read};
use std::iter::FusedIterator;
use tracing::debug;

/// A decoded reply, or the error that terminated decoding
pub type Payload = Result<Reply>;

/// Largest accepted bulk string payload
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Largest accepted element count for an array header
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// Largest accepted `$`, `*` or `:` line, CRLF included
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Initial buffer for a bulk body; grows only as bytes arrive
const BULK_CHUNK: usize = 8 * 1024;

/// Upper bound on elements preallocated from an array header
const ARRAY_PREALLOC: i64 = 1024;

pub struct Decoder<R> {
    reader: R,
    line: Vec<u8>,
    done: bool,
}

impl<R: BufRead> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(128),
            done: false,
        }
    }

    /// Whether the sequence has ended
    pub fn is_terminated(&self) -> bool {
        self.done
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    fn next_payload(&mut self) -> Payload {
        loop {
            if !self.read_line()? {
                debug!("skipping overlong line");
                continue;
            }

            let len = self.line.len();
            if len <= 2 || self.line[len - 2] != b'\r' {
                debug!("skipping malformed line ({} bytes)", len);
                continue;
            }

            let header = &self.line[1..len - 2];
            match self.line[0] {
                b'+' => return Ok(Reply::SimpleString(lossy(header))),
                b'-' => return Ok(Reply::Error(lossy(header))),
                b':' => {
                    return parse_i64(header)
                        .map(Reply::Integer)
                        .ok_or_else(|| Error::InvalidInteger(lossy(header)));
                }
                b'$' => {
                    let n = parse_i64(header)
                        .ok_or_else(|| Error::InvalidBulkLength(lossy(header)))?;
                    return self.read_bulk(n).map(Reply::BulkString);
                }
                b'*' => {
                    let n = parse_i64(header)
                        .ok_or_else(|| Error::InvalidArrayLength(lossy(header)))?;
                    return self.read_array(n);
                }
                other => {
                    debug!("skipping line with unknown type byte {:?}", other as char);
                    continue;
                }
            }
        }
    }

    /// Read `n` sub-lines, each expected to be a bulk string header.
    ///
    /// A sub-line that is not a `$` header is dropped and does not count toward
    /// `n`; reading continues until `n` elements have been collected.
    fn read_array(&mut self, n: i64) -> Payload {
        if n <= 0 {
            return Ok(Reply::empty_array());
        }
        if n > MAX_ARRAY_LEN {
            return Err(Error::InvalidArrayLength(n.to_string()));
        }

        let mut items = Vec::with_capacity(n.min(ARRAY_PREALLOC) as usize);
        while (items.len() as i64) < n {
            if !self.read_line()? {
                debug!("skipping overlong array element line");
                continue;
            }

            let len = self.line.len();
            if len < 4 || self.line[len - 2] != b'\r' || self.line[0] != b'$' {
                debug!("skipping malformed array element ({} bytes)", len);
                continue;
            }

            let header = &self.line[1..len - 2];
            let size =
                parse_i64(header).ok_or_else(|| Error::InvalidBulkLength(lossy(header)))?;
            items.push(self.read_bulk(size)?);
        }

        Ok(Reply::Array(Some(items)))
    }

    /// Read a bulk payload of `n` bytes plus its CRLF.
    ///
    /// A negative length is the null bulk string and has no body. The buffer
    /// grows with the bytes actually received, so a header alone costs nothing.
    fn read_bulk(&mut self, n: i64) -> Result<Option<Bytes>> {
        if n < 0 {
            return Ok(None);
        }
        if n > MAX_BULK_LEN {
            return Err(Error::BulkTooLarge(n));
        }

        let n = n as usize;
        let mut body = Vec::with_capacity((n + 2).min(BULK_CHUNK));
        (&mut self.reader).take(n as u64 + 2).read_to_end(&mut body)?;
        if body.len() < n + 2 {
            return Err(Error::ConnectionClosed);
        }
        if &body[n..] != b"\r\n" {
            return Err(Error::MissingCrlf);
        }

        body.truncate(n);
        Ok(Some(Bytes::from(body)))
    }

    /// Read up to and including the next `\n` into `self.line`.
    ///
    /// Returns `false` if the line ran past [`MAX_LINE_LEN`] and was discarded.
    /// An overlong `$`, `*` or `:` line is an error instead.
    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let mut discarding = false;
        loop {
            let available = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            // End of stream, including a dangling partial line.
            if available.is_empty() {
                return Err(Error::ConnectionClosed);
            }

            let (consumed, complete) = match memchr(b'\n', available) {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };
            if !discarding {
                self.line.extend_from_slice(&available[..consumed]);
            }
            self.reader.consume(consumed);

            if !discarding && self.line.len() > MAX_LINE_LEN {
                if matches!(self.line[0], b'$' | b'*' | b':') {
                    return Err(Error::LineTooLong(MAX_LINE_LEN));
                }
                discarding = true;
                self.line.clear();
            }
            if complete {
                return Ok(!discarding);
            }
        }
    }
}

impl<R: BufRead> Iterator for Decoder<R> {
    type Item = Payload;

    fn next(&mut self) -> Option<Payload> {
        if self.done {
            return None;
        }

        let payload = self.next_payload();
        if payload.is_err() {
            self.done = true;
        }
        Some(payload)
    }
}

impl<R: BufRead> FusedIterator for Decoder<R> {}

#[inline]
fn parse_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

#[inline]
fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
