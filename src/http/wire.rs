//! Buffered, timeout-aware framing over a [`Transport`].
//!
//! Both the server session and the client connection read through a
//! `Wire`: it owns no state of its own, it borrows the socket and the
//! read-ahead buffer so leftover bytes survive between exchanges.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::HttpError;
use crate::net::transport::Transport;
use crate::resilience::timeouts::with_timeout;

const READ_CHUNK: usize = 8 * 1024;

pub(crate) struct Wire<'a> {
    io: &'a mut Transport,
    buf: &'a mut BytesMut,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl<'a> Wire<'a> {
    pub(crate) fn new(
        io: &'a mut Transport,
        buf: &'a mut BytesMut,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> Self {
        Self {
            io,
            buf,
            read_timeout,
            write_timeout,
        }
    }

    pub(crate) fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Reborrow with a shorter lifetime, e.g. to hand to a body reader.
    pub(crate) fn reborrow(&mut self) -> Wire<'_> {
        Wire {
            io: &mut *self.io,
            buf: &mut *self.buf,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }

    /// Read more bytes from the socket into the buffer. Returns 0 on EOF.
    pub(crate) async fn fill(&mut self) -> Result<usize, HttpError> {
        if self.buf.capacity() - self.buf.len() < READ_CHUNK {
            self.buf.reserve(READ_CHUNK);
        }
        let io = &mut *self.io;
        let buf = &mut *self.buf;
        with_timeout(self.read_timeout, "read", io.read_buf(buf)).await
    }

    /// Read a header section terminated by an empty line.
    ///
    /// Returns `Ok(None)` when the peer closed before sending anything,
    /// which is the normal end of a keep-alive connection. One stray empty
    /// line ahead of a message is skipped; a second one is returned as an
    /// empty head so the caller rejects it.
    pub(crate) async fn read_head(&mut self, max: usize) -> Result<Option<BytesMut>, HttpError> {
        let mut scan_from = 0;
        let mut skipped_blank = false;
        loop {
            if let Some(len) = leading_blank_line(&self.buf[..]) {
                if skipped_blank {
                    return Ok(Some(self.buf.split_to(len)));
                }
                let _ = self.buf.split_to(len);
                skipped_blank = true;
                scan_from = 0;
                continue;
            }
            if let Some(end) = head_end(&self.buf[scan_from..]) {
                return Ok(Some(self.buf.split_to(scan_from + end)));
            }
            if self.buf.len() > max {
                return Err(HttpError::parse("header section too large"));
            }
            // a terminator may straddle reads: keep "\n\r" in view
            scan_from = self.buf.len().saturating_sub(2);
            if self.fill().await? == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(HttpError::ConnectionClosed)
                };
            }
        }
    }

    /// Read one line, returning it without the trailing CRLF (or bare LF).
    pub(crate) async fn read_line(&mut self, max: usize) -> Result<BytesMut, HttpError> {
        loop {
            if let Some(pos) = memchr::memchr(b'\n', &self.buf[..]) {
                let mut line = self.buf.split_to(pos + 1);
                line.truncate(pos);
                if line.ends_with(b"\r") {
                    line.truncate(pos - 1);
                }
                return Ok(line);
            }
            if self.buf.len() > max {
                return Err(HttpError::parse("line too long"));
            }
            if self.fill().await? == 0 {
                return Err(HttpError::ConnectionClosed);
            }
        }
    }

    /// Deliver exactly `n` bytes to `on_data`, in pieces as they arrive.
    pub(crate) async fn read_exact_into<F>(&mut self, mut n: u64, on_data: &mut F) -> Result<(), HttpError>
    where
        F: FnMut(&[u8]) -> bool,
    {
        while n > 0 {
            if self.buf.is_empty() && self.fill().await? == 0 {
                return Err(HttpError::ConnectionClosed);
            }
            let take = (self.buf.len() as u64).min(n) as usize;
            let piece = self.buf.split_to(take);
            n -= take as u64;
            if !on_data(&piece) {
                return Err(HttpError::Canceled);
            }
        }
        Ok(())
    }

    /// Deliver everything until the peer closes, bounded by `max` bytes.
    pub(crate) async fn read_to_eof<F>(&mut self, max: u64, on_data: &mut F) -> Result<(), HttpError>
    where
        F: FnMut(&[u8]) -> bool,
    {
        let mut total = 0u64;
        loop {
            if !self.buf.is_empty() {
                total += self.buf.len() as u64;
                if total > max {
                    return Err(HttpError::PayloadTooLarge);
                }
                let piece = self.buf.split();
                if !on_data(&piece) {
                    return Err(HttpError::Canceled);
                }
            }
            if self.fill().await? == 0 {
                return Ok(());
            }
        }
    }

    pub(crate) async fn write_all(&mut self, data: &[u8]) -> Result<(), HttpError> {
        let io = &mut *self.io;
        with_timeout(self.write_timeout, "write", io.write_all(data)).await
    }

    pub(crate) async fn flush(&mut self) -> Result<(), HttpError> {
        let io = &mut *self.io;
        with_timeout(self.write_timeout, "write", io.flush()).await
    }
}

fn leading_blank_line(buf: &[u8]) -> Option<usize> {
    if buf.starts_with(b"\r\n") {
        Some(2)
    } else if buf.starts_with(b"\n") {
        Some(1)
    } else {
        None
    }
}

/// Offset just past the empty line ending a head, with CRLF or bare LF line endings.
fn head_end(buf: &[u8]) -> Option<usize> {
    memchr::memchr_iter(b'\n', buf).find_map(|i| match &buf[i + 1..] {
        [b'\n', ..] => Some(i + 2),
        [b'\r', b'\n', ..] => Some(i + 3),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::transport::BufferStream;

    #[tokio::test]
    async fn head_then_body_share_buffer() {
        let mut io = Transport::Buffer(BufferStream::new(
            b"\r\nGET / HTTP/1.1\r\nHost: x\r\n\r\nhello".to_vec(),
        ));
        let mut buf = BytesMut::new();
        let mut wire = Wire::new(&mut io, &mut buf, None, None);

        let head = wire.read_head(1024).await.unwrap().unwrap();
        assert!(head.starts_with(b"GET / HTTP/1.1"));
        assert!(head.ends_with(b"\r\n\r\n"));

        let mut body = Vec::new();
        wire.read_exact_into(5, &mut |d: &[u8]| {
            body.extend_from_slice(d);
            true
        })
        .await
        .unwrap();
        assert_eq!(body, b"hello");
        assert!(wire.read_head(1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_body_reports_closed() {
        let mut io = Transport::Buffer(BufferStream::new(b"abc".to_vec()));
        let mut buf = BytesMut::new();
        let mut wire = Wire::new(&mut io, &mut buf, None, None);
        let err = wire.read_exact_into(10, &mut |_: &[u8]| true).await.unwrap_err();
        assert!(matches!(err, HttpError::ConnectionClosed));
    }

    #[tokio::test]
    async fn oversized_head_is_rejected() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        raw.extend(std::iter::repeat(b'a').take(200));
        let mut io = Transport::Buffer(BufferStream::new(raw));
        let mut buf = BytesMut::new();
        let mut wire = Wire::new(&mut io, &mut buf, None, None);
        assert!(matches!(wire.read_head(64).await, Err(HttpError::Parse(_))));
    }

    #[tokio::test]
    async fn bare_lf_head_is_recognised() {
        let mut io = Transport::Buffer(BufferStream::new(b"GET / HTTP/1.1\nHost: x\n\nrest".to_vec()));
        let mut buf = BytesMut::new();
        let mut wire = Wire::new(&mut io, &mut buf, None, None);
        let head = wire.read_head(1024).await.unwrap().unwrap();
        assert_eq!(&head[..], b"GET / HTTP/1.1\nHost: x\n\n");
        assert_eq!(&buf[..], b"rest");
    }

    #[tokio::test]
    async fn second_blank_line_is_returned_as_empty_head() {
        let mut io = Transport::Buffer(BufferStream::new(b"\r\n\r\n".to_vec()));
        let mut buf = BytesMut::new();
        let mut wire = Wire::new(&mut io, &mut buf, None, None);
        let head = wire.read_head(1024).await.unwrap().unwrap();
        assert_eq!(&head[..], b"\r\n");
    }

    #[test]
    fn head_end_handles_mixed_line_endings() {
        assert_eq!(head_end(b"A\r\nB: c\r\n\r\nx"), Some(11));
        assert_eq!(head_end(b"A\nB: c\n\nx"), Some(8));
        assert_eq!(head_end(b"A\nB: c\n\r\nx"), Some(9));
        assert_eq!(head_end(b"A\r\nB: c\r\n"), None);
    }
}
