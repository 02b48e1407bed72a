//! Body streaming in both directions.
//!
//! # Responsibilities
//! - Outbound: drive pull-style content providers into the socket, honoring
//!   backpressure through [`DataSink::is_writable`]
//! - Inbound: push body bytes to receivers for length-delimited, chunked and
//!   read-until-close framing
//! - Incremental `multipart/form-data` parsing and serialization
//!
//! # Data Flow
//! ```text
//! Outbound:
//!     provider(offset, len, sink) → sink buffer → [not writable?] → flush → socket
//!
//! Inbound:
//!     socket → Wire buffer → framing (length | chunked | eof) → receiver(bytes)
//!                                                           ↘ MultipartParser → events
//! ```
//!
//! # Design Decisions
//! - Providers are synchronous: they fill a buffering sink and the engine
//!   awaits the socket between calls, so a slow peer suspends the provider
//!   instead of blocking a thread
//! - A receiver returning `false` cancels the transfer

use memchr::memmem;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::HttpError;
use crate::http::codec::{self, BodyFraming};
use crate::http::types::StatusCode;
use crate::http::wire::Wire;

/// Buffered bytes at which a sink stops reporting itself writable.
pub const SINK_HIGH_WATER: usize = 64 * 1024;

const MAX_CHUNK_LINE: usize = 4 * 1024;
const MAX_PART_HEADER: usize = 16 * 1024;

/// Produces a sized body: called with the next offset and the number of
/// bytes still owed. Returning `false` aborts the response.
pub type ContentProvider = Box<dyn FnMut(u64, u64, &mut DataSink) -> bool + Send + Sync>;

/// Produces a chunked body of unknown length: called with the running
/// offset until it calls [`DataSink::done`]. Returning `false` aborts.
pub type ChunkedContentProvider = Box<dyn FnMut(u64, &mut DataSink) -> bool + Send + Sync>;

/// Receives body bytes as they arrive. Returning `false` cancels the read.
pub type ContentReceiver = Box<dyn FnMut(&[u8]) -> bool + Send + Sync>;

/// Reports `(received, total)` while a body downloads; `false` cancels.
pub type Progress = Box<dyn FnMut(u64, u64) -> bool + Send + Sync>;

/// A body-producing callable attached to a request or response.
pub enum Content {
    Sized {
        offset: u64,
        length: u64,
        provider: ContentProvider,
    },
    Chunked(ChunkedContentProvider),
}

impl std::fmt::Debug for Content {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Content::Sized { offset, length, .. } => f
                .debug_struct("Sized")
                .field("offset", offset)
                .field("length", length)
                .finish_non_exhaustive(),
            Content::Chunked(_) => f.write_str("Chunked"),
        }
    }
}

/// Destination handed to content providers.
#[derive(Debug)]
pub struct DataSink {
    buf: Vec<u8>,
    high_water: usize,
    written: u64,
    budget: Option<u64>,
    done: bool,
    failed: bool,
}

impl DataSink {
    pub(crate) fn new(high_water: usize) -> Self {
        Self {
            buf: Vec::new(),
            high_water,
            written: 0,
            budget: None,
            done: false,
            failed: false,
        }
    }

    fn with_budget(high_water: usize, budget: u64) -> Self {
        Self {
            budget: Some(budget),
            ..Self::new(high_water)
        }
    }

    /// Queue bytes for the peer. Returns `false` once the connection failed.
    ///
    /// Bytes beyond a sized body's declared length are dropped.
    pub fn write(&mut self, data: &[u8]) -> bool {
        if self.failed {
            return false;
        }
        let allowed = match self.budget {
            Some(budget) => (budget - self.written).min(data.len() as u64) as usize,
            None => data.len(),
        };
        self.buf.extend_from_slice(&data[..allowed]);
        self.written += allowed as u64;
        true
    }

    /// Mark the body complete.
    pub fn done(&mut self) {
        self.done = true;
    }

    /// False while the engine still has too much buffered for this peer, or
    /// after the connection failed.
    pub fn is_writable(&self) -> bool {
        !self.failed && self.buf.len() < self.high_water
    }

    /// Total bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    async fn flush_to(&mut self, wire: &mut Wire<'_>) -> Result<(), HttpError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let pending = self.take();
        if let Err(e) = wire.write_all(&pending).await {
            self.failed = true;
            return Err(e);
        }
        Ok(())
    }
}

/// Stream `length` bytes starting at `offset` from a sized provider.
pub(crate) async fn write_sized(
    wire: &mut Wire<'_>,
    provider: &mut ContentProvider,
    offset: u64,
    length: u64,
) -> Result<(), HttpError> {
    let mut sink = DataSink::with_budget(SINK_HIGH_WATER, length);
    while sink.written() < length {
        if !sink.is_writable() {
            sink.flush_to(wire).await?;
        }
        let before = sink.written();
        if !provider(offset + before, length - before, &mut sink) {
            return Err(HttpError::Canceled);
        }
        if sink.written() == before {
            if sink.is_done() {
                return Err(HttpError::parse("content provider ended before declared length"));
            }
            // nothing ready yet; let the provider's producer make progress
            sink.flush_to(wire).await?;
            tokio::task::yield_now().await;
        }
    }
    sink.flush_to(wire).await
}

/// Stream a chunked provider, one chunk per provider call, then the
/// terminating zero-length chunk.
pub(crate) async fn write_chunked(wire: &mut Wire<'_>, provider: &mut ChunkedContentProvider) -> Result<(), HttpError> {
    let mut sink = DataSink::new(SINK_HIGH_WATER);
    let mut offset = 0u64;
    loop {
        if !provider(offset, &mut sink) {
            return Err(HttpError::Canceled);
        }
        let data = sink.take();
        if !data.is_empty() {
            offset += data.len() as u64;
            if let Err(e) = wire.write_all(&codec::frame_chunk(&data)).await {
                sink.failed = true;
                return Err(e);
            }
        }
        if sink.is_done() {
            return wire.write_all(codec::LAST_CHUNK).await;
        }
        if data.is_empty() {
            tokio::task::yield_now().await;
        }
    }
}

/// Deliver an inbound body to `receiver` according to its framing.
pub(crate) async fn read_body<F>(
    wire: &mut Wire<'_>,
    framing: BodyFraming,
    max: u64,
    receiver: &mut F,
) -> Result<(), HttpError>
where
    F: FnMut(&[u8]) -> bool,
{
    match framing {
        BodyFraming::Empty => Ok(()),
        BodyFraming::Length(n) => {
            if n > max {
                return Err(HttpError::PayloadTooLarge);
            }
            wire.read_exact_into(n, receiver).await
        }
        BodyFraming::Chunked => read_chunked(wire, max, receiver).await,
        BodyFraming::UntilClose => wire.read_to_eof(max, receiver).await,
    }
}

async fn read_chunked<F>(wire: &mut Wire<'_>, max: u64, receiver: &mut F) -> Result<(), HttpError>
where
    F: FnMut(&[u8]) -> bool,
{
    let mut total = 0u64;
    loop {
        let line = wire.read_line(MAX_CHUNK_LINE).await?;
        let size = codec::parse_chunk_size(&line)?;
        if size == 0 {
            // trailer fields are read and discarded
            while !wire.read_line(MAX_CHUNK_LINE).await?.is_empty() {}
            return Ok(());
        }
        total = total.saturating_add(size);
        if total > max {
            return Err(HttpError::PayloadTooLarge);
        }
        wire.read_exact_into(size, receiver).await?;
        if !wire.read_line(MAX_CHUNK_LINE).await?.is_empty() {
            return Err(HttpError::parse("chunk data not followed by CRLF"));
        }
    }
}

/// Where the inbound body of the current exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum BodyState {
    #[default]
    Unread,
    Consumed,
    Failed {
        status: Option<StatusCode>,
        transport: bool,
    },
}

/// Handle a streaming handler uses to pull the request body on demand.
pub struct ContentReader<'a> {
    wire: Wire<'a>,
    framing: BodyFraming,
    max_length: u64,
    boundary: Option<String>,
    state: &'a mut BodyState,
}

impl<'a> ContentReader<'a> {
    pub(crate) fn new(
        wire: Wire<'a>,
        framing: BodyFraming,
        max_length: u64,
        boundary: Option<String>,
        state: &'a mut BodyState,
    ) -> Self {
        Self {
            wire,
            framing,
            max_length,
            boundary,
            state,
        }
    }

    /// True if the request declared `multipart/form-data` with a boundary.
    pub fn is_multipart(&self) -> bool {
        self.boundary.is_some()
    }

    /// Declared `Content-Length`, if the body is length-delimited.
    pub fn content_length(&self) -> Option<u64> {
        match self.framing {
            BodyFraming::Length(n) => Some(n),
            _ => None,
        }
    }

    /// Stream the raw body into `receiver`. A second call is a no-op.
    pub async fn read<F>(&mut self, mut receiver: F) -> Result<(), HttpError>
    where
        F: FnMut(&[u8]) -> bool + Send,
    {
        if *self.state != BodyState::Unread {
            return Ok(());
        }
        let result = read_body(&mut self.wire, self.framing, self.max_length, &mut receiver).await;
        self.finish(result)
    }

    /// Stream a multipart body as a sequence of part and content events.
    pub async fn read_multipart<F>(&mut self, mut on_event: F) -> Result<(), HttpError>
    where
        F: FnMut(MultipartEvent<'_>) -> bool + Send,
    {
        let Some(boundary) = self.boundary.clone() else {
            return Err(HttpError::parse("request body is not multipart/form-data"));
        };
        if *self.state != BodyState::Unread {
            return Ok(());
        }

        let mut parser = MultipartParser::new(&boundary);
        let mut failure: Option<HttpError> = None;
        let result = {
            let mut receiver = |data: &[u8]| match parser.feed(data, &mut on_event) {
                Ok(more) => more,
                Err(e) => {
                    failure = Some(e);
                    false
                }
            };
            read_body(&mut self.wire, self.framing, self.max_length, &mut receiver).await
        };

        let result = match (result, failure) {
            (_, Some(e)) => Err(e),
            (Ok(()), None) if !parser.is_complete() => {
                Err(HttpError::parse("multipart body ended before closing boundary"))
            }
            (r, None) => r,
        };
        self.finish(result)
    }

    fn finish(&mut self, result: Result<(), HttpError>) -> Result<(), HttpError> {
        *self.state = match &result {
            Ok(()) => BodyState::Consumed,
            Err(e) => BodyState::Failed {
                status: e.status(),
                transport: e.is_transport(),
            },
        };
        result
    }
}

/// One part of a `multipart/form-data` body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartFormData {
    pub name: String,
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl MultipartFormData {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn file(
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            content: content.into(),
        }
    }
}

/// Events emitted while a multipart body streams in.
#[derive(Debug)]
pub enum MultipartEvent<'a> {
    /// A new part began; `content` is always empty here.
    Part(&'a MultipartFormData),
    /// A slice of the current part's content.
    Content(&'a [u8]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartState {
    Preamble,
    AfterBoundary,
    Headers,
    Body,
    Epilogue,
}

/// Incremental `multipart/form-data` parser fed with arbitrary slices.
#[derive(Debug)]
pub struct MultipartParser {
    dash_boundary: Vec<u8>,
    delimiter: Vec<u8>,
    state: PartState,
    buf: Vec<u8>,
}

impl MultipartParser {
    pub fn new(boundary: &str) -> Self {
        let dash_boundary = format!("--{}", boundary).into_bytes();
        let mut delimiter = b"\r\n".to_vec();
        delimiter.extend_from_slice(&dash_boundary);
        Self {
            dash_boundary,
            delimiter,
            state: PartState::Preamble,
            buf: Vec::new(),
        }
    }

    /// Feed more body bytes. `Ok(false)` means the callback asked to stop.
    pub fn feed<F>(&mut self, data: &[u8], on_event: &mut F) -> Result<bool, HttpError>
    where
        F: FnMut(MultipartEvent<'_>) -> bool,
    {
        self.buf.extend_from_slice(data);
        loop {
            match self.state {
                PartState::Preamble => match memmem::find(&self.buf, &self.dash_boundary) {
                    Some(pos) => {
                        self.buf.drain(..pos + self.dash_boundary.len());
                        self.state = PartState::AfterBoundary;
                    }
                    None => {
                        let keep = self.dash_boundary.len() - 1;
                        if self.buf.len() > keep {
                            self.buf.drain(..self.buf.len() - keep);
                        }
                        return Ok(true);
                    }
                },
                PartState::AfterBoundary => {
                    if self.buf.len() < 2 {
                        return Ok(true);
                    }
                    if self.buf.starts_with(b"--") {
                        self.state = PartState::Epilogue;
                    } else if self.buf.starts_with(b"\r\n") {
                        self.buf.drain(..2);
                        self.state = PartState::Headers;
                    } else {
                        return Err(HttpError::parse("malformed multipart boundary line"));
                    }
                }
                PartState::Headers => match memmem::find(&self.buf, b"\r\n\r\n") {
                    Some(pos) => {
                        let part = parse_part_headers(&self.buf[..pos])?;
                        self.buf.drain(..pos + 4);
                        self.state = PartState::Body;
                        if !on_event(MultipartEvent::Part(&part)) {
                            return Ok(false);
                        }
                    }
                    None if self.buf.len() > MAX_PART_HEADER => {
                        return Err(HttpError::parse("multipart part header too large"));
                    }
                    None => return Ok(true),
                },
                PartState::Body => match memmem::find(&self.buf, &self.delimiter) {
                    Some(pos) => {
                        if pos > 0 && !on_event(MultipartEvent::Content(&self.buf[..pos])) {
                            return Ok(false);
                        }
                        self.buf.drain(..pos + self.delimiter.len());
                        self.state = PartState::AfterBoundary;
                    }
                    None => {
                        // the tail may hold the start of the next delimiter
                        let keep = self.delimiter.len() - 1;
                        if self.buf.len() > keep {
                            let emit = self.buf.len() - keep;
                            if !on_event(MultipartEvent::Content(&self.buf[..emit])) {
                                return Ok(false);
                            }
                            self.buf.drain(..emit);
                        }
                        return Ok(true);
                    }
                },
                PartState::Epilogue => {
                    self.buf.clear();
                    return Ok(true);
                }
            }
        }
    }

    /// True once the closing boundary has been seen.
    pub fn is_complete(&self) -> bool {
        self.state == PartState::Epilogue
    }
}

fn parse_part_headers(block: &[u8]) -> Result<MultipartFormData, HttpError> {
    let text = std::str::from_utf8(block).map_err(|_| HttpError::parse("multipart header is not utf-8"))?;
    let mut part = MultipartFormData::default();
    let mut has_disposition = false;

    for line in text.split("\r\n") {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpError::parse("malformed multipart header line"))?;
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("Content-Type") {
            part.content_type = value.to_string();
        } else if name.eq_ignore_ascii_case("Content-Disposition") {
            has_disposition = true;
            for param in value.split(';').skip(1) {
                if let Some((key, val)) = param.trim().split_once('=') {
                    let val = val.trim().trim_matches('"').to_string();
                    match key.trim().to_ascii_lowercase().as_str() {
                        "name" => part.name = val,
                        "filename" => part.filename = val,
                        _ => {}
                    }
                }
            }
        }
    }

    if !has_disposition {
        return Err(HttpError::parse("multipart part without Content-Disposition"));
    }
    Ok(part)
}

/// Parse a fully buffered multipart body into its parts.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<Vec<MultipartFormData>, HttpError> {
    let mut parts: Vec<MultipartFormData> = Vec::new();
    let mut parser = MultipartParser::new(boundary);
    parser.feed(body, &mut |event: MultipartEvent<'_>| {
        match event {
            MultipartEvent::Part(p) => parts.push(p.clone()),
            MultipartEvent::Content(d) => {
                if let Some(last) = parts.last_mut() {
                    last.content.extend_from_slice(d);
                }
            }
        }
        true
    })?;
    if !parser.is_complete() {
        return Err(HttpError::parse("multipart body ended before closing boundary"));
    }
    Ok(parts)
}

/// Extract the boundary parameter of a `multipart/form-data` content type.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let media = params.next()?.trim();
    if !media.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .filter_map(|p| p.trim().split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

/// Fresh boundary for an outgoing multipart body.
pub fn random_boundary() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("h1-engine-{}", suffix)
}

/// Serialize parts into a `multipart/form-data` body.
pub fn serialize_multipart(items: &[MultipartFormData], boundary: &str) -> Vec<u8> {
    let mut body = Vec::new();
    for item in items {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", item.name);
        if !item.filename.is_empty() {
            disposition.push_str(&format!("; filename=\"{}\"", item.filename));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if !item.content_type.is_empty() {
            body.extend_from_slice(format!("Content-Type: {}\r\n", item.content_type).as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&item.content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::transport::{BufferStream, Transport};
    use bytes::BytesMut;

    fn output_of(t: Transport) -> Vec<u8> {
        match t {
            Transport::Buffer(b) => b.output().to_vec(),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn chunked_provider_frames_each_call() {
        let mut io = Transport::Buffer(BufferStream::new(Vec::new()));
        let mut buf = BytesMut::new();
        let pieces: Vec<&'static [u8]> = vec![b"abc", b"de"];
        let mut calls = 0;
        let mut provider: ChunkedContentProvider = Box::new(move |_offset, sink: &mut DataSink| {
            match pieces.get(calls) {
                Some(p) => {
                    sink.write(p);
                }
                None => sink.done(),
            }
            calls += 1;
            true
        });
        {
            let mut wire = Wire::new(&mut io, &mut buf, None, None);
            write_chunked(&mut wire, &mut provider).await.unwrap();
        }
        assert_eq!(output_of(io), b"3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn chunked_body_reassembles() {
        let mut io = Transport::Buffer(BufferStream::new(
            b"3\r\nabc\r\n2;ext=1\r\nde\r\n0\r\nTrailer: x\r\n\r\n".to_vec(),
        ));
        let mut buf = BytesMut::new();
        let mut wire = Wire::new(&mut io, &mut buf, None, None);
        let mut got = Vec::new();
        read_body(&mut wire, BodyFraming::Chunked, 1024, &mut |d: &[u8]| {
            got.extend_from_slice(d);
            true
        })
        .await
        .unwrap();
        assert_eq!(got, b"abcde");
    }

    #[tokio::test]
    async fn sized_provider_respects_offsets_and_length() {
        let data: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();
        let source = data.clone();
        let mut provider: ContentProvider = Box::new(move |offset, length, sink: &mut DataSink| {
            let start = offset as usize;
            let end = (start + 1000).min(start + length as usize);
            sink.write(&source[start..end]);
            true
        });
        let mut io = Transport::Buffer(BufferStream::new(Vec::new()));
        let mut buf = BytesMut::new();
        {
            let mut wire = Wire::new(&mut io, &mut buf, None, None);
            write_sized(&mut wire, &mut provider, 10, 150_000).await.unwrap();
        }
        assert_eq!(output_of(io), &data[10..150_010]);
    }

    #[tokio::test]
    async fn sink_stops_being_writable_at_high_water() {
        let mut sink = DataSink::new(4);
        assert!(sink.is_writable());
        sink.write(b"abcd");
        assert!(!sink.is_writable());
        assert_eq!(sink.take(), b"abcd");
        assert!(sink.is_writable());
    }

    #[tokio::test]
    async fn provider_abort_cancels() {
        let mut provider: ContentProvider = Box::new(|_, _, _| false);
        let mut io = Transport::Buffer(BufferStream::new(Vec::new()));
        let mut buf = BytesMut::new();
        let mut wire = Wire::new(&mut io, &mut buf, None, None);
        let err = write_sized(&mut wire, &mut provider, 0, 10).await.unwrap_err();
        assert!(matches!(err, HttpError::Canceled));
    }

    #[tokio::test]
    async fn receiver_false_cancels_read() {
        let mut io = Transport::Buffer(BufferStream::new(b"0123456789".to_vec()));
        let mut buf = BytesMut::new();
        let mut wire = Wire::new(&mut io, &mut buf, None, None);
        let err = read_body(&mut wire, BodyFraming::Length(10), 100, &mut |_: &[u8]| false)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Canceled));
    }

    #[tokio::test]
    async fn declared_length_over_limit_is_rejected_before_reading() {
        let mut io = Transport::Buffer(BufferStream::new(Vec::new()));
        let mut buf = BytesMut::new();
        let mut wire = Wire::new(&mut io, &mut buf, None, None);
        let err = read_body(&mut wire, BodyFraming::Length(11), 10, &mut |_: &[u8]| true)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::PayloadTooLarge));
    }

    #[test]
    fn multipart_parses_split_input() {
        let items = vec![
            MultipartFormData::new("text", "hello world"),
            MultipartFormData::file("upload", "a.txt", "text/plain", b"line1\r\nline2".to_vec()),
        ];
        let body = serialize_multipart(&items, "XyZ");

        // feed one byte at a time to exercise every partial state
        let mut parts: Vec<MultipartFormData> = Vec::new();
        let mut parser = MultipartParser::new("XyZ");
        for byte in &body {
            let more = parser
                .feed(std::slice::from_ref(byte), &mut |event: MultipartEvent<'_>| {
                    match event {
                        MultipartEvent::Part(p) => parts.push(p.clone()),
                        MultipartEvent::Content(d) => parts.last_mut().unwrap().content.extend_from_slice(d),
                    }
                    true
                })
                .unwrap();
            assert!(more);
        }
        assert!(parser.is_complete());
        assert_eq!(parts, items);
    }

    #[test]
    fn multipart_requires_closing_boundary() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"x\"\r\n\r\nvalue";
        assert!(parse_multipart(body, "b").is_err());
    }

    #[test]
    fn boundary_extraction() {
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=\"abc\""),
            Some("abc".to_string())
        );
        assert_eq!(boundary_from_content_type("text/plain; boundary=abc"), None);
        assert_eq!(boundary_from_content_type("multipart/form-data"), None);
    }
}
