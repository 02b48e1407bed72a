//! HTTP/1.x message head parsing and serialization.
//!
//! # Responsibilities
//! - Parse request lines, status lines and header blocks
//! - Serialize request and response heads
//! - Decide body framing from headers
//! - Chunk framing helpers and `Range` header parsing
//!
//! # Design Decisions
//! - Works on complete head buffers; incremental reading lives in `wire`
//! - Lines may end in CRLF or bare LF
//! - Header names and values are trimmed; names must then be tokens

use crate::error::HttpError;
use crate::http::headers::Headers;
use crate::http::request::{Params, Request};
use crate::http::response::Response;
use crate::http::types::{ByteRange, Method, StatusCode, Version};
use crate::security::limits::Limits;

/// Terminating chunk of a chunked body (no trailers).
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// How the body following a head is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Empty,
    Length(u64),
    Chunked,
    /// Response body runs until the server closes the connection.
    UntilClose,
}

impl BodyFraming {
    pub fn has_body(&self) -> bool {
        !matches!(self, BodyFraming::Empty | BodyFraming::Length(0))
    }
}

/// Framing of a request body: chunked, else `Content-Length`, else none.
pub fn request_framing(headers: &Headers) -> Result<BodyFraming, HttpError> {
    if headers.has_token("Transfer-Encoding", "chunked") {
        return Ok(BodyFraming::Chunked);
    }
    match content_length(headers)? {
        Some(n) => Ok(BodyFraming::Length(n)),
        None => Ok(BodyFraming::Empty),
    }
}

/// Framing of a response body to a request made with `method`.
pub fn response_framing(method: &Method, status: StatusCode, headers: &Headers) -> Result<BodyFraming, HttpError> {
    if *method == Method::Head || status.forbids_body() {
        return Ok(BodyFraming::Empty);
    }
    if headers.has_token("Transfer-Encoding", "chunked") {
        return Ok(BodyFraming::Chunked);
    }
    match content_length(headers)? {
        Some(n) => Ok(BodyFraming::Length(n)),
        None => Ok(BodyFraming::UntilClose),
    }
}

fn content_length(headers: &Headers) -> Result<Option<u64>, HttpError> {
    let mut found: Option<u64> = None;
    for value in headers.get_all("Content-Length") {
        let n = value
            .trim()
            .parse::<u64>()
            .map_err(|_| HttpError::parse(format!("invalid Content-Length: {:?}", value)))?;
        if found.is_some_and(|prev| prev != n) {
            return Err(HttpError::parse("conflicting Content-Length values"));
        }
        found = Some(n);
    }
    Ok(found)
}

fn head_lines(head: &[u8]) -> Result<impl Iterator<Item = &str>, HttpError> {
    let text = std::str::from_utf8(head).map_err(|_| HttpError::parse("message head is not valid utf-8"))?;
    Ok(text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .take_while(|l| !l.is_empty()))
}

fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

/// Parse header field lines into a [`Headers`] map.
pub fn parse_header_lines<'a>(lines: impl Iterator<Item = &'a str>, limits: &Limits) -> Result<Headers, HttpError> {
    let mut headers = Headers::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpError::parse(format!("header line without colon: {:?}", line)))?;
        let name = name.trim();
        if !is_token(name) {
            return Err(HttpError::parse(format!("invalid header name: {:?}", name)));
        }
        headers.append(name, value.trim());
        if headers.len() > limits.max_header_count {
            return Err(HttpError::parse("too many header fields"));
        }
    }
    Ok(headers)
}

/// Parse a complete request head (request line + headers + blank line).
pub fn parse_request_head(head: &[u8], limits: &Limits) -> Result<Request, HttpError> {
    let mut lines = head_lines(head)?;
    let request_line = lines.next().ok_or_else(|| HttpError::parse("empty request line"))?;

    let mut parts = request_line.split_ascii_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) => (m, t, v),
        _ => return Err(HttpError::parse(format!("malformed request line: {:?}", request_line))),
    };
    if target.len() > limits.max_uri_length {
        return Err(HttpError::UriTooLong(limits.max_uri_length));
    }
    let version = match Version::from_token(version) {
        Some(v) => v,
        None if version.starts_with("HTTP/") => return Err(HttpError::VersionNotSupported(version.to_string())),
        None => return Err(HttpError::parse(format!("malformed protocol version: {:?}", version))),
    };

    let mut request = Request::new(Method::from_token(method), target);
    request.version = version;
    request.headers = parse_header_lines(lines, limits)?;
    Ok(request)
}

/// Parse a status line and headers. Returns `(version, status, reason, headers)`.
pub fn parse_response_head(head: &[u8], limits: &Limits) -> Result<(Version, StatusCode, String, Headers), HttpError> {
    let mut lines = head_lines(head)?;
    let status_line = lines.next().ok_or_else(|| HttpError::parse("empty status line"))?;

    let mut parts = status_line.splitn(3, ' ');
    let version = parts
        .next()
        .and_then(Version::from_token)
        .ok_or_else(|| HttpError::parse(format!("malformed status line: {:?}", status_line)))?;
    let status = parts
        .next()
        .and_then(|c| c.parse::<u16>().ok())
        .and_then(StatusCode::from_u16)
        .ok_or_else(|| HttpError::parse(format!("malformed status code in {:?}", status_line)))?;
    let reason = parts.next().unwrap_or("").trim().to_string();

    let headers = parse_header_lines(lines, limits)?;
    Ok((version, status, reason, headers))
}

/// Split a request target into its decoded query parameters.
pub fn parse_query(query: &str) -> Params {
    url::form_urlencoded::parse(query.as_bytes()).into_owned().collect()
}

/// Encode parameters as `application/x-www-form-urlencoded`.
pub fn encode_query(params: &Params) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in params.iter() {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}

fn write_headers(out: &mut Vec<u8>, headers: &Headers) {
    for (name, value) in headers.iter() {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

/// Serialize a request line and headers using `target` as the request-target.
pub fn serialize_request_head(request: &Request, target: &str) -> Vec<u8> {
    serialize_head(&request.method, target, request.version, &request.headers)
}

/// Serialize a request line and an explicit header set.
pub fn serialize_head(method: &Method, target: &str, version: Version, headers: &Headers) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(format!("{} {} {}\r\n", method, target, version).as_bytes());
    write_headers(&mut out, headers);
    out
}

/// Serialize a status line and headers.
pub fn serialize_response_head(response: &Response) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(
        format!(
            "{} {} {}\r\n",
            response.version,
            response.status.as_u16(),
            response.reason_phrase()
        )
        .as_bytes(),
    );
    write_headers(&mut out, &response.headers);
    out
}

/// Frame one chunk: hex length, CRLF, data, CRLF.
pub fn frame_chunk(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 12);
    out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

/// Parse a chunk-size line, ignoring chunk extensions.
pub fn parse_chunk_size(line: &[u8]) -> Result<u64, HttpError> {
    let text = std::str::from_utf8(line).map_err(|_| HttpError::parse("chunk size is not ascii"))?;
    let size = text.split(';').next().unwrap_or("").trim();
    if size.is_empty() || size.len() > 16 {
        return Err(HttpError::parse(format!("invalid chunk size: {:?}", text)));
    }
    u64::from_str_radix(size, 16).map_err(|_| HttpError::parse(format!("invalid chunk size: {:?}", text)))
}

/// Parse a `Range` header value of the form `bytes=a-b, c-, -d`.
pub fn parse_ranges(value: &str) -> Result<Vec<ByteRange>, HttpError> {
    let set = value
        .trim()
        .strip_prefix("bytes=")
        .ok_or(HttpError::RangeNotSatisfiable)?;
    let mut ranges = Vec::new();
    for item in set.split(',') {
        let (first, last) = item.trim().split_once('-').ok_or(HttpError::RangeNotSatisfiable)?;
        let parse = |s: &str| -> Result<Option<u64>, HttpError> {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<u64>().map(Some).map_err(|_| HttpError::RangeNotSatisfiable)
            }
        };
        let range = ByteRange::new(parse(first)?, parse(last)?);
        match (range.start, range.end) {
            (None, None) => return Err(HttpError::RangeNotSatisfiable),
            (Some(s), Some(e)) if s > e => return Err(HttpError::RangeNotSatisfiable),
            _ => ranges.push(range),
        }
    }
    Ok(ranges)
}
