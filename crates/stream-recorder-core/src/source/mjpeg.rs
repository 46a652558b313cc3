//! Pull-style MJPEG source.
//!
//! Reads a `multipart/x-mixed-replace` body (the format webcam relays serve
//! motion JPEG over HTTP) either from an `http(s)://` URL or from a local
//! file holding a captured body.

use crate::{Frame, FrameSource, SourceError};

use std::{panic::Location, time::Duration};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use error_location::ErrorLocation;
use futures::TryStreamExt;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    time::Instant,
};
use tokio_util::io::StreamReader;
use tracing::{debug, info, instrument, warn};

/// Boundary used when the producer does not announce one.
pub(crate) const DEFAULT_BOUNDARY: &str = "frame";

/// Bytes requested from the reader per refill.
const READ_CHUNK: usize = 64 * 1024;

/// Largest part body accepted before the stream is considered broken.
pub(crate) const MAX_PART_LEN: usize = 16 * 1024 * 1024;

/// Upper bound on establishing the TCP/TLS connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on receiving the response headers.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Frame source reading motion JPEG parts from a multipart stream.
pub struct MjpegSource {
    identifier: String,
    reader: Option<Box<dyn AsyncRead + Send + Unpin>>,
    parser: MultipartParser,
}

impl MjpegSource {
    /// Opens `identifier`, which is either an `http(s)://` URL or a path to
    /// a file containing a multipart body.
    ///
    /// HTTP sources must connect and answer with headers within a few
    /// seconds; the body itself may stream indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] if the stream cannot be opened.
    #[instrument]
    pub async fn open(identifier: &str) -> Result<Self, SourceError> {
        let unavailable = |reason: String| SourceError::Unavailable {
            identifier: identifier.to_string(),
            reason,
            location: ErrorLocation::from(Location::caller()),
        };

        if identifier.starts_with("http://") || identifier.starts_with("https://") {
            let client = reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .map_err(|e| unavailable(format!("Failed to build HTTP client: {}", e)))?;

            let response = tokio::time::timeout(RESPONSE_TIMEOUT, client.get(identifier).send())
                .await
                .map_err(|_| {
                    unavailable(format!("No response within {:?}", RESPONSE_TIMEOUT))
                })?
                .map_err(|e| unavailable(format!("Request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(unavailable(format!(
                    "Unexpected HTTP status {}",
                    response.status()
                )));
            }

            let boundary = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .and_then(boundary_from_content_type)
                .unwrap_or_else(|| DEFAULT_BOUNDARY.to_string());

            let body = response.bytes_stream().map_err(std::io::Error::other);

            info!(identifier, boundary = %boundary, "MJPEG stream opened");

            Ok(Self::from_reader(
                identifier,
                StreamReader::new(Box::pin(body)),
                &boundary,
            ))
        } else {
            let file = tokio::fs::File::open(identifier)
                .await
                .map_err(|e| unavailable(format!("Failed to open file: {}", e)))?;

            info!(identifier, "MJPEG file opened");

            Ok(Self::from_reader(identifier, file, DEFAULT_BOUNDARY))
        }
    }

    /// Wraps an already-connected reader.
    pub fn from_reader<R>(identifier: impl Into<String>, reader: R, boundary: &str) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            identifier: identifier.into(),
            reader: Some(Box::new(reader)),
            parser: MultipartParser::new(boundary),
        }
    }
}

#[async_trait]
impl FrameSource for MjpegSource {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn next(&mut self) -> Result<Option<Frame>, SourceError> {
        loop {
            while let Some(part) = self.parser.next_part()? {
                match Frame::from_jpeg(part, Instant::now()) {
                    Some(frame) => return Ok(Some(frame)),
                    None => warn!(identifier = %self.identifier, "Skipping non-JPEG part"),
                }
            }

            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };

            let buffer = self.parser.buffer_mut();
            buffer.reserve(READ_CHUNK);

            let read = reader
                .read_buf(buffer)
                .await
                .map_err(|e| SourceError::ReadFailed {
                    reason: format!("Stream read failed: {}", e),
                    location: ErrorLocation::from(Location::caller()),
                })?;

            if read == 0 {
                debug!(identifier = %self.identifier, "MJPEG stream reached end");
                self.reader = None;
                let last = self
                    .parser
                    .finish()
                    .and_then(|part| Frame::from_jpeg(part, Instant::now()));
                return Ok(last);
            }
        }
    }

    async fn close(&mut self) {
        self.reader = None;
        self.parser.clear();
        debug!(identifier = %self.identifier, "MJPEG source closed");
    }
}

/// Extracts the boundary parameter from a multipart `Content-Type` value.
pub(crate) fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| value.trim().trim_matches('"'))
        })
        .map(|boundary| boundary.strip_prefix("--").unwrap_or(boundary).to_string())
        .filter(|boundary| !boundary.is_empty())
}

/// Incremental splitter for `multipart/x-mixed-replace` bodies.
///
/// Parts may or may not carry a `Content-Length` header; without one the
/// part body runs until the next delimiter line. Bytes that cannot belong to
/// a part are discarded as they arrive, and a part may not grow beyond
/// [`MAX_PART_LEN`].
pub(crate) struct MultipartParser {
    delimiter: Vec<u8>,
    buf: BytesMut,
    /// Offset from which the search for the closing delimiter resumes.
    scanned: usize,
}

impl MultipartParser {
    pub(crate) fn new(boundary: &str) -> Self {
        Self {
            delimiter: format!("--{}", boundary).into_bytes(),
            buf: BytesMut::new(),
            scanned: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    #[cfg(test)]
    pub(crate) fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    pub(crate) fn clear(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }

    /// Returns the next complete part body, if the buffer holds one.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::ReadFailed`] when a part exceeds
    /// [`MAX_PART_LEN`].
    pub(crate) fn next_part(&mut self) -> Result<Option<Bytes>, SourceError> {
        let Some((body_start, content_length)) = self.part_header() else {
            return self.within_limit().map(|()| None);
        };

        let body_len = match content_length {
            Some(len) if len > MAX_PART_LEN => return Err(part_too_large(len)),
            Some(len) if self.buf.len() < body_start + len => return Ok(None),
            Some(len) => len,
            None => {
                let from = self.scanned.max(body_start);
                match find(&self.buf[from..], &self.delimiter) {
                    Some(pos) => from + pos - body_start,
                    None => {
                        // A delimiter may straddle the end of the buffer
                        self.scanned = self
                            .buf
                            .len()
                            .saturating_sub(self.delimiter.len() - 1)
                            .max(body_start);
                        return self.within_limit().map(|()| None);
                    }
                }
            }
        };

        let _ = self.buf.split_to(body_start);
        let body = self.buf.split_to(body_len).freeze();
        self.scanned = 0;

        Ok(Some(trim_line_break(body)))
    }

    /// Flushes a trailing part at end of stream.
    pub(crate) fn finish(&mut self) -> Option<Bytes> {
        let part = self.part_header().and_then(|(body_start, _)| {
            let _ = self.buf.split_to(body_start);
            let body = trim_line_break(self.buf.split().freeze());
            (!body.is_empty()).then_some(body)
        });
        self.clear();
        part
    }

    #[track_caller]
    fn within_limit(&self) -> Result<(), SourceError> {
        if self.buf.len() > MAX_PART_LEN {
            return Err(part_too_large(self.buf.len()));
        }
        Ok(())
    }

    /// Locates the next delimiter and the end of its headers.
    ///
    /// Returns the offset of the part body and the declared length, if any.
    fn part_header(&mut self) -> Option<(usize, Option<usize>)> {
        match find(&self.buf, &self.delimiter) {
            Some(0) => {}
            Some(start) => {
                // Preamble or trailing bytes of a skipped part
                let _ = self.buf.split_to(start);
                self.scanned = 0;
            }
            None => {
                let keep = self.delimiter.len() - 1;
                if self.buf.len() > keep {
                    let _ = self.buf.split_to(self.buf.len() - keep);
                }
                self.scanned = 0;
                return None;
            }
        }

        let headers_start = self.delimiter.len();
        let headers_len = find(&self.buf[headers_start..], b"\r\n\r\n")?;
        let headers = &self.buf[headers_start..headers_start + headers_len];

        let content_length = String::from_utf8_lossy(headers).lines().find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        });

        Some((headers_start + headers_len + 4, content_length))
    }
}

#[track_caller]
fn part_too_large(len: usize) -> SourceError {
    SourceError::ReadFailed {
        reason: format!(
            "Multipart part of {} bytes exceeds the {} byte limit",
            len, MAX_PART_LEN
        ),
        location: ErrorLocation::from(Location::caller()),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn trim_line_break(mut body: Bytes) -> Bytes {
    if body.ends_with(b"\r\n") {
        body.truncate(body.len() - 2);
    } else if body.ends_with(b"\n") {
        body.truncate(body.len() - 1);
    }
    body
}
