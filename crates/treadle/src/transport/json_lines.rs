//! Line-delimited JSON transport over any reader/writer pair.

use std::io::{self, BufRead, Write};

use tracing::{debug, warn};

use super::wire::WireRequest;
use super::{DecodeError, Incoming, TRANSPORT_TARGET, Transport, TransportError};
use crate::http::Reply;

/// Maximum size of a single request line in bytes.
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

enum Line {
    Eof,
    Complete(Vec<u8>),
    Oversized(usize),
}

/// Reads one JSON request per line and writes one JSON reply per line.
///
/// End of input is a shutdown. Oversized lines are skipped up to the next
/// newline and reported as malformed so the stream stays in sync.
#[derive(Debug)]
pub struct JsonLinesTransport<R, W> {
    reader: R,
    writer: W,
    max_request_bytes: usize,
}

impl JsonLinesTransport<io::StdinLock<'static>, io::Stdout> {
    /// Transport over the process's standard streams.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> JsonLinesTransport<R, W> {
    /// Creates a transport with the default line limit.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            max_request_bytes: MAX_REQUEST_BYTES,
        }
    }

    /// Overrides the line limit.
    #[must_use]
    pub fn with_limit(mut self, max_request_bytes: usize) -> Self {
        self.max_request_bytes = max_request_bytes;
        self
    }

    /// Returns the reader and writer.
    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }

    fn read_line(&mut self) -> io::Result<Line> {
        let mut buffer = Vec::new();
        let mut size = 0_usize;
        let mut oversized = false;

        loop {
            let (consumed, complete) = {
                let available = match self.reader.fill_buf() {
                    Ok(available) => available,
                    Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                    Err(error) => return Err(error),
                };
                if available.is_empty() {
                    return Ok(match (size, oversized) {
                        (0, _) => Line::Eof,
                        (_, true) => Line::Oversized(size),
                        (_, false) => Line::Complete(buffer),
                    });
                }
                let newline = available.iter().position(|byte| *byte == b'\n');
                let chunk = newline.map_or(available, |position| &available[..=position]);
                size += chunk.len();
                if !oversized && size > self.max_request_bytes {
                    oversized = true;
                    buffer = Vec::new();
                }
                if !oversized {
                    buffer.extend_from_slice(chunk);
                }
                (chunk.len(), newline.is_some())
            };
            self.reader.consume(consumed);

            if complete {
                return Ok(if oversized {
                    Line::Oversized(size)
                } else {
                    Line::Complete(buffer)
                });
            }
        }
    }
}

impl<R: BufRead, W: Write> Transport for JsonLinesTransport<R, W> {
    fn receive(&mut self) -> Result<Incoming, TransportError> {
        loop {
            let line = self
                .read_line()
                .map_err(|source| TransportError::Read { source })?;
            let bytes = match line {
                Line::Eof => {
                    debug!(target: TRANSPORT_TARGET, "input closed");
                    return Ok(Incoming::Shutdown);
                }
                Line::Oversized(size) => {
                    warn!(target: TRANSPORT_TARGET, size, "request line too large");
                    return Ok(Incoming::Malformed(DecodeError::TooLarge {
                        size,
                        max_size: self.max_request_bytes,
                    }));
                }
                Line::Complete(bytes) => bytes,
            };
            if bytes.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let decoded = WireRequest::parse(&bytes).and_then(WireRequest::into_request);
            return Ok(match decoded {
                Ok(request) => Incoming::Request(request),
                Err(error) => {
                    warn!(target: TRANSPORT_TARGET, error = %error, "malformed request");
                    Incoming::Malformed(error)
                }
            });
        }
    }

    fn respond(&mut self, reply: &Reply) -> Result<(), TransportError> {
        let mut line =
            serde_json::to_vec(reply).map_err(|source| TransportError::Encode { source })?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .and_then(|()| self.writer.flush())
            .map_err(|source| TransportError::Write { source })
    }
}
