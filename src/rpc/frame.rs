//! LSP Base Protocol Framing
//!
//! Frames are a block of CRLF-terminated headers, an empty line, and
//! exactly `Content-Length` bytes of payload:
//!
//! ```text
//! Content-Length: 123\r\n
//! Content-Type: application/vscode-jsonrpc; charset=utf-8\r\n
//! \r\n
//! {"jsonrpc":"2.0",...}
//! ```
//!
//! Header names are matched case-insensitively. Only `Content-Length` is
//! written back; replies are always UTF-8 JSON.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;

pub const DEFAULT_MEDIA_TYPE: &str = "application/vscode-jsonrpc";
pub const DEFAULT_CHARSET: &str = "utf-8";
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

const MAX_HEADER_LINE: u64 = 8 * 1024;

/// A single length-prefixed message unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub content_length: usize,
    pub content_type: Option<String>,
    pub content: Vec<u8>,
}

impl Frame {
    pub fn media_type(&self) -> MediaType {
        MediaType::parse(self.content_type.as_deref())
    }
}

/// Parsed `Content-Type` header value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub essence: String,
    pub charset: String,
}

impl Default for MediaType {
    fn default() -> Self {
        Self {
            essence: DEFAULT_MEDIA_TYPE.to_string(),
            charset: DEFAULT_CHARSET.to_string(),
        }
    }
}

impl MediaType {
    pub fn parse(value: Option<&str>) -> Self {
        let value = match value.map(str::trim) {
            Some(v) if !v.is_empty() => v.to_ascii_lowercase(),
            _ => return Self::default(),
        };

        let mut parts = value.split(';');
        let essence = parts.next().unwrap_or_default().trim();
        let charset = parts
            .filter_map(|p| p.trim().strip_prefix("charset="))
            .map(|c| c.trim().trim_matches('"'))
            .find(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CHARSET);

        Self {
            essence: if essence.is_empty() {
                DEFAULT_MEDIA_TYPE.to_string()
            } else {
                essence.to_string()
            },
            charset: match charset {
                "utf8" => DEFAULT_CHARSET.to_string(),
                other => other.to_string(),
            },
        }
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Reads frames from a buffered byte stream
pub struct FrameReader<R> {
    reader: R,
    max_content_length: usize,
    line: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_limit(reader, DEFAULT_MAX_CONTENT_LENGTH)
    }

    pub fn with_limit(reader: R, max_content_length: usize) -> Self {
        Self {
            reader,
            max_content_length,
            line: Vec::with_capacity(64),
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly before the first byte
    /// of a header block. Running out of bytes anywhere later is an error.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let Some((content_length, content_type)) = self.read_headers().await? else {
            return Ok(None);
        };

        if content_length > self.max_content_length {
            return Err(FrameError::ContentTooLarge {
                length: content_length,
                limit: self.max_content_length,
            });
        }

        let content = self.read_content(content_length).await?;
        tracing::trace!("Frame <- {} bytes", content_length);

        Ok(Some(Frame {
            content_length,
            content_type,
            content,
        }))
    }

    async fn read_headers(&mut self) -> Result<Option<(usize, Option<String>)>, FrameError> {
        let mut content_length: Option<usize> = None;
        let mut content_type: Option<String> = None;
        let mut at_start = true;

        loop {
            self.line.clear();
            let bytes_read = (&mut self.reader)
                .take(MAX_HEADER_LINE)
                .read_until(b'\n', &mut self.line)
                .await?;

            if bytes_read == 0 {
                if at_start {
                    return Ok(None);
                }
                return Err(FrameError::TruncatedHeader);
            }
            at_start = false;

            let Some(raw) = self.line.strip_suffix(b"\r\n") else {
                return Err(if self.line.ends_with(b"\n") {
                    FrameError::MissingCarriageReturn
                } else {
                    FrameError::TruncatedHeader
                });
            };

            // Empty line marks end of headers
            if raw.is_empty() {
                break;
            }

            if !raw.is_ascii() {
                return Err(FrameError::NonAsciiHeader);
            }
            let line = String::from_utf8_lossy(raw);
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MissingColon(line.to_string()))?;

            match key.trim().to_ascii_lowercase().as_str() {
                "content-length" => {
                    let value = value.trim();
                    content_length = Some(
                        value
                            .parse()
                            .map_err(|_| FrameError::InvalidContentLength(value.to_string()))?,
                    );
                }
                "content-type" => content_type = Some(value.trim().to_string()),
                other => tracing::debug!("Ignore unknown header: {}", other),
            }
        }

        let content_length = content_length.ok_or(FrameError::MissingContentLength)?;
        Ok(Some((content_length, content_type)))
    }

    async fn read_content(&mut self, length: usize) -> Result<Vec<u8>, FrameError> {
        let mut content = vec![0u8; length];
        let mut filled = 0;

        while filled < length {
            let n = self.reader.read(&mut content[filled..]).await?;
            if n == 0 {
                return Err(FrameError::ShortRead {
                    expected: length,
                    actual: filled,
                });
            }
            filled += n;
        }

        Ok(content)
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Writes frames to a byte stream, flushing after each one
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame(&mut self, content: &[u8]) -> io::Result<()> {
        write_frame(&mut self.writer, content).await
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Write a payload with LSP framing and flush
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, content: &[u8]) -> io::Result<()> {
    tracing::trace!("Frame -> {} bytes", content.len());

    let header = format!("Content-Length: {}\r\n\r\n", content.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(content).await?;
    writer.flush().await
}
