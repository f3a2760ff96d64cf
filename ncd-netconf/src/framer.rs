//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Byte-stream framing state machine for NETCONF over SSH/TCP.
//!
//! Two framings are supported: the original end-of-message marker
//! (`]]>]]>`, base:1.0) and the RFC 6242 chunked framing negotiated once
//! both peers advertise `base:1.1`. The decoder is a pure state machine so
//! it can be driven byte-by-byte in tests without any actual I/O; `Framer`
//! wraps it around a tokio `AsyncRead`/`AsyncWrite` for real use.

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameMode {
    Eom,
    Chunked,
}

const EOM_MARKER: &[u8] = b"]]>]]>";

#[derive(Debug)]
enum ChunkState {
    // Waiting for the leading '\n' of either a chunk-size or end-of-chunks.
    ExpectNewline,
    // Saw '\n', waiting for '#'.
    ExpectHash,
    // Saw "\n#", waiting for a size digit or a second '#' (end marker).
    SizeOrEnd,
    // Accumulating decimal digits of a chunk-size.
    ReadingSize(u32),
    // Waiting for the '\n' that follows "\n##".
    ExpectEndNewline,
    // Copying `remaining` more bytes of chunk-data into the output buffer.
    ReadingData(u32),
}

#[derive(Debug)]
pub enum FramerError {
    // The chunked framing grammar was violated (bad size digit, missing
    // terminator, etc). This is always fatal to the connection.
    MalformedChunk(String),
    // The peer closed the connection with a frame started but not
    // terminated (a partial EOM marker match or mid-chunk state). Unlike a
    // clean EOF between messages, this always means a truncated message was
    // lost, so it's reported as an error rather than folded into `Ok(None)`.
    TruncatedAtEof,
}

impl fmt::Display for FramerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramerError::MalformedChunk(reason) => {
                write!(f, "malformed chunked framing: {}", reason)
            }
            FramerError::TruncatedAtEof => {
                write!(f, "connection closed with an unterminated frame in progress")
            }
        }
    }
}

impl std::error::Error for FramerError {}

/// A pure byte-at-a-time frame decoder, holding the only state that must
/// survive across `read()` calls on a connection: the current framing
/// mode, how far into the EOM marker or chunk grammar we've matched, and
/// the output buffer accumulated so far.
pub struct FrameDecoder {
    mode: FrameMode,
    eom_match: usize,
    chunk_state: ChunkState,
    output: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(mode: FrameMode) -> Self {
        FrameDecoder {
            mode,
            eom_match: 0,
            chunk_state: ChunkState::ExpectNewline,
            output: Vec::new(),
        }
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    /// True iff no partial frame is in progress: no bytes of a message have
    /// been buffered and, in chunked mode, the grammar is back at the start
    /// of a new chunk header. A clean EOF is only clean when this holds.
    pub fn is_idle(&self) -> bool {
        if !self.output.is_empty() {
            return false;
        }
        match self.mode {
            FrameMode::Eom => self.eom_match == 0,
            FrameMode::Chunked => matches!(self.chunk_state, ChunkState::ExpectNewline),
        }
    }

    /// Switches framing mode. Only valid between messages (callers switch
    /// right after negotiating `base:1.1` in the `<hello>` exchange).
    pub fn set_mode(&mut self, mode: FrameMode) {
        self.mode = mode;
        self.eom_match = 0;
        self.chunk_state = ChunkState::ExpectNewline;
        self.output.clear();
    }

    /// Feeds one byte of input. Returns `Ok(Some(message))` when a full
    /// message has just completed.
    pub fn feed(
        &mut self,
        byte: u8,
    ) -> Result<Option<Vec<u8>>, FramerError> {
        if byte == 0 {
            // Skip NUL bytes (e.g. from interactive terminals), as the
            // original framer does.
            return Ok(None);
        }
        match self.mode {
            FrameMode::Eom => Ok(self.feed_eom(byte)),
            FrameMode::Chunked => self.feed_chunked(byte),
        }
    }

    fn feed_eom(&mut self, byte: u8) -> Option<Vec<u8>> {
        self.output.push(byte);
        if byte == EOM_MARKER[self.eom_match] {
            self.eom_match += 1;
            if self.eom_match == EOM_MARKER.len() {
                self.eom_match = 0;
                let mut message = std::mem::take(&mut self.output);
                message.truncate(message.len() - EOM_MARKER.len());
                return Some(message);
            }
        } else {
            // Restart the marker match; note this is a simple restart, not
            // a full KMP backtrack, which is sufficient since the marker
            // has no self-overlap ("]]>]]>").
            self.eom_match = usize::from(byte == EOM_MARKER[0]);
        }
        None
    }

    fn feed_chunked(
        &mut self,
        byte: u8,
    ) -> Result<Option<Vec<u8>>, FramerError> {
        match self.chunk_state {
            ChunkState::ExpectNewline => {
                if byte != b'\n' {
                    return Err(FramerError::MalformedChunk(
                        "expected newline before chunk-size".to_owned(),
                    ));
                }
                self.chunk_state = ChunkState::ExpectHash;
                Ok(None)
            }
            ChunkState::ExpectHash => {
                if byte != b'#' {
                    return Err(FramerError::MalformedChunk(
                        "expected '#' after newline".to_owned(),
                    ));
                }
                self.chunk_state = ChunkState::SizeOrEnd;
                Ok(None)
            }
            ChunkState::SizeOrEnd => {
                if byte == b'#' {
                    self.chunk_state = ChunkState::ExpectEndNewline;
                    Ok(None)
                } else if byte.is_ascii_digit() && byte != b'0' {
                    self.chunk_state =
                        ChunkState::ReadingSize(u32::from(byte - b'0'));
                    Ok(None)
                } else {
                    Err(FramerError::MalformedChunk(
                        "expected chunk-size digit or '#'".to_owned(),
                    ))
                }
            }
            ChunkState::ReadingSize(accum) => {
                if byte == b'\n' {
                    self.chunk_state = ChunkState::ReadingData(accum);
                    Ok(None)
                } else if byte.is_ascii_digit() {
                    let accum = accum
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(u32::from(byte - b'0')))
                        .ok_or_else(|| {
                            FramerError::MalformedChunk(
                                "chunk-size overflow".to_owned(),
                            )
                        })?;
                    self.chunk_state = ChunkState::ReadingSize(accum);
                    Ok(None)
                } else {
                    Err(FramerError::MalformedChunk(
                        "expected digit or newline in chunk-size".to_owned(),
                    ))
                }
            }
            ChunkState::ExpectEndNewline => {
                if byte != b'\n' {
                    return Err(FramerError::MalformedChunk(
                        "expected newline after \"##\"".to_owned(),
                    ));
                }
                self.chunk_state = ChunkState::ExpectNewline;
                Ok(Some(std::mem::take(&mut self.output)))
            }
            ChunkState::ReadingData(remaining) => {
                self.output.push(byte);
                if remaining == 1 {
                    self.chunk_state = ChunkState::ExpectNewline;
                } else {
                    self.chunk_state = ChunkState::ReadingData(remaining - 1);
                }
                Ok(None)
            }
        }
    }
}

/// Wraps a `FrameDecoder` around an async transport. Transport-agnostic: it
/// only needs `AsyncRead`/`AsyncWrite`, so it drives a Unix socket, a TCP
/// stream, or an in-memory duplex pipe identically.
pub struct Framer<S> {
    io: S,
    decoder: FrameDecoder,
    read_buf: [u8; 4096],
}

#[derive(Debug)]
pub enum FramerIoError {
    Io(std::io::Error),
    Framing(FramerError),
}

impl fmt::Display for FramerIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramerIoError::Io(e) => write!(f, "{}", e),
            FramerIoError::Framing(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FramerIoError {}

impl<S> Framer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: S, mode: FrameMode) -> Self {
        Framer {
            io,
            decoder: FrameDecoder::new(mode),
            read_buf: [0; 4096],
        }
    }

    pub fn mode(&self) -> FrameMode {
        self.decoder.mode()
    }

    pub fn set_mode(&mut self, mode: FrameMode) {
        self.decoder.set_mode(mode);
    }

    /// Reads until a full message is framed, or returns `Ok(None)` on a
    /// clean EOF (including the protocol-level EOF aliases the IPC channel
    /// also treats as clean: a reset connection mid-read) between messages.
    /// An EOF with a frame already started — an unterminated EOM marker
    /// match or a chunk grammar not back at its start state — is instead
    /// reported as [`FramerError::TruncatedAtEof`], since a message was
    /// plainly lost rather than the peer simply having nothing more to say.
    pub async fn read_message(
        &mut self,
    ) -> Result<Option<Vec<u8>>, FramerIoError> {
        loop {
            let n = match self.io.read(&mut self.read_buf).await {
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::ConnectionReset
                            | std::io::ErrorKind::BrokenPipe
                    ) =>
                {
                    0
                }
                Err(e) => return Err(FramerIoError::Io(e)),
            };
            if n == 0 {
                if self.decoder.is_idle() {
                    return Ok(None);
                }
                return Err(FramerIoError::Framing(FramerError::TruncatedAtEof));
            }
            for &byte in &self.read_buf[..n] {
                if let Some(message) = self
                    .decoder
                    .feed(byte)
                    .map_err(FramerIoError::Framing)?
                {
                    return Ok(Some(message));
                }
            }
        }
    }

    pub async fn write_message(
        &mut self,
        body: &[u8],
    ) -> Result<(), FramerIoError> {
        match self.decoder.mode() {
            FrameMode::Eom => {
                self.io.write_all(body).await.map_err(FramerIoError::Io)?;
                self.io
                    .write_all(EOM_MARKER)
                    .await
                    .map_err(FramerIoError::Io)?;
            }
            FrameMode::Chunked => {
                let header = format!("\n#{}\n", body.len());
                self.io
                    .write_all(header.as_bytes())
                    .await
                    .map_err(FramerIoError::Io)?;
                self.io.write_all(body).await.map_err(FramerIoError::Io)?;
                self.io
                    .write_all(b"\n##\n")
                    .await
                    .map_err(FramerIoError::Io)?;
            }
        }
        self.io.flush().await.map_err(FramerIoError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(decoder: &mut FrameDecoder, bytes: &[u8]) -> Option<Vec<u8>> {
        let mut last = None;
        for &b in bytes {
            if let Some(msg) = decoder.feed(b).unwrap() {
                last = Some(msg);
            }
        }
        last
    }

    #[test]
    fn eom_frames_a_simple_message() {
        let mut decoder = FrameDecoder::new(FrameMode::Eom);
        let msg = feed_all(&mut decoder, b"<hello/>]]>]]>");
        assert_eq!(msg.unwrap(), b"<hello/>");
    }

    #[test]
    fn eom_skips_nul_bytes() {
        let mut decoder = FrameDecoder::new(FrameMode::Eom);
        let msg = feed_all(&mut decoder, b"<a\0b/>]]>]]>");
        assert_eq!(msg.unwrap(), b"<ab/>");
    }

    #[test]
    fn chunked_frames_single_chunk_message() {
        let mut decoder = FrameDecoder::new(FrameMode::Chunked);
        let msg = feed_all(&mut decoder, b"\n#8\n<hello/>\n##\n");
        assert_eq!(msg.unwrap(), b"<hello/>");
    }

    #[test]
    fn chunked_frames_multiple_chunks() {
        let mut decoder = FrameDecoder::new(FrameMode::Chunked);
        let msg = feed_all(&mut decoder, b"\n#3\n<a>\n#4\n</a>\n##\n");
        assert_eq!(msg.unwrap(), b"<a></a>");
    }

    #[test]
    fn chunked_rejects_leading_zero_size() {
        let mut decoder = FrameDecoder::new(FrameMode::Chunked);
        let mut err = None;
        for &b in b"\n#0" {
            if let Err(e) = decoder.feed(b) {
                err = Some(e);
                break;
            }
        }
        assert!(err.is_some());
    }

    #[test]
    fn eom_decoder_is_idle_only_between_messages() {
        let mut decoder = FrameDecoder::new(FrameMode::Eom);
        assert!(decoder.is_idle());
        feed_all(&mut decoder, b"<hello/>");
        assert!(!decoder.is_idle());
        feed_all(&mut decoder, b"]]>]]>");
        assert!(decoder.is_idle());
    }

    #[test]
    fn chunked_decoder_is_idle_only_between_messages() {
        let mut decoder = FrameDecoder::new(FrameMode::Chunked);
        assert!(decoder.is_idle());
        feed_all(&mut decoder, b"\n#8\n<hello/>");
        assert!(!decoder.is_idle());
        feed_all(&mut decoder, b"\n##\n");
        assert!(decoder.is_idle());
    }

    #[tokio::test]
    async fn read_message_errors_on_eof_mid_frame() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut framer = Framer::new(server, FrameMode::Eom);

        client.write_all(b"<hello/>]]>").await.unwrap();
        drop(client);

        let err = framer.read_message().await.unwrap_err();
        assert!(matches!(
            err,
            FramerIoError::Framing(FramerError::TruncatedAtEof)
        ));
    }

    #[tokio::test]
    async fn read_message_returns_none_on_clean_eof_between_frames() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut framer = Framer::new(server, FrameMode::Eom);

        client.write_all(b"<hello/>]]>]]>").await.unwrap();
        let msg = framer.read_message().await.unwrap().unwrap();
        assert_eq!(msg, b"<hello/>");

        drop(client);
        assert!(framer.read_message().await.unwrap().is_none());
    }
}
