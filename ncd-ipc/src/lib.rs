//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Internal IPC channel between the backend and its clients (the NETCONF
//! and RESTCONF frontends, and any other process embedding a client
//! library).
//!
//! Wire frame: `op_len: u32 be | op_id: u32 be | body | NUL`, where
//! `op_len` counts the whole frame including the 8-byte header and the
//! trailing NUL. `op_id == 0` is reserved for asynchronous notifications,
//! sent without waiting for a corresponding request, exactly as the
//! original protocol's `send_msg_notify` does.
//!
//! "Atomic I/O": reads and writes retry on `Interrupted`/`WouldBlock`
//! rather than surfacing them to the caller, and `ConnectionReset`/
//! `BrokenPipe` are treated as a clean end-of-stream instead of an error,
//! matching `atomicio()`'s `switch (errno)` in the original transport.

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};

const HEADER_LEN: usize = 8;

/// Either end of the channel, selectable at connect time via
/// `CLICON_SOCK_FAMILY`.
pub enum Transport {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Unix(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            Transport::Tcp(s) => std::pin::Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Unix(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            Transport::Tcp(s) => std::pin::Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Unix(s) => std::pin::Pin::new(s).poll_flush(cx),
            Transport::Tcp(s) => std::pin::Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Unix(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            Transport::Tcp(s) => std::pin::Pin::new(s).poll_shutdown(cx),
        }
    }
}

#[derive(Debug)]
pub enum ChannelError {
    Io(std::io::Error),
    // `op_len` in a received header was smaller than the 8-byte header
    // itself, or the body was missing its trailing NUL.
    Malformed,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Io(e) => write!(f, "{}", e),
            ChannelError::Malformed => write!(f, "malformed IPC frame"),
        }
    }
}

impl std::error::Error for ChannelError {}

fn is_clean_eof(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
    ) || e.raw_os_error() == Some(libc::EBADF)
}

/// A received message: `op_id == 0` is an async notification, any other
/// value is a reply correlated by the caller's own request/response
/// bookkeeping (the wire format carries no separate correlation id beyond
/// `op_id`, mirroring the original protocol).
pub struct Message {
    pub op_id: u32,
    pub body: Vec<u8>,
}

pub struct Channel<S> {
    io: S,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: S) -> Self {
        Channel { io }
    }

    /// Reads one frame, retrying `Interrupted`/`WouldBlock` and mapping
    /// `ConnectionReset`/`BrokenPipe`/`EBADF` to a clean `Ok(None)` EOF.
    pub async fn recv(&mut self) -> Result<Option<Message>, ChannelError> {
        let mut header = [0u8; HEADER_LEN];
        if !self.read_atomic(&mut header).await? {
            return Ok(None);
        }
        let op_len = u32::from_be_bytes(header[0..4].try_into().unwrap()) as usize;
        let op_id = u32::from_be_bytes(header[4..8].try_into().unwrap());
        if op_len < HEADER_LEN {
            return Err(ChannelError::Malformed);
        }
        let mut body = vec![0u8; op_len - HEADER_LEN];
        if !body.is_empty() && !self.read_atomic(&mut body).await? {
            return Err(ChannelError::Malformed);
        }
        if body.pop() != Some(0) {
            return Err(ChannelError::Malformed);
        }
        Ok(Some(Message { op_id, body }))
    }

    /// Fills `buf` completely, retrying `Interrupted`/`WouldBlock`.
    /// Returns `Ok(false)` if the peer closed the connection before any
    /// byte of `buf` was read (a clean EOF at a message boundary);
    /// returns `Err` if it closed partway through (a truncated frame).
    async fn read_atomic(&mut self, buf: &mut [u8]) -> Result<bool, ChannelError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.io.read(&mut buf[filled..]).await {
                Ok(0) => {
                    return if filled == 0 {
                        Ok(false)
                    } else {
                        Err(ChannelError::Malformed)
                    };
                }
                Ok(n) => filled += n,
                Err(e) if is_clean_eof(&e) => {
                    return if filled == 0 {
                        Ok(false)
                    } else {
                        Err(ChannelError::Malformed)
                    };
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::Interrupted
                            | std::io::ErrorKind::WouldBlock
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(ChannelError::Io(e)),
            }
        }
        Ok(true)
    }

    pub async fn send(&mut self, op_id: u32, body: &[u8]) -> Result<(), ChannelError> {
        let op_len = (HEADER_LEN + body.len() + 1) as u32;
        let mut frame = Vec::with_capacity(op_len as usize);
        frame.extend_from_slice(&op_len.to_be_bytes());
        frame.extend_from_slice(&op_id.to_be_bytes());
        frame.extend_from_slice(body);
        frame.push(0);
        self.write_atomic(&frame).await
    }

    /// Sends an asynchronous notification (`op_id = 0`), the same framing
    /// used for request/reply messages but never awaited for a reply.
    pub async fn notify(&mut self, body: &[u8]) -> Result<(), ChannelError> {
        self.send(0, body).await
    }

    async fn write_atomic(&mut self, buf: &[u8]) -> Result<(), ChannelError> {
        let mut written = 0;
        while written < buf.len() {
            match self.io.write(&buf[written..]).await {
                Ok(0) => return Err(ChannelError::Malformed),
                Ok(n) => written += n,
                Err(e) if is_clean_eof(&e) => return Err(ChannelError::Malformed),
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::Interrupted
                            | std::io::ErrorKind::WouldBlock
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(ChannelError::Io(e)),
            }
        }
        self.io.flush().await.map_err(ChannelError::Io)
    }
}

/// Best-effort extraction of a notification's topic (its top-level element
/// name) for client-side demultiplexing, without pulling in a full XML
/// parser: notifications are demuxed by interested clients subscribing to
/// a name, not by strict request/reply alternation, so a cheap scan is
/// enough.
pub fn notification_topic(body: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(body).ok()?;
    let start = text.find('<')? + 1;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')?;
    let name = &rest[..end];
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn send_then_recv_round_trips() {
        let (client_io, server_io) = duplex(4096);
        let mut client = Channel::new(client_io);
        let mut server = Channel::new(server_io);

        client.send(7, b"<get/>").await.unwrap();
        let message = server.recv().await.unwrap().unwrap();
        assert_eq!(message.op_id, 7);
        assert_eq!(message.body, b"<get/>");
    }

    #[tokio::test]
    async fn notify_uses_op_id_zero() {
        let (client_io, server_io) = duplex(4096);
        let mut client = Channel::new(client_io);
        let mut server = Channel::new(server_io);

        client.notify(b"<config-change/>").await.unwrap();
        let message = server.recv().await.unwrap().unwrap();
        assert_eq!(message.op_id, 0);
    }

    #[tokio::test]
    async fn dropped_peer_is_a_clean_eof() {
        let (client_io, server_io) = duplex(4096);
        drop(client_io);
        let mut server = Channel::new(server_io);
        assert!(server.recv().await.unwrap().is_none());
    }

    #[test]
    fn topic_is_the_root_element_name() {
        assert_eq!(
            notification_topic(b"<config-change><path>/a</path></config-change>"),
            Some("config-change")
        );
    }
}
