//! TCP socket ownership wrappers.
//!
//! [`Socket`] owns exactly one connected, non-blocking stream; [`Listener`]
//! owns the server's accept socket. A `Socket` is deliberately move-only:
//! transferring it transfers the handle, and there is no way to end up
//! with two owners of one descriptor.
//!
//! Packet I/O is frame-exact: the fixed header goes first, then exactly
//! `payload_len` bytes. Partial transfers are retried in a bounded loop
//! with a deadline; a stalled peer surfaces as [`NetError::Timeout`] rather
//! than wedging the frame driver forever.

use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::frame::{FrameError, Packet, PacketHeader};
use crate::core::constants::{CONNECT_TIMEOUT, IO_DEADLINE, IO_RETRY_DELAY, PACKET_HEADER_SIZE};
use crate::core::{NetError, NetResult};

/// Owner of one connected stream socket.
#[derive(Debug)]
pub struct Socket {
    stream: TcpStream,
    peer: SocketAddr,
    last_heard_from: Instant,
    last_spoken: Instant,
}

impl Socket {
    /// Resolve `hostname` and open a TCP connection to it.
    ///
    /// Addresses matching the preferred family are tried first; each
    /// attempt is bounded by `CONNECT_TIMEOUT`. On success the stream is
    /// switched non-blocking and Nagle's algorithm is disabled. Failure
    /// leaves no socket behind.
    pub fn connect(hostname: &str, port: u16, prefer_ipv6: bool) -> NetResult<Self> {
        let resolved: Vec<SocketAddr> = (hostname, port)
            .to_socket_addrs()
            .map_err(|e| NetError::Connect(format!("cannot resolve {hostname}: {e}")))?
            .collect();
        if resolved.is_empty() {
            return Err(NetError::Connect(format!("no addresses for {hostname}")));
        }

        let mut ordered: Vec<SocketAddr> = resolved
            .iter()
            .copied()
            .filter(|a| a.is_ipv6() == prefer_ipv6)
            .collect();
        ordered.extend(resolved.iter().copied().filter(|a| a.is_ipv6() != prefer_ipv6));

        let mut last_error = None;
        for addr in ordered {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    debug!(%addr, "connected to {hostname}:{port}");
                    return Self::from_stream(stream);
                }
                Err(e) => last_error = Some((addr, e)),
            }
        }

        let (addr, e) = last_error.expect("at least one address was tried");
        Err(NetError::Connect(format!("{hostname}:{port} via {addr}: {e}")))
    }

    /// Wrap a freshly accepted stream.
    pub(crate) fn from_accepted(stream: TcpStream) -> NetResult<Self> {
        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> NetResult<Self> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        let peer = stream.peer_addr()?;
        let now = Instant::now();
        Ok(Self {
            stream,
            peer,
            last_heard_from: now,
            last_spoken: now,
        })
    }

    /// The remote address, for logging.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Zero-timeout readiness poll. Never blocks.
    ///
    /// Reports ready on orderly peer shutdown and on socket errors as
    /// well, so that the following [`read_packet`](Self::read_packet)
    /// surfaces the condition instead of it going unnoticed.
    pub fn select(&self) -> bool {
        let mut probe = [0u8; 1];
        match self.stream.peek(&mut probe) {
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(_) => true,
        }
    }

    /// Write one packet, header first, then exactly the payload.
    ///
    /// The header's declared length must match the payload; a mismatch is
    /// caught here before anything touches the wire.
    pub fn send_packet(&mut self, packet: &Packet) -> NetResult<()> {
        if packet.payload.len() != packet.header.payload_len as usize {
            return Err(FrameError::LengthMismatch {
                declared: packet.header.payload_len as usize,
                actual: packet.payload.len(),
            }
            .into());
        }

        self.write_entire(&packet.header.to_bytes())?;
        self.write_entire(&packet.payload)?;
        self.last_spoken = Instant::now();
        trace!(
            peer = %self.peer,
            packet_type = packet.header.packet_type,
            len = packet.header.payload_len,
            "sent packet"
        );
        Ok(())
    }

    /// Read one packet, header first, then exactly the declared payload.
    ///
    /// A read of zero bytes is orderly peer shutdown
    /// ([`NetError::PeerClosed`]), not a retryable short read.
    pub fn read_packet(&mut self) -> NetResult<Packet> {
        let mut head = [0u8; PACKET_HEADER_SIZE];
        self.read_entire(&mut head)?;
        let header = PacketHeader::from_bytes(&head)?;

        let mut payload = vec![0u8; header.payload_len as usize];
        self.read_entire(&mut payload)?;

        self.last_heard_from = Instant::now();
        trace!(
            peer = %self.peer,
            packet_type = header.packet_type,
            len = header.payload_len,
            "read packet"
        );
        Ok(Packet { header, payload })
    }

    fn read_entire(&mut self, buf: &mut [u8]) -> NetResult<()> {
        let deadline = Instant::now() + IO_DEADLINE;
        let mut filled = 0;
        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(NetError::PeerClosed),
                Ok(n) => filled += n,
                Err(e) if retryable(e.kind()) => {
                    if Instant::now() >= deadline {
                        return Err(NetError::Timeout);
                    }
                    std::thread::sleep(IO_RETRY_DELAY);
                }
                Err(e) => return Err(NetError::Io(e)),
            }
        }
        Ok(())
    }

    fn write_entire(&mut self, buf: &[u8]) -> NetResult<()> {
        let deadline = Instant::now() + IO_DEADLINE;
        let mut written = 0;
        while written < buf.len() {
            match self.stream.write(&buf[written..]) {
                Ok(0) => return Err(NetError::PeerClosed),
                Ok(n) => written += n,
                Err(e) if retryable(e.kind()) => {
                    if Instant::now() >= deadline {
                        return Err(NetError::Timeout);
                    }
                    std::thread::sleep(IO_RETRY_DELAY);
                }
                Err(e) => return Err(NetError::Io(e)),
            }
        }
        Ok(())
    }

    /// Close the connection. Idempotent: closing an already-closed socket
    /// is a no-op, not an error.
    pub fn disconnect(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    /// Time since the peer was last heard from.
    pub fn idle_for(&self) -> Duration {
        self.last_heard_from.elapsed()
    }

    /// Time since we last spoke to the peer.
    pub fn quiet_for(&self) -> Duration {
        self.last_spoken.elapsed()
    }
}

fn retryable(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

/// Owner of the server's listening socket.
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
}

impl Listener {
    /// Bind and listen on the wildcard address for the given family.
    ///
    /// `backlog` is a hint only; std applies the OS listen default.
    pub fn start(port: u16, backlog: u32, ipv6: bool) -> NetResult<Self> {
        let addr: SocketAddr = if ipv6 {
            (Ipv6Addr::UNSPECIFIED, port).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, port).into()
        };

        let listener =
            TcpListener::bind(addr).map_err(|e| NetError::Bind(format!("{addr}: {e}")))?;
        listener.set_nonblocking(true)?;
        debug!(%addr, backlog, "listening");
        Ok(Self { listener })
    }

    /// Non-blocking accept. Returns `Ok(None)` when nothing is pending;
    /// never blocks the caller.
    pub fn check_pending(&self) -> NetResult<Option<Socket>> {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                debug!(%addr, "accepted connection");
                Ok(Some(Socket::from_accepted(stream)?))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The bound local address (port 0 resolves to the real port).
    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
