//! Raw byte links to the vehicle.
//!
//! Every endpoint is opened with a read timeout of [`READ_POLL`], so a reader
//! blocked on an idle link wakes up often enough to notice that its transport
//! was closed.  Each link is split into a read half, owned by the reader
//! thread, and a write half, owned by the transport.  The OS endpoint is
//! released once both halves are dropped.

use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serialport::SerialPort;

use crate::transport::ConnectionDescriptor;

/// Upper bound on how long a read blocks before returning `WouldBlock` /
/// `TimedOut`.
pub(crate) const READ_POLL: Duration = Duration::from_millis(100);

/// Where UDP writes go.
pub(crate) enum Peer {
    Fixed(SocketAddr),
    /// Learned from the source of the latest datagram.
    Learned(Arc<Mutex<Option<SocketAddr>>>),
}

pub(crate) enum LinkReader {
    Udp {
        socket: UdpSocket,
        learned_peer: Option<Arc<Mutex<Option<SocketAddr>>>>,
    },
    Tcp(TcpStream),
    Serial(Box<dyn SerialPort>),
}

pub(crate) enum LinkWriter {
    Udp { socket: UdpSocket, peer: Peer },
    Tcp(TcpStream),
    Serial(Box<dyn SerialPort>),
}

/// Open `descriptor` and split it into its two halves.
///
/// Blocking: TCP connects and serial opens happen here.
pub(crate) fn open(descriptor: &ConnectionDescriptor) -> io::Result<(LinkReader, LinkWriter)> {
    match descriptor {
        ConnectionDescriptor::UdpListen { address } => {
            let socket = UdpSocket::bind(resolve(address)?)?;
            socket.set_read_timeout(Some(READ_POLL))?;
            let learned = Arc::new(Mutex::new(None));
            let reader = LinkReader::Udp {
                socket: socket.try_clone()?,
                learned_peer: Some(Arc::clone(&learned)),
            };
            let writer = LinkWriter::Udp {
                socket,
                peer: Peer::Learned(learned),
            };
            Ok((reader, writer))
        }
        ConnectionDescriptor::UdpConnect { address } => {
            let peer = resolve(address)?;
            let unspecified = if peer.is_ipv4() {
                IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            } else {
                IpAddr::V6(Ipv6Addr::UNSPECIFIED)
            };
            let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0))?;
            socket.set_read_timeout(Some(READ_POLL))?;
            let reader = LinkReader::Udp {
                socket: socket.try_clone()?,
                learned_peer: None,
            };
            let writer = LinkWriter::Udp {
                socket,
                peer: Peer::Fixed(peer),
            };
            Ok((reader, writer))
        }
        ConnectionDescriptor::TcpConnect { address } => {
            let stream = TcpStream::connect(resolve(address)?)?;
            stream.set_read_timeout(Some(READ_POLL))?;
            stream.set_nodelay(true)?;
            Ok((LinkReader::Tcp(stream.try_clone()?), LinkWriter::Tcp(stream)))
        }
        ConnectionDescriptor::Serial { device, baud_rate } => {
            let port = serialport::new(device.as_str(), *baud_rate)
                .timeout(READ_POLL)
                .open()?;
            let reader = port.try_clone()?;
            Ok((LinkReader::Serial(reader), LinkWriter::Serial(port)))
        }
    }
}

fn resolve(address: &str) -> io::Result<SocketAddr> {
    address.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{address} does not resolve"),
        )
    })
}

impl LinkReader {
    /// Read whatever is available into `buf`.  A UDP read returns one
    /// datagram.
    ///
    /// # Errors
    ///
    /// `WouldBlock` / `TimedOut` when nothing arrived within [`READ_POLL`];
    /// `UnexpectedEof` when a TCP peer hung up.
    pub(crate) fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            LinkReader::Udp {
                socket,
                learned_peer,
            } => {
                let (n, source) = socket.recv_from(buf)?;
                if let Some(peer) = learned_peer {
                    *peer.lock() = Some(source);
                }
                Ok(n)
            }
            LinkReader::Tcp(stream) => match stream.read(buf)? {
                0 => Err(io::ErrorKind::UnexpectedEof.into()),
                n => Ok(n),
            },
            LinkReader::Serial(port) => port.read(buf),
        }
    }
}

impl LinkWriter {
    /// Write one serialised frame.  Returns `false` when a UDP listener has
    /// not heard from anyone yet and so has nowhere to send.
    pub(crate) fn write_frame(&mut self, frame: &[u8]) -> io::Result<bool> {
        match self {
            LinkWriter::Udp { socket, peer } => {
                let target = match peer {
                    Peer::Fixed(addr) => Some(*addr),
                    Peer::Learned(learned) => *learned.lock(),
                };
                match target {
                    Some(addr) => {
                        socket.send_to(frame, addr)?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            LinkWriter::Tcp(stream) => {
                stream.write_all(frame)?;
                Ok(true)
            }
            LinkWriter::Serial(port) => {
                port.write_all(frame)?;
                port.flush()?;
                Ok(true)
            }
        }
    }
}
