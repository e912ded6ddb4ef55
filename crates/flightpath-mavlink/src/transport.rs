//! The message-transport seam.
//!
//! The client never opens sockets or serial ports itself.  It talks to a
//! [`MessageTransport`], which already parses inbound frames into
//! [`InboundFrame`]s and serialises outbound [`GcsMessage`]s.
//!
//! - [`MavlinkTransport`][crate::wire::MavlinkTransport] – the real transport:
//!   MAVLink 2 framing over a serial port or socket.
//! - `MockTransport` (tests only) – records sends and replays injected frames.

use std::fmt;

use async_trait::async_trait;
use flightpath_types::GatewayError;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::message::{GcsMessage, InboundFrame};

/// Every vehicle link must implement this trait.
///
/// # Contract
///
/// * `send` – broadcast one typed message.  Fails with
///   [`GatewayError::SendFailed`] once the transport is closed or when the
///   endpoint is unreachable.
///
/// * `events` – the in-order stream of decoded inbound frames.  It ends when
///   the transport closes.  The stream can be taken once; later calls return
///   an empty stream.
///
/// * `close` – release the endpoint.  Idempotent.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, message: GcsMessage) -> Result<(), GatewayError>;

    async fn events(&self) -> BoxStream<'static, InboundFrame>;

    async fn close(&self);
}

/// Where the vehicle lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionDescriptor {
    Serial { device: String, baud_rate: u32 },
    /// Listen for the vehicle on a local UDP socket (e.g. `0.0.0.0:14540`).
    UdpListen { address: String },
    UdpConnect { address: String },
    TcpConnect { address: String },
}

impl ConnectionDescriptor {
    /// `mavlink`-style address string (`udpin:host:port`, `serial:dev:baud`),
    /// used in logs and errors.
    pub fn address(&self) -> String {
        match self {
            ConnectionDescriptor::Serial { device, baud_rate } => {
                format!("serial:{device}:{baud_rate}")
            }
            ConnectionDescriptor::UdpListen { address } => format!("udpin:{address}"),
            ConnectionDescriptor::UdpConnect { address } => format!("udpout:{address}"),
            ConnectionDescriptor::TcpConnect { address } => format!("tcpout:{address}"),
        }
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}
