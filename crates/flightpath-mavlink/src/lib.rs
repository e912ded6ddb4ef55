//! `flightpath-mavlink` – MAVLink vehicle-protocol client.
//!
//! Turns the lossy, asynchronous message stream of a PX4 vehicle into a
//! thread-safe telemetry snapshot, fire-and-forget commands and a
//! timeout-bounded mission upload.
//!
//! # Modules
//!
//! - [`client`] – [`Client`][client::Client]: owns the connection state, the
//!   inbound-processing task and the ground-station announcer, and exposes
//!   connection, command and mission operations.
//! - [`transport`] – [`MessageTransport`][transport::MessageTransport]: the
//!   seam between the client and whatever parses frames, plus
//!   [`ConnectionDescriptor`][transport::ConnectionDescriptor].
//! - [`wire`] – [`MavlinkTransport`][wire::MavlinkTransport]: MAVLink v2
//!   framing via the `mavlink` crate over a raw link (serial, UDP, TCP).
//! - [`message`] – the closed sets of inbound and outbound message shapes.
//! - [`liveness`] – heartbeat-derived connected/armed state with a staleness
//!   window.
//! - [`telemetry`] – [`TelemetrySnapshot`][telemetry::TelemetrySnapshot] and
//!   unit conversion.
//! - [`command`] – COMMAND_LONG and position-setpoint encoding, ack decoding.
//! - [`mode`] – PX4 custom-mode codec.
//! - [`mission`] – upload session state and mission progress.
//! - [`announcer`] – periodic GCS heartbeat and SYSTEM_TIME.
//! - [`config`] – [`ClientConfig`][config::ClientConfig].

pub mod announcer;
pub mod client;
pub mod command;
pub mod config;
mod link;
pub mod liveness;
pub mod message;
pub mod mission;
pub mod mode;
pub mod telemetry;
pub mod transport;
pub mod wire;

#[cfg(test)]
mod mock;

pub use client::{Client, ConnectionInfo};
pub use config::ClientConfig;
pub use message::{GcsMessage, InboundFrame, VehicleMessage};
pub use mission::{MissionProgress, ProgressStatus};
pub use telemetry::{TelemetryReport, TelemetrySnapshot};
pub use transport::{ConnectionDescriptor, MessageTransport};
pub use wire::MavlinkTransport;
