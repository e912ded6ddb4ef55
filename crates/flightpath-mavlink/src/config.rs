//! [`ClientConfig`] – knobs for one vehicle connection.

use std::time::Duration;

use crate::transport::ConnectionDescriptor;

/// MAVLink system id conventionally used by ground stations.
pub const DEFAULT_GCS_SYSTEM_ID: u8 = 255;
/// MAV_COMP_ID_MISSIONPLANNER.
pub const DEFAULT_GCS_COMPONENT_ID: u8 = 190;
pub const DEFAULT_ANNOUNCE_PERIOD: Duration = Duration::from_secs(1);
/// The link is considered dead after this much heartbeat silence.
pub const DEFAULT_HEARTBEAT_STALENESS: Duration = Duration::from_secs(3);
pub const DEFAULT_MISSION_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_STREAM_RATE_HZ: u16 = 10;

/// Configuration for a [`Client`][crate::Client].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use flightpath_mavlink::{ClientConfig, ConnectionDescriptor};
///
/// let cfg = ClientConfig::new(ConnectionDescriptor::UdpListen {
///     address: "0.0.0.0:14540".into(),
/// })
/// .with_mission_upload_timeout(Duration::from_secs(10));
///
/// assert_eq!(cfg.gcs_system_id, 255);
/// assert_eq!(cfg.mission_upload_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connection: ConnectionDescriptor,
    pub gcs_system_id: u8,
    pub gcs_component_id: u8,
    pub announce_period: Duration,
    pub heartbeat_staleness: Duration,
    pub mission_upload_timeout: Duration,
    pub stream_rate_hz: u16,
}

impl ClientConfig {
    pub fn new(connection: ConnectionDescriptor) -> Self {
        Self {
            connection,
            gcs_system_id: DEFAULT_GCS_SYSTEM_ID,
            gcs_component_id: DEFAULT_GCS_COMPONENT_ID,
            announce_period: DEFAULT_ANNOUNCE_PERIOD,
            heartbeat_staleness: DEFAULT_HEARTBEAT_STALENESS,
            mission_upload_timeout: DEFAULT_MISSION_UPLOAD_TIMEOUT,
            stream_rate_hz: DEFAULT_STREAM_RATE_HZ,
        }
    }

    pub fn with_gcs_ids(mut self, system_id: u8, component_id: u8) -> Self {
        self.gcs_system_id = system_id;
        self.gcs_component_id = component_id;
        self
    }

    pub fn with_announce_period(mut self, period: Duration) -> Self {
        self.announce_period = period;
        self
    }

    pub fn with_heartbeat_staleness(mut self, window: Duration) -> Self {
        self.heartbeat_staleness = window;
        self
    }

    pub fn with_mission_upload_timeout(mut self, timeout: Duration) -> Self {
        self.mission_upload_timeout = timeout;
        self
    }

    pub fn with_stream_rate(mut self, rate_hz: u16) -> Self {
        self.stream_rate_hz = rate_hz;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ClientConfig::new(ConnectionDescriptor::Serial {
            device: "/dev/ttyUSB0".into(),
            baud_rate: 57600,
        });
        assert_eq!(cfg.gcs_system_id, 255);
        assert_eq!(cfg.gcs_component_id, 190);
        assert_eq!(cfg.announce_period, Duration::from_secs(1));
        assert_eq!(cfg.heartbeat_staleness, Duration::from_secs(3));
        assert_eq!(cfg.mission_upload_timeout, Duration::from_secs(30));
        assert_eq!(cfg.stream_rate_hz, 10);
    }
}
