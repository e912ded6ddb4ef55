//! `flightpath-types` – protocol-agnostic drone vocabulary.
//!
//! Everything above the vehicle-protocol boundary speaks in these types:
//! generic flight modes, mission waypoints, and the [`GatewayError`]
//! taxonomy.  Protocol clients (e.g. `flightpath-mavlink`) translate them into
//! their own wire representation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Flight modes understood by the gateway, independent of any autopilot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightMode {
    /// Full manual control.
    Manual,
    /// Attitude stabilisation.
    Stabilized,
    AltitudeHold,
    /// Holds GPS position when sticks are centred.
    PositionHold,
    /// Vehicle accepts externally supplied setpoints (PX4 OFFBOARD).
    Guided,
    /// Executes the uploaded mission.
    Auto,
    ReturnHome,
    Land,
    Takeoff,
    Loiter,
}

impl FlightMode {
    /// Every mode, in declaration order.
    pub const ALL: [FlightMode; 10] = [
        FlightMode::Manual,
        FlightMode::Stabilized,
        FlightMode::AltitudeHold,
        FlightMode::PositionHold,
        FlightMode::Guided,
        FlightMode::Auto,
        FlightMode::ReturnHome,
        FlightMode::Land,
        FlightMode::Takeoff,
        FlightMode::Loiter,
    ];

    fn as_str(self) -> &'static str {
        match self {
            FlightMode::Manual => "MANUAL",
            FlightMode::Stabilized => "STABILIZED",
            FlightMode::AltitudeHold => "ALTITUDE_HOLD",
            FlightMode::PositionHold => "POSITION_HOLD",
            FlightMode::Guided => "GUIDED",
            FlightMode::Auto => "AUTO",
            FlightMode::ReturnHome => "RETURN_HOME",
            FlightMode::Land => "LAND",
            FlightMode::Takeoff => "TAKEOFF",
            FlightMode::Loiter => "LOITER",
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlightMode {
    type Err = String;

    /// Case-insensitive; accepts `-` or `_` as separators and the common
    /// aliases `offboard`, `rtl`, `poshold` and `althold`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        let mode = match normalized.as_str() {
            "OFFBOARD" => FlightMode::Guided,
            "RTL" => FlightMode::ReturnHome,
            "POSHOLD" => FlightMode::PositionHold,
            "ALTHOLD" => FlightMode::AltitudeHold,
            "MISSION" => FlightMode::Auto,
            other => FlightMode::ALL
                .into_iter()
                .find(|m| m.as_str() == other)
                .ok_or_else(|| format!("unsupported flight mode: {s}"))?,
        };
        Ok(mode)
    }
}

/// A geographic position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPosition {
    /// Degrees, WGS-84.
    pub latitude: f64,
    /// Degrees, WGS-84.
    pub longitude: f64,
    /// Metres.
    pub altitude: f64,
}

/// What the vehicle should do when it reaches a waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaypointAction {
    Takeoff,
    Land,
    #[default]
    Waypoint,
    /// Loiter indefinitely.
    Loiter,
    /// Loiter for `hold_time_sec`.
    Hold,
}

/// One mission step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// 0-indexed position in the mission.
    pub sequence: u32,
    #[serde(default)]
    pub action: WaypointAction,
    #[serde(flatten)]
    pub position: GeoPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_time_sec: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_radius: Option<f32>,
    /// Degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f32>,
}

impl Waypoint {
    /// A plain fly-through waypoint with no optional parameters.
    pub fn new(sequence: u32, action: WaypointAction, position: GeoPosition) -> Self {
        Self {
            sequence,
            action,
            position,
            hold_time_sec: None,
            acceptance_radius: None,
            heading: None,
        }
    }
}

/// Errors surfaced by a vehicle-protocol client.
///
/// None of these are retried inside the client; retry policy belongs to the
/// caller.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GatewayError {
    #[error("Transport Creation Error: {0}")]
    TransportCreation(String),

    #[error("Connection Timeout: no heartbeat within {timeout_ms} ms")]
    ConnectionTimeout { timeout_ms: u64 },

    #[error("Not connected to drone")]
    NotConnected,

    #[error("Mission upload already in progress")]
    UploadInProgress,

    #[error("Mission upload failed: vehicle returned code {code}")]
    MissionUploadFailed { code: u8 },

    #[error("Mission upload timeout after {timeout_secs} s")]
    MissionUploadTimeout { timeout_secs: u64 },

    #[error("Send Failed: {0}")]
    SendFailed(String),

    #[error("Mission must have at least one waypoint")]
    EmptyMission,

    #[error("Mission too large: {count} waypoints, at most {max} fit in a mission count")]
    MissionTooLarge { count: usize, max: u16 },

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),
}
