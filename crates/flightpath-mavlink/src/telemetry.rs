//! Telemetry aggregation.
//!
//! [`TelemetrySnapshot`] is the latest known vehicle state.  Each inbound
//! telemetry kind owns a disjoint set of fields; [`TelemetrySnapshot::apply`]
//! converts wire units to SI units, writes only those fields and stamps
//! `last_update`.  The client keeps the snapshot behind its state lock, so a
//! reader always clones a whole, consistent snapshot.

use chrono::{DateTime, Utc};
use flightpath_types::FlightMode;
use serde::Serialize;

use crate::message::VehicleMessage;
use crate::mode;

/// Fewer visible satellites than this is reported as "GPS not OK".
pub const GPS_OK_MIN_SATELLITES: u32 = 6;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TelemetrySnapshot {
    // GLOBAL_POSITION_INT
    /// Degrees.
    pub latitude: f64,
    /// Degrees.
    pub longitude: f64,
    /// Metres above mean sea level.
    pub altitude: f64,
    /// m/s.
    pub velocity_north: f64,
    pub velocity_east: f64,
    pub velocity_down: f64,

    // ATTITUDE (radians)
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,

    // VFR_HUD
    /// Degrees.
    pub heading: f64,
    pub ground_speed: f64,
    pub vertical_speed: f64,

    // SYS_STATUS
    /// Volts.
    pub battery_voltage: f64,
    /// Amps.
    pub battery_current: f64,
    /// Percent, -1 when the autopilot does not estimate it.
    pub battery_remaining: i32,
    pub sensors_healthy: bool,

    // GPS_RAW_INT
    /// Approximate horizontal accuracy in metres.
    pub gps_accuracy: f64,
    pub satellite_count: u32,

    // HEARTBEAT
    pub base_mode: u8,
    pub custom_mode: u32,

    pub last_update: Option<DateTime<Utc>>,
}

impl TelemetrySnapshot {
    /// Fold one inbound message into the snapshot.
    ///
    /// Returns `false` (and changes nothing) for messages that carry no
    /// telemetry.
    pub fn apply(&mut self, message: &VehicleMessage, now: DateTime<Utc>) -> bool {
        match *message {
            VehicleMessage::GlobalPosition {
                lat,
                lon,
                alt,
                vx,
                vy,
                vz,
            } => {
                self.latitude = f64::from(lat) / 1e7;
                self.longitude = f64::from(lon) / 1e7;
                self.altitude = f64::from(alt) / 1000.0;
                self.velocity_north = f64::from(vx) / 100.0;
                self.velocity_east = f64::from(vy) / 100.0;
                self.velocity_down = f64::from(vz) / 100.0;
            }
            VehicleMessage::Attitude { roll, pitch, yaw } => {
                self.roll = f64::from(roll);
                self.pitch = f64::from(pitch);
                self.yaw = f64::from(yaw);
            }
            VehicleMessage::VfrHud {
                heading,
                groundspeed,
                climb,
            } => {
                self.heading = f64::from(heading);
                self.ground_speed = f64::from(groundspeed);
                self.vertical_speed = f64::from(climb);
            }
            VehicleMessage::SysStatus {
                voltage_battery,
                current_battery,
                battery_remaining,
                sensors_enabled,
                sensors_health,
            } => {
                self.battery_voltage = f64::from(voltage_battery) / 1000.0;
                self.battery_current = f64::from(current_battery) / 100.0;
                self.battery_remaining = i32::from(battery_remaining);
                self.sensors_healthy = sensors_healthy(sensors_enabled, sensors_health);
            }
            VehicleMessage::GpsRaw {
                eph,
                satellites_visible,
            } => {
                // EPH is HDOP * 100.
                self.gps_accuracy = f64::from(eph) / 100.0;
                self.satellite_count = u32::from(satellites_visible);
            }
            _ => return false,
        }
        self.last_update = Some(now);
        true
    }

    /// Record the mode carried by a vehicle heartbeat.
    pub fn apply_mode(&mut self, base_mode: u8, custom_mode: u32) {
        self.base_mode = base_mode;
        self.custom_mode = custom_mode;
    }

    pub fn flight_mode(&self) -> FlightMode {
        mode::decode(self.custom_mode)
    }

    pub fn gps_ok(&self) -> bool {
        self.satellite_count >= GPS_OK_MIN_SATELLITES
    }
}

/// Every enabled sensor must be reported healthy; disabled sensors are
/// ignored.
pub fn sensors_healthy(enabled: u32, health: u32) -> bool {
    health & enabled == enabled
}

/// The snapshot plus the derived link and mode state callers usually want.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryReport {
    #[serde(flatten)]
    pub snapshot: TelemetrySnapshot,
    pub connected: bool,
    pub armed: bool,
    pub flight_mode: FlightMode,
    pub gps_ok: bool,
    pub sensors_ok: bool,
}

impl TelemetryReport {
    pub fn new(snapshot: TelemetrySnapshot, connected: bool, armed: bool) -> Self {
        Self {
            flight_mode: snapshot.flight_mode(),
            gps_ok: snapshot.gps_ok(),
            sensors_ok: snapshot.sensors_healthy,
            snapshot,
            connected,
            armed,
        }
    }
}
