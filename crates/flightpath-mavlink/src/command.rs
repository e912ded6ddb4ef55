//! Command encoding and acknowledgment decoding.
//!
//! Commands are fire-and-forget COMMAND_LONG messages addressed to the
//! autopilot.  COMMAND_ACK is only ever logged; it is never matched back to
//! the call that triggered it.

use crate::message::{GcsMessage, Target};

/// MAV_CMD identifiers used by the client.
pub mod mav_cmd {
    pub const NAV_WAYPOINT: u16 = 16;
    pub const NAV_LOITER_UNLIM: u16 = 17;
    pub const NAV_LOITER_TIME: u16 = 19;
    pub const NAV_RETURN_TO_LAUNCH: u16 = 20;
    pub const NAV_LAND: u16 = 21;
    pub const NAV_TAKEOFF: u16 = 22;
    pub const DO_SET_MODE: u16 = 176;
    pub const COMPONENT_ARM_DISARM: u16 = 400;
}

/// MAV_MODE_FLAG_CUSTOM_MODE_ENABLED, passed as DO_SET_MODE param1.
const CUSTOM_MODE_ENABLED: f32 = 1.0;

/// Ignore vx, vy, vz, afx, afy, afz, yaw and yaw_rate: honour position only.
pub const POSITION_ONLY_TYPE_MASK: u16 = 0b0000_1101_1111_1000;

/// The one-shot commands the client issues.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VehicleCommand {
    Arm,
    Disarm,
    /// Raw PX4 custom-mode value.
    SetMode(u32),
    /// Altitude in metres.
    Takeoff(f32),
    Land,
    ReturnToLaunch,
}

impl VehicleCommand {
    pub fn id(&self) -> u16 {
        match self {
            VehicleCommand::Arm | VehicleCommand::Disarm => mav_cmd::COMPONENT_ARM_DISARM,
            VehicleCommand::SetMode(_) => mav_cmd::DO_SET_MODE,
            VehicleCommand::Takeoff(_) => mav_cmd::NAV_TAKEOFF,
            VehicleCommand::Land => mav_cmd::NAV_LAND,
            VehicleCommand::ReturnToLaunch => mav_cmd::NAV_RETURN_TO_LAUNCH,
        }
    }

    /// COMMAND_LONG param1..param7.
    pub fn params(&self) -> [f32; 7] {
        let mut p = [0.0; 7];
        match *self {
            VehicleCommand::Arm => p[0] = 1.0,
            VehicleCommand::Disarm => {}
            // Custom modes are sent as a float; PX4 values fit in 24 bits so
            // nothing is lost.
            VehicleCommand::SetMode(raw) => {
                p[0] = CUSTOM_MODE_ENABLED;
                p[1] = raw as f32;
            }
            VehicleCommand::Takeoff(altitude) => p[6] = altitude,
            VehicleCommand::Land | VehicleCommand::ReturnToLaunch => {}
        }
        p
    }

    pub fn to_message(&self, system_id: u8) -> GcsMessage {
        GcsMessage::CommandLong {
            target: Target::autopilot(system_id),
            command: self.id(),
            params: self.params(),
        }
    }
}

/// Build a position-only SET_POSITION_TARGET_GLOBAL_INT setpoint.
///
/// The vehicle only honours it in offboard (GUIDED) mode; this is not checked
/// here.
pub fn position_target(system_id: u8, latitude: f64, longitude: f64, altitude: f32) -> GcsMessage {
    GcsMessage::SetPositionTarget {
        target: Target::autopilot(system_id),
        lat_e7: degrees_to_e7(latitude),
        lon_e7: degrees_to_e7(longitude),
        alt: altitude,
        type_mask: POSITION_ONLY_TYPE_MASK,
    }
}

/// Degrees to the wire's degE7 fixed point.
pub fn degrees_to_e7(degrees: f64) -> i32 {
    (degrees * 1e7) as i32
}

/// Human name for a MAV_RESULT code.
pub fn describe_result(result: u8) -> &'static str {
    match result {
        0 => "ACCEPTED",
        1 => "TEMPORARILY_REJECTED",
        2 => "DENIED",
        3 => "UNSUPPORTED",
        4 => "FAILED",
        5 => "IN_PROGRESS",
        _ => "UNKNOWN",
    }
}

pub fn is_accepted(result: u8) -> bool {
    result == 0
}
