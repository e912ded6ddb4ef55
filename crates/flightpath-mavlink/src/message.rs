//! Typed message shapes crossing the transport boundary.
//!
//! The client never touches dialect structs directly.  Inbound frames are
//! narrowed to the closed set of [`VehicleMessage`] kinds the client handles,
//! and everything it sends is a [`GcsMessage`].  The wire transport owns the
//! conversion to and from the `mavlink` crate's `common` dialect.

use serde::Serialize;

// ────────────────────────────────────────────────────────────────────────────
// Inbound
// ────────────────────────────────────────────────────────────────────────────

/// A decoded inbound message tagged with its sender.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub message: VehicleMessage,
    pub system_id: u8,
    pub component_id: u8,
}

impl InboundFrame {
    pub fn new(system_id: u8, component_id: u8, message: VehicleMessage) -> Self {
        Self {
            message,
            system_id,
            component_id,
        }
    }
}

/// Every inbound message kind the client reacts to.  Units are the raw wire
/// units; conversion happens in the telemetry aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleMessage {
    Heartbeat {
        mav_type: u8,
        base_mode: u8,
        custom_mode: u32,
    },
    CommandAck {
        command: u16,
        result: u8,
    },
    StatusText {
        severity: u8,
        text: String,
    },
    /// GLOBAL_POSITION_INT: degE7, millimetres, cm/s.
    GlobalPosition {
        lat: i32,
        lon: i32,
        alt: i32,
        vx: i16,
        vy: i16,
        vz: i16,
    },
    /// ATTITUDE: radians.
    Attitude { roll: f32, pitch: f32, yaw: f32 },
    VfrHud {
        heading: i16,
        groundspeed: f32,
        climb: f32,
    },
    /// SYS_STATUS: millivolts, centiamps, percent, sensor bitmasks.
    SysStatus {
        voltage_battery: u16,
        current_battery: i16,
        battery_remaining: i8,
        sensors_enabled: u32,
        sensors_health: u32,
    },
    GpsRaw {
        eph: u16,
        satellites_visible: u8,
    },
    MissionRequest { seq: u16 },
    MissionRequestInt { seq: u16 },
    MissionAck { code: u8 },
    MissionCurrent { seq: u16 },
    MissionItemReached { seq: u16 },
}

impl VehicleMessage {
    /// Upper-case dialect name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            VehicleMessage::Heartbeat { .. } => "HEARTBEAT",
            VehicleMessage::CommandAck { .. } => "COMMAND_ACK",
            VehicleMessage::StatusText { .. } => "STATUSTEXT",
            VehicleMessage::GlobalPosition { .. } => "GLOBAL_POSITION_INT",
            VehicleMessage::Attitude { .. } => "ATTITUDE",
            VehicleMessage::VfrHud { .. } => "VFR_HUD",
            VehicleMessage::SysStatus { .. } => "SYS_STATUS",
            VehicleMessage::GpsRaw { .. } => "GPS_RAW_INT",
            VehicleMessage::MissionRequest { .. } => "MISSION_REQUEST",
            VehicleMessage::MissionRequestInt { .. } => "MISSION_REQUEST_INT",
            VehicleMessage::MissionAck { .. } => "MISSION_ACK",
            VehicleMessage::MissionCurrent { .. } => "MISSION_CURRENT",
            VehicleMessage::MissionItemReached { .. } => "MISSION_ITEM_REACHED",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Outbound
// ────────────────────────────────────────────────────────────────────────────

/// Addressee of a targeted outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Target {
    pub system: u8,
    pub component: u8,
}

impl Target {
    /// Component 1 is the autopilot on every PX4/ArduPilot vehicle.
    pub const AUTOPILOT_COMPONENT: u8 = 1;

    pub fn autopilot(system: u8) -> Self {
        Self {
            system,
            component: Self::AUTOPILOT_COMPONENT,
        }
    }
}

/// One mission item in wire units (degE7 lat/lon, metres relative altitude).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MissionItem {
    pub seq: u16,
    pub command: u16,
    pub lat_e7: i32,
    pub lon_e7: i32,
    pub alt: f32,
    /// Hold time in seconds.
    pub param1: f32,
    /// Acceptance radius in metres.
    pub param2: f32,
    pub param3: f32,
    /// Heading in degrees.
    pub param4: f32,
}

/// Every message the ground station sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GcsMessage {
    /// Ground-control-station presence announcement.
    Heartbeat,
    SystemTime {
        time_unix_usec: u64,
        time_boot_ms: u32,
    },
    RequestDataStream {
        target: Target,
        stream_id: u8,
        rate_hz: u16,
        start: bool,
    },
    CommandLong {
        target: Target,
        command: u16,
        params: [f32; 7],
    },
    /// SET_POSITION_TARGET_GLOBAL_INT in the relative-altitude frame.
    SetPositionTarget {
        target: Target,
        lat_e7: i32,
        lon_e7: i32,
        alt: f32,
        type_mask: u16,
    },
    MissionCount {
        target: Target,
        count: u16,
    },
    MissionItemInt {
        target: Target,
        item: MissionItem,
    },
    MissionClearAll {
        target: Target,
    },
    MissionSetCurrent {
        target: Target,
        seq: u16,
    },
}

impl GcsMessage {
    pub fn name(&self) -> &'static str {
        match self {
            GcsMessage::Heartbeat => "HEARTBEAT",
            GcsMessage::SystemTime { .. } => "SYSTEM_TIME",
            GcsMessage::RequestDataStream { .. } => "REQUEST_DATA_STREAM",
            GcsMessage::CommandLong { .. } => "COMMAND_LONG",
            GcsMessage::SetPositionTarget { .. } => "SET_POSITION_TARGET_GLOBAL_INT",
            GcsMessage::MissionCount { .. } => "MISSION_COUNT",
            GcsMessage::MissionItemInt { .. } => "MISSION_ITEM_INT",
            GcsMessage::MissionClearAll { .. } => "MISSION_CLEAR_ALL",
            GcsMessage::MissionSetCurrent { .. } => "MISSION_SET_CURRENT",
        }
    }
}
