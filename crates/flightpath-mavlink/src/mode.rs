//! PX4 custom-mode codec.
//!
//! PX4 packs its flight mode into HEARTBEAT `custom_mode` as
//! `main | (sub << 16)`; the sub-mode only carries meaning under
//! [`px4::MAIN_AUTO`].  Both functions here are pure.

use flightpath_types::FlightMode;

/// PX4 main- and sub-mode identifiers.
pub mod px4 {
    pub const MAIN_MANUAL: u32 = 1;
    pub const MAIN_ALTCTL: u32 = 2;
    pub const MAIN_POSCTL: u32 = 3;
    pub const MAIN_AUTO: u32 = 4;
    pub const MAIN_ACRO: u32 = 5;
    pub const MAIN_OFFBOARD: u32 = 6;
    pub const MAIN_STABILIZED: u32 = 7;
    pub const MAIN_RATTITUDE: u32 = 8;

    pub const AUTO_READY: u32 = 1;
    pub const AUTO_TAKEOFF: u32 = 2;
    pub const AUTO_LOITER: u32 = 3;
    pub const AUTO_MISSION: u32 = 4;
    pub const AUTO_RTL: u32 = 5;
    pub const AUTO_LAND: u32 = 6;
    pub const AUTO_FOLLOW: u32 = 8;
    pub const AUTO_PRECLAND: u32 = 9;

    /// Pack a main/sub pair.
    pub const fn pack(main: u32, sub: u32) -> u32 {
        main | (sub << 16)
    }
}

/// Encode a generic mode as a PX4 custom-mode value.
pub fn encode(mode: FlightMode) -> u32 {
    use px4::*;
    match mode {
        FlightMode::Manual => MAIN_MANUAL,
        FlightMode::Stabilized => MAIN_STABILIZED,
        FlightMode::AltitudeHold => MAIN_ALTCTL,
        FlightMode::PositionHold => MAIN_POSCTL,
        FlightMode::Guided => MAIN_OFFBOARD,
        FlightMode::Auto => pack(MAIN_AUTO, AUTO_MISSION),
        FlightMode::ReturnHome => pack(MAIN_AUTO, AUTO_RTL),
        FlightMode::Land => pack(MAIN_AUTO, AUTO_LAND),
        FlightMode::Takeoff => pack(MAIN_AUTO, AUTO_TAKEOFF),
        FlightMode::Loiter => pack(MAIN_AUTO, AUTO_LOITER),
    }
}

/// Decode a PX4 custom-mode value.
///
/// An AUTO main mode with an unrecognised sub-mode decodes to
/// [`FlightMode::Auto`].  Any other unrecognised value decodes to
/// [`FlightMode::Manual`].
pub fn decode(raw: u32) -> FlightMode {
    use px4::*;
    let main = raw & 0xFF;
    let sub = (raw >> 16) & 0xFF;

    match main {
        MAIN_MANUAL => FlightMode::Manual,
        MAIN_STABILIZED => FlightMode::Stabilized,
        MAIN_ALTCTL => FlightMode::AltitudeHold,
        MAIN_POSCTL => FlightMode::PositionHold,
        MAIN_OFFBOARD => FlightMode::Guided,
        MAIN_AUTO => match sub {
            AUTO_MISSION => FlightMode::Auto,
            AUTO_RTL => FlightMode::ReturnHome,
            AUTO_LAND => FlightMode::Land,
            AUTO_TAKEOFF => FlightMode::Takeoff,
            AUTO_LOITER => FlightMode::Loiter,
            _ => FlightMode::Auto,
        },
        _ => FlightMode::Manual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_every_mode() {
        for mode in FlightMode::ALL {
            assert_eq!(decode(encode(mode)), mode, "round trip failed for {mode}");
        }
    }

    #[test]
    fn return_home_packs_rtl_sub_mode() {
        let raw = encode(FlightMode::ReturnHome);
        assert_eq!(raw, px4::MAIN_AUTO | (px4::AUTO_RTL << 16));
        assert_eq!(raw, 0x0005_0004);
    }

    #[test]
    fn unknown_values_fall_back() {
        assert_eq!(decode(px4::MAIN_ACRO), FlightMode::Manual);
        assert_eq!(decode(px4::MAIN_RATTITUDE), FlightMode::Manual);
        assert_eq!(decode(0), FlightMode::Manual);
        assert_eq!(decode(px4::pack(px4::MAIN_AUTO, px4::AUTO_FOLLOW)), FlightMode::Auto);
        assert_eq!(decode(px4::pack(px4::MAIN_AUTO, px4::AUTO_READY)), FlightMode::Auto);
    }

    #[test]
    fn decode_ignores_unrelated_bits() {
        // Bits above the sub-mode byte are masked off.
        let raw = px4::pack(px4::MAIN_AUTO, px4::AUTO_LAND) | 0xFF00_0000;
        assert_eq!(decode(raw), FlightMode::Land);
    }
}
