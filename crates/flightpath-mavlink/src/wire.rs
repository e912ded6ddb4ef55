//! [`MavlinkTransport`] – [`MessageTransport`] speaking MAVLink 2 over a raw
//! link.
//!
//! The link is blocking and polled: a dedicated reader thread reads chunks
//! with a short timeout, reassembles frames with the `mavlink` crate's v2
//! parser, narrows each `common`-dialect frame to a [`VehicleMessage`] and
//! forwards it over an unbounded channel.  Sends run on tokio's blocking pool
//! and stamp the header sequence under the writer lock, so sequence numbers
//! follow wire order.

use std::io::{Cursor, ErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use flightpath_types::GatewayError;
use futures_util::stream::{self, BoxStream, StreamExt};
use mavlink::common::{
    COMMAND_LONG_DATA, HEARTBEAT_DATA, MISSION_CLEAR_ALL_DATA, MISSION_COUNT_DATA,
    MISSION_ITEM_INT_DATA, MISSION_SET_CURRENT_DATA, MavAutopilot, MavCmd, MavFrame, MavMessage,
    MavModeFlag, MavState, MavType, PositionTargetTypemask, REQUEST_DATA_STREAM_DATA,
    SET_POSITION_TARGET_GLOBAL_INT_DATA, SYSTEM_TIME_DATA,
};
use mavlink::error::{MessageReadError, ParserError};
use mavlink::{MavHeader, MavlinkVersion};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::command::mav_cmd;
use crate::link::{self, LinkReader, LinkWriter, READ_POLL};
use crate::message::{GcsMessage, InboundFrame, VehicleMessage};
use crate::transport::{ConnectionDescriptor, MessageTransport};

/// HEARTBEAT `mavlink_version` field value for MAVLink 2.
const MAVLINK_VERSION_FIELD: u8 = 3;

/// MAVLink 2 start-of-frame marker.
const STX_V2: u8 = 0xFD;

/// Largest serialised MAVLink 2 frame (signed, full payload).
const MAX_FRAME_LEN: usize = 280;

/// Unparsed bytes kept between reads before the buffer is reset.
const MAX_BUFFERED: usize = 16 * 1024;

/// How long [`MessageTransport::close`] waits for the reader thread.
const CLOSE_WAIT: Duration = Duration::from_secs(1);

/// Write half plus the sequence counter it stamps onto outbound headers.
struct Outbound {
    link: LinkWriter,
    sequence: u8,
}

pub struct MavlinkTransport {
    outbound: Arc<Mutex<Option<Outbound>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    address: String,
    system_id: u8,
    component_id: u8,
    events: Mutex<Option<mpsc::UnboundedReceiver<InboundFrame>>>,
    closed: Arc<AtomicBool>,
}

impl MavlinkTransport {
    /// Open `descriptor` and start the reader thread.  Outbound frames carry
    /// the given ground-station ids.
    ///
    /// Blocking: TCP connects and serial opens happen here.
    pub fn open(
        descriptor: &ConnectionDescriptor,
        system_id: u8,
        component_id: u8,
    ) -> Result<Self, GatewayError> {
        let address = descriptor.address();
        let (reader, writer) = link::open(descriptor)
            .map_err(|e| GatewayError::TransportCreation(format!("{address}: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let handle = {
            let closed = Arc::clone(&closed);
            thread::Builder::new()
                .name("mavlink-rx".into())
                .spawn(move || read_loop(reader, tx, closed))
                .map_err(|e| GatewayError::TransportCreation(e.to_string()))?
        };

        info!(%address, "MAVLink transport open");
        Ok(Self {
            outbound: Arc::new(Mutex::new(Some(Outbound {
                link: writer,
                sequence: 0,
            }))),
            reader: Mutex::new(Some(handle)),
            address,
            system_id,
            component_id,
            events: Mutex::new(Some(rx)),
            closed,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Drop for MavlinkTransport {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Bytes received but not yet parsed into frames.
#[derive(Default)]
struct FrameBuffer {
    bytes: Vec<u8>,
}

impl FrameBuffer {
    fn push(&mut self, chunk: &[u8]) {
        if self.bytes.len() + chunk.len() > MAX_BUFFERED {
            trace!(dropped = self.bytes.len(), "frame buffer overflow, resetting");
            self.bytes.clear();
        }
        self.bytes.extend_from_slice(chunk);
    }

    /// The next complete frame, or `None` once only a partial frame (or
    /// nothing) is left.  Noise and bad-CRC frames are skipped.
    fn next_frame(&mut self) -> Option<Result<(MavHeader, MavMessage), ParserError>> {
        if self.bytes.is_empty() {
            return None;
        }
        let mut cursor = Cursor::new(self.bytes.as_slice());
        let result = mavlink::read_versioned_msg::<MavMessage, _>(&mut cursor, MavlinkVersion::V2);
        let consumed = cursor.position() as usize;
        match result {
            Ok(frame) => {
                self.bytes.drain(..consumed);
                Some(Ok(frame))
            }
            Err(MessageReadError::Parse(e)) => {
                self.bytes.drain(..consumed);
                Some(Err(e))
            }
            // Ran out of bytes: keep from the first marker and wait for more.
            Err(MessageReadError::Io(_)) => {
                match self.bytes.iter().position(|&b| b == STX_V2) {
                    Some(start) => {
                        self.bytes.drain(..start);
                    }
                    None => self.bytes.clear(),
                }
                None
            }
        }
    }
}

fn read_loop(
    mut link: LinkReader,
    tx: mpsc::UnboundedSender<InboundFrame>,
    closed: Arc<AtomicBool>,
) {
    let mut chunk = [0u8; 4096];
    let mut frames = FrameBuffer::default();
    'read: while !closed.load(Ordering::Relaxed) {
        match link.read_chunk(&mut chunk) {
            Ok(n) => frames.push(&chunk[..n]),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => {
                if !closed.load(Ordering::Relaxed) {
                    error!(error = %e, "MAVLink read failed, reader stopping");
                }
                break;
            }
        }
        while let Some(result) = frames.next_frame() {
            match result {
                Ok((header, frame)) => {
                    let Some(message) = decode(&frame) else {
                        continue;
                    };
                    let inbound = InboundFrame::new(header.system_id, header.component_id, message);
                    if tx.send(inbound).is_err() {
                        break 'read;
                    }
                }
                Err(e) => trace!(error = %e, "skipping undecodable frame"),
            }
        }
    }
    debug!("MAVLink reader thread exited");
}

#[async_trait]
impl MessageTransport for MavlinkTransport {
    async fn send(&self, message: GcsMessage) -> Result<(), GatewayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::SendFailed("transport closed".into()));
        }
        let name = message.name();
        let frame = encode(&message)?;
        let (system_id, component_id) = (self.system_id, self.component_id);

        let outbound = Arc::clone(&self.outbound);
        tokio::task::spawn_blocking(move || {
            let mut guard = outbound.lock();
            let out = guard.as_mut().ok_or("transport closed".to_string())?;
            let header = MavHeader {
                system_id,
                component_id,
                sequence: out.sequence,
            };
            let mut bytes = Vec::with_capacity(MAX_FRAME_LEN);
            mavlink::write_versioned_msg(&mut bytes, MavlinkVersion::V2, header, &frame)
                .map_err(|e| e.to_string())?;
            if out.link.write_frame(&bytes).map_err(|e| e.to_string())? {
                out.sequence = out.sequence.wrapping_add(1);
            } else {
                trace!(kind = name, "no peer heard yet, frame dropped");
            }
            Ok::<(), String>(())
        })
        .await
        .map_err(|e| GatewayError::SendFailed(format!("{name}: {e}")))?
        .map_err(|e| GatewayError::SendFailed(format!("{name}: {e}")))
    }

    async fn events(&self) -> BoxStream<'static, InboundFrame> {
        match self.events.lock().take() {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|frame| (frame, rx))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }

    /// Drops the write half and waits up to [`CLOSE_WAIT`] for the reader
    /// thread, which owns the read half, to notice and exit.
    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let outbound = Arc::clone(&self.outbound);
        let reader = self.reader.lock().take();
        let stopped = tokio::task::spawn_blocking(move || {
            drop(outbound.lock().take());
            let Some(handle) = reader else {
                return true;
            };
            let deadline = Instant::now() + CLOSE_WAIT;
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    return false;
                }
                thread::sleep(READ_POLL / 10);
            }
            handle.join().is_ok()
        })
        .await
        .unwrap_or(false);

        if !stopped {
            warn!(address = %self.address, "MAVLink reader did not stop within {CLOSE_WAIT:?}");
        }
        info!(address = %self.address, "MAVLink transport closed");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Dialect conversion
// ────────────────────────────────────────────────────────────────────────────

/// Narrow a `common` frame to a [`VehicleMessage`].  `None` for kinds the
/// client does not handle.
pub fn decode(frame: &MavMessage) -> Option<VehicleMessage> {
    let message = match frame {
        MavMessage::HEARTBEAT(d) => VehicleMessage::Heartbeat {
            mav_type: d.mavtype as u8,
            base_mode: d.base_mode.bits(),
            custom_mode: d.custom_mode,
        },
        MavMessage::COMMAND_ACK(d) => VehicleMessage::CommandAck {
            command: d.command as u16,
            result: d.result as u8,
        },
        MavMessage::STATUSTEXT(d) => VehicleMessage::StatusText {
            severity: d.severity as u8,
            text: text_from_bytes(&d.text),
        },
        MavMessage::GLOBAL_POSITION_INT(d) => VehicleMessage::GlobalPosition {
            lat: d.lat,
            lon: d.lon,
            alt: d.alt,
            vx: d.vx,
            vy: d.vy,
            vz: d.vz,
        },
        MavMessage::ATTITUDE(d) => VehicleMessage::Attitude {
            roll: d.roll,
            pitch: d.pitch,
            yaw: d.yaw,
        },
        MavMessage::VFR_HUD(d) => VehicleMessage::VfrHud {
            heading: d.heading,
            groundspeed: d.groundspeed,
            climb: d.climb,
        },
        MavMessage::SYS_STATUS(d) => VehicleMessage::SysStatus {
            voltage_battery: d.voltage_battery,
            current_battery: d.current_battery,
            battery_remaining: d.battery_remaining,
            sensors_enabled: d.onboard_control_sensors_enabled.bits(),
            sensors_health: d.onboard_control_sensors_health.bits(),
        },
        MavMessage::GPS_RAW_INT(d) => VehicleMessage::GpsRaw {
            eph: d.eph,
            satellites_visible: d.satellites_visible,
        },
        MavMessage::MISSION_REQUEST(d) => VehicleMessage::MissionRequest { seq: d.seq },
        MavMessage::MISSION_REQUEST_INT(d) => VehicleMessage::MissionRequestInt { seq: d.seq },
        MavMessage::MISSION_ACK(d) => VehicleMessage::MissionAck {
            code: d.mavtype as u8,
        },
        MavMessage::MISSION_CURRENT(d) => VehicleMessage::MissionCurrent { seq: d.seq },
        MavMessage::MISSION_ITEM_REACHED(d) => VehicleMessage::MissionItemReached { seq: d.seq },
        _ => return None,
    };
    Some(message)
}

/// Build the `common` frame for an outbound message.
///
/// # Errors
///
/// [`GatewayError::SendFailed`] for a command id the client never issues.
pub fn encode(message: &GcsMessage) -> Result<MavMessage, GatewayError> {
    let frame = match *message {
        GcsMessage::Heartbeat => MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GCS,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: MAVLINK_VERSION_FIELD,
        }),
        GcsMessage::SystemTime {
            time_unix_usec,
            time_boot_ms,
        } => MavMessage::SYSTEM_TIME(SYSTEM_TIME_DATA {
            time_unix_usec,
            time_boot_ms,
        }),
        GcsMessage::RequestDataStream {
            target,
            stream_id,
            rate_hz,
            start,
        } => MavMessage::REQUEST_DATA_STREAM(REQUEST_DATA_STREAM_DATA {
            req_message_rate: rate_hz,
            target_system: target.system,
            target_component: target.component,
            req_stream_id: stream_id,
            start_stop: u8::from(start),
        }),
        GcsMessage::CommandLong {
            target,
            command,
            params,
        } => MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
            command: to_mav_cmd(command)?,
            target_system: target.system,
            target_component: target.component,
            confirmation: 0,
        }),
        GcsMessage::SetPositionTarget {
            target,
            lat_e7,
            lon_e7,
            alt,
            type_mask,
        } => MavMessage::SET_POSITION_TARGET_GLOBAL_INT(SET_POSITION_TARGET_GLOBAL_INT_DATA {
            lat_int: lat_e7,
            lon_int: lon_e7,
            alt,
            type_mask: PositionTargetTypemask::from_bits_truncate(type_mask),
            target_system: target.system,
            target_component: target.component,
            coordinate_frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
            ..Default::default()
        }),
        GcsMessage::MissionCount { target, count } => {
            MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
                count,
                target_system: target.system,
                target_component: target.component,
                ..Default::default()
            })
        }
        GcsMessage::MissionItemInt { target, item } => {
            MavMessage::MISSION_ITEM_INT(MISSION_ITEM_INT_DATA {
                param1: item.param1,
                param2: item.param2,
                param3: item.param3,
                param4: item.param4,
                x: item.lat_e7,
                y: item.lon_e7,
                z: item.alt,
                seq: item.seq,
                command: to_mav_cmd(item.command)?,
                target_system: target.system,
                target_component: target.component,
                frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
                current: 0,
                autocontinue: 1,
                ..Default::default()
            })
        }
        GcsMessage::MissionClearAll { target } => {
            MavMessage::MISSION_CLEAR_ALL(MISSION_CLEAR_ALL_DATA {
                target_system: target.system,
                target_component: target.component,
                ..Default::default()
            })
        }
        GcsMessage::MissionSetCurrent { target, seq } => {
            MavMessage::MISSION_SET_CURRENT(MISSION_SET_CURRENT_DATA {
                seq,
                target_system: target.system,
                target_component: target.component,
            })
        }
    };
    Ok(frame)
}

fn to_mav_cmd(id: u16) -> Result<MavCmd, GatewayError> {
    let cmd = match id {
        mav_cmd::NAV_WAYPOINT => MavCmd::MAV_CMD_NAV_WAYPOINT,
        mav_cmd::NAV_LOITER_UNLIM => MavCmd::MAV_CMD_NAV_LOITER_UNLIM,
        mav_cmd::NAV_LOITER_TIME => MavCmd::MAV_CMD_NAV_LOITER_TIME,
        mav_cmd::NAV_RETURN_TO_LAUNCH => MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH,
        mav_cmd::NAV_LAND => MavCmd::MAV_CMD_NAV_LAND,
        mav_cmd::NAV_TAKEOFF => MavCmd::MAV_CMD_NAV_TAKEOFF,
        mav_cmd::DO_SET_MODE => MavCmd::MAV_CMD_DO_SET_MODE,
        mav_cmd::COMPONENT_ARM_DISARM => MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
        other => {
            return Err(GatewayError::SendFailed(format!(
                "unsupported MAV_CMD {other}"
            )));
        }
    };
    Ok(cmd)
}

/// STATUSTEXT text is NUL-padded.
fn text_from_bytes(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{POSITION_ONLY_TYPE_MASK, VehicleCommand, position_target};
    use crate::message::{MissionItem, Target};
    use mavlink::common::{
        GLOBAL_POSITION_INT_DATA, MISSION_ACK_DATA, MavMissionResult, MavSysStatusSensor,
        SYS_STATUS_DATA,
    };
    use std::net::UdpSocket;

    fn vehicle_heartbeat() -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_PX4,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_STANDBY,
            mavlink_version: 3,
        })
    }

    fn serialise(frame: &MavMessage, sequence: u8) -> Vec<u8> {
        let header = MavHeader {
            system_id: 1,
            component_id: 1,
            sequence,
        };
        let mut bytes = Vec::new();
        mavlink::write_versioned_msg(&mut bytes, MavlinkVersion::V2, header, frame).unwrap();
        bytes
    }

    /// A loopback address nothing is bound to right now.
    fn free_udp_address() -> String {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.local_addr().unwrap().to_string()
    }

    #[test]
    fn gcs_heartbeat_identifies_as_ground_station() {
        match encode(&GcsMessage::Heartbeat).unwrap() {
            MavMessage::HEARTBEAT(d) => {
                assert_eq!(d.mavtype, MavType::MAV_TYPE_GCS);
                assert_eq!(d.autopilot, MavAutopilot::MAV_AUTOPILOT_INVALID);
                assert_eq!(d.system_status, MavState::MAV_STATE_ACTIVE);
                assert_eq!(d.mavlink_version, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn arm_encodes_to_command_long() {
        let msg = VehicleCommand::Arm.to_message(7);
        match encode(&msg).unwrap() {
            MavMessage::COMMAND_LONG(d) => {
                assert_eq!(d.command, MavCmd::MAV_CMD_COMPONENT_ARM_DISARM);
                assert_eq!(d.param1, 1.0);
                assert_eq!(d.target_system, 7);
                assert_eq!(d.target_component, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn setpoint_uses_relative_alt_frame_and_mask() {
        match encode(&position_target(1, 47.0, 8.0, 10.0)).unwrap() {
            MavMessage::SET_POSITION_TARGET_GLOBAL_INT(d) => {
                assert_eq!(d.coordinate_frame, MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT);
                assert_eq!(d.type_mask.bits(), POSITION_ONLY_TYPE_MASK);
                assert_eq!(d.lat_int, 470_000_000);
                assert_eq!(d.alt, 10.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn mission_item_fields() {
        let item = MissionItem {
            seq: 4,
            command: mav_cmd::NAV_LOITER_TIME,
            lat_e7: 1,
            lon_e7: 2,
            alt: 3.0,
            param1: 15.0,
            param2: 2.0,
            param3: 0.0,
            param4: 180.0,
        };
        let msg = GcsMessage::MissionItemInt {
            target: Target::autopilot(1),
            item,
        };
        match encode(&msg).unwrap() {
            MavMessage::MISSION_ITEM_INT(d) => {
                assert_eq!(d.seq, 4);
                assert_eq!(d.command, MavCmd::MAV_CMD_NAV_LOITER_TIME);
                assert_eq!(d.frame, MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT);
                assert_eq!(d.autocontinue, 1);
                assert_eq!(d.current, 0);
                assert_eq!(d.param1, 15.0);
                assert_eq!(d.param4, 180.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_command_id_is_rejected() {
        let msg = GcsMessage::CommandLong {
            target: Target::autopilot(1),
            command: 9999,
            params: [0.0; 7],
        };
        assert!(matches!(encode(&msg), Err(GatewayError::SendFailed(_))));
    }

    #[test]
    fn decodes_heartbeat_mode_bits() {
        let frame = MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0x0004_0004,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_PX4,
            base_mode: MavModeFlag::from_bits_truncate(0x80 | 0x01),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        });
        assert_eq!(
            decode(&frame),
            Some(VehicleMessage::Heartbeat {
                mav_type: 2,
                base_mode: 0x81,
                custom_mode: 0x0004_0004,
            })
        );
    }

    #[test]
    fn decodes_telemetry_in_wire_units() {
        let frame = MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
            lat: 473_977_420,
            lon: 85_455_940,
            alt: 488_000,
            vx: 10,
            ..Default::default()
        });
        assert!(matches!(
            decode(&frame),
            Some(VehicleMessage::GlobalPosition { lat: 473_977_420, alt: 488_000, vx: 10, .. })
        ));

        let status = SYS_STATUS_DATA {
            voltage_battery: 12_400,
            battery_remaining: 50,
            onboard_control_sensors_enabled: MavSysStatusSensor::from_bits_truncate(0b11),
            onboard_control_sensors_health: MavSysStatusSensor::from_bits_truncate(0b01),
            ..Default::default()
        };
        assert_eq!(
            decode(&MavMessage::SYS_STATUS(status)),
            Some(VehicleMessage::SysStatus {
                voltage_battery: 12_400,
                current_battery: 0,
                battery_remaining: 50,
                sensors_enabled: 0b11,
                sensors_health: 0b01,
            })
        );
    }

    #[test]
    fn decodes_mission_ack_code() {
        let frame = MavMessage::MISSION_ACK(MISSION_ACK_DATA {
            mavtype: MavMissionResult::MAV_MISSION_ACCEPTED,
            ..Default::default()
        });
        assert_eq!(decode(&frame), Some(VehicleMessage::MissionAck { code: 0 }));
    }

    #[test]
    fn status_text_is_trimmed_at_nul() {
        let mut raw = [0u8; 50];
        raw[..12].copy_from_slice(b"Takeoff det ");
        assert_eq!(text_from_bytes(&raw), "Takeoff det");
        assert_eq!(text_from_bytes(b"full"), "full");
    }

    #[test]
    fn open_fails_for_missing_serial_device() {
        let descriptor = ConnectionDescriptor::Serial {
            device: "/dev/flightpath-does-not-exist".into(),
            baud_rate: 57600,
        };
        let result = MavlinkTransport::open(&descriptor, 255, 190);
        assert!(matches!(result, Err(GatewayError::TransportCreation(_))));
    }

    #[test]
    fn frame_buffer_reassembles_split_frames_and_skips_noise() {
        let mut first = vec![0x00, 0x42];
        first.extend(serialise(&vehicle_heartbeat(), 7));
        let second = serialise(&vehicle_heartbeat(), 8);
        let (head, tail) = second.split_at(5);

        let mut buffer = FrameBuffer::default();
        buffer.push(&first);
        buffer.push(head);
        let (header, frame) = buffer.next_frame().unwrap().unwrap();
        assert_eq!(header.sequence, 7);
        assert!(matches!(frame, MavMessage::HEARTBEAT(_)));
        assert!(buffer.next_frame().is_none());

        buffer.push(tail);
        let (header, _) = buffer.next_frame().unwrap().unwrap();
        assert_eq!(header.sequence, 8);
        assert!(buffer.next_frame().is_none());
        assert!(buffer.bytes.is_empty());
    }

    #[test]
    fn frame_buffer_drops_garbage_without_a_marker() {
        let mut buffer = FrameBuffer::default();
        buffer.push(&[0x01, 0x02, 0x03]);
        assert!(buffer.next_frame().is_none());
        assert!(buffer.bytes.is_empty());
    }

    #[tokio::test]
    async fn close_releases_udp_port_for_reopen() {
        let descriptor = ConnectionDescriptor::UdpListen {
            address: free_udp_address(),
        };
        let first = MavlinkTransport::open(&descriptor, 255, 190).unwrap();
        assert!(matches!(
            MavlinkTransport::open(&descriptor, 255, 190),
            Err(GatewayError::TransportCreation(_))
        ));

        first.close().await;
        let second = MavlinkTransport::open(&descriptor, 255, 190)
            .expect("udpin address must be free again after close");
        second.close().await;
        drop(first);
    }

    #[tokio::test]
    async fn udp_listener_decodes_frames_and_replies_in_sequence() {
        let address = free_udp_address();
        let transport = MavlinkTransport::open(
            &ConnectionDescriptor::UdpListen {
                address: address.clone(),
            },
            255,
            190,
        )
        .unwrap();
        let mut events = transport.events().await;

        let vehicle = UdpSocket::bind("127.0.0.1:0").unwrap();
        vehicle.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        vehicle
            .send_to(&serialise(&vehicle_heartbeat(), 0), &address)
            .unwrap();

        let inbound = tokio::time::timeout(Duration::from_secs(2), events.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inbound.system_id, 1);
        assert!(matches!(
            inbound.message,
            VehicleMessage::Heartbeat { mav_type: 2, .. }
        ));

        transport.send(GcsMessage::Heartbeat).await.unwrap();
        transport.send(GcsMessage::Heartbeat).await.unwrap();
        let mut sequences = Vec::new();
        let mut buf = [0u8; MAX_FRAME_LEN];
        for _ in 0..2 {
            let n = vehicle.recv(&mut buf).unwrap();
            let (header, frame) =
                mavlink::read_versioned_msg::<MavMessage, _>(&mut &buf[..n], MavlinkVersion::V2)
                    .unwrap();
            assert_eq!((header.system_id, header.component_id), (255, 190));
            assert!(matches!(frame, MavMessage::HEARTBEAT(_)));
            sequences.push(header.sequence);
        }
        assert_eq!(sequences, vec![0, 1]);

        transport.close().await;
        assert!(matches!(
            transport.send(GcsMessage::Heartbeat).await,
            Err(GatewayError::SendFailed(_))
        ));
    }
}
