//! Mission upload session and progress tracking.
//!
//! Upload handshake (ground station → vehicle):
//!
//! ```text
//! MISSION_COUNT(n) ──►
//!                  ◄── MISSION_REQUEST[_INT](0)
//! MISSION_ITEM_INT(0) ──►
//!                  ◄── ...                    (until n-1)
//!                  ◄── MISSION_ACK(code)
//! ```
//!
//! [`MissionState`] holds at most one [`UploadSession`].  Its completion is a
//! `oneshot` channel, fulfilled exactly once by whichever of ack, send failure
//! or abandonment happens first.  Progress ([`MissionProgress`]) is fed by
//! unsolicited MISSION_CURRENT / MISSION_ITEM_REACHED and is independent of
//! the session.

use flightpath_types::{GatewayError, Waypoint, WaypointAction};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::command::{degrees_to_e7, mav_cmd};
use crate::message::MissionItem;

/// MAV_MISSION_ACCEPTED.
pub const MISSION_ACCEPTED: u8 = 0;

pub type UploadResult = Result<(), GatewayError>;

// ────────────────────────────────────────────────────────────────────────────
// Upload session
// ────────────────────────────────────────────────────────────────────────────

/// One in-flight upload.
#[derive(Debug)]
pub struct UploadSession {
    id: u64,
    waypoints: Vec<Waypoint>,
    completion: oneshot::Sender<UploadResult>,
}

impl UploadSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Fulfil the completion signal.  A caller that already gave up is fine.
    fn finish(self, result: UploadResult) {
        let _ = self.completion.send(result);
    }
}

/// Result of looking up a vehicle item request.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemRequest {
    NotUploading,
    OutOfRange { count: usize },
    Item { session_id: u64, item: MissionItem },
}

/// Result of a MISSION_ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Accepted { count: u32 },
    Rejected { code: u8 },
    /// No upload was pending (e.g. the caller already timed out).
    Unsolicited { code: u8 },
}

// ────────────────────────────────────────────────────────────────────────────
// Progress
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    Idle,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MissionProgress {
    pub current: u32,
    pub total: u32,
    pub active: bool,
    /// Sequence of the last MISSION_ITEM_REACHED.
    pub last_reached: Option<u32>,
}

impl MissionProgress {
    pub fn status(&self) -> ProgressStatus {
        if !self.active || self.total == 0 {
            ProgressStatus::Idle
        } else if self.current < self.total {
            ProgressStatus::InProgress
        } else {
            ProgressStatus::Completed
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MissionState
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MissionState {
    upload: Option<UploadSession>,
    progress: MissionProgress,
    next_id: u64,
}

impl MissionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session.  Rejects without touching the current session if one
    /// is already pending.
    pub fn begin_upload(
        &mut self,
        waypoints: Vec<Waypoint>,
    ) -> Result<(u64, oneshot::Receiver<UploadResult>), GatewayError> {
        if waypoints.is_empty() {
            return Err(GatewayError::EmptyMission);
        }
        if self.upload.is_some() {
            return Err(GatewayError::UploadInProgress);
        }

        self.next_id += 1;
        let (tx, rx) = oneshot::channel();
        self.upload = Some(UploadSession {
            id: self.next_id,
            waypoints,
            completion: tx,
        });
        Ok((self.next_id, rx))
    }

    pub fn is_uploading(&self) -> bool {
        self.upload.is_some()
    }

    pub fn session(&self) -> Option<&UploadSession> {
        self.upload.as_ref()
    }

    /// Translate the vehicle's request for item `seq`.
    pub fn item_for_request(&self, seq: u16) -> ItemRequest {
        let Some(session) = &self.upload else {
            return ItemRequest::NotUploading;
        };
        match session.waypoints.get(usize::from(seq)) {
            Some(wp) => ItemRequest::Item {
                session_id: session.id,
                item: mission_item(seq, wp),
            },
            None => ItemRequest::OutOfRange {
                count: session.waypoints.len(),
            },
        }
    }

    /// Settle a MISSION_ACK against the pending session.
    pub fn handle_ack(&mut self, code: u8) -> AckOutcome {
        let Some(session) = self.upload.take() else {
            return AckOutcome::Unsolicited { code };
        };

        if code == MISSION_ACCEPTED {
            let count = session.waypoints.len() as u32;
            self.progress = MissionProgress {
                total: count,
                ..MissionProgress::default()
            };
            session.finish(Ok(()));
            AckOutcome::Accepted { count }
        } else {
            session.finish(Err(GatewayError::MissionUploadFailed { code }));
            AckOutcome::Rejected { code }
        }
    }

    /// Complete session `id` with an error.  No-op if that session is gone.
    pub fn fail(&mut self, id: u64, error: GatewayError) -> bool {
        match self.take_if(id) {
            Some(session) => {
                session.finish(Err(error));
                true
            }
            None => false,
        }
    }

    /// Drop session `id` without signalling (the waiter has gone).
    pub fn abandon(&mut self, id: u64) -> bool {
        self.take_if(id).is_some()
    }

    fn take_if(&mut self, id: u64) -> Option<UploadSession> {
        if self.upload.as_ref().is_some_and(|s| s.id == id) {
            self.upload.take()
        } else {
            None
        }
    }

    pub fn progress(&self) -> MissionProgress {
        self.progress
    }

    pub fn set_current(&mut self, seq: u16) {
        self.progress.current = u32::from(seq);
        self.progress.active = true;
    }

    pub fn item_reached(&mut self, seq: u16) {
        self.progress.last_reached = Some(u32::from(seq));
    }

    pub fn reset_progress(&mut self) {
        self.progress = MissionProgress::default();
    }
}

/// MAV_CMD for a waypoint action.
pub fn action_command(action: WaypointAction) -> u16 {
    match action {
        WaypointAction::Takeoff => mav_cmd::NAV_TAKEOFF,
        WaypointAction::Land => mav_cmd::NAV_LAND,
        WaypointAction::Waypoint => mav_cmd::NAV_WAYPOINT,
        WaypointAction::Loiter => mav_cmd::NAV_LOITER_UNLIM,
        WaypointAction::Hold => mav_cmd::NAV_LOITER_TIME,
    }
}

/// Build the wire item for `wp`, numbered with the requested `seq`.
pub fn mission_item(seq: u16, wp: &Waypoint) -> MissionItem {
    MissionItem {
        seq,
        command: action_command(wp.action),
        lat_e7: degrees_to_e7(wp.position.latitude),
        lon_e7: degrees_to_e7(wp.position.longitude),
        alt: wp.position.altitude as f32,
        param1: wp.hold_time_sec.unwrap_or(0.0),
        param2: wp.acceptance_radius.unwrap_or(0.0),
        param3: 0.0,
        param4: wp.heading.unwrap_or(0.0),
    }
}
