//! [`LinkLiveness`] – connection and armed state derived from heartbeats.
//!
//! The vehicle sends HEARTBEAT at roughly 1 Hz.  Each one refreshes the
//! deadline; a link whose last heartbeat is older than the staleness window is
//! considered dead.  Liveness is evaluated lazily by [`LinkLiveness::refresh`]
//! instead of by a timer task.

use std::time::Duration;

use tokio::time::Instant;

/// MAV_MODE_FLAG_SAFETY_ARMED.
pub const SAFETY_ARMED_FLAG: u8 = 0b1000_0000;

/// What changed as a result of one heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartbeatOutcome {
    /// The link went from disconnected to connected.
    pub newly_connected: bool,
    /// `Some(armed)` only when the armed state flipped.
    pub armed_changed: Option<bool>,
}

/// Tracks the vehicle heartbeat and the state carried in it.
#[derive(Debug, Clone)]
pub struct LinkLiveness {
    connected: bool,
    armed: bool,
    system_id: u8,
    last_heartbeat: Option<Instant>,
    staleness: Duration,
}

impl LinkLiveness {
    pub fn new(staleness: Duration) -> Self {
        Self {
            connected: false,
            armed: false,
            system_id: 0,
            last_heartbeat: None,
            staleness,
        }
    }

    /// Record a vehicle heartbeat received at `now`.
    pub fn record_heartbeat(&mut self, system_id: u8, base_mode: u8, now: Instant) -> HeartbeatOutcome {
        let newly_connected = !self.connected;
        self.connected = true;
        self.system_id = system_id;
        self.last_heartbeat = Some(now);

        let armed = base_mode & SAFETY_ARMED_FLAG != 0;
        let armed_changed = (armed != self.armed).then_some(armed);
        self.armed = armed;

        HeartbeatOutcome {
            newly_connected,
            armed_changed,
        }
    }

    /// `true` when no heartbeat has arrived within the staleness window.
    pub fn is_stale(&self, now: Instant) -> bool {
        match self.last_heartbeat {
            Some(at) => now.saturating_duration_since(at) > self.staleness,
            None => true,
        }
    }

    /// Degrade `connected` to `false` if the link has gone stale.
    ///
    /// Returns `true` when this call performed the transition.
    pub fn refresh(&mut self, now: Instant) -> bool {
        if self.connected && self.is_stale(now) {
            self.connected = false;
            return true;
        }
        false
    }

    /// Force the link down (explicit close).
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn armed(&self) -> bool {
        self.armed
    }

    pub fn system_id(&self) -> u8 {
        self.system_id
    }

    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }
}
