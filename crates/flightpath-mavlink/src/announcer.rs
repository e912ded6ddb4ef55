//! Ground-station announcer.
//!
//! PX4 and ArduPilot only stream to, and fail-safe against, a ground station
//! they can hear.  This task broadcasts a GCS HEARTBEAT plus SYSTEM_TIME (a
//! time reference for GPS warm start) every period until told to stop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::message::GcsMessage;
use crate::transport::MessageTransport;

/// Spawn the announcer.  It exits when `shutdown` flips to `true` or its
/// sender is dropped.
pub fn spawn(
    transport: Arc<dyn MessageTransport>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => announce(transport.as_ref()).await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("ground-station announcer stopped");
    })
}

async fn announce(transport: &dyn MessageTransport) {
    for message in [GcsMessage::Heartbeat, system_time()] {
        let name = message.name();
        if let Err(e) = transport.send(message).await {
            warn!(message = name, error = %e, "announce send failed");
        }
    }
}

/// SYSTEM_TIME carrying the wall clock.  `time_boot_ms` is the same clock
/// truncated to 32 bits.
pub fn system_time() -> GcsMessage {
    let now = Utc::now();
    let millis = now.timestamp_millis().max(0) as u64;
    GcsMessage::SystemTime {
        time_unix_usec: now.timestamp_micros().max(0) as u64,
        time_boot_ms: (millis % (1u64 << 32)) as u32,
    }
}
