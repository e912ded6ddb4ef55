//! [`Client`] – one MAVLink vehicle connection.
//!
//! # Tasks
//!
//! | Task | Role |
//! |---|---|
//! | inbound | Drains the transport's event stream in arrival order and dispatches each [`VehicleMessage`] to its handler. |
//! | announcer | Broadcasts the ground-station heartbeat and system time every period. |
//!
//! Everything else runs on the caller's task.  All mutable state lives in one
//! [`ClientState`] behind a single `RwLock`; the lock is never held across an
//! `.await`.
//!
//! Only [`Client::wait_for_connection`] and [`Client::upload_mission`] wait on
//! the vehicle, each under an explicit deadline.  Commands are
//! fire-and-forget: they return once the transport accepts the send.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use flightpath_types::{FlightMode, GatewayError, Waypoint};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::announcer;
use crate::command::{self, VehicleCommand};
use crate::config::ClientConfig;
use crate::liveness::LinkLiveness;
use crate::message::{GcsMessage, InboundFrame, Target, VehicleMessage};
use crate::mission::{AckOutcome, ItemRequest, MissionProgress, MissionState, UploadSession};
use crate::mode::px4;
use crate::telemetry::{TelemetryReport, TelemetrySnapshot};
use crate::transport::{ConnectionDescriptor, MessageTransport};
use crate::wire::MavlinkTransport;

/// MAV_TYPE_GCS.
const MAV_TYPE_GCS: u8 = 6;
/// MAV_DATA_STREAM_ALL.
const DATA_STREAM_ALL: u8 = 0;

const CONNECTION_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Upper bound on waiting for background tasks during [`Client::close`].
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(2);

// ────────────────────────────────────────────────────────────────────────────
// State
// ────────────────────────────────────────────────────────────────────────────

struct ClientState {
    liveness: LinkLiveness,
    telemetry: TelemetrySnapshot,
    mission: MissionState,
}

/// Snapshot of the link for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub connection: ConnectionDescriptor,
    pub system_id: u8,
    pub connected: bool,
    pub armed: bool,
    pub since_last_heartbeat: Option<Duration>,
}

/// State shared between the client handle and its background tasks.
struct Shared {
    transport: Arc<dyn MessageTransport>,
    state: RwLock<ClientState>,
    config: ClientConfig,
    closed: AtomicBool,
}

impl Shared {
    fn is_connected(&self) -> bool {
        let now = Instant::now();
        {
            let state = self.state.read();
            if !state.liveness.connected() {
                return false;
            }
            if !state.liveness.is_stale(now) {
                return true;
            }
        }

        let mut state = self.state.write();
        if state.liveness.refresh(now) {
            warn!(
                system_id = state.liveness.system_id(),
                "no heartbeat for {:?}; link marked disconnected",
                self.config.heartbeat_staleness
            );
        }
        state.liveness.connected()
    }

    fn system_id(&self) -> u8 {
        self.state.read().liveness.system_id()
    }

    fn report(&self) -> TelemetryReport {
        let connected = self.is_connected();
        let state = self.state.read();
        TelemetryReport::new(state.telemetry.clone(), connected, state.liveness.armed())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ── inbound handlers ────────────────────────────────────────────────────

    async fn handle_frame(&self, frame: InboundFrame) {
        let InboundFrame {
            message,
            system_id,
            component_id,
        } = frame;
        trace!(system_id, message = message.name(), "inbound");

        match message {
            VehicleMessage::Heartbeat {
                mav_type,
                base_mode,
                custom_mode,
            } => self.on_heartbeat(system_id, component_id, mav_type, base_mode, custom_mode),
            VehicleMessage::CommandAck { command, result } => {
                let outcome = command::describe_result(result);
                if command::is_accepted(result) {
                    info!(command, result = outcome, "command acknowledged");
                } else {
                    warn!(command, result = outcome, "command not accepted");
                }
            }
            VehicleMessage::StatusText { severity, text } => match severity {
                0..=3 => error!(system_id, severity, "vehicle: {text}"),
                4 => warn!(system_id, severity, "vehicle: {text}"),
                _ => info!(system_id, severity, "vehicle: {text}"),
            },
            VehicleMessage::MissionRequest { seq } | VehicleMessage::MissionRequestInt { seq } => {
                self.on_mission_request(seq).await
            }
            VehicleMessage::MissionAck { code } => self.on_mission_ack(code),
            VehicleMessage::MissionCurrent { seq } => {
                self.state.write().mission.set_current(seq);
                debug!(seq, "current mission item");
            }
            VehicleMessage::MissionItemReached { seq } => {
                self.state.write().mission.item_reached(seq);
                info!(seq, "mission item reached");
            }
            telemetry => {
                self.state.write().telemetry.apply(&telemetry, Utc::now());
            }
        }
    }

    fn on_heartbeat(
        &self,
        system_id: u8,
        component_id: u8,
        mav_type: u8,
        base_mode: u8,
        custom_mode: u32,
    ) {
        // Another ground station on the same link is not the vehicle.
        if mav_type == MAV_TYPE_GCS {
            trace!(system_id, "ignoring ground-station heartbeat");
            return;
        }
        // Gimbals, cameras and companions heartbeat too; their mode fields
        // say nothing about the autopilot.
        if component_id != Target::AUTOPILOT_COMPONENT {
            trace!(system_id, component_id, mav_type, "ignoring non-autopilot heartbeat");
            return;
        }

        let outcome = {
            let mut state = self.state.write();
            state.telemetry.apply_mode(base_mode, custom_mode);
            state.liveness.record_heartbeat(system_id, base_mode, Instant::now())
        };

        if outcome.newly_connected {
            info!(system_id, "vehicle heartbeat received, link up");
        }
        if let Some(armed) = outcome.armed_changed {
            info!(system_id, armed, "{}", if armed { "vehicle armed" } else { "vehicle disarmed" });
        }
    }

    async fn on_mission_request(&self, seq: u16) {
        let (request, system_id) = {
            let state = self.state.read();
            (state.mission.item_for_request(seq), state.liveness.system_id())
        };

        match request {
            ItemRequest::NotUploading => warn!(seq, "unexpected mission item request"),
            ItemRequest::OutOfRange { count } => {
                warn!(seq, count, "mission item request out of range")
            }
            ItemRequest::Item { session_id, item } => {
                debug!(seq, "sending mission item");
                let message = GcsMessage::MissionItemInt {
                    target: Target::autopilot(system_id),
                    item,
                };
                if let Err(e) = self.transport.send(message).await {
                    error!(seq, error = %e, "failed to send mission item");
                    self.state.write().mission.fail(session_id, e);
                }
            }
        }
    }

    fn on_mission_ack(&self, code: u8) {
        let outcome = self.state.write().mission.handle_ack(code);
        match outcome {
            AckOutcome::Accepted { count } => info!(count, "mission upload accepted"),
            AckOutcome::Rejected { code } => warn!(code, "mission upload rejected"),
            AckOutcome::Unsolicited { code } => {
                warn!(code, "mission ack with no upload pending, dropped")
            }
        }
    }
}

async fn run_inbound(
    shared: Arc<Shared>,
    mut events: BoxStream<'static, InboundFrame>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            frame = events.next() => match frame {
                Some(frame) => shared.handle_frame(frame).await,
                None => {
                    warn!("transport event stream ended");
                    break;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("inbound processing stopped");
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// A MAVLink vehicle client.
///
/// One instance per connection attempt; after [`Client::close`] it cannot be
/// reused.
pub struct Client {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    inbound: Mutex<Option<JoinHandle<()>>>,
    announcer: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Open the configured endpoint with the `mavlink` crate and start the
    /// background tasks.  Does not wait for the vehicle.
    ///
    /// # Errors
    ///
    /// [`GatewayError::TransportCreation`] when the endpoint cannot be opened.
    pub async fn connect(config: ClientConfig) -> Result<Self, GatewayError> {
        let descriptor = config.connection.clone();
        let system_id = config.gcs_system_id;
        let component_id = config.gcs_component_id;
        let transport = tokio::task::spawn_blocking(move || {
            MavlinkTransport::open(&descriptor, system_id, component_id)
        })
        .await
        .map_err(|e| GatewayError::TransportCreation(e.to_string()))??;

        Ok(Self::with_transport(Arc::new(transport), config).await)
    }

    /// Start a client over an already-open transport.
    pub async fn with_transport(transport: Arc<dyn MessageTransport>, config: ClientConfig) -> Self {
        info!(connection = %config.connection, "starting MAVLink client");

        let events = transport.events().await;
        let shared = Arc::new(Shared {
            transport: Arc::clone(&transport),
            state: RwLock::new(ClientState {
                liveness: LinkLiveness::new(config.heartbeat_staleness),
                telemetry: TelemetrySnapshot::default(),
                mission: MissionState::new(),
            }),
            closed: AtomicBool::new(false),
            config,
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let inbound = tokio::spawn(run_inbound(
            Arc::clone(&shared),
            events,
            shutdown_rx.clone(),
        ));
        let announcer = announcer::spawn(transport, shared.config.announce_period, shutdown_rx);

        Self {
            shared,
            shutdown,
            inbound: Mutex::new(Some(inbound)),
            announcer: Mutex::new(Some(announcer)),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    // ── connection ──────────────────────────────────────────────────────────

    /// Wait until a vehicle heartbeat has been seen, then ask the vehicle to
    /// start streaming telemetry.
    ///
    /// # Errors
    ///
    /// [`GatewayError::ConnectionTimeout`] if no heartbeat arrives within
    /// `timeout`.
    pub async fn wait_for_connection(&self, timeout: Duration) -> Result<(), GatewayError> {
        let poll = async {
            let mut ticker = time::interval(CONNECTION_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                if self.is_connected() {
                    return;
                }
            }
        };

        time::timeout(timeout, poll)
            .await
            .map_err(|_| GatewayError::ConnectionTimeout {
                timeout_ms: timeout.as_millis() as u64,
            })?;

        info!(system_id = self.system_id(), "connected to vehicle");
        self.request_data_streams().await;
        Ok(())
    }

    async fn request_data_streams(&self) {
        let message = GcsMessage::RequestDataStream {
            target: Target::autopilot(self.system_id()),
            stream_id: DATA_STREAM_ALL,
            rate_hz: self.shared.config.stream_rate_hz,
            start: true,
        };
        if let Err(e) = self.shared.transport.send(message).await {
            warn!(error = %e, "data stream request failed");
        }
    }

    /// Stop the background tasks and release the transport.  Safe to call
    /// more than once.
    pub async fn close(&self) -> Result<(), GatewayError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            debug!("client already closed");
            return Ok(());
        }
        info!("closing MAVLink client");

        let _ = self.shutdown.send(true);

        let announcer = self.announcer.lock().take();
        if let Some(handle) = announcer {
            stop_task("announcer", handle).await;
        }
        let inbound = self.inbound.lock().take();
        if let Some(handle) = inbound {
            stop_task("inbound", handle).await;
        }

        {
            let mut state = self.shared.state.write();
            state.liveness.mark_disconnected();
            if let Some(id) = state.mission.session().map(UploadSession::id) {
                state.mission.fail(id, GatewayError::NotConnected);
            }
        }

        self.shared.transport.close().await;
        Ok(())
    }

    // ── state ───────────────────────────────────────────────────────────────

    /// `true` while heartbeats keep arriving.  Reading this after the
    /// staleness window has passed without a heartbeat marks the link down.
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    pub fn is_armed(&self) -> bool {
        self.shared.state.read().liveness.armed()
    }

    /// System id of the vehicle, from its latest heartbeat.
    pub fn system_id(&self) -> u8 {
        self.shared.system_id()
    }

    /// A copy of the latest telemetry.
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.shared.state.read().telemetry.clone()
    }

    pub fn telemetry_report(&self) -> TelemetryReport {
        self.shared.report()
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        let connected = self.is_connected();
        let state = self.shared.state.read();
        ConnectionInfo {
            connection: self.shared.config.connection.clone(),
            system_id: state.liveness.system_id(),
            connected,
            armed: state.liveness.armed(),
            since_last_heartbeat: state.liveness.last_heartbeat().map(|at| at.elapsed()),
        }
    }

    // ── commands ────────────────────────────────────────────────────────────

    pub async fn arm(&self) -> Result<(), GatewayError> {
        self.send_command(VehicleCommand::Arm).await
    }

    pub async fn disarm(&self) -> Result<(), GatewayError> {
        self.send_command(VehicleCommand::Disarm).await
    }

    /// Switch to a raw PX4 custom mode.
    pub async fn set_mode(&self, custom_mode: u32) -> Result<(), GatewayError> {
        self.send_command(VehicleCommand::SetMode(custom_mode)).await
    }

    pub async fn set_flight_mode(&self, mode: FlightMode) -> Result<(), GatewayError> {
        self.set_mode(crate::mode::encode(mode)).await
    }

    /// Take off to `altitude` metres.
    pub async fn takeoff(&self, altitude: f32) -> Result<(), GatewayError> {
        self.send_command(VehicleCommand::Takeoff(altitude)).await
    }

    pub async fn land(&self) -> Result<(), GatewayError> {
        self.send_command(VehicleCommand::Land).await
    }

    pub async fn return_to_launch(&self) -> Result<(), GatewayError> {
        self.send_command(VehicleCommand::ReturnToLaunch).await
    }

    /// Send a position setpoint.  The vehicle only follows it in GUIDED
    /// (offboard) mode; the current mode is not checked.
    pub async fn go_to_position(
        &self,
        latitude: f64,
        longitude: f64,
        altitude: f32,
    ) -> Result<(), GatewayError> {
        let system_id = self.require_connected()?;
        info!(latitude, longitude, altitude, "sending position setpoint");
        self.shared
            .transport
            .send(command::position_target(system_id, latitude, longitude, altitude))
            .await
    }

    async fn send_command(&self, cmd: VehicleCommand) -> Result<(), GatewayError> {
        let system_id = self.require_connected()?;
        info!(command = cmd.id(), system_id, "sending command {cmd:?}");
        self.shared.transport.send(cmd.to_message(system_id)).await
    }

    fn require_connected(&self) -> Result<u8, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        Ok(self.system_id())
    }

    // ── mission ─────────────────────────────────────────────────────────────

    /// Upload `waypoints`, waiting for the vehicle's verdict.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::EmptyMission`] / [`GatewayError::NotConnected`] /
    ///   [`GatewayError::MissionTooLarge`] before anything is sent.
    /// - [`GatewayError::UploadInProgress`] if another upload is pending.
    /// - [`GatewayError::MissionUploadFailed`] if the vehicle rejects it.
    /// - [`GatewayError::MissionUploadTimeout`] if no ack arrives in time.
    ///   The vehicle may still finish the handshake afterwards; that late ack
    ///   is logged and dropped.
    pub async fn upload_mission(&self, waypoints: Vec<Waypoint>) -> Result<(), GatewayError> {
        if waypoints.is_empty() {
            return Err(GatewayError::EmptyMission);
        }
        let system_id = self.require_connected()?;
        let count =
            u16::try_from(waypoints.len()).map_err(|_| GatewayError::MissionTooLarge {
                count: waypoints.len(),
                max: u16::MAX,
            })?;

        // Mark the session before MISSION_COUNT goes out.
        let (session_id, completion) = self.shared.state.write().mission.begin_upload(waypoints)?;
        info!(count, "starting mission upload");

        let message = GcsMessage::MissionCount {
            target: Target::autopilot(system_id),
            count,
        };
        if let Err(e) = self.shared.transport.send(message).await {
            self.shared.state.write().mission.abandon(session_id);
            return Err(e);
        }

        let timeout = self.shared.config.mission_upload_timeout;
        match time::timeout(timeout, completion).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GatewayError::NotConnected),
            Err(_) => {
                self.shared.state.write().mission.abandon(session_id);
                warn!(count, "mission upload timed out after {timeout:?}");
                Err(GatewayError::MissionUploadTimeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    /// `true` while an upload session is open.
    pub fn mission_upload_pending(&self) -> bool {
        self.shared.state.read().mission.is_uploading()
    }

    pub async fn clear_mission(&self) -> Result<(), GatewayError> {
        let system_id = self.require_connected()?;
        info!("clearing mission");
        self.shared
            .transport
            .send(GcsMessage::MissionClearAll {
                target: Target::autopilot(system_id),
            })
            .await?;
        self.shared.state.write().mission.reset_progress();
        Ok(())
    }

    /// Make item `start_index` the current mission item.
    pub async fn start_mission(&self, start_index: u16) -> Result<(), GatewayError> {
        let system_id = self.require_connected()?;
        info!(start_index, "starting mission");
        self.shared
            .transport
            .send(GcsMessage::MissionSetCurrent {
                target: Target::autopilot(system_id),
                seq: start_index,
            })
            .await
    }

    /// Hold position (AUTO / LOITER).
    pub async fn pause_mission(&self) -> Result<(), GatewayError> {
        self.set_mode(px4::pack(px4::MAIN_AUTO, px4::AUTO_LOITER)).await
    }

    /// Continue the mission (AUTO / MISSION).
    pub async fn resume_mission(&self) -> Result<(), GatewayError> {
        self.set_mode(px4::pack(px4::MAIN_AUTO, px4::AUTO_MISSION)).await
    }

    pub fn mission_progress(&self) -> MissionProgress {
        self.shared.state.read().mission.progress()
    }

    // ── feeds ───────────────────────────────────────────────────────────────

    /// A [`TelemetryReport`] every `period`.  Ends when the client closes;
    /// drop it to stop early.
    pub fn telemetry_feed(&self, period: Duration) -> BoxStream<'static, TelemetryReport> {
        self.feed(period, |shared| shared.report())
    }

    /// Mission progress every `period`.  Ends when the client closes.
    pub fn progress_feed(&self, period: Duration) -> BoxStream<'static, MissionProgress> {
        self.feed(period, |shared| shared.state.read().mission.progress())
    }

    fn feed<T, F>(&self, period: Duration, sample: F) -> BoxStream<'static, T>
    where
        T: Send + 'static,
        F: Fn(&Shared) -> T + Send + Sync + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let ticker = time::interval(period);
        stream::unfold((shared, ticker, sample), |(shared, mut ticker, sample)| async move {
            ticker.tick().await;
            if shared.is_closed() {
                return None;
            }
            let item = sample(shared.as_ref());
            Some((item, (shared, ticker, sample)))
        })
        .boxed()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Background tasks watch this; the transport is released when the
        // last task exits.
        let _ = self.shutdown.send(true);
    }
}

async fn stop_task(name: &'static str, mut handle: JoinHandle<()>) {
    if time::timeout(TASK_STOP_TIMEOUT, &mut handle).await.is_err() {
        warn!(task = name, "task did not stop within {TASK_STOP_TIMEOUT:?}, aborting");
        handle.abort();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
