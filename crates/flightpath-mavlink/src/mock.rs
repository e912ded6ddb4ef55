//! In-memory [`MessageTransport`] for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use flightpath_types::GatewayError;
use futures_util::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::message::{GcsMessage, InboundFrame, Target, VehicleMessage};
use crate::transport::MessageTransport;

/// Records every accepted send on a channel and replays injected frames.
pub struct MockTransport {
    sent: mpsc::UnboundedSender<GcsMessage>,
    inbound_tx: mpsc::UnboundedSender<InboundFrame>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundFrame>>>,
    attempts: AtomicUsize,
    fail_sends: AtomicBool,
    closed: AtomicBool,
}

impl MockTransport {
    /// Returns the transport and the receiving end of its send log.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GcsMessage>) {
        let (sent, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let transport = Self {
            sent,
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            attempts: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        };
        (transport, sent_rx)
    }

    /// Queue a frame from the vehicle's autopilot.
    pub fn inject(&self, system_id: u8, message: VehicleMessage) {
        self.inject_from(system_id, Target::AUTOPILOT_COMPONENT, message);
    }

    /// Queue a frame from any component on the vehicle.
    pub fn inject_from(&self, system_id: u8, component_id: u8, message: VehicleMessage) {
        let _ = self
            .inbound_tx
            .send(InboundFrame::new(system_id, component_id, message));
    }

    /// A vehicle heartbeat from `system_id` in the given base mode.
    pub fn inject_heartbeat(&self, system_id: u8, base_mode: u8) {
        self.inject(
            system_id,
            VehicleMessage::Heartbeat {
                mav_type: 2,
                base_mode,
                custom_mode: 0,
            },
        );
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Number of `send` calls, including failed ones.
    pub fn send_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    async fn send(&self, message: GcsMessage) -> Result<(), GatewayError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::SendFailed("transport closed".into()));
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(GatewayError::SendFailed("mock send failure".into()));
        }
        let _ = self.sent.send(message);
        Ok(())
    }

    async fn events(&self) -> BoxStream<'static, InboundFrame> {
        match self.inbound_rx.lock().take() {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|frame| (frame, rx))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
