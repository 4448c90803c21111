//! Operator input channel.
//!
//! Operator input is produced on its own thread (keyboard, joystick, network)
//! and consumed by the control thread once per tick.  Two values cross the
//! boundary:
//!
//! * the continuous [`OperatorIntent`] – a last-write-wins latched value
//!   carried by a [`tokio::sync::watch`] channel.  The control thread only
//!   borrows the latest value and never waits for a new one.
//! * a discrete [`PhaseRequest`] – a single latched slot.  The writer
//!   overwrites it, the control thread takes it (leaving it empty), so each
//!   request is seen at most once.  A pending `Emergency` is never
//!   overwritten by a later `Start` or `Stop`.
//!
//! # Example
//!
//! ```rust
//! use strider_middleware::operator::operator_channel;
//! use strider_types::{OperatorIntent, PhaseRequest};
//!
//! let (handle, receiver) = operator_channel();
//! handle.set_intent(OperatorIntent::new(0.5, 0.0, 0.1));
//! handle.request(PhaseRequest::Start);
//!
//! assert_eq!(receiver.intent().x, 0.5);
//! assert_eq!(receiver.take_request(), Some(PhaseRequest::Start));
//! assert_eq!(receiver.take_request(), None);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use strider_types::{OperatorIntent, PhaseRequest};
use tokio::sync::watch;
use tracing::debug;

use crate::keymap::KeyAction;

const SLOT_EMPTY: u8 = 0;
const SLOT_START: u8 = 1;
const SLOT_STOP: u8 = 2;
const SLOT_EMERGENCY: u8 = 3;

fn encode(request: PhaseRequest) -> u8 {
    match request {
        PhaseRequest::Start => SLOT_START,
        PhaseRequest::Stop => SLOT_STOP,
        PhaseRequest::Emergency => SLOT_EMERGENCY,
    }
}

fn decode(slot: u8) -> Option<PhaseRequest> {
    match slot {
        SLOT_START => Some(PhaseRequest::Start),
        SLOT_STOP => Some(PhaseRequest::Stop),
        SLOT_EMERGENCY => Some(PhaseRequest::Emergency),
        _ => None,
    }
}

/// Create a connected writer / reader pair with a zero intent and an empty
/// request slot.
pub fn operator_channel() -> (OperatorHandle, OperatorReceiver) {
    let (intent_tx, intent_rx) = watch::channel(OperatorIntent::default());
    let slot = Arc::new(AtomicU8::new(SLOT_EMPTY));
    (
        OperatorHandle {
            intent: Arc::new(intent_tx),
            request: Arc::clone(&slot),
        },
        OperatorReceiver {
            intent: intent_rx,
            request: slot,
        },
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Writer side
// ────────────────────────────────────────────────────────────────────────────

/// Writer half, owned by the input thread.  Cloning it gives another writer
/// onto the same latched values (e.g. the Ctrl-C handler).
#[derive(Debug, Clone)]
pub struct OperatorHandle {
    intent: Arc<watch::Sender<OperatorIntent>>,
    request: Arc<AtomicU8>,
}

impl OperatorHandle {
    /// Replace the latched intent.
    pub fn set_intent(&self, intent: OperatorIntent) {
        self.intent.send_replace(intent);
    }

    /// Modify the latched intent in place.
    pub fn update_intent(&self, f: impl FnOnce(&mut OperatorIntent)) {
        self.intent.send_modify(f);
    }

    /// The intent as last written.
    pub fn intent(&self) -> OperatorIntent {
        *self.intent.borrow()
    }

    /// Latch a phase-change request, replacing any unread one unless the
    /// unread one is an emergency.
    pub fn request(&self, request: PhaseRequest) {
        let new = encode(request);
        let _ = self
            .request
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current == SLOT_EMERGENCY {
                    None
                } else {
                    Some(new)
                }
            });
        debug!(?request, "phase request latched");
    }

    /// Apply one decoded key press.
    pub fn apply(&self, action: KeyAction) {
        match action {
            KeyAction::Request(request) => self.request(request),
            KeyAction::Nudge { x, y, yaw } => self.update_intent(|i| {
                i.x += x;
                i.y += y;
                i.yaw += yaw;
            }),
            KeyAction::ZeroIntent => self.set_intent(OperatorIntent::default()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reader side
// ────────────────────────────────────────────────────────────────────────────

/// Reader half, owned by the control thread.  Every method is non-blocking.
#[derive(Debug)]
pub struct OperatorReceiver {
    intent: watch::Receiver<OperatorIntent>,
    request: Arc<AtomicU8>,
}

impl OperatorReceiver {
    /// The most recently written intent.  Keeps returning the last value
    /// after the writer is gone.
    pub fn intent(&self) -> OperatorIntent {
        *self.intent.borrow()
    }

    /// Take the pending phase request, leaving the slot empty.
    pub fn take_request(&self) -> Option<PhaseRequest> {
        decode(self.request.swap(SLOT_EMPTY, Ordering::AcqRel))
    }

    /// `true` once every [`OperatorHandle`] has been dropped.
    pub fn writer_closed(&self) -> bool {
        self.intent.has_changed().is_err()
    }
}
