//! In-process broadcast medium
//!
//! Every frame sent on a virtual network is handed to every other plugged-in
//! receiver. Used to wire virtual ports together in simulations and tests.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Callback invoked for each frame delivered to a receiver
pub type FrameHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Identifies one plugged-in receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverId(u64);

/// A virtual network segment
#[derive(Default)]
pub struct VirtualNetwork {
    next_id: AtomicU64,
    plugged: Mutex<Vec<(ReceiverId, FrameHandler)>>,
}

impl VirtualNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug a receiver into this network
    pub fn plug(&self, handler: FrameHandler) -> ReceiverId {
        let id = ReceiverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.plugged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    /// Unplug a receiver; returns false if it was not plugged in
    pub fn unplug(&self, id: ReceiverId) -> bool {
        let mut plugged = self.plugged.lock().unwrap_or_else(PoisonError::into_inner);
        let before = plugged.len();
        plugged.retain(|(plugged_id, _)| *plugged_id != id);
        plugged.len() != before
    }

    /// Send a frame to every receiver except the sender
    pub fn send_frame(&self, frame: Bytes, sender: ReceiverId) {
        // handlers run outside the lock so they may plug/unplug or send
        let recipients: Vec<FrameHandler> = self
            .plugged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, _)| *id != sender)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in recipients {
            handler(frame.clone());
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.plugged.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
