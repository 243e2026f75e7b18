//! Single-slot hand-off channels.
//!
//! Both the frame queue and the debug-image queue hold at most one pending
//! value. Offering into a full slot drops the new value instead of blocking.

use crossbeam_channel::{Receiver, RecvError, Sender, TryRecvError, TrySendError, bounded};

/// What happened to an offered value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// Slot was full, the offered value was discarded
    DroppedNewest,
    /// Receiver is gone
    Disconnected,
}

pub struct SlotSender<T> {
    tx: Sender<T>,
}

pub struct SlotReceiver<T> {
    rx: Receiver<T>,
}

/// Create a capacity-1 channel
pub fn slot<T>() -> (SlotSender<T>, SlotReceiver<T>) {
    let (tx, rx) = bounded(1);
    (SlotSender { tx }, SlotReceiver { rx })
}

impl<T> SlotSender<T> {
    /// Non-blocking offer with drop-newest overflow
    pub fn offer(&self, value: T) -> Offer {
        match self.tx.try_send(value) {
            Ok(()) => Offer::Queued,
            Err(TrySendError::Full(_)) => Offer::DroppedNewest,
            Err(TrySendError::Disconnected(_)) => Offer::Disconnected,
        }
    }

    /// Blocking send, used only for control messages that must not be lost.
    /// Returns `false` when the receiver is gone.
    pub fn send_blocking(&self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }
}

impl<T> Clone for SlotSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> SlotReceiver<T> {
    /// Block until a value arrives. `None` once every sender is dropped.
    pub fn recv(&self) -> Option<T> {
        match self.rx.recv() {
            Ok(value) => Some(value),
            Err(RecvError) => None,
        }
    }

    /// Take the pending value, if any
    pub fn take(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}
