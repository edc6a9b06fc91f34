//! Callback targets.
//!
//! A target is the opaque handle a reply is delivered to. It is backed by an
//! unbounded channel so delivery never blocks the router; the receiving half
//! belongs to whoever registered the target (a pending client future, a
//! persistent listener, a transport adapter).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::views::Reply;

/// Receiving half of a [`CallbackTarget`].
pub type ReplyReceiver = mpsc::UnboundedReceiver<Reply>;

static NEXT_TARGET: AtomicU64 = AtomicU64::new(1);

/// Whether a slot survives a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotMode {
    /// Consumed and cleared after exactly one delivery.
    OneShot,
    /// Retained across arbitrarily many deliveries.
    Persistent,
}

impl SlotMode {
    /// Transport-level "keep callback" flag.
    #[must_use]
    pub const fn keep_alive(self) -> bool {
        matches!(self, Self::Persistent)
    }
}

/// What happened to a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The reply reached a live receiver.
    Delivered,
    /// The target is unset; nothing to do.
    Skipped,
    /// The receiver was dropped; the reply is lost.
    Dead,
}

/// Handle a reply can be delivered to.
///
/// An unset target ([`CallbackTarget::unset`]) is a legal no-op: delivering
/// to it is silently skipped.
#[derive(Clone)]
pub struct CallbackTarget {
    id: u64,
    sender: Option<mpsc::UnboundedSender<Reply>>,
}

impl CallbackTarget {
    /// Create a target and the receiver its replies arrive on.
    #[must_use]
    pub fn channel() -> (Self, ReplyReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let target = Self {
            id: NEXT_TARGET.fetch_add(1, Ordering::Relaxed),
            sender: Some(tx),
        };
        (target, rx)
    }

    /// A target that swallows every delivery.
    #[must_use]
    pub const fn unset() -> Self {
        Self { id: 0, sender: None }
    }

    /// Process-unique id of this target (`0` for unset targets).
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns `true` if the target is unset.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        self.sender.is_none()
    }

    /// Liveness flag: `false` once the receiving half has been dropped.
    ///
    /// Unset targets count as alive; they are a valid resting state.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.sender.as_ref().is_none_or(|tx| !tx.is_closed())
    }

    /// Deliver a reply.
    pub fn deliver(&self, reply: Reply) -> DeliveryOutcome {
        match &self.sender {
            None => DeliveryOutcome::Skipped,
            Some(tx) => match tx.send(reply) {
                Ok(()) => DeliveryOutcome::Delivered,
                Err(_) => DeliveryOutcome::Dead,
            },
        }
    }
}

impl Default for CallbackTarget {
    fn default() -> Self {
        Self::unset()
    }
}

impl fmt::Debug for CallbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTarget")
            .field("id", &self.id)
            .field("unset", &self.is_unset())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl PartialEq for CallbackTarget {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CallbackTarget {}
