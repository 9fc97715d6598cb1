//! Intent relay built on an unbounded channel
//!
//! A Relay carries UI intents from input widgets into the controller, which
//! drains the paired receiver one intent at a time.

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};

/// Type-safe event relay into a sequentially processed stream.
///
/// Relays follow the `{source}_{event}_relay` naming pattern, e.g.
/// `intent_relay` for the channel every input widget feeds.
///
/// # Examples
///
/// ```
/// use futures::StreamExt;
/// use lstmvis::dataflow::relay;
///
/// let (threshold_changed_relay, mut stream) = relay::<f32>();
/// threshold_changed_relay.send(0.5);
/// assert_eq!(futures::executor::block_on(stream.next()), Some(0.5));
/// ```
#[derive(Debug)]
pub struct Relay<T> {
    sender: UnboundedSender<T>,
}

impl<T> Clone for Relay<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Error type for Relay operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The receiving side was dropped
    #[error("relay channel closed")]
    ChannelClosed,
}

impl<T> Relay<T> {
    /// Create a new Relay with its receiver stream.
    pub fn new() -> (Self, UnboundedReceiver<T>) {
        let (sender, receiver) = unbounded();
        (Relay { sender }, receiver)
    }

    /// Send a value through the relay.
    ///
    /// If the receiver has been dropped the value is silently discarded.
    /// Use `try_send()` when the caller needs to know.
    pub fn send(&self, value: T) {
        let _ = self.sender.unbounded_send(value);
    }

    /// Send with explicit error handling.
    pub fn try_send(&self, value: T) -> Result<(), RelayError> {
        self.sender
            .unbounded_send(value)
            .map_err(|_| RelayError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<T> Default for Relay<T> {
    /// A disconnected relay whose values are discarded.
    ///
    /// Useful as a placeholder before the real receiver is wired.
    fn default() -> Self {
        let (relay, _receiver) = Self::new();
        relay
    }
}

/// Creates a new Relay with an associated receiver stream.
pub fn relay<T>() -> (Relay<T>, UnboundedReceiver<T>) {
    Relay::new()
}
