//! Message channel abstraction.
//!
//! The bridge only needs to post messages to the other side and to be handed
//! the raw messages that arrive. [`MessagePort`] is the posting half; inbound
//! traffic is fed to `handle_message` on the host or guest, either directly by
//! the embedding event loop or by a `listen` task reading an [`Inbox`].

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

use crate::error::{BridgeError, BridgeResult};
use crate::message::BridgeMessage;

/// Sends messages to the other side of the channel.
///
/// Delivery is best effort and unordered from the bridge's point of view;
/// the bridge never assumes a posted message arrives.
#[async_trait]
pub trait MessagePort: Send + Sync {
    /// Post one message.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ChannelClosed`] when the other side is gone,
    /// or a serialization error if the message cannot be encoded.
    async fn post(&self, message: BridgeMessage) -> BridgeResult<()>;
}

/// In-process port that serializes each message to JSON before delivery,
/// exactly as a structured-clone channel would.
#[derive(Clone)]
pub struct LocalPort {
    tx: mpsc::UnboundedSender<Value>,
}

impl fmt::Debug for LocalPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalPort")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl LocalPort {
    /// Post a raw JSON value, bypassing the typed message model.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ChannelClosed`] when the receiving inbox was dropped.
    pub fn post_raw(&self, value: Value) -> BridgeResult<()> {
        self.tx
            .send(value)
            .map_err(|_| BridgeError::ChannelClosed("receiver dropped".to_string()))
    }
}

#[async_trait]
impl MessagePort for LocalPort {
    async fn post(&self, message: BridgeMessage) -> BridgeResult<()> {
        self.post_raw(message.to_value()?)
    }
}

/// Receiving half of a local channel.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl Inbox {
    /// Wait for the next raw message; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Take a message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }
}

/// One side of a connected pair.
#[derive(Debug)]
pub struct ChannelEnd {
    /// Posts to the opposite side
    pub port: LocalPort,
    /// Messages posted by the opposite side
    pub inbox: Inbox,
}

/// Create two connected ends, conventionally host first and guest second.
///
/// ```rust
/// use toolui_bridge::{BridgeMessage, MessagePort, channel};
///
/// # tokio_test::block_on(async {
/// let (host, mut guest) = channel::pair();
/// host.port.post(BridgeMessage::Ready).await.unwrap();
///
/// let raw = guest.inbox.recv().await.unwrap();
/// assert_eq!(raw["type"], "ready");
/// # });
/// ```
pub fn pair() -> (ChannelEnd, ChannelEnd) {
    let (to_b, from_a) = mpsc::unbounded_channel();
    let (to_a, from_b) = mpsc::unbounded_channel();
    (
        ChannelEnd {
            port: LocalPort { tx: to_b },
            inbox: Inbox { rx: from_b },
        },
        ChannelEnd {
            port: LocalPort { tx: to_a },
            inbox: Inbox { rx: from_a },
        },
    )
}
