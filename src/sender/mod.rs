//! Channel transport seam.
//!
//! One [`ChannelSender`] per channel, wired in at construction. The engine
//! treats transports as fire-and-forget: a send either succeeds, fails
//! transiently (retryable), or fails permanently (destination invalid).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::channel::{Channel, ChannelKey};
use crate::error::SendError;
use crate::render::RenderedMessage;
use crate::window::ReminderWindow;

/// Transport for one channel.
///
/// For push, `key` carries the device endpoint the message must go to;
/// for the other channels the user id identifies the destination.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(
        &self,
        user_id: &str,
        key: &ChannelKey,
        window: ReminderWindow,
        message: &RenderedMessage,
    ) -> Result<(), SendError>;
}

/// Channel -> sender wiring.
///
/// A channel without a registered sender is treated as globally disabled:
/// dispatch for it is skipped with a warning, without failing other
/// channels.
#[derive(Default)]
pub struct SenderRegistry {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self {
            senders: HashMap::new(),
        }
    }

    pub fn with_sender(mut self, channel: Channel, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(channel, sender);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelSender>> {
        self.senders.get(&channel).cloned()
    }

    pub fn is_configured(&self, channel: Channel) -> bool {
        self.senders.contains_key(&channel)
    }
}

/// Sender that only logs, used by the demo binary so the engine runs end
/// to end without real transports.
pub struct LoggingSender;

#[async_trait]
impl ChannelSender for LoggingSender {
    async fn send(
        &self,
        user_id: &str,
        key: &ChannelKey,
        window: ReminderWindow,
        message: &RenderedMessage,
    ) -> Result<(), SendError> {
        tracing::info!(
            user_id = %user_id,
            channel_key = %key,
            window = %window,
            title = %message.title,
            "Reminder dispatched (logging sender)"
        );
        Ok(())
    }
}
