//! Notification channels, endpoint-scoped channel keys, and the
//! eligibility resolver.

mod resolver;

pub use resolver::eligible_channels;

use serde::{Deserialize, Serialize};

/// A notification transport.
///
/// Declaration order is dispatch priority order: push is cheapest and least
/// intrusive, email is the fallback of last resort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Push,
    WhatsApp,
    Sms,
    Email,
}

impl Channel {
    /// All channels, in dispatch priority order.
    pub const PRIORITY_ORDER: [Channel; 4] = [
        Channel::Push,
        Channel::WhatsApp,
        Channel::Sms,
        Channel::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Push => "push",
            Channel::WhatsApp => "whatsapp",
            Channel::Sms => "sms",
            Channel::Email => "email",
        }
    }

    /// Channels subject to quiet-hours suppression. Email is treated as
    /// non-intrusive and is never suppressed.
    pub fn respects_quiet_hours(&self) -> bool {
        !matches!(self, Channel::Email)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger-facing channel identity.
///
/// Push dispatch fans out per device endpoint, so for ledger purposes the
/// push channel is scoped to the endpoint (`push:{endpoint}`); the other
/// channels are a single destination per user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKey {
    Push { endpoint: String },
    WhatsApp,
    Sms,
    Email,
}

impl ChannelKey {
    pub fn for_push_endpoint(endpoint: impl Into<String>) -> Self {
        ChannelKey::Push {
            endpoint: endpoint.into(),
        }
    }

    /// Key for a channel with a single destination per user. Push is
    /// endpoint-scoped and has no direct key; use
    /// [`ChannelKey::for_push_endpoint`].
    pub fn direct(channel: Channel) -> Option<Self> {
        match channel {
            Channel::Push => None,
            Channel::WhatsApp => Some(ChannelKey::WhatsApp),
            Channel::Sms => Some(ChannelKey::Sms),
            Channel::Email => Some(ChannelKey::Email),
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            ChannelKey::Push { .. } => Channel::Push,
            ChannelKey::WhatsApp => Channel::WhatsApp,
            ChannelKey::Sms => Channel::Sms,
            ChannelKey::Email => Channel::Email,
        }
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKey::Push { endpoint } => write!(f, "push:{endpoint}"),
            other => f.write_str(other.channel().as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert_eq!(
            Channel::PRIORITY_ORDER,
            [
                Channel::Push,
                Channel::WhatsApp,
                Channel::Sms,
                Channel::Email
            ]
        );
    }

    #[test]
    fn test_email_exempt_from_quiet_hours() {
        assert!(Channel::Push.respects_quiet_hours());
        assert!(Channel::Sms.respects_quiet_hours());
        assert!(Channel::WhatsApp.respects_quiet_hours());
        assert!(!Channel::Email.respects_quiet_hours());
    }

    #[test]
    fn test_direct_key_excludes_push() {
        assert_eq!(ChannelKey::direct(Channel::Push), None);
        assert_eq!(ChannelKey::direct(Channel::Email), Some(ChannelKey::Email));
        assert_eq!(ChannelKey::direct(Channel::Sms), Some(ChannelKey::Sms));
        assert_eq!(
            ChannelKey::direct(Channel::WhatsApp),
            Some(ChannelKey::WhatsApp)
        );
    }

    #[test]
    fn test_channel_key_display() {
        let key = ChannelKey::for_push_endpoint("https://push.example/abc");
        assert_eq!(key.to_string(), "push:https://push.example/abc");
        assert_eq!(ChannelKey::Email.to_string(), "email");
    }
}
