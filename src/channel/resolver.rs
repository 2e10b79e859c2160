//! Channel eligibility resolution.

use chrono::{DateTime, Utc};
use smallvec::SmallVec;

use crate::preference::NotificationPreference;
use crate::ratelimit::ChannelRateLimiter;

use super::Channel;

/// Channels eligible to send for a user right now, in dispatch priority
/// order (push, whatsapp, sms, email).
///
/// Applies, in order: the user's per-channel opt-outs, quiet-hours
/// suppression (email exempt), and the per-channel hourly cap. Reads only,
/// no side effects; rate budget is consumed later, at dispatch time.
pub fn eligible_channels(
    pref: &NotificationPreference,
    limiter: &ChannelRateLimiter,
    now: DateTime<Utc>,
) -> SmallVec<[Channel; 4]> {
    Channel::PRIORITY_ORDER
        .iter()
        .copied()
        .filter(|&c| pref.channel_enabled(c))
        .filter(|&c| !pref.in_quiet_hours(c, now))
        .filter(|&c| !limiter.at_cap(c, now))
        .collect()
}
