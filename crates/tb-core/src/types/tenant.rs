//! Tenant identity — the `(user, bot)` pair that addresses a session.

use std::fmt;

/// Prefix of every per-tenant tick channel.
pub const TICKS_CHANNEL_PREFIX: &str = "CH:TICKS:";

/// Composite identity of one streaming session.
///
/// The registry holds at most one live session per key. `Display` renders
/// the stable composite form `"userID:botID"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantKey {
    user_id: String,
    bot_id: String,
}

impl TenantKey {
    pub fn new(user_id: &str, bot_id: &str) -> Self {
        Self { user_id: user_id.to_string(), bot_id: bot_id.to_string() }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    /// Name of the pub/sub channel this tenant's ticks are published on:
    /// `"CH:TICKS:" + userID + ":" + botID`.
    pub fn ticks_channel(&self) -> String {
        format!("{TICKS_CHANNEL_PREFIX}{}:{}", self.user_id, self.bot_id)
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.bot_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_form() {
        let key = TenantKey::new("U1", "B1");
        assert_eq!(key.to_string(), "U1:B1");
    }

    #[test]
    fn ticks_channel_name() {
        let key = TenantKey::new("U1", "B1");
        assert_eq!(key.ticks_channel(), "CH:TICKS:U1:B1");
    }

    #[test]
    fn distinct_users_distinct_keys() {
        assert_ne!(TenantKey::new("U1", "B1"), TenantKey::new("U11", "B1"));
    }
}
