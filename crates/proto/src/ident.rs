use serde::{Deserialize, Serialize};

/// Unique identifier for a channel endpoint (e.g., "telegram:12345").
///
/// Doubles as the reply address: the adapter that produced an inbound
/// event knows how to turn its own channel id back into a platform chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    /// Builds a channel identifier from adapter name and adapter-specific id.
    pub fn new(adapter: &str, id: &str) -> Self {
        Self(format!("{adapter}:{id}"))
    }

    /// Returns the raw channel identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the adapter-specific part after the `adapter:` prefix,
    /// or the whole string when no prefix is present.
    pub fn local_part(&self) -> &str {
        match self.0.split_once(':') {
            Some((_, rest)) => rest,
            None => &self.0,
        }
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stable identity of a remote principal.
///
/// The numeric platform user id is the stable part; a display handle is
/// appended as `<id>|<handle>` when available so allowlists keyed on
/// handles keep working, without losing identity when the handle changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SenderId(pub String);

impl SenderId {
    /// Builds a sender identity from a numeric user id and optional handle.
    pub fn composite(user_id: i64, handle: Option<&str>) -> Self {
        match handle {
            Some(h) if !h.is_empty() => Self(format!("{user_id}|{h}")),
            _ => Self(user_id.to_string()),
        }
    }

    /// Returns the raw sender identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the stable numeric portion of the identity.
    pub fn numeric_part(&self) -> &str {
        match self.0.split_once('|') {
            Some((id, _)) => id,
            None => &self.0,
        }
    }
}

impl std::fmt::Display for SenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SenderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SenderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
