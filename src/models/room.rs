use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static EMAIL_SHAPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid regex")
});

const MAX_TOKEN_LEN: usize = 254;

/// Room identifier held by a client and the relay.
///
/// Rooms have no lifecycle of their own: they exist while somebody holds the
/// token. Shape rules (email-like tokens) belong to the UI; the core only
/// rejects tokens that cannot travel as a label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomToken(String);

impl RoomToken {
    /// Parse a user-supplied room token.
    pub fn parse(raw: &str) -> Result<Self> {
        let token = raw.trim();
        if token.is_empty() {
            return Err(Error::InvalidRoomToken("empty".to_string()));
        }
        if token.len() > MAX_TOKEN_LEN {
            return Err(Error::InvalidRoomToken(format!(
                "longer than {} bytes",
                MAX_TOKEN_LEN
            )));
        }
        if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::InvalidRoomToken(format!(
                "'{}' contains whitespace",
                token
            )));
        }
        Ok(Self(token.to_string()))
    }

    /// Wrap a room name handed out by the relay.
    pub fn assigned(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Email-shaped check used by front ends before joining.
    pub fn is_email_shaped(raw: &str) -> bool {
        EMAIL_SHAPED.is_match(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
