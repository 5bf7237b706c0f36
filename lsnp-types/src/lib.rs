//! Shared identifiers, scopes, and protocol constants for the LSNP peer.
//!
//! Kept deliberately tiny: every other crate in the workspace depends on
//! this one, so anything added here is added everywhere.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Newline is forbidden inside a record value (spec §4.1); reject it once,
/// here, so every layer above the codec can rely on the invariant.
pub const FORBIDDEN_VALUE_BYTE: u8 = b'\n';

/// Default UDP listen port when none is configured.
pub const LSNP_DEFAULT_PORT: u16 = 50999;

/// Chunk size (pre-base64, bytes) used by the file-transfer engine.
pub const MAX_CHUNK_SIZE: usize = 1024;

/// Upper bound on a single UDP payload this peer will ever send (§4.5).
pub const MAX_DATAGRAM_SIZE: usize = 60 * 1024;

/// Base retry interval for the reliability layer (§4.6).
pub const RELIABILITY_BASE_INTERVAL_SECS: u64 = 2;

/// Maximum retransmission attempts per outbound message (§4.6).
pub const RELIABILITY_MAX_ATTEMPTS: u32 = 3;

/// Bound on the per-sender seen-message-id set (§5).
pub const SEEN_ID_CAP: usize = 1024;

/// How long a sender waits for FILE_ACCEPT/FILE_REJECT before aborting (§4.8).
pub const FILE_OFFER_TIMEOUT_SECS: u64 = 60;

/// How long a receiver waits for chunk progress before aborting a transfer (§5).
pub const TRANSFER_STALL_TIMEOUT_SECS: u64 = 60;

/// Default period for the PROFILE-broadcast / PING sweep (§4.7, §9).
pub const DEFAULT_PERIODIC_INTERVAL_SECS: u64 = 300;

/// A peer's canonical identifier: `user@ip`.
///
/// The short handle alone (`user`) is ambiguous across peers; only the full
/// form is used as a map key or embedded in a token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FullId {
    pub user: String,
    pub ip: Ipv4Addr,
}

impl FullId {
    pub fn new(user: impl Into<String>, ip: Ipv4Addr) -> Self {
        Self { user: user.into(), ip }
    }

    /// The short handle, e.g. `"alice"` from `"alice@192.168.1.5"`.
    pub fn handle(&self) -> &str {
        &self.user
    }
}

impl fmt::Display for FullId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.ip)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FullIdParseError {
    #[error("missing '@' separator in full id {0:?}")]
    MissingSeparator(String),
    #[error("empty user handle in full id {0:?}")]
    EmptyUser(String),
    #[error("invalid IPv4 address {0:?}")]
    BadIp(String),
}

impl FromStr for FullId {
    type Err = FullIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, ip) = s
            .split_once('@')
            .ok_or_else(|| FullIdParseError::MissingSeparator(s.to_string()))?;
        if user.is_empty() {
            return Err(FullIdParseError::EmptyUser(s.to_string()));
        }
        let ip: Ipv4Addr = ip
            .parse()
            .map_err(|_| FullIdParseError::BadIp(ip.to_string()))?;
        Ok(FullId { user: user.to_string(), ip })
    }
}

/// Authorization scope embedded in a token (§3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Chat,
    File,
    Broadcast,
    Follow,
    Game,
    Group,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Chat => "chat",
            Scope::File => "file",
            Scope::Broadcast => "broadcast",
            Scope::Follow => "follow",
            Scope::Game => "game",
            Scope::Group => "group",
        }
    }

    /// The scope required to send/receive a record of the given `TYPE`, if any.
    ///
    /// `PROFILE`, `PING`, and `ACK` carry no scope requirement — they are
    /// never wrapped in a reliability entry and never authorization-checked.
    pub fn required_for_type(message_type: &str) -> Option<Scope> {
        match message_type {
            "DM" => Some(Scope::Chat),
            "POST" | "LIKE" => Some(Scope::Broadcast),
            "FOLLOW" | "UNFOLLOW" => Some(Scope::Follow),
            "FILE_OFFER" | "FILE_ACCEPT" | "FILE_REJECT" | "FILE_CHUNK" | "FILE_RECEIVED" => {
                Some(Scope::File)
            }
            "GAME_INVITE" | "GAME_MOVE" | "GAME_RESULT" => Some(Scope::Game),
            "GROUP_CREATE" | "GROUP_MSG" => Some(Scope::Group),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown scope {0:?}")]
pub struct ScopeParseError(String);

impl FromStr for Scope {
    type Err = ScopeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Scope::Chat),
            "file" => Ok(Scope::File),
            "broadcast" => Ok(Scope::Broadcast),
            "follow" => Ok(Scope::Follow),
            "game" => Ok(Scope::Game),
            "group" => Ok(Scope::Group),
            other => Err(ScopeParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_id_roundtrip() {
        let id = FullId::new("alice", Ipv4Addr::new(192, 168, 1, 5));
        let s = id.to_string();
        assert_eq!(s, "alice@192.168.1.5");
        assert_eq!(s.parse::<FullId>().unwrap(), id);
    }

    #[test]
    fn full_id_rejects_missing_separator() {
        assert_eq!(
            "alice".parse::<FullId>(),
            Err(FullIdParseError::MissingSeparator("alice".to_string()))
        );
    }

    #[test]
    fn full_id_rejects_bad_ip() {
        assert!("alice@not-an-ip".parse::<FullId>().is_err());
    }

    #[test]
    fn scope_roundtrip() {
        for s in [
            Scope::Chat,
            Scope::File,
            Scope::Broadcast,
            Scope::Follow,
            Scope::Game,
            Scope::Group,
        ] {
            assert_eq!(s.as_str().parse::<Scope>().unwrap(), s);
        }
    }

    #[test]
    fn scope_required_for_type() {
        assert_eq!(Scope::required_for_type("DM"), Some(Scope::Chat));
        assert_eq!(Scope::required_for_type("PROFILE"), None);
        assert_eq!(Scope::required_for_type("ACK"), None);
    }
}
