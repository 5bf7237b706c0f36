//! Authorization tokens: `user@ip|expiry_unix|scope` (spec §3, §4.2).

use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

use lsnp_types::{FullId, Scope};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token {0:?}")]
    Malformed(String),
    #[error("token expired at {expiry} (now is {now})")]
    Expired { expiry: u64, now: u64 },
    #[error("token scope {actual} does not match required scope {expected}")]
    ScopeMismatch { expected: Scope, actual: Scope },
    #[error("token ip {token_ip} does not match datagram source ip {source_ip}")]
    IPMismatch { token_ip: Ipv4Addr, source_ip: Ipv4Addr },
}

/// Mint a token for `full_id`, good for `ttl_seconds` from now.
pub fn mint(full_id: &FullId, scope: Scope, ttl_seconds: u64) -> String {
    mint_at(full_id, scope, ttl_seconds, now_unix())
}

/// Same as [`mint`] but with an explicit "now", for deterministic tests.
pub fn mint_at(full_id: &FullId, scope: Scope, ttl_seconds: u64, now: u64) -> String {
    let expiry = now.saturating_add(ttl_seconds);
    format!("{full_id}|{expiry}|{scope}")
}

/// Validate `token` against the scope required for the message type being
/// carried, the UDP source address the datagram actually arrived from, and
/// the current time.
///
/// A successful return means the record may be dispatched. Any error means
/// the record is dropped by the caller (spec §4.2, §7); this function only
/// classifies the failure, it does not decide logging policy.
pub fn validate(
    token: &str,
    expected_scope: Scope,
    sender_ip: Ipv4Addr,
    now: u64,
) -> Result<(), TokenError> {
    let mut parts = token.splitn(3, '|');
    let (Some(full_id_part), Some(expiry_part), Some(scope_part)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed(token.to_string()));
    };
    if parts.next().is_some() {
        return Err(TokenError::Malformed(token.to_string()));
    }

    let full_id: FullId = full_id_part
        .parse()
        .map_err(|_| TokenError::Malformed(token.to_string()))?;
    let expiry: u64 = expiry_part
        .parse()
        .map_err(|_| TokenError::Malformed(token.to_string()))?;
    let actual_scope: Scope = scope_part
        .parse()
        .map_err(|_| TokenError::Malformed(token.to_string()))?;

    if full_id.ip != sender_ip {
        return Err(TokenError::IPMismatch {
            token_ip: full_id.ip,
            source_ip: sender_ip,
        });
    }
    if expiry < now {
        return Err(TokenError::Expired { expiry, now });
    }
    if actual_scope != expected_scope {
        return Err(TokenError::ScopeMismatch {
            expected: expected_scope,
            actual: actual_scope,
        });
    }
    Ok(())
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
