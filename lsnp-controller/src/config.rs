//! Controller startup configuration. A thin value type so the `lsnp-cli`
//! binary's `clap` parsing has something concrete to build, and so tests
//! can construct a controller without touching process arguments.

use std::path::PathBuf;

use lsnp_types::{DEFAULT_PERIODIC_INTERVAL_SECS, LSNP_DEFAULT_PORT};

#[derive(Debug, Clone)]
pub struct Config {
    /// The short handle this peer advertises itself as, e.g. `"alice"`.
    pub user: String,
    /// Display name sent in `PROFILE` records; defaults to `user` if unset.
    pub display_name: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Default TTL (seconds) applied to posts created with `create_post`
    /// when no explicit TTL is given.
    pub default_ttl_secs: u32,
    /// TTL for minted tokens.
    pub token_ttl_secs: u64,
    pub periodic_interval_secs: u64,
    pub verbose: bool,
}

impl Config {
    pub fn new(user: impl Into<String>) -> Self {
        let user = user.into();
        Self {
            display_name: user.clone(),
            user,
            port: LSNP_DEFAULT_PORT,
            data_dir: PathBuf::from("./lsnp_data"),
            default_ttl_secs: 3600,
            token_ttl_secs: 300,
            periodic_interval_secs: DEFAULT_PERIODIC_INTERVAL_SECS,
            verbose: false,
        }
    }
}
