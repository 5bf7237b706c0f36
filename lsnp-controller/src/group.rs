//! Group routing: an in-memory, unpersisted map from group id to its member
//! list, with no key derivation or confidentiality layer. This crate only
//! tracks who a `GROUP_MSG` should be forwarded to, not any deeper group
//! semantics.

use std::collections::HashMap;

use lsnp_types::FullId;
use tokio::sync::Mutex;

/// Tracks `GROUP_CREATE` membership lists verbatim; the core never
/// interprets them beyond "who do I forward `GROUP_MSG` to".
#[derive(Default)]
pub struct GroupRouter {
    groups: Mutex<HashMap<String, Vec<FullId>>>,
}

impl GroupRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or overwrites) a group's member list from a `GROUP_CREATE`.
    pub async fn create_group(&self, group_id: String, members: Vec<FullId>) {
        self.groups.lock().await.insert(group_id, members);
    }

    pub async fn members(&self, group_id: &str) -> Option<Vec<FullId>> {
        self.groups.lock().await.get(group_id).cloned()
    }
}
