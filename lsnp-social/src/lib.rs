//! Social state (spec §4.9): follower graph, the local post/like/DM
//! surface, and the posts fanned in from followed peers.
//!
//! Every collection lives behind its own mutex so that, say, appending a
//! DM never blocks a concurrent follower lookup. Callers that need to
//! cross into the peer registry or file-transfer locks must take those
//! first (§5 lock ordering: registry → social state → file-transfer).
//!
//! This crate deliberately doesn't know about the wire format or tokens —
//! it holds plain domain values; the controller is the one place that
//! parses a `Record` into an [`lsnp_core`] facade, checks the token, and
//! then calls down into these methods. Token-scope enforcement happens
//! one layer up.

use std::collections::{HashMap, HashSet};

use lsnp_core::{token::now_unix, LikeAction};
use lsnp_types::FullId;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A post, independent of whether it's mine or one I've seen from a
/// followed peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostInfo {
    pub post_id: String,
    pub content: String,
    pub ttl: u32,
    /// Unix timestamp the post was created (spec §3: `created_at`), the
    /// base `ttl` seconds are counted from. For an inbound `POST` this is
    /// stamped at receipt time, since the wire record carries no
    /// `CREATED_AT` field of its own.
    pub created_at: u64,
}

/// Whether a post's TTL has elapsed as of `now` (spec §3: "retained until
/// TTL expiry").
fn is_expired(post: &PostInfo, now: u64) -> bool {
    now >= post.created_at.saturating_add(post.ttl as u64)
}

/// A post this peer authored, plus who has liked it.
#[derive(Debug, Clone)]
pub struct MyPost {
    pub post: PostInfo,
    pub likers: HashSet<FullId>,
}

/// A direct message sitting in the inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEntry {
    pub from: FullId,
    pub content: String,
    pub timestamp: u64,
}

#[derive(Default)]
pub struct SocialState {
    following: Mutex<HashSet<FullId>>,
    followers: Mutex<HashSet<FullId>>,
    inbox: Mutex<Vec<InboxEntry>>,
    posts_seen: Mutex<HashMap<String, PostInfo>>,
    my_posts: Mutex<HashMap<String, MyPost>>,
    my_likes: Mutex<HashMap<String, LikeAction>>,
}

impl SocialState {
    pub fn new() -> Self {
        Self::default()
    }

    // -- following (local "follow <user>" / "unfollow <user>" commands) --

    /// Returns `true` if `id` was not already followed.
    pub async fn follow_locally(&self, id: FullId) -> bool {
        self.following.lock().await.insert(id)
    }

    pub async fn unfollow_locally(&self, id: &FullId) -> bool {
        self.following.lock().await.remove(id)
    }

    pub async fn is_following(&self, id: &FullId) -> bool {
        self.following.lock().await.contains(id)
    }

    pub async fn following_snapshot(&self) -> Vec<FullId> {
        self.following.lock().await.iter().cloned().collect()
    }

    // -- followers (driven by inbound FOLLOW / UNFOLLOW) --

    /// Returns `true` if `id` was not already a follower.
    pub async fn add_follower(&self, id: FullId) -> bool {
        self.followers.lock().await.insert(id)
    }

    pub async fn remove_follower(&self, id: &FullId) -> bool {
        self.followers.lock().await.remove(id)
    }

    /// Fan-out target for an outbound `POST` (§4.9: one record per
    /// follower, no broadcast-to-all path).
    pub async fn followers_snapshot(&self) -> Vec<FullId> {
        self.followers.lock().await.iter().cloned().collect()
    }

    // -- direct messages --

    /// Appends an inbound DM to the inbox. Idempotent receive is handled
    /// by the reliability layer's dedup, not here: every call appends.
    pub async fn receive_dm(&self, from: FullId, content: String, timestamp: u64) {
        self.inbox.lock().await.push(InboxEntry { from, content, timestamp });
    }

    pub async fn inbox_snapshot(&self) -> Vec<InboxEntry> {
        self.inbox.lock().await.clone()
    }

    // -- posts --

    /// Mints a new post under a fresh id and records it as mine.
    ///
    /// `post_id` is timestamp-unique (spec §3: "id: timestamp-unique-string")
    /// — a unix-seconds prefix followed by a UUID disambiguator, so two
    /// posts authored in the same second still get distinct ids without
    /// needing a clock finer than whole seconds.
    pub async fn create_post(&self, content: String, ttl: u32) -> PostInfo {
        let post_id = format!("{}-{}", now_unix(), Uuid::new_v4());
        let post = PostInfo { post_id, content, ttl, created_at: now_unix() };
        self.my_posts.lock().await.insert(
            post.post_id.clone(),
            MyPost { post: post.clone(), likers: HashSet::new() },
        );
        post
    }

    /// Stores an inbound `POST` only if `sender` is followed. Returns
    /// whether it was stored.
    pub async fn receive_post(&self, sender: &FullId, post: PostInfo) -> bool {
        if !self.is_following(sender).await {
            return false;
        }
        self.posts_seen.lock().await.insert(post.post_id.clone(), post);
        true
    }

    pub async fn posts_seen_snapshot(&self) -> Vec<PostInfo> {
        self.posts_seen.lock().await.values().cloned().collect()
    }

    pub async fn my_posts_snapshot(&self) -> Vec<MyPost> {
        self.my_posts.lock().await.values().cloned().collect()
    }

    /// Drops every post whose TTL has elapsed as of `now`, from both
    /// `posts_seen` and `my_posts` (spec §3: a post is "retained until TTL
    /// expiry"). Call this periodically, the same way
    /// `FileTransferEngine::abort_stalled` is polled by a background task.
    pub async fn prune_expired(&self, now: u64) {
        self.posts_seen.lock().await.retain(|_, post| !is_expired(post, now));
        self.my_posts.lock().await.retain(|_, my_post| !is_expired(&my_post.post, now));
    }

    // -- likes --

    /// Computes the next toggle state for a post I don't own and records
    /// it locally. The caller sends a `LIKE` record carrying the returned
    /// action; the post's owner applies it via [`Self::apply_like`].
    pub async fn toggle_like(&self, post_id: &str) -> LikeAction {
        let mut likes = self.my_likes.lock().await;
        let next = match likes.get(post_id) {
            Some(LikeAction::Like) => LikeAction::Unlike,
            Some(LikeAction::Unlike) | None => LikeAction::Like,
        };
        likes.insert(post_id.to_string(), next);
        next
    }

    pub async fn my_likes_snapshot(&self) -> HashMap<String, LikeAction> {
        self.my_likes.lock().await.clone()
    }

    /// Applies an inbound `LIKE`/`UNLIKE` to a post I own. Returns `false`
    /// if `post_id` isn't one of mine (the record is ACKed regardless;
    /// the caller just has nothing to update).
    pub async fn apply_like(&self, post_id: &str, from: FullId, action: LikeAction) -> bool {
        let mut my_posts = self.my_posts.lock().await;
        let Some(entry) = my_posts.get_mut(post_id) else {
            return false;
        };
        match action {
            LikeAction::Like => entry.likers.insert(from),
            LikeAction::Unlike => entry.likers.remove(&from),
        };
        true
    }
}
