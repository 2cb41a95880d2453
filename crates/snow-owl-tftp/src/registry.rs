//! Concurrent conversation table keyed on (host, port).
//!
//! Grounded in `original_source/emmer/conversation_table.py`'s operation set
//! (`add_conversation`/`get_conversation`/`delete_conversation`), but
//! realized with a sharded map (`dashmap`) instead of a single
//! `threading.RLock()`-guarded dict. The Python original needs reentrancy
//! because its maintainer loop holds the table lock across per-entry work;
//! here `snapshot()` clones `Arc` handles and releases every shard lock
//! before the maintainer touches any conversation, so no single lock is ever
//! held across an `.await` (see `SPEC_FULL.md` §4.2, §9).

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::conversation::Conversation;

#[derive(Default)]
pub struct ConversationRegistry {
    conversations: DashMap<SocketAddr, Arc<Conversation>>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally overwrites any existing entry for `peer`. A repeated
    /// RRQ/WRQ from a known peer silently replaces its conversation, per the
    /// resolved open question in `SPEC_FULL.md` §9, but it's logged here.
    pub fn insert(&self, peer: SocketAddr, conversation: Arc<Conversation>) {
        if self.conversations.insert(peer, conversation).is_some() {
            debug!(%peer, "overwriting existing conversation for peer");
        }
    }

    pub fn lookup(&self, peer: &SocketAddr) -> Option<Arc<Conversation>> {
        self.conversations.get(peer).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, peer: &SocketAddr) -> bool {
        self.conversations.remove(peer).is_some()
    }

    /// Clones the live `(peer, conversation)` pairs without holding any
    /// shard lock past the call itself, so the maintainer can do
    /// potentially slow per-conversation work (retransmits, handler
    /// invocation) afterwards with no registry lock held.
    pub fn snapshot(&self) -> Vec<(SocketAddr, Arc<Conversation>)> {
        self.conversations
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
