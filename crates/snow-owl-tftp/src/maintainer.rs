//! Periodic sweep over the conversation registry: retransmit stale
//! conversations, time out those that have exhausted their retry budget,
//! and reap completed ones. Grounded in
//! `original_source/emmer/performer.py` (`run`/`_get_stale_conversations`/
//! `_handle_stale_conversation`/`sweep_completed_conversations`).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::audit::AuditLogger;
use crate::codec::Packet;
use crate::conversation::ConversationState;
use crate::registry::ConversationRegistry;
use crate::transport::DatagramTransport;

pub struct Maintainer {
    registry: Arc<ConversationRegistry>,
    transport: Arc<dyn DatagramTransport>,
    resend_timeout: Duration,
    retries_before_giveup: u32,
    tick_interval: Duration,
}

impl Maintainer {
    pub fn new(
        registry: Arc<ConversationRegistry>,
        transport: Arc<dyn DatagramTransport>,
        resend_timeout: Duration,
        retries_before_giveup: u32,
        tick_interval: Duration,
    ) -> Self {
        Self {
            registry,
            transport,
            resend_timeout,
            retries_before_giveup,
            tick_interval,
        }
    }

    /// Runs forever. Exceptions from one conversation's handling never stop
    /// the loop; the next tick always fires regardless of this tick's
    /// outcome, matching `performer.py`'s top-level try/except.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            interval.tick().await;
            self.sweep_once().await;
        }
    }

    pub async fn sweep_once(&self) {
        for (peer, conversation) in self.registry.snapshot() {
            if conversation.state().await == ConversationState::Completed {
                self.registry.remove(&peer);
                AuditLogger::reaped(peer);
                continue;
            }

            if !conversation.is_stale(self.resend_timeout).await {
                continue;
            }

            if conversation.retries_made().await < self.retries_before_giveup {
                let packet = conversation.mark_retry().await;
                if packet.is_no_op() {
                    continue;
                }
                let bytes = packet.serialize();
                if let Err(e) = self.transport.send_to(&bytes, peer).await {
                    warn!(%peer, error = %e, "retransmit failed");
                }
                AuditLogger::retransmitted(peer, conversation.retries_made().await);
                debug!(%peer, "retransmitted stale conversation");
            } else {
                let timeout = Packet::error(0, "Conversation Timed Out");
                if let Err(e) = self.transport.send_to(&timeout.serialize(), peer).await {
                    error!(%peer, error = %e, "failed to send timeout error");
                }
                self.registry.remove(&peer);
                AuditLogger::timed_out(peer);
                debug!(%peer, "conversation timed out and was removed");
            }
        }
    }
}
