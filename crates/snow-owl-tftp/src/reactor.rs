//! Datagram receive loop. Grounded in
//! `original_source/emmer/reactor.py` (`run`/`handle_message`/
//! `get_conversation`): receive, classify, dispatch, reply.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::audit::{AuditLogger, RequestKind};
use crate::codec::{self, Packet};
use crate::conversation::Conversation;
use crate::registry::ConversationRegistry;
use crate::route::RouteTable;
use crate::transport::{DatagramTransport, MAX_DATAGRAM_SIZE};
use crate::worker_pool::{Job, WorkerPool};

pub struct Reactor {
    transport: Arc<dyn DatagramTransport>,
    registry: Arc<ConversationRegistry>,
    routes: Arc<RouteTable>,
    worker_pool: Arc<WorkerPool>,
}

impl Reactor {
    pub fn new(
        transport: Arc<dyn DatagramTransport>,
        registry: Arc<ConversationRegistry>,
        routes: Arc<RouteTable>,
        worker_count: usize,
        channel_capacity: usize,
    ) -> Self {
        let worker_transport = transport.clone();
        let worker_registry = registry.clone();
        let worker_routes = routes.clone();
        let worker_pool = Arc::new(WorkerPool::new(worker_count, channel_capacity, move |job: Job| {
            let transport = worker_transport.clone();
            let registry = worker_registry.clone();
            let routes = worker_routes.clone();
            async move {
                process_datagram(&transport, &registry, &routes, job).await;
            }
        }));

        Self {
            transport,
            registry,
            routes,
            worker_pool,
        }
    }

    /// Runs forever, receiving datagrams and handing them to the worker
    /// pool. Returns only if the transport itself errors unrecoverably.
    pub async fn run(&self) -> crate::error::Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (n, peer) = self.transport.recv_from(&mut buf).await?;
            let data = buf[..n].to_vec();
            if !self.worker_pool.try_submit(Job { data, peer }) {
                debug!(%peer, "dropped datagram: worker pool saturated");
            }
        }
    }

    pub fn registry(&self) -> &Arc<ConversationRegistry> {
        &self.registry
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }
}

async fn process_datagram(
    transport: &Arc<dyn DatagramTransport>,
    registry: &ConversationRegistry,
    routes: &RouteTable,
    job: Job,
) {
    let packet = codec::parse(&job.data);
    if packet.is_no_op() {
        debug!(peer = %job.peer, "dropped malformed datagram");
        return;
    }

    let conversation = get_or_create_conversation(registry, &packet, job.peer);
    let Some(conversation) = conversation else {
        debug!(peer = %job.peer, "no conversation for non-request packet, dropping");
        return;
    };

    let (read_handler, write_handler) = match &packet {
        Packet::ReadRequest { filename, .. } => {
            AuditLogger::request_received(job.peer, filename, RequestKind::Read);
            (routes.resolve_read(filename), None)
        }
        Packet::WriteRequest { filename, .. } => {
            AuditLogger::request_received(job.peer, filename, RequestKind::Write);
            (None, routes.resolve_write(filename))
        }
        _ => (None, None),
    };

    let reply = conversation.handle(packet, read_handler, write_handler).await;
    if let Packet::Error { code, message } = &reply {
        AuditLogger::transfer_failed(job.peer, "", *code, message);
    } else if reply.is_no_op() && conversation.state().await == crate::conversation::ConversationState::Completed {
        AuditLogger::transfer_completed(job.peer, "");
    }
    if reply.is_no_op() {
        return;
    }
    let bytes = reply.serialize();
    if let Err(e) = transport.send_to(&bytes, job.peer).await {
        warn!(peer = %job.peer, error = %e, "failed to send reply");
    }
}

fn get_or_create_conversation(
    registry: &ConversationRegistry,
    packet: &Packet,
    peer: SocketAddr,
) -> Option<Arc<Conversation>> {
    match packet {
        Packet::ReadRequest { .. } | Packet::WriteRequest { .. } => {
            let conversation = Arc::new(Conversation::new(peer));
            registry.insert(peer, conversation.clone());
            Some(conversation)
        }
        _ => registry.lookup(&peer),
    }
}
