//! Public entry point. Grounded in `original_source/emmer/emmer.py`'s
//! `Emmer` class (`route_read`/`route_write`/`run`) for the surface shape;
//! the teacher's own `TftpServer` struct for the Rust field conventions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::TftpConfig;
use crate::error::Result;
use crate::maintainer::Maintainer;
use crate::reactor::Reactor;
use crate::registry::ConversationRegistry;
use crate::route::{ReadHandler, RouteTable, WriteHandler};
use crate::transport::{DatagramTransport, UdpTransport};

/// A TFTP server framework: bind it, register read/write routes, then
/// `run()`; the reactor and maintainer loops run until the process exits.
pub struct TftpServer {
    config: TftpConfig,
    routes: RouteTable,
}

impl TftpServer {
    pub fn new(config: TftpConfig) -> Self {
        Self {
            config,
            routes: RouteTable::new(),
        }
    }

    /// Registers `handler` for read requests whose filename matches
    /// `pattern` (anchored at the start). Rejects a malformed `pattern`
    /// immediately rather than at request time.
    pub fn on_read(&mut self, pattern: &str, handler: impl ReadHandler + 'static) -> Result<()> {
        self.routes.on_read(pattern, handler)
    }

    pub fn on_write(&mut self, pattern: &str, handler: impl WriteHandler + 'static) -> Result<()> {
        self.routes.on_write(pattern, handler)
    }

    /// Binds the configured address and runs the reactor and maintainer
    /// loops concurrently. Does not return under normal operation.
    pub async fn run(self) -> Result<()> {
        let transport: Arc<dyn DatagramTransport> = Arc::new(
            UdpTransport::bind(self.config.bind_addr, 2 * 1024 * 1024, 2 * 1024 * 1024).await?,
        );
        self.run_with_transport(transport).await
    }

    /// Runs against an already-constructed transport; the seam tests use
    /// to drive the server with an in-memory transport instead of a bound
    /// UDP socket.
    pub async fn run_with_transport(self, transport: Arc<dyn DatagramTransport>) -> Result<()> {
        let bind_addr: SocketAddr = transport.local_addr()?;
        info!(%bind_addr, "snow-owl-tftp server starting");

        let registry = Arc::new(ConversationRegistry::new());
        let routes = Arc::new(self.routes);

        let reactor = Reactor::new(
            transport.clone(),
            registry.clone(),
            routes,
            self.config.worker_count,
            self.config.worker_channel_capacity,
        );

        let maintainer = Maintainer::new(
            registry,
            transport,
            Duration::from_secs(self.config.resend_timeout_secs),
            self.config.retries_before_giveup,
            Duration::from_secs(self.config.maintainer_tick_secs),
        );

        let maintainer_handle = tokio::spawn(async move { maintainer.run().await });
        let result = reactor.run().await;
        maintainer_handle.abort();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::InMemoryTransport;
    use std::collections::BTreeMap;

    fn peer(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    async fn greet(_filename: &str, _peer: SocketAddr) -> Result<Vec<u8>> {
        Ok(b"hi".to_vec())
    }

    #[tokio::test]
    async fn serves_a_registered_read_route_end_to_end() {
        let mut server = TftpServer::new(TftpConfig::default());
        server.on_read(r"^hello$", greet).unwrap();

        let transport = Arc::new(InMemoryTransport::new(peer(3942)));
        transport
            .push_inbound(
                crate::codec::Packet::ReadRequest {
                    filename: "hello".into(),
                    mode: "octet".into(),
                    options: BTreeMap::new(),
                }
                .serialize()
                .to_vec(),
                peer(9000),
            )
            .await;

        let transport_clone = transport.clone();
        let handle = tokio::spawn(async move { server.run_with_transport(transport_clone).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        let outbound = transport.outbound.lock().await;
        assert_eq!(outbound.len(), 1);
        assert_eq!(
            crate::codec::parse(&outbound[0].0),
            crate::codec::Packet::Data {
                block_num: 1,
                payload: b"hi".to_vec()
            }
        );
    }
}
