//! Abstraction the reactor and maintainer program against, so the core
//! never names a concrete socket type directly. [`UdpTransport`] backs it in
//! production; tests drive the reactor against an in-memory fake.

use std::net::SocketAddr;

use async_trait::async_trait;
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::Result;

/// Maximum TFTP datagram the reactor will accept off the wire
/// (`SPEC_FULL.md` §4.6).
pub const MAX_DATAGRAM_SIZE: usize = 1024;

#[async_trait]
pub trait DatagramTransport: Send + Sync {
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize>;
    fn local_addr(&self) -> Result<SocketAddr>;
}

/// Production transport backed by a `tokio` UDP socket, bound with the same
/// `socket2`-level tuning the teacher's file-serving server used for its
/// listening socket (`SO_REUSEADDR`, explicit buffer sizes), minus the
/// batch-syscall (`recvmmsg`/`sendmmsg`) machinery that has no counterpart
/// in this framework's single-datagram-at-a-time reactor.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr, recv_buffer: usize, send_buffer: usize) -> Result<Self> {
        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::DGRAM, None)?;
        socket.set_reuse_address(true)?;
        socket.set_recv_buffer_size(recv_buffer)?;
        socket.set_send_buffer_size(send_buffer)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        Ok(self.socket.recv_from(buf).await?)
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        Ok(self.socket.send_to(buf, target).await?)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

/// An in-memory transport used by reactor/maintainer integration tests so
/// they don't need a real bound socket. Not gated behind `cfg(test)`: tests
/// under `tests/` compile the crate as an external dependency, where
/// `cfg(test)` does not apply.
pub mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryTransport {
        inbound: Mutex<VecDeque<(Vec<u8>, SocketAddr)>>,
        pub outbound: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
        local: SocketAddr,
    }

    impl InMemoryTransport {
        pub fn new(local: SocketAddr) -> Self {
            Self {
                inbound: Mutex::new(VecDeque::new()),
                outbound: Mutex::new(Vec::new()),
                local,
            }
        }

        pub async fn push_inbound(&self, bytes: Vec<u8>, from: SocketAddr) {
            self.inbound.lock().await.push_back((bytes, from));
        }
    }

    #[async_trait]
    impl DatagramTransport for InMemoryTransport {
        async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
            loop {
                if let Some((bytes, from)) = self.inbound.lock().await.pop_front() {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    return Ok((n, from));
                }
                tokio::task::yield_now().await;
            }
        }

        async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
            self.outbound.lock().await.push((buf.to_vec(), target));
            Ok(buf.len())
        }

        fn local_addr(&self) -> Result<SocketAddr> {
            Ok(self.local)
        }
    }
}
