//! A TFTP (RFC 1350) server framework: applications register filename-keyed
//! read/write handlers, `TftpServer::run` drives the wire protocol.

pub mod audit;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod conversation;
pub mod error;
pub mod maintainer;
pub mod reactor;
pub mod registry;
pub mod route;
pub mod server;
pub mod transport;
pub mod worker_pool;

pub use codec::{Packet, BLOCK_SIZE};
pub use config::TftpConfig;
pub use error::{Result, TftpError};
pub use route::{ReadHandler, WriteHandler};
pub use server::TftpServer;
