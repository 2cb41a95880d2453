//! The one integration surface application code touches: registering
//! filename-pattern handlers for reads and writes.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use regex::Regex;

use crate::error::{Result, TftpError};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Invoked on RRQ once a read route matches; must resolve before the first
/// DATA block can be sent (see `SPEC_FULL.md` §4.3).
pub trait ReadHandler: Send + Sync {
    fn call(&self, filename: &str, peer: SocketAddr) -> BoxFuture<'static, Result<Vec<u8>>>;
}

impl<F, Fut> ReadHandler for F
where
    F: Fn(&str, SocketAddr) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
{
    fn call(&self, filename: &str, peer: SocketAddr) -> BoxFuture<'static, Result<Vec<u8>>> {
        Box::pin((self)(filename, peer))
    }
}

/// Invoked once at end-of-transfer for a successful WRQ.
pub trait WriteHandler: Send + Sync {
    fn call(&self, filename: &str, peer: SocketAddr, data: Vec<u8>) -> BoxFuture<'static, Result<()>>;
}

impl<F, Fut> WriteHandler for F
where
    F: Fn(&str, SocketAddr, Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, filename: &str, peer: SocketAddr, data: Vec<u8>) -> BoxFuture<'static, Result<()>> {
        Box::pin((self)(filename, peer, data))
    }
}

struct ReadRule {
    pattern: Regex,
    handler: Arc<dyn ReadHandler>,
}

struct WriteRule {
    pattern: Regex,
    handler: Arc<dyn WriteHandler>,
}

/// Ordered, first-match-wins dispatch tables for read and write requests.
#[derive(Default)]
pub struct RouteTable {
    read_rules: Vec<ReadRule>,
    write_rules: Vec<WriteRule>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `pattern` immediately, so a malformed regex is rejected at
    /// registration time rather than surfacing on the next matching request.
    pub fn on_read(&mut self, pattern: &str, handler: impl ReadHandler + 'static) -> Result<()> {
        let pattern = compile(pattern)?;
        self.read_rules.push(ReadRule {
            pattern,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    pub fn on_write(&mut self, pattern: &str, handler: impl WriteHandler + 'static) -> Result<()> {
        let pattern = compile(pattern)?;
        self.write_rules.push(WriteRule {
            pattern,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    pub fn resolve_read(&self, filename: &str) -> Option<Arc<dyn ReadHandler>> {
        self.read_rules
            .iter()
            .find(|rule| matches_at_start(&rule.pattern, filename))
            .map(|rule| rule.handler.clone())
    }

    pub fn resolve_write(&self, filename: &str) -> Option<Arc<dyn WriteHandler>> {
        self.write_rules
            .iter()
            .find(|rule| matches_at_start(&rule.pattern, filename))
            .map(|rule| rule.handler.clone())
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| TftpError::Protocol(format!("invalid route pattern {pattern:?}: {e}")))
}

/// Anchored-at-start, unanchored-at-end match, equivalent to Python's
/// `re.match`, which the original implementation's route table relies on.
fn matches_at_start(pattern: &Regex, filename: &str) -> bool {
    pattern.find(filename).is_some_and(|m| m.start() == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok_read(_filename: &str, _peer: SocketAddr) -> Result<Vec<u8>> {
        Ok(b"ok".to_vec())
    }

    async fn ok_write(_filename: &str, _peer: SocketAddr, _data: Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:1".parse().unwrap()
    }

    #[test]
    fn first_match_wins() {
        let mut table = RouteTable::new();
        table.on_read(r"^a.*", ok_read).unwrap();
        table.on_read(r"^.*", ok_read).unwrap();
        assert!(table.resolve_read("abc").is_some());
        assert!(table.resolve_read("xyz").is_some());
    }

    #[test]
    fn no_match_returns_none() {
        let mut table = RouteTable::new();
        table.on_read(r"^only_this\.txt$", ok_read).unwrap();
        assert!(table.resolve_read("other.txt").is_none());
    }

    #[test]
    fn match_is_anchored_at_start_not_end() {
        let mut table = RouteTable::new();
        table.on_read(r"^foo", ok_read).unwrap();
        assert!(table.resolve_read("foobar").is_some());
        assert!(table.resolve_read("barfoo").is_none());
    }

    #[test]
    fn invalid_pattern_is_rejected_at_registration() {
        let mut table = RouteTable::new();
        assert!(table.on_read("(unclosed", ok_read).is_err());
    }

    #[tokio::test]
    async fn resolved_read_handler_is_callable() {
        let mut table = RouteTable::new();
        table.on_read(r"^f$", ok_read).unwrap();
        let handler = table.resolve_read("f").unwrap();
        assert_eq!(handler.call("f", peer()).await.unwrap(), b"ok".to_vec());
    }

    #[tokio::test]
    async fn resolved_write_handler_is_callable() {
        let mut table = RouteTable::new();
        table.on_write(r"^f$", ok_write).unwrap();
        let handler = table.resolve_write("f").unwrap();
        assert!(handler.call("f", peer(), vec![1, 2, 3]).await.is_ok());
    }
}
