//! Minimal GET/PUT demo client exercising the wire protocol end to end.
//! Trimmed from the teacher's sibling `bin/client.rs`, no block-size or
//! windowsize negotiation flags, since this core never negotiates options
//! (always 512-byte blocks); the load-test/benchmark client is out of
//! scope for this crate.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use snow_owl_tftp::{Packet, Result, TftpError, BLOCK_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "snow-owl-tftp-client")]
#[command(about = "Minimal TFTP client", long_about = None)]
struct Cli {
    /// TFTP server address, e.g. 127.0.0.1:3942
    #[arg(short, long)]
    server: String,

    #[arg(short, long, conflicts_with = "put")]
    get: Option<String>,

    #[arg(short, long, conflicts_with = "get")]
    put: Option<String>,

    /// Local file path (destination for get, source for put)
    #[arg(short, long)]
    file: Option<PathBuf>,

    #[arg(short, long, default_value = "octet")]
    mode: String,

    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .init();

    let server_addr: SocketAddr = cli
        .server
        .parse()
        .map_err(|e| TftpError::Protocol(format!("invalid server address: {e}")))?;
    let timeout_dur = Duration::from_secs(cli.timeout);

    if let Some(remote_file) = cli.get {
        let local_file = cli.file.unwrap_or_else(|| PathBuf::from(&remote_file));
        info!(%server_addr, remote_file, ?local_file, "downloading");
        get(server_addr, &remote_file, &cli.mode, &local_file, timeout_dur).await?;
        info!("download complete");
    } else if let Some(local_file) = cli.put {
        let remote_file = cli
            .file
            .and_then(|p| p.to_str().map(String::from))
            .unwrap_or_else(|| local_file.clone());
        info!(%server_addr, local_file, remote_file, "uploading");
        put(server_addr, &PathBuf::from(&local_file), &remote_file, &cli.mode, timeout_dur).await?;
        info!("upload complete");
    } else {
        return Err(TftpError::Protocol("must specify either --get or --put".into()));
    }

    Ok(())
}

async fn get(server: SocketAddr, remote_file: &str, mode: &str, local_file: &PathBuf, timeout_dur: Duration) -> Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let rrq = Packet::ReadRequest {
        filename: remote_file.to_string(),
        mode: mode.to_string(),
        options: BTreeMap::new(),
    };
    socket.send_to(&rrq.serialize(), server).await?;

    let mut out = tokio::fs::File::create(local_file).await?;
    let mut expected_block: u16 = 1;
    let mut buf = vec![0u8; BLOCK_SIZE + 64];
    loop {
        let (n, from) = timeout(timeout_dur, socket.recv_from(&mut buf))
            .await
            .map_err(|_| TftpError::Protocol("timed out waiting for DATA".into()))??;
        match snow_owl_tftp::codec::parse(&buf[..n]) {
            Packet::Data { block_num, payload } if block_num == expected_block => {
                out.write_all(&payload).await?;
                socket.send_to(&Packet::Ack { block_num }.serialize(), from).await?;
                debug!(block_num, len = payload.len(), "received block");
                if payload.len() < BLOCK_SIZE {
                    break;
                }
                expected_block = expected_block.wrapping_add(1);
            }
            Packet::Error { code, message } => {
                return Err(TftpError::Protocol(format!("server error {code}: {message}")));
            }
            _ => debug!("ignoring unexpected packet during GET"),
        }
    }
    Ok(())
}

async fn put(server: SocketAddr, local_file: &PathBuf, remote_file: &str, mode: &str, timeout_dur: Duration) -> Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let wrq = Packet::WriteRequest {
        filename: remote_file.to_string(),
        mode: mode.to_string(),
        options: BTreeMap::new(),
    };
    socket.send_to(&wrq.serialize(), server).await?;

    let mut buf = vec![0u8; BLOCK_SIZE + 64];
    let (n, server) = timeout(timeout_dur, socket.recv_from(&mut buf))
        .await
        .map_err(|_| TftpError::Protocol("timed out waiting for initial ACK".into()))??;
    match snow_owl_tftp::codec::parse(&buf[..n]) {
        Packet::Ack { block_num: 0 } => {}
        Packet::Error { code, message } => {
            return Err(TftpError::Protocol(format!("server error {code}: {message}")));
        }
        _ => return Err(TftpError::Protocol("expected initial ACK(0)".into())),
    }

    let mut file = tokio::fs::File::open(local_file).await?;
    let mut block_num: u16 = 1;
    loop {
        let mut chunk = vec![0u8; BLOCK_SIZE];
        let read = file.read(&mut chunk).await?;
        chunk.truncate(read);
        let data = Packet::Data {
            block_num,
            payload: chunk,
        };
        socket.send_to(&data.serialize(), server).await?;

        let (n, _) = timeout(timeout_dur, socket.recv_from(&mut buf))
            .await
            .map_err(|_| TftpError::Protocol("timed out waiting for ACK".into()))??;
        match snow_owl_tftp::codec::parse(&buf[..n]) {
            Packet::Ack { block_num: acked } if acked == block_num => {
                debug!(block_num, "acked");
            }
            Packet::Error { code, message } => {
                return Err(TftpError::Protocol(format!("server error {code}: {message}")));
            }
            _ => return Err(TftpError::Protocol("unexpected reply during PUT".into())),
        }
        if read < BLOCK_SIZE {
            break;
        }
        block_num = block_num.wrapping_add(1);
    }
    Ok(())
}
