//! Example filesystem-backed TFTP server wiring `TftpServer`'s read/write
//! routes to a root directory. Grounded in the teacher's `main.rs`
//! path-validation (`validate_and_resolve_path`) and glob-based write
//! policy (`is_write_allowed`), adapted to the framework's handler
//! signatures.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use snow_owl_tftp::config::{self, LogFormat, TftpConfig};
use snow_owl_tftp::error::{Result, TftpError};
use snow_owl_tftp::TftpServer;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "snow-owl-tftp-server")]
#[command(about = "TFTP server framework: serves a root directory", long_about = None)]
struct Cli {
    /// Path to a TOML config file. If omitted, built-in defaults are used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the default configuration to the given path and exit.
    #[arg(long)]
    write_default_config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Override the configured root directory.
    #[arg(short, long)]
    root_dir: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = cli.write_default_config {
        config::write_default_config(&path)?;
        println!("wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => TftpConfig::default(),
    };
    if let Some(bind) = cli.bind {
        cfg.bind_addr = bind;
    }
    if let Some(root_dir) = cli.root_dir {
        cfg.root_dir = root_dir;
    }
    config::validate_config(&cfg, false)?;

    let log_level = if cli.verbose { "debug" } else { cfg.logging.level.as_str() };
    // Keep the worker guard alive for the process lifetime: dropping it
    // stops the non-blocking writer's background flush thread.
    let _log_guard = init_logging(&cfg, log_level);

    let root_dir = Arc::new(cfg.root_dir.clone());
    let write_cfg = Arc::new(cfg.write_config.clone());
    let max_file_size = cfg.max_file_size_bytes;

    info!(bind_addr = %cfg.bind_addr, root_dir = %root_dir.display(), "snow-owl-tftp-server starting");

    let mut server = TftpServer::new(cfg);

    let read_root = root_dir.clone();
    server.on_read(r"^.+$", move |filename: &str, _peer: SocketAddr| {
        let root = read_root.clone();
        let filename = filename.to_string();
        async move { read_file(&root, &filename, max_file_size).await }
    })?;

    let write_root = root_dir.clone();
    server.on_write(r"^.+$", move |filename: &str, _peer: SocketAddr, data: Vec<u8>| {
        let root = write_root.clone();
        let write_cfg = write_cfg.clone();
        let filename = filename.to_string();
        async move { write_file(&root, &write_cfg, &filename, data).await }
    })?;

    server.run().await
}

/// Builds the process-wide tracing subscriber, routing to a rolling file
/// appender when `logging.file` is set and plain stdout otherwise, and
/// honoring `logging.format` (text vs JSON) either way.
fn init_logging(cfg: &TftpConfig, log_level: &str) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    match &cfg.logging.file {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            let filename = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("snow-owl-tftp.log"));
            let file_appender = tracing_appender::rolling::daily(directory, filename);
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            let builder = tracing_subscriber::fmt().with_env_filter(log_level).with_target(false).with_writer(writer);
            if cfg.logging.format == LogFormat::Json {
                builder.json().init();
            } else {
                builder.init();
            }
            Some(guard)
        }
        None => {
            let builder = tracing_subscriber::fmt().with_env_filter(log_level).with_target(false);
            if cfg.logging.format == LogFormat::Json {
                builder.json().init();
            } else {
                builder.init();
            }
            None
        }
    }
}

async fn read_file(root: &Path, filename: &str, max_file_size: u64) -> Result<Vec<u8>> {
    let path = validate_and_resolve_path(root, filename)?;
    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| TftpError::Protocol(format!("cannot read {}: {e}", path.display())))?;
    if max_file_size != 0 && data.len() as u64 > max_file_size {
        return Err(TftpError::Protocol(format!(
            "{} exceeds max_file_size_bytes ({} > {})",
            path.display(),
            data.len(),
            max_file_size
        )));
    }
    Ok(data)
}

async fn write_file(
    root: &Path,
    write_cfg: &config::WriteConfig,
    filename: &str,
    data: Vec<u8>,
) -> Result<()> {
    if !write_cfg.enabled {
        return Err(TftpError::Protocol("writes are disabled".into()));
    }
    if !is_write_allowed(write_cfg, filename) {
        return Err(TftpError::Protocol(format!(
            "{filename} does not match any allowed_patterns"
        )));
    }
    let path = validate_and_resolve_path(root, filename)?;
    if !write_cfg.allow_overwrite && tokio::fs::metadata(&path).await.is_ok() {
        return Err(TftpError::Protocol(format!("{} already exists", path.display())));
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, data).await?;
    Ok(())
}

/// Resolves `filename` against `root`, rejecting any path that would escape
/// it (`..` components, absolute paths). Mirrors the teacher's
/// `validate_and_resolve_path` directory-traversal guard.
fn validate_and_resolve_path(root: &Path, filename: &str) -> Result<PathBuf> {
    let requested = Path::new(filename);
    if requested.is_absolute() || requested.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(TftpError::Protocol(format!("path traversal attempt: {filename}")));
    }
    Ok(root.join(requested))
}

fn is_write_allowed(write_cfg: &config::WriteConfig, filename: &str) -> bool {
    write_cfg
        .allowed_patterns
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .any(|pattern| pattern.matches(filename))
}
