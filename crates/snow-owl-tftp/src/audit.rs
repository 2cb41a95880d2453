//! Structured lifecycle logging for conversations.
//!
//! Grounded in the teacher's sibling `audit.rs` (tagged-enum
//! `AuditEvent` + flattened `CommonFields`), trimmed from file-transfer
//! events down to the framework's own conversation lifecycle: a request
//! arriving, a transfer completing or failing, a retransmit, a timeout, a
//! reap.

use std::net::SocketAddr;

use serde::Serialize;
use tracing::{event, Level};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    RequestReceived {
        #[serde(flatten)]
        common: CommonFields,
        client_addr: String,
        filename: String,
        kind: RequestKind,
    },
    TransferCompleted {
        #[serde(flatten)]
        common: CommonFields,
        client_addr: String,
        filename: String,
    },
    TransferFailed {
        #[serde(flatten)]
        common: CommonFields,
        client_addr: String,
        filename: String,
        error_code: u16,
        error_message: String,
    },
    Retransmitted {
        #[serde(flatten)]
        common: CommonFields,
        client_addr: String,
        retries_made: u32,
    },
    TimedOut {
        #[serde(flatten)]
        common: CommonFields,
        client_addr: String,
    },
    Reaped {
        #[serde(flatten)]
        common: CommonFields,
        client_addr: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Read,
    Write,
}

/// NIST 800-53 AU-3: Content of Audit Records. Every event carries a
/// timestamp, the emitting service, and a severity.
#[derive(Debug, Clone, Serialize)]
pub struct CommonFields {
    pub timestamp: String,
    pub service: &'static str,
    pub severity: &'static str,
}

impl CommonFields {
    fn new(severity: &'static str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            service: "snow-owl-tftp",
            severity,
        }
    }
}

impl AuditEvent {
    pub fn log(&self) {
        let json = serde_json::to_string(self)
            .unwrap_or_else(|e| format!("{{\"error\":\"failed to serialize audit event: {e}\"}}"));
        match self {
            AuditEvent::TransferFailed { .. } => event!(Level::WARN, audit_event = %json),
            AuditEvent::TimedOut { .. } => event!(Level::WARN, audit_event = %json),
            _ => event!(Level::INFO, audit_event = %json),
        }
    }
}

pub struct AuditLogger;

impl AuditLogger {
    pub fn request_received(client_addr: SocketAddr, filename: &str, kind: RequestKind) {
        AuditEvent::RequestReceived {
            common: CommonFields::new("info"),
            client_addr: client_addr.to_string(),
            filename: filename.to_string(),
            kind,
        }
        .log();
    }

    pub fn transfer_completed(client_addr: SocketAddr, filename: &str) {
        AuditEvent::TransferCompleted {
            common: CommonFields::new("info"),
            client_addr: client_addr.to_string(),
            filename: filename.to_string(),
        }
        .log();
    }

    pub fn transfer_failed(client_addr: SocketAddr, filename: &str, error_code: u16, error_message: &str) {
        AuditEvent::TransferFailed {
            common: CommonFields::new("warn"),
            client_addr: client_addr.to_string(),
            filename: filename.to_string(),
            error_code,
            error_message: error_message.to_string(),
        }
        .log();
    }

    pub fn retransmitted(client_addr: SocketAddr, retries_made: u32) {
        AuditEvent::Retransmitted {
            common: CommonFields::new("info"),
            client_addr: client_addr.to_string(),
            retries_made,
        }
        .log();
    }

    pub fn timed_out(client_addr: SocketAddr) {
        AuditEvent::TimedOut {
            common: CommonFields::new("warn"),
            client_addr: client_addr.to_string(),
        }
        .log();
    }

    pub fn reaped(client_addr: SocketAddr) {
        AuditEvent::Reaped {
            common: CommonFields::new("info"),
            client_addr: client_addr.to_string(),
        }
        .log();
    }
}
