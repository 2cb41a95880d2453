//! Wire format for the five TFTP packet kinds (RFC 1350) plus the option
//! extension framing from RFC 2347. Parsing never panics: any malformed
//! input degrades to [`Packet::NoOp`], which the reactor treats as "drop,
//! do not reply."

use std::collections::BTreeMap;

use bytes::{BufMut, BytesMut};

const OP_RRQ: u16 = 1;
const OP_WRQ: u16 = 2;
const OP_DATA: u16 = 3;
const OP_ACK: u16 = 4;
const OP_ERROR: u16 = 5;
const OP_OACK: u16 = 6;

/// The maximum DATA payload a conversation ever produces or accepts. Option
/// negotiation (RFC 2348 blksize) is parsed but never acted on, so every
/// block is this size or smaller (see `SPEC_FULL.md` §4.1).
pub const BLOCK_SIZE: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    ReadRequest {
        filename: String,
        mode: String,
        options: BTreeMap<String, String>,
    },
    WriteRequest {
        filename: String,
        mode: String,
        options: BTreeMap<String, String>,
    },
    Data {
        block_num: u16,
        payload: Vec<u8>,
    },
    Ack {
        block_num: u16,
    },
    Error {
        code: u16,
        message: String,
    },
    /// Sentinel for "no reply warranted": either the input was malformed,
    /// or the state machine legitimately has nothing to send.
    NoOp,
}

impl Packet {
    pub fn error(code: u16, message: impl Into<String>) -> Packet {
        Packet::Error {
            code,
            message: message.into(),
        }
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self, Packet::NoOp)
    }

    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        match self {
            Packet::ReadRequest {
                filename,
                mode,
                options,
            } => {
                buf.put_u16(OP_RRQ);
                put_cstr(&mut buf, filename);
                put_cstr(&mut buf, mode);
                put_options(&mut buf, options);
            }
            Packet::WriteRequest {
                filename,
                mode,
                options,
            } => {
                buf.put_u16(OP_WRQ);
                put_cstr(&mut buf, filename);
                put_cstr(&mut buf, mode);
                put_options(&mut buf, options);
            }
            Packet::Data { block_num, payload } => {
                buf.put_u16(OP_DATA);
                buf.put_u16(*block_num);
                buf.put_slice(payload);
            }
            Packet::Ack { block_num } => {
                buf.put_u16(OP_ACK);
                buf.put_u16(*block_num);
            }
            Packet::Error { code, message } => {
                buf.put_u16(OP_ERROR);
                buf.put_u16(*code);
                put_cstr(&mut buf, message);
            }
            Packet::NoOp => {}
        }
        buf
    }
}

fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

fn put_options(buf: &mut BytesMut, options: &BTreeMap<String, String>) {
    // Options are already held in a BTreeMap, so iteration is key-sorted.
    for (k, v) in options {
        put_cstr(buf, k);
        put_cstr(buf, v);
    }
}

/// Parse a datagram into a [`Packet`]. Any framing violation yields
/// [`Packet::NoOp`] rather than an error; the wire is untrusted input and
/// the reactor's only valid response to garbage is silence.
pub fn parse(bytes: &[u8]) -> Packet {
    try_parse(bytes).unwrap_or(Packet::NoOp)
}

fn try_parse(bytes: &[u8]) -> Option<Packet> {
    if bytes.len() < 2 {
        return None;
    }
    let opcode = u16::from_be_bytes([bytes[0], bytes[1]]);
    let rest = &bytes[2..];
    match opcode {
        OP_RRQ => parse_request(rest).map(|(filename, mode, options)| Packet::ReadRequest {
            filename,
            mode,
            options,
        }),
        OP_WRQ => parse_request(rest).map(|(filename, mode, options)| Packet::WriteRequest {
            filename,
            mode,
            options,
        }),
        OP_DATA => {
            if rest.len() < 2 {
                return None;
            }
            let block_num = u16::from_be_bytes([rest[0], rest[1]]);
            let payload = rest[2..].to_vec();
            if payload.len() > u16::MAX as usize {
                return None;
            }
            Some(Packet::Data { block_num, payload })
        }
        OP_ACK => {
            if rest.len() != 2 {
                return None;
            }
            let block_num = u16::from_be_bytes([rest[0], rest[1]]);
            Some(Packet::Ack { block_num })
        }
        OP_ERROR => {
            if rest.len() < 2 {
                return None;
            }
            let code = u16::from_be_bytes([rest[0], rest[1]]);
            let message = parse_cstr(&rest[2..])?.0;
            Some(Packet::Error { code, message })
        }
        // OACK is recognized so it doesn't get misparsed as an unknown
        // opcode, but the state machine never emits or consumes it: block
        // size negotiation is out of scope.
        OP_OACK => None,
        _ => None,
    }
}

fn parse_request(rest: &[u8]) -> Option<(String, String, BTreeMap<String, String>)> {
    let (filename, rest) = parse_cstr(rest)?;
    let (mode, rest) = parse_cstr(rest)?;
    let options = parse_options(rest)?;
    Some((filename, mode, options))
}

fn parse_cstr(bytes: &[u8]) -> Option<(String, &[u8])> {
    let nul_pos = bytes.iter().position(|&b| b == 0)?;
    let s = std::str::from_utf8(&bytes[..nul_pos]).ok()?;
    Some((s.to_string(), &bytes[nul_pos + 1..]))
}

fn parse_options(mut rest: &[u8]) -> Option<BTreeMap<String, String>> {
    let mut options = BTreeMap::new();
    while !rest.is_empty() {
        let (key, r) = parse_cstr(rest)?;
        let (value, r) = parse_cstr(r)?;
        options.insert(key, value);
        rest = r;
    }
    Some(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn round_trips_read_request_without_options() {
        let p = Packet::ReadRequest {
            filename: "file.txt".into(),
            mode: "netascii".into(),
            options: BTreeMap::new(),
        };
        let bytes = p.serialize();
        assert_eq!(parse(&bytes), p);
    }

    #[test]
    fn round_trips_write_request_with_options_sorted() {
        let p = Packet::WriteRequest {
            filename: "f".into(),
            mode: "octet".into(),
            options: opts(&[("tsize", "100"), ("blksize", "1024")]),
        };
        let bytes = p.serialize();
        // blksize sorts before tsize lexicographically.
        assert!(bytes.windows(7).any(|w| w == b"blksize"));
        assert_eq!(parse(&bytes), p);
    }

    #[test]
    fn round_trips_data_and_ack() {
        let data = Packet::Data {
            block_num: 7,
            payload: vec![1, 2, 3],
        };
        assert_eq!(parse(&data.serialize()), data);

        let ack = Packet::Ack { block_num: 42 };
        assert_eq!(parse(&ack.serialize()), ack);
    }

    #[test]
    fn round_trips_error() {
        let e = Packet::error(1, "File not found");
        assert_eq!(parse(&e.serialize()), e);
    }

    #[test]
    fn truncated_header_is_no_op() {
        assert_eq!(parse(&[0x00]), Packet::NoOp);
        assert_eq!(parse(&[]), Packet::NoOp);
    }

    #[test]
    fn unknown_opcode_is_no_op() {
        assert_eq!(parse(&[0x00, 0x63]), Packet::NoOp);
    }

    #[test]
    fn oack_is_no_op() {
        assert_eq!(parse(&[0x00, 0x06]), Packet::NoOp);
    }

    #[test]
    fn missing_terminator_is_no_op() {
        // RRQ with filename but no terminating NUL.
        let mut bytes = BytesMut::new();
        bytes.put_u16(OP_RRQ);
        bytes.put_slice(b"file.txt");
        assert_eq!(parse(&bytes), Packet::NoOp);
    }

    #[test]
    fn ack_with_wrong_length_is_no_op() {
        assert_eq!(parse(&[0x00, 0x04, 0x00]), Packet::NoOp);
        assert_eq!(parse(&[0x00, 0x04, 0x00, 0x01, 0x00]), Packet::NoOp);
    }

    #[test]
    fn no_op_serializes_to_empty_bytes() {
        assert!(Packet::NoOp.serialize().is_empty());
    }
}
