//! Inter-worker frame format.
//!
//! Every record on the bus is length-prefixed and self-describing:
//!
//! ```text
//! u32  body length (type byte + payload + crc)
//! u8   frame type
//! ...  payload, fixed-width little-endian integers
//! u32  crc32 over type byte + payload
//! ```
//!
//! Virtual times travel as unsigned 64-bit little-endian; the sentinel
//! encodings pass through unchanged. Strings are u16-length-prefixed UTF-8,
//! guest payloads u32-length-prefixed raw bytes.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::coordinator::ops::SimOp;
use crate::engine::event::{Endpoint, Packet};
use crate::engine::time::{SimDuration, VirtualTime};
use crate::engine::{NetworkId, NodeAddr, SlaveId, WorkerId};

const FT_START: u8 = 1;
const FT_OP: u8 = 2;
const FT_TRACK: u8 = 3;
const FT_STATE: u8 = 4;
const FT_PACKET: u8 = 5;
const FT_DONE_WORKER: u8 = 6;
const FT_DONE_SLAVE: u8 = 7;
const FT_ERROR: u8 = 8;

const OP_CREATE_NETWORK: u8 = 1;
const OP_CONNECT_NETWORKS: u8 = 2;
const OP_CREATE_NODE: u8 = 3;
const OP_END: u8 = 4;

/// A worker's published time tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateFrame {
    pub src: WorkerId,
    pub last_event: VirtualTime,
    pub current: VirtualTime,
    pub next_event: VirtualTime,
    pub window: VirtualTime,
}

/// Node placement record broadcast by the master so every worker can route
/// packets and resolve names without shared state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRecord {
    pub network: NetworkId,
    pub addr: NodeAddr,
    pub owner: WorkerId,
    pub hostname: String,
    pub kbps_up: u32,
    pub kbps_down: u32,
}

/// Everything that crosses worker/slave/master boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Start {
        min_latency: SimDuration,
        max_latency: SimDuration,
    },
    Op(SimOp),
    Track(TrackRecord),
    State(StateFrame),
    Packet(Packet),
    DoneWorker {
        worker: WorkerId,
    },
    DoneSlave {
        slave: SlaveId,
    },
    Error {
        worker: WorkerId,
        message: String,
    },
}

#[derive(Debug)]
pub enum FrameError {
    /// Buffer ended before the advertised length.
    Truncated,
    /// Checksum mismatch.
    Corrupt { expected: u32, actual: u32 },
    UnknownFrameType(u8),
    UnknownOpKind(u8),
    BadString,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Truncated => write!(f, "frame truncated"),
            FrameError::Corrupt { expected, actual } => {
                write!(f, "frame crc mismatch: expected {:08x}, got {:08x}", expected, actual)
            }
            FrameError::UnknownFrameType(t) => write!(f, "unknown frame type {}", t),
            FrameError::UnknownOpKind(k) => write!(f, "unknown op kind {}", k),
            FrameError::BadString => write!(f, "frame string is not valid utf-8"),
        }
    }
}

impl std::error::Error for FrameError {}

impl Frame {
    /// Encode to a self-contained wire record.
    pub fn encode(&self) -> Bytes {
        let mut body = BytesMut::with_capacity(64);
        match self {
            Frame::Start {
                min_latency,
                max_latency,
            } => {
                body.put_u8(FT_START);
                body.put_u64_le(min_latency.as_millis());
                body.put_u64_le(max_latency.as_millis());
            }
            Frame::Op(op) => {
                body.put_u8(FT_OP);
                encode_op(op, &mut body);
            }
            Frame::Track(t) => {
                body.put_u8(FT_TRACK);
                body.put_u16_le(t.network.0);
                body.put_u32_le(t.addr.0);
                body.put_u16_le(t.owner.0);
                put_string(&mut body, &t.hostname);
                body.put_u32_le(t.kbps_up);
                body.put_u32_le(t.kbps_down);
            }
            Frame::State(s) => {
                body.put_u8(FT_STATE);
                body.put_u16_le(s.src.0);
                body.put_u64_le(s.last_event.0);
                body.put_u64_le(s.current.0);
                body.put_u64_le(s.next_event.0);
                body.put_u64_le(s.window.0);
            }
            Frame::Packet(p) => {
                body.put_u8(FT_PACKET);
                body.put_u32_le(p.src.addr.0);
                body.put_u16_le(p.src.port);
                body.put_u32_le(p.dst.addr.0);
                body.put_u16_le(p.dst.port);
                body.put_u64_le(p.sent_at.0);
                body.put_u32_le(p.payload.len() as u32);
                body.put_slice(&p.payload);
            }
            Frame::DoneWorker { worker } => {
                body.put_u8(FT_DONE_WORKER);
                body.put_u16_le(worker.0);
            }
            Frame::DoneSlave { slave } => {
                body.put_u8(FT_DONE_SLAVE);
                body.put_u16_le(slave.0);
            }
            Frame::Error { worker, message } => {
                body.put_u8(FT_ERROR);
                body.put_u16_le(worker.0);
                put_string(&mut body, message);
            }
        }

        let crc = crc32fast::hash(&body);
        let mut out = BytesMut::with_capacity(body.len() + 8);
        out.put_u32_le((body.len() + 4) as u32);
        out.put_slice(&body);
        out.put_u32_le(crc);
        out.freeze()
    }

    /// Decode one record produced by `encode`.
    pub fn decode(buf: &mut Bytes) -> Result<Frame, FrameError> {
        if buf.remaining() < 4 {
            return Err(FrameError::Truncated);
        }
        let len = buf.get_u32_le() as usize;
        if buf.remaining() < len || len < 5 {
            return Err(FrameError::Truncated);
        }
        let mut body = buf.split_to(len - 4);
        let mut crc_part = buf.split_to(4);
        let expected = crc_part.get_u32_le();
        let actual = crc32fast::hash(&body);
        if expected != actual {
            return Err(FrameError::Corrupt { expected, actual });
        }

        let ftype = body.get_u8();
        match ftype {
            FT_START => {
                check_len(&body, 16)?;
                Ok(Frame::Start {
                    min_latency: SimDuration::from_millis(body.get_u64_le()),
                    max_latency: SimDuration::from_millis(body.get_u64_le()),
                })
            }
            FT_OP => decode_op(&mut body).map(Frame::Op),
            FT_TRACK => {
                check_len(&body, 8)?;
                let network = NetworkId(body.get_u16_le());
                let addr = NodeAddr(body.get_u32_le());
                let owner = WorkerId(body.get_u16_le());
                let hostname = get_string(&mut body)?;
                check_len(&body, 8)?;
                Ok(Frame::Track(TrackRecord {
                    network,
                    addr,
                    owner,
                    hostname,
                    kbps_up: body.get_u32_le(),
                    kbps_down: body.get_u32_le(),
                }))
            }
            FT_STATE => {
                check_len(&body, 34)?;
                Ok(Frame::State(StateFrame {
                    src: WorkerId(body.get_u16_le()),
                    last_event: VirtualTime(body.get_u64_le()),
                    current: VirtualTime(body.get_u64_le()),
                    next_event: VirtualTime(body.get_u64_le()),
                    window: VirtualTime(body.get_u64_le()),
                }))
            }
            FT_PACKET => {
                check_len(&body, 24)?;
                let src = Endpoint {
                    addr: NodeAddr(body.get_u32_le()),
                    port: body.get_u16_le(),
                };
                let dst = Endpoint {
                    addr: NodeAddr(body.get_u32_le()),
                    port: body.get_u16_le(),
                };
                let sent_at = VirtualTime(body.get_u64_le());
                let plen = body.get_u32_le() as usize;
                check_len(&body, plen)?;
                let payload = body.split_to(plen);
                Ok(Frame::Packet(Packet {
                    src,
                    dst,
                    payload,
                    sent_at,
                }))
            }
            FT_DONE_WORKER => {
                check_len(&body, 2)?;
                Ok(Frame::DoneWorker {
                    worker: WorkerId(body.get_u16_le()),
                })
            }
            FT_DONE_SLAVE => {
                check_len(&body, 2)?;
                Ok(Frame::DoneSlave {
                    slave: SlaveId(body.get_u16_le()),
                })
            }
            FT_ERROR => {
                check_len(&body, 2)?;
                let worker = WorkerId(body.get_u16_le());
                let message = get_string(&mut body)?;
                Ok(Frame::Error { worker, message })
            }
            other => Err(FrameError::UnknownFrameType(other)),
        }
    }
}

fn encode_op(op: &SimOp, body: &mut BytesMut) {
    match op {
        SimOp::CreateNetwork {
            at,
            id,
            intra_latency_ms,
        } => {
            body.put_u8(OP_CREATE_NETWORK);
            body.put_u64_le(at.0);
            body.put_u16_le(id.0);
            body.put_u64_le(*intra_latency_ms);
        }
        SimOp::ConnectNetworks {
            at,
            a,
            b,
            latency_ms,
        } => {
            body.put_u8(OP_CONNECT_NETWORKS);
            body.put_u64_le(at.0);
            body.put_u16_le(a.0);
            body.put_u16_le(b.0);
            body.put_u64_le(*latency_ms);
        }
        SimOp::CreateNode {
            at,
            addr,
            network,
            hostname,
            plugin,
            args,
            kbps_up,
            kbps_down,
        } => {
            body.put_u8(OP_CREATE_NODE);
            body.put_u64_le(at.0);
            body.put_u32_le(addr.0);
            body.put_u16_le(network.0);
            put_string(body, hostname);
            put_string(body, plugin);
            body.put_u16_le(args.len() as u16);
            for arg in args {
                put_string(body, arg);
            }
            body.put_u32_le(*kbps_up);
            body.put_u32_le(*kbps_down);
        }
        SimOp::End { at } => {
            body.put_u8(OP_END);
            body.put_u64_le(at.0);
        }
    }
}

fn decode_op(body: &mut Bytes) -> Result<SimOp, FrameError> {
    check_len(body, 1)?;
    let kind = body.get_u8();
    match kind {
        OP_CREATE_NETWORK => {
            check_len(body, 18)?;
            Ok(SimOp::CreateNetwork {
                at: VirtualTime(body.get_u64_le()),
                id: NetworkId(body.get_u16_le()),
                intra_latency_ms: body.get_u64_le(),
            })
        }
        OP_CONNECT_NETWORKS => {
            check_len(body, 20)?;
            Ok(SimOp::ConnectNetworks {
                at: VirtualTime(body.get_u64_le()),
                a: NetworkId(body.get_u16_le()),
                b: NetworkId(body.get_u16_le()),
                latency_ms: body.get_u64_le(),
            })
        }
        OP_CREATE_NODE => {
            check_len(body, 14)?;
            let at = VirtualTime(body.get_u64_le());
            let addr = NodeAddr(body.get_u32_le());
            let network = NetworkId(body.get_u16_le());
            let hostname = get_string(body)?;
            let plugin = get_string(body)?;
            check_len(body, 2)?;
            let argc = body.get_u16_le() as usize;
            let mut args = Vec::with_capacity(argc);
            for _ in 0..argc {
                args.push(get_string(body)?);
            }
            check_len(body, 8)?;
            Ok(SimOp::CreateNode {
                at,
                addr,
                network,
                hostname,
                plugin,
                args,
                kbps_up: body.get_u32_le(),
                kbps_down: body.get_u32_le(),
            })
        }
        OP_END => {
            check_len(body, 8)?;
            Ok(SimOp::End {
                at: VirtualTime(body.get_u64_le()),
            })
        }
        other => Err(FrameError::UnknownOpKind(other)),
    }
}

fn put_string(body: &mut BytesMut, s: &str) {
    body.put_u16_le(s.len() as u16);
    body.put_slice(s.as_bytes());
}

fn get_string(body: &mut Bytes) -> Result<String, FrameError> {
    check_len(body, 2)?;
    let len = body.get_u16_le() as usize;
    check_len(body, len)?;
    let raw = body.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| FrameError::BadString)
}

fn check_len(body: &Bytes, need: usize) -> Result<(), FrameError> {
    if body.remaining() < need {
        Err(FrameError::Truncated)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame) {
        let mut wire = frame.encode();
        let decoded = Frame::decode(&mut wire).expect("decode");
        assert_eq!(decoded, frame);
        assert_eq!(wire.remaining(), 0, "trailing bytes after decode");
    }

    #[test]
    fn test_state_frame_roundtrip() {
        roundtrip(Frame::State(StateFrame {
            src: WorkerId(3),
            last_event: VirtualTime::from_millis(10),
            current: VirtualTime::from_millis(12),
            next_event: VirtualTime::INVALID,
            window: VirtualTime::MAX,
        }));
    }

    #[test]
    fn test_create_node_op_roundtrip() {
        roundtrip(Frame::Op(SimOp::CreateNode {
            at: VirtualTime::ZERO,
            addr: NodeAddr(0x0a000001),
            network: NetworkId(1),
            hostname: "ping.example".into(),
            plugin: "pingpong".into(),
            args: vec!["--peer".into(), "pong.example".into()],
            kbps_up: 1024,
            kbps_down: 2048,
        }));
    }

    #[test]
    fn test_packet_roundtrip() {
        roundtrip(Frame::Packet(Packet {
            src: Endpoint {
                addr: NodeAddr(1),
                port: 80,
            },
            dst: Endpoint {
                addr: NodeAddr(2),
                port: 8080,
            },
            payload: Bytes::from_static(b"ping 0"),
            sent_at: VirtualTime::from_millis(42),
        }));
    }

    #[test]
    fn test_control_frames_roundtrip() {
        roundtrip(Frame::Start {
            min_latency: SimDuration::from_millis(10),
            max_latency: SimDuration::from_millis(150),
        });
        roundtrip(Frame::Track(TrackRecord {
            network: NetworkId(1),
            addr: NodeAddr(7),
            owner: WorkerId(0),
            hostname: "pong.example".into(),
            kbps_up: 1000,
            kbps_down: 1000,
        }));
        roundtrip(Frame::DoneWorker { worker: WorkerId(1) });
        roundtrip(Frame::DoneSlave { slave: SlaveId(0) });
        roundtrip(Frame::Error {
            worker: WorkerId(2),
            message: "backwards time".into(),
        });
    }

    #[test]
    fn test_corrupt_frame_rejected() {
        let wire = Frame::DoneWorker { worker: WorkerId(1) }.encode();
        let mut bad = BytesMut::from(&wire[..]);
        let last = bad.len() - 5;
        bad[last] ^= 0xff;
        let mut bad = bad.freeze();
        match Frame::decode(&mut bad) {
            Err(FrameError::Corrupt { .. }) => {}
            other => panic!("expected Corrupt, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let wire = Frame::DoneSlave { slave: SlaveId(0) }.encode();
        let mut short = wire.slice(..wire.len() - 2);
        match Frame::decode(&mut short) {
            Err(FrameError::Truncated) => {}
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_frame_type_rejected() {
        let mut body = BytesMut::new();
        body.put_u8(0xee);
        let crc = crc32fast::hash(&body);
        let mut out = BytesMut::new();
        out.put_u32_le((body.len() + 4) as u32);
        out.put_slice(&body);
        out.put_u32_le(crc);
        let mut wire = out.freeze();
        match Frame::decode(&mut wire) {
            Err(FrameError::UnknownFrameType(0xee)) => {}
            other => panic!("expected UnknownFrameType, got {:?}", other),
        }
    }
}
