use std::io;

use thiserror::Error;

/// Errors raised while decoding a netlink route message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetlinkError {
    #[error("netlink message too short ({len} bytes)")]
    TooShort { len: usize },
    #[error("netlink length field {declared} does not fit the buffer of {available} bytes")]
    BadLength { declared: usize, available: usize },
}

/// Errors raised while reading the FPM stream. Any of these tears the FPM
/// connection down; the peer is expected to reconnect and replay.
#[derive(Debug, Error)]
pub enum FpmError {
    #[error("FPM read failed: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported FPM version {0}")]
    UnsupportedVersion(u8),
    #[error("unexpected FPM message type {0}")]
    UnexpectedType(u8),
    #[error("FPM message of {0} bytes exceeds the receive buffer")]
    Oversized(usize),
    #[error("FPM header length {0} is shorter than the header itself")]
    Runt(usize),
}
