//! Crate-wide typed errors at the seams between protocol parsing, the DDOP
//! model, the CAN stack adapter and subnet persistence. `main` and other
//! wiring code use `anyhow::Result` on top of these; nothing here is meant
//! to be caught and recovered from by its caller except by logging and
//! dropping the offending unit of work (spec's error taxonomy: malformed
//! input is never fatal).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("bad start-of-packet marker: {0:02x} {1:02x}")]
    BadStartOfPacket(u8, u8),
    #[error("checksum mismatch: expected {expected:02x}, got {actual:02x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("no pool chunks stored for this partner")]
    NoChunksStored,
    #[error("pool data truncated at offset {0}")]
    Truncated(usize),
    #[error("unknown object type tag {0:02x}")]
    UnknownObjectType(u8),
    #[error("pool data could not be parsed after all stored chunks were tried")]
    UnparseableAfterAllChunks,
}

#[derive(Debug, Error)]
pub enum CanStackError {
    #[error("CAN hardware interface failed to start: {0}")]
    HardwareStartFailed(String),
    #[error("ISO 11783 address claim timed out after {0:?}")]
    AddressClaimTimeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum SubnetConfigError {
    #[error("failed to read settings file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse settings file: {0}")]
    Parse(#[from] serde_json::Error),
}
