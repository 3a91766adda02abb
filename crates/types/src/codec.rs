//! Message and certificate encoding.
//!
//! # Format
//!
//! ```text
//! [version: u8][payload: SBOR-encoded value]
//! ```
//!
//! The same encoding is used to size messages in the mempool and to embed
//! the commit QC in a block header.

use crate::{HotstuffMessage, QuorumCertificate};
use thiserror::Error;

/// Current encoding version.
pub const WIRE_VERSION: u8 = 1;

/// Errors that can occur during encoding/decoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unknown wire version: {0}")]
    UnknownVersion(u8),

    #[error("Message too short")]
    MessageTooShort,

    #[error("SBOR decode error: {0}")]
    SborDecode(String),

    #[error("SBOR encode error: {0}")]
    SborEncode(String),
}

fn frame(payload: Vec<u8>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(1 + payload.len());
    bytes.push(WIRE_VERSION);
    bytes.extend(payload);
    bytes
}

fn payload(data: &[u8]) -> Result<&[u8], CodecError> {
    let (&version, payload) = data.split_first().ok_or(CodecError::MessageTooShort)?;
    if version != WIRE_VERSION {
        return Err(CodecError::UnknownVersion(version));
    }
    Ok(payload)
}

pub fn encode_message(message: &HotstuffMessage) -> Result<Vec<u8>, CodecError> {
    let payload =
        sbor::basic_encode(message).map_err(|e| CodecError::SborEncode(format!("{:?}", e)))?;
    Ok(frame(payload))
}

pub fn decode_message(data: &[u8]) -> Result<HotstuffMessage, CodecError> {
    sbor::basic_decode(payload(data)?).map_err(|e| CodecError::SborDecode(format!("{:?}", e)))
}

pub fn encode_quorum_certificate(qc: &QuorumCertificate) -> Result<Vec<u8>, CodecError> {
    let payload =
        sbor::basic_encode(qc).map_err(|e| CodecError::SborEncode(format!("{:?}", e)))?;
    Ok(frame(payload))
}

pub fn decode_quorum_certificate(data: &[u8]) -> Result<QuorumCertificate, CodecError> {
    sbor::basic_decode(payload(data)?).map_err(|e| CodecError::SborDecode(format!("{:?}", e)))
}
