//! Packet framing: 8-byte fixed header + bincode body.
//!
//! Header layout: version, packet type, total length (u16 BE, header included),
//! hop limit, return code, flags, header length.

use crate::protocol::{
    Message, PACKET_TYPE_CONTENT_OBJECT, PACKET_TYPE_INTEREST, PACKET_TYPE_INTEREST_RETURN,
    PROTOCOL_VERSION,
};

pub const FIXED_HEADER_SIZE: usize = 8;
pub const MAX_PACKET_LEN: usize = u16::MAX as usize;
const DEFAULT_HOP_LIMIT: u8 = 255;

/// Encode a message into one packet.
pub fn encode_packet(msg: &Message) -> Result<Vec<u8>, PacketEncodeError> {
    let body = bincode::serialize(msg).map_err(PacketEncodeError::Encode)?;
    let total = FIXED_HEADER_SIZE + body.len();
    if total > MAX_PACKET_LEN {
        return Err(PacketEncodeError::TooLarge(total));
    }
    let return_code = match msg {
        Message::InterestReturn { code, .. } => code.as_u8(),
        _ => 0,
    };
    let hop_limit = match msg {
        Message::ContentObject(_) => 0,
        _ => DEFAULT_HOP_LIMIT,
    };
    let mut out = Vec::with_capacity(total);
    out.push(PROTOCOL_VERSION);
    out.push(msg.packet_type());
    out.extend_from_slice(&(total as u16).to_be_bytes());
    out.push(hop_limit);
    out.push(return_code);
    out.push(0); // flags
    out.push(FIXED_HEADER_SIZE as u8);
    out.extend_from_slice(&body);
    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum PacketEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("packet too large: {0} bytes")]
    TooLarge(usize),
}

/// Decode one packet from the front of `bytes`. Returns the message and the bytes consumed.
/// `NeedMore` means the buffer holds a partial packet.
pub fn decode_packet(bytes: &[u8]) -> Result<(Message, usize), PacketDecodeError> {
    if bytes.len() < FIXED_HEADER_SIZE {
        return Err(PacketDecodeError::NeedMore);
    }
    if bytes[0] != PROTOCOL_VERSION {
        return Err(PacketDecodeError::BadVersion(bytes[0]));
    }
    let packet_type = bytes[1];
    if !matches!(
        packet_type,
        PACKET_TYPE_INTEREST | PACKET_TYPE_CONTENT_OBJECT | PACKET_TYPE_INTEREST_RETURN
    ) {
        return Err(PacketDecodeError::UnknownType(packet_type));
    }
    let total = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    let header_len = bytes[7] as usize;
    if header_len < FIXED_HEADER_SIZE || total < header_len {
        return Err(PacketDecodeError::BadLength);
    }
    if bytes.len() < total {
        return Err(PacketDecodeError::NeedMore);
    }
    let msg: Message =
        bincode::deserialize(&bytes[header_len..total]).map_err(PacketDecodeError::Decode)?;
    if msg.packet_type() != packet_type {
        return Err(PacketDecodeError::TypeMismatch);
    }
    Ok((msg, total))
}

#[derive(Debug, thiserror::Error)]
pub enum PacketDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("unsupported version {0}")]
    BadVersion(u8),
    #[error("unknown packet type {0}")]
    UnknownType(u8),
    #[error("inconsistent header lengths")]
    BadLength,
    #[error("header type does not match body")]
    TypeMismatch,
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}
