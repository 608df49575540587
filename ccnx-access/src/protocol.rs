//! CCNx message model: Interest, Content Object, Interest Return.

use serde::{Deserialize, Serialize};

use crate::name::Name;

/// Current protocol version. Carried in the fixed header and the portal handshake.
pub const PROTOCOL_VERSION: u8 = 1;

/// Request for one object matching `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        Self { name }
    }
}

/// Data reply to an Interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentObject {
    pub name: Name,
    /// Highest valid chunk index of the logical object. None: this object is the last one.
    pub final_chunk: Option<u64>,
    pub payload: Vec<u8>,
}

impl ContentObject {
    /// Chunk number carried in the object's own name.
    pub fn chunk_number(&self) -> Option<u64> {
        self.name.chunk_number()
    }

    /// Final chunk index; a missing marker reads as 0 so any chunk counts as the last.
    pub fn final_chunk_number(&self) -> u64 {
        self.final_chunk.unwrap_or(0)
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

/// Why a forwarder handed an Interest back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnCode {
    NoRoute,
    HopLimitExceeded,
    NoResources,
    PathError,
    Prohibited,
    Congested,
    MtuTooLarge,
}

impl ReturnCode {
    pub fn as_u8(self) -> u8 {
        match self {
            ReturnCode::NoRoute => 1,
            ReturnCode::HopLimitExceeded => 2,
            ReturnCode::NoResources => 3,
            ReturnCode::PathError => 4,
            ReturnCode::Prohibited => 5,
            ReturnCode::Congested => 6,
            ReturnCode::MtuTooLarge => 7,
        }
    }
}

/// All wire message types. Bodies are bincode; the fixed header is in the wire module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Interest(Interest),
    ContentObject(ContentObject),
    InterestReturn { interest: Interest, code: ReturnCode },
}

impl Message {
    /// Packet type byte for the fixed header.
    pub fn packet_type(&self) -> u8 {
        match self {
            Message::Interest(_) => PACKET_TYPE_INTEREST,
            Message::ContentObject(_) => PACKET_TYPE_CONTENT_OBJECT,
            Message::InterestReturn { .. } => PACKET_TYPE_INTEREST_RETURN,
        }
    }

    pub fn is_content_object(&self) -> bool {
        matches!(self, Message::ContentObject(_))
    }

    /// Split into a content object or anything else.
    pub fn into_response(self) -> Response {
        match self {
            Message::ContentObject(co) => Response::ContentObject(co),
            other => Response::Other(other),
        }
    }
}

pub const PACKET_TYPE_INTEREST: u8 = 0;
pub const PACKET_TYPE_CONTENT_OBJECT: u8 = 1;
pub const PACKET_TYPE_INTEREST_RETURN: u8 = 2;

/// What a fetch can get back: the object it asked for, or some other message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ContentObject(ContentObject),
    Other(Message),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::{build_chunk_name, Name};

    fn object(chunk: u64, final_chunk: Option<u64>) -> ContentObject {
        let base = Name::parse_uri("ccnx:/ccnx/tutorial/fetch/movie.mpg").unwrap();
        ContentObject {
            name: build_chunk_name(&base, chunk, &[]),
            final_chunk,
            payload: vec![0u8; 10],
        }
    }

    #[test]
    fn content_object_accessors() {
        let co = object(4, Some(9));
        assert_eq!(co.chunk_number(), Some(4));
        assert_eq!(co.final_chunk_number(), 9);
        assert_eq!(co.payload_size(), 10);
    }

    #[test]
    fn missing_final_marker_reads_as_last() {
        let co = object(0, None);
        assert!(co.chunk_number().unwrap() >= co.final_chunk_number());
    }

    #[test]
    fn response_split() {
        let msg = Message::ContentObject(object(1, Some(2)));
        assert!(msg.is_content_object());
        assert!(matches!(msg.into_response(), Response::ContentObject(_)));

        let ret = Message::InterestReturn {
            interest: Interest::new(Name::new()),
            code: ReturnCode::NoRoute,
        };
        assert!(!ret.is_content_object());
        assert_eq!(ret.packet_type(), PACKET_TYPE_INTEREST_RETURN);
        assert!(matches!(ret.into_response(), Response::Other(_)));
    }
}
