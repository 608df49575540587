//! CCNx 1.0 stream access core.
//! Host-driven: the media host pulls blocks, seeks and queries; the core turns pulls
//! into chunk Interests over a portal and slices the replies.

pub mod chunk;
pub mod config;
pub mod control;
pub mod exchange;
pub mod ffi;
pub mod identity;
pub mod name;
pub mod portal;
pub mod protocol;
pub mod stream;
pub mod wire;

pub use chunk::{chunk_index_for, extract_block, ChunkSize, DEFAULT_CHUNK_SIZE};
pub use config::AccessConfig;
pub use control::{ControlAnswer, ControlError, ControlQuery};
pub use identity::Credentials;
pub use name::{build_base_name, build_chunk_name, Name, NameSegment, SegmentType};
pub use portal::{FramedPortal, Portal, PortalError, PortalFactory, Timeout};
pub use protocol::{ContentObject, Interest, Message, Response, PROTOCOL_VERSION};
pub use stream::{open_tcp, CursorState, OpenError, StreamSession};
pub use wire::{decode_packet, encode_packet, PacketDecodeError, PacketEncodeError};
