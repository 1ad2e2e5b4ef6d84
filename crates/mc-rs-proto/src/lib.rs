//! Java Edition protocol 47 types, packet definitions and framing.

pub mod codec;
pub mod compression;
pub mod error;
pub mod frame;
pub mod packets;
pub mod registry;
pub mod state;
pub mod types;

pub use error::ProtoError;
pub use frame::{FrameCodec, RawFrame};
pub use packets::{GamePacket, Packet};
pub use registry::PacketRegistry;
pub use state::{ConnectionState, Direction};
