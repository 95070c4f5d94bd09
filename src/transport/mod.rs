//! Transport layer: newline-delimited JSON-RPC over stdio

mod codec;
mod stdio;

pub use self::codec::JsonLineCodec;
pub use self::stdio::{InboundFrames, ResponseSender, inbound, spawn_writer};
