// Binary frame protocol between the controller and a remote client.

pub mod client;
pub mod packet;

pub use client::{Client, Reply};
pub use packet::{Frame, FrameTag, pack, unpack, unpack_stream, write_frame};
