//! Lock-free single-producer/single-consumer ring buffers over shared memory, paired
//! into duplex channels for host-local IPC.
//!
//! - [`SPSC::RingBuffer`]: claim/commit/abort framing and the drain loop.
//! - [`SPSC::DuplexChannel`]: one file-backed segment holding two ring buffers and a
//!   handshake header.
//! - [`SPSC::Forwarder`]: reference loop republishing one buffer onto another.

// Module naming follows project convention (SPSC = Single-Producer Single-Consumer)
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod Debug;
#[allow(non_snake_case)]
pub mod SPSC;
pub mod error;

pub use error::{ChannelError, ForwardError, RingBufferError};
