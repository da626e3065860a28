mod builder;
mod channel;
mod debug;
mod forwarder;
pub mod idle;

pub use builder::{ChannelBuilder, DEFAULT_CAPACITY, DEFAULT_HANDSHAKE_TIMEOUT};
pub use channel::{default_channel_path, DuplexChannel, READY_VERSION};
pub use forwarder::{BackPressurePolicy, Forwarder, ForwarderStats};
pub use idle::IdleStrategy;

pub mod Buffer;

pub use Buffer::{Claim, ControlledAction, RingBuffer};
