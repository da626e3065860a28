pub mod Buffer;
pub mod Buffer_impl;
pub mod layout;
pub mod record;

pub use Buffer::{Claim, ControlledAction, RingBuffer}; // re-export for stable path
