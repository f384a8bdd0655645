//! Backend adapters.
//!
//! Each backend supplies a [`Stream`](crate::Stream) plus the blocking
//! [`Producer`](crate::Producer) and [`Consumer`](crate::Consumer) handles
//! behind it, and is registered by name in
//! [`StreamRegistry::builtin`](crate::StreamRegistry::builtin) when its
//! feature is enabled.

#[cfg(feature = "kafka")]
pub mod kafka;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
