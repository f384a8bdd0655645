//! Broker-agnostic publish/subscribe streams.
//!
//! Application code asks a [`StreamRegistry`] for a backend by name, opens a
//! [`Publisher`] or [`Subscriber`] on the returned [`Stream`], and sends or
//! receives [`StreamMessage`]s. Connections opened with an
//! [`ExecutionContext`] run their blocking backend calls on a worker and hand
//! back a pending [`Dispatch`]; without one, calls block the caller.
//!
//! ```
//! use std::time::Duration;
//! use stream_bus::{scoped, StreamMessage, StreamRegistry};
//!
//! let stream = StreamRegistry::builtin().by_name("memory", "lib-doc", None)?;
//!
//! scoped(stream.subscribe(&["greetings"])?, |subscriber| {
//!     stream.publish()?.send(StreamMessage::new("greetings", "hi")).wait()?;
//!     let msg = subscriber.receive(Some(Duration::from_millis(100))).wait()?;
//!     assert_eq!(msg.payload_str(), Some("hi"));
//!     Ok(())
//! })?;
//! # Ok::<(), stream_bus::StreamError>(())
//! ```

pub mod backends;
mod config;
mod connection;
mod error;
mod execution;
mod message;
mod registry;
mod stream;

pub use config::{EmptyPolicy, StreamConfig, StreamSettings};
pub use connection::{
    scoped, Connection, Consumer, Polled, Producer, Publisher, StreamPublisher, StreamSubscriber,
    Subscriber,
};
pub use error::{BoxError, Result, StreamError};
pub use execution::{dispatch, Dispatch, ExecutionContext};
pub use message::{MessageChanges, StreamMessage};
pub use registry::{by_name, global, install, StreamFactory, StreamRegistry};
pub use stream::Stream;
