//! Connection lifecycle - open publishers and subscribers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Publisher + Subscriber Traits                   │
//! │  Publisher: send(msg)          -> Dispatch<()>              │
//! │  Subscriber: receive(timeout)  -> Dispatch<StreamMessage>   │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │        StreamPublisher<P> / StreamSubscriber<C>              │
//! │  - route every call through the execution adapter           │
//! │  - close at most once, close on drop                        │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │           Producer + Consumer (backend, blocking)            │
//! │  Producer: produce(msg) / close()                           │
//! │  Consumer: poll(timeout) -> Polled / close()                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod publisher;
mod subscriber;

use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use crate::error::Result;
use crate::execution::ExecutionContext;

pub use publisher::{Producer, Publisher, StreamPublisher};
pub use subscriber::{Consumer, Polled, StreamSubscriber, Subscriber};

/// An open publisher or subscriber holding backend resources.
pub trait Connection: Send + Sync {
    /// The worker pool operations are dispatched to, if any.
    fn execution_context(&self) -> Option<&ExecutionContext>;

    fn is_closed(&self) -> bool {
        false
    }

    /// Release backend resources.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn execution_context(&self) -> Option<&ExecutionContext> {
        (**self).execution_context()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}

/// Use `connection` for the duration of `f`, then close it.
///
/// `close` runs exactly once whichever way `f` exits: a value, an error, or
/// a panic. A close failure is returned when `f` succeeded; when `f` failed
/// its error wins.
///
/// ## Example
///
/// ```
/// use stream_bus::{scoped, StreamMessage, StreamRegistry};
///
/// let stream = StreamRegistry::builtin().by_name("memory", "scoped-doc", None).unwrap();
///
/// scoped(stream.publish().unwrap(), |publisher| {
///     publisher.send(StreamMessage::new("t1", "hi")).wait()
/// })
/// .unwrap();
/// ```
pub fn scoped<C, T, F>(connection: C, f: F) -> Result<T>
where
    C: Connection,
    F: FnOnce(&C) -> Result<T>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&connection)));
    let closed = connection.close();

    match outcome {
        Ok(Ok(value)) => closed.map(|()| value),
        Ok(Err(err)) => {
            if let Err(close_err) = closed {
                warn!(error = %close_err, "failed to close connection after error");
            }
            Err(err)
        }
        Err(payload) => {
            if let Err(close_err) = closed {
                warn!(error = %close_err, "failed to close connection while unwinding");
            }
            panic::resume_unwind(payload)
        }
    }
}
