//! Execution adapter: run a blocking backend operation inline, or hand it to
//! a worker pool and return a future.
//!
//! Backends implement `send`/`receive` once, as plain blocking code. The
//! connection decides how that code runs based on whether it was opened with
//! an [`ExecutionContext`]:
//!
//! ```text
//!   connection.send(msg)
//!          │
//!          ▼
//!   dispatch(context, op) ──── None ────▶ op() on the caller's thread
//!          │                              → Dispatch::ready(result)
//!          │
//!        Some(ctx)
//!          │
//!          ▼
//!   ctx.spawn_blocking(op)               → Dispatch::pending(join handle)
//! ```
//!
//! Either way the caller gets a [`Dispatch`], which can be awaited or
//! resolved with [`Dispatch::wait`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::{Result, StreamError};

/// Handle to the worker pool used for non-blocking send/receive.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    handle: Handle,
}

impl ExecutionContext {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Capture the runtime the caller is running in, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    fn submit<T, F>(&self, op: F) -> JoinHandle<Result<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.handle.spawn_blocking(op)
    }
}

impl From<Handle> for ExecutionContext {
    fn from(handle: Handle) -> Self {
        Self::new(handle)
    }
}

/// Run `op` according to `context`.
///
/// Without a context the operation runs to completion before this returns.
/// With one, it is submitted to the context's blocking pool and this returns
/// immediately.
pub fn dispatch<T, F>(context: Option<&ExecutionContext>, op: F) -> Dispatch<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match context {
        None => Dispatch::ready(op()),
        Some(context) => Dispatch::pending(context.submit(op)),
    }
}

enum State<T> {
    Ready(Option<Result<T>>),
    Pending(JoinHandle<Result<T>>),
}

/// Outcome of a dispatched operation: already complete, or running on a worker.
///
/// Implements `Future`, so async callers simply `.await` it. Synchronous
/// callers use [`wait`](Dispatch::wait).
#[must_use = "a dispatched operation reports its result through the Dispatch"]
pub struct Dispatch<T> {
    state: State<T>,
}

// Neither variant is structurally pinned; the join handle is itself Unpin.
impl<T> Unpin for Dispatch<T> {}

impl<T> Dispatch<T> {
    pub fn ready(result: Result<T>) -> Self {
        Self {
            state: State::Ready(Some(result)),
        }
    }

    fn pending(handle: JoinHandle<Result<T>>) -> Self {
        Self {
            state: State::Pending(handle),
        }
    }

    /// Whether the operation was handed to a worker.
    pub fn is_pending(&self) -> bool {
        matches!(self.state, State::Pending(_))
    }

    /// Block the current thread until the operation completes.
    ///
    /// Must not be called from inside an async task; `.await` the dispatch
    /// there instead.
    pub fn wait(self) -> Result<T> {
        match self.state {
            State::Ready(result) => result.unwrap_or(Err(StreamError::Closed)),
            State::Pending(handle) => futures::executor::block_on(handle)?,
        }
    }
}

impl<T> Future for Dispatch<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            State::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(StreamError::Closed)))
            }
            State::Pending(handle) => match Pin::new(handle).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(join)) => Poll::Ready(Err(StreamError::from(join))),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl<T> std::fmt::Debug for Dispatch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Ready(Some(_)) => "ready",
            State::Ready(None) => "taken",
            State::Pending(_) => "pending",
        };
        f.debug_struct("Dispatch").field("state", &state).finish()
    }
}
