//! Subscriber connections.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::Connection;
use crate::config::EmptyPolicy;
use crate::error::{Result, StreamError};
use crate::execution::{dispatch, Dispatch, ExecutionContext};
use crate::message::StreamMessage;

/// Trait for receiving messages on the topics a connection was opened with.
///
/// This is a pull-based interface. `receive` calls on one subscriber are
/// expected to be issued one after another, not concurrently.
pub trait Subscriber: Connection {
    /// Topics fixed when the subscription was opened.
    fn topics(&self) -> &BTreeSet<String>;

    /// Receive the next message.
    ///
    /// `timeout` is the per-poll window; `None` blocks until the backend
    /// delivers. Depending on the backend's [`EmptyPolicy`] an empty window
    /// either fails with `StreamError::Empty` or starts another poll.
    fn receive(&self, timeout: Option<Duration>) -> Dispatch<StreamMessage>;
}

/// Result of a single backend poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Polled {
    /// A message was delivered.
    Message(StreamMessage),
    /// The poll window elapsed with nothing to deliver.
    Empty,
    /// The backend reached a known end-of-data marker (e.g. a partition EOF);
    /// more may arrive later. Always polled past.
    EndOfData,
}

/// Backend receive handle: the blocking half a backend implements.
pub trait Consumer: Send + Sync + 'static {
    /// Poll once for up to `timeout` (`None` blocks).
    fn poll(&self, timeout: Option<Duration>) -> Result<Polled>;

    /// Release the subscription (e.g. unsubscribe, then disconnect).
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Subscriber connection over a backend [`Consumer`].
pub struct StreamSubscriber<C: Consumer> {
    consumer: Arc<C>,
    topics: BTreeSet<String>,
    policy: EmptyPolicy,
    context: Option<ExecutionContext>,
    closed: Arc<AtomicBool>,
}

impl<C: Consumer> StreamSubscriber<C> {
    pub fn new(
        consumer: C,
        topics: BTreeSet<String>,
        policy: EmptyPolicy,
        context: Option<ExecutionContext>,
    ) -> Self {
        Self {
            consumer: Arc::new(consumer),
            topics,
            policy,
            context,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn empty_policy(&self) -> EmptyPolicy {
        self.policy
    }
}

impl<C: Consumer> Connection for StreamSubscriber<C> {
    fn execution_context(&self) -> Option<&ExecutionContext> {
        self.context.as_ref()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.consumer.close()
    }
}

impl<C: Consumer> Subscriber for StreamSubscriber<C> {
    fn topics(&self) -> &BTreeSet<String> {
        &self.topics
    }

    fn receive(&self, timeout: Option<Duration>) -> Dispatch<StreamMessage> {
        let poller = Poller {
            consumer: Arc::clone(&self.consumer),
            closed: Arc::clone(&self.closed),
            topics: self.topics.iter().cloned().collect(),
            policy: self.policy,
        };
        dispatch(self.context.as_ref(), move || poller.run(timeout))
    }
}

impl<C: Consumer> Drop for StreamSubscriber<C> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close subscriber on drop");
        }
    }
}

/// Everything a receive needs, owned so it can move onto a worker.
struct Poller<C> {
    consumer: Arc<C>,
    closed: Arc<AtomicBool>,
    topics: Vec<String>,
    policy: EmptyPolicy,
}

impl<C: Consumer> Poller<C> {
    fn run(self, timeout: Option<Duration>) -> Result<StreamMessage> {
        loop {
            // Closing is the only way to stop a subscriber that keeps polling.
            if self.closed.load(Ordering::Acquire) {
                return Err(StreamError::Closed);
            }

            debug!(topics = ?self.topics, ?timeout, "polling consumer");
            match self.consumer.poll(timeout)? {
                Polled::Message(msg) => return Ok(msg),
                Polled::EndOfData => continue,
                Polled::Empty => match self.policy {
                    EmptyPolicy::KeepPolling => continue,
                    EmptyPolicy::Fail => {
                        return Err(StreamError::Empty {
                            topics: self.topics,
                            timeout,
                        })
                    }
                },
            }
        }
    }
}
