//! Publisher connections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::Connection;
use crate::error::{Result, StreamError};
use crate::execution::{dispatch, Dispatch, ExecutionContext};
use crate::message::StreamMessage;

/// Trait for sending messages on topics.
///
/// Implementations might include:
/// - `StreamPublisher<MemoryProducer>` - in-process broker
/// - `StreamPublisher<RedisProducer>` - Redis `PUBLISH`
/// - `StreamPublisher<KafkaProducer>` - Kafka producer
pub trait Publisher: Connection {
    /// Send a message to the subscribers of its topic.
    ///
    /// Resolves immediately when the connection has no execution context;
    /// otherwise the send runs on a worker and the returned `Dispatch`
    /// completes when it does.
    fn send(&self, msg: StreamMessage) -> Dispatch<()>;
}

/// Backend send handle: the blocking half a backend implements.
pub trait Producer: Send + Sync + 'static {
    /// Hand `msg` to the backend, blocking until it accepts or rejects it.
    fn produce(&self, msg: &StreamMessage) -> Result<()>;

    /// Release the backend client.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Publisher connection over a backend [`Producer`].
pub struct StreamPublisher<P: Producer> {
    producer: Arc<P>,
    context: Option<ExecutionContext>,
    closed: AtomicBool,
}

impl<P: Producer> StreamPublisher<P> {
    pub fn new(producer: P, context: Option<ExecutionContext>) -> Self {
        Self {
            producer: Arc::new(producer),
            context,
            closed: AtomicBool::new(false),
        }
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }
}

impl<P: Producer> Connection for StreamPublisher<P> {
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
        self.producer.close()
    }
}

impl<P: Producer> Publisher for StreamPublisher<P> {
    fn send(&self, msg: StreamMessage) -> Dispatch<()> {
        if self.is_closed() {
            return Dispatch::ready(Err(StreamError::Closed));
        }
        if msg.topic().is_empty() {
            return Dispatch::ready(Err(StreamError::InvalidMessage(
                "topic must not be empty".to_string(),
            )));
        }

        let producer = Arc::clone(&self.producer);
        dispatch(self.context.as_ref(), move || {
            debug!(topic = msg.topic(), bytes = msg.payload().len(), "producing message");
            producer.produce(&msg)
        })
    }
}

impl<P: Producer> Drop for StreamPublisher<P> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close publisher on drop");
        }
    }
}
