//! In-memory broker for testing and single-process scenarios.
//!
//! This module provides a thread-safe in-process backend, useful for:
//! - Unit and integration testing without external dependencies
//! - Single-process applications
//! - Development and prototyping
//!
//! Streams opened on the same target share one broker, so a publisher and a
//! subscriber built from separate `by_name("memory", "orders", ..)` calls
//! see each other's messages.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::{EmptyPolicy, StreamConfig};
use crate::connection::{
    Consumer, Polled, Producer, Publisher, StreamPublisher, StreamSubscriber, Subscriber,
};
use crate::error::{Result, StreamError};
use crate::execution::ExecutionContext;
use crate::message::StreamMessage;
use crate::stream::{topic_set, Stream};

fn poisoned<T>(_: PoisonError<T>) -> StreamError {
    StreamError::backend("memory broker lock poisoned", "poisoned lock")
}

/// In-process broker.
///
/// Features:
/// - Thread-safe (can be shared across threads via `Clone`)
/// - Messages are stored in a shared log
/// - Each subscriber tracks its own read position and only sees messages
///   published after it subscribed, on its own topics
/// - The log only retains messages some live subscriber has not read yet
///
/// ## Example
///
/// ```
/// use stream_bus::backends::memory::InMemoryBroker;
/// use stream_bus::{StreamMessage, Subscriber};
/// use std::time::Duration;
///
/// let broker = InMemoryBroker::new();
/// let subscriber = broker.subscriber(&["orders"], None);
///
/// broker.publish(StreamMessage::new("orders", "created")).unwrap();
///
/// let msg = subscriber.receive(Some(Duration::from_millis(100))).wait().unwrap();
/// assert_eq!(msg.payload_str(), Some("created"));
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    /// Shared message log
    log: Arc<RwLock<Log>>,
}

#[derive(Default)]
struct Log {
    /// Absolute position of `messages[0]`.
    offset: usize,
    messages: VecDeque<StreamMessage>,
    /// Absolute read position of every live consumer, by consumer id.
    cursors: HashMap<u64, usize>,
    next_id: u64,
}

impl Log {
    fn end(&self) -> usize {
        self.offset + self.messages.len()
    }

    fn register(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let end = self.end();
        self.cursors.insert(id, end);
        id
    }

    fn deregister(&mut self, id: u64) {
        if self.cursors.remove(&id).is_some() {
            self.trim();
        }
    }

    /// Advance consumer `id` to its next message on `topics`.
    fn next_for(&mut self, id: u64, topics: &BTreeSet<String>) -> Option<StreamMessage> {
        let end = self.end();
        let pos = self.cursors.get_mut(&id)?;

        let mut found = None;
        while *pos < end {
            let msg = &self.messages[*pos - self.offset];
            *pos += 1;
            if topics.contains(msg.topic()) {
                found = Some(msg.clone());
                break;
            }
        }
        self.trim();
        found
    }

    /// Drop every message all live consumers have read past.
    fn trim(&mut self) {
        let low = self.cursors.values().copied().min().unwrap_or_else(|| self.end());
        self.messages.drain(..low - self.offset);
        self.offset = low;
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

static BROKERS: OnceLock<Mutex<HashMap<String, Weak<RwLock<Log>>>>> = OnceLock::new();

impl InMemoryBroker {
    /// Create a new, unnamed broker.
    pub fn new() -> Self {
        Self {
            log: Arc::new(RwLock::new(Log::default())),
        }
    }

    /// Get (or create) the process-wide broker for `target`.
    ///
    /// Repeated calls with the same `target` return handles to the same log
    /// while any handle, stream or connection on it is alive. A target with
    /// none left is forgotten.
    pub fn named(target: &str) -> Self {
        let brokers = BROKERS.get_or_init(|| Mutex::new(HashMap::new()));
        let mut brokers = brokers.lock().unwrap_or_else(PoisonError::into_inner);
        brokers.retain(|_, log| log.strong_count() > 0);

        if let Some(log) = brokers.get(target).and_then(Weak::upgrade) {
            return Self { log };
        }
        let broker = Self::new();
        brokers.insert(target.to_string(), Arc::downgrade(&broker.log));
        broker
    }

    /// Append a message for every live subscriber.
    ///
    /// With no subscribers the message is dropped, as nobody can read it.
    pub fn publish(&self, msg: StreamMessage) -> Result<()> {
        let mut log = self.log.write().map_err(poisoned)?;
        log.messages.push_back(msg);
        log.trim();
        Ok(())
    }

    /// Get all retained messages.
    pub fn messages(&self) -> Vec<StreamMessage> {
        self.read_log(|log| log.iter().cloned().collect())
    }

    /// Find all retained messages on a topic.
    pub fn find_all_by_topic(&self, topic: &str) -> Vec<StreamMessage> {
        self.read_log(|log| log.iter().filter(|m| m.topic() == topic).cloned().collect())
    }

    /// Number of messages retained for subscribers that have not read them.
    pub fn len(&self) -> usize {
        self.read_log(|log| log.len())
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.read_log(|log| log.is_empty())
    }

    /// Clear all messages from the log (useful for test cleanup).
    ///
    /// Existing subscribers skip to the end so they keep seeing new messages.
    pub fn clear(&self) {
        let mut log = self.log.write().unwrap_or_else(PoisonError::into_inner);
        let end = log.end();
        log.cursors.values_mut().for_each(|pos| *pos = end);
        log.trim();
    }

    /// Open a subscriber on this broker directly, outside any registry.
    pub fn subscriber(
        &self,
        topics: &[&str],
        context: Option<ExecutionContext>,
    ) -> StreamSubscriber<MemoryConsumer> {
        let topics = topic_set(topics);
        StreamSubscriber::new(
            self.consumer(topics.clone()),
            topics,
            EmptyPolicy::Fail,
            context,
        )
    }

    /// Open a publisher on this broker directly, outside any registry.
    pub fn publisher(&self, context: Option<ExecutionContext>) -> StreamPublisher<MemoryProducer> {
        StreamPublisher::new(
            MemoryProducer {
                broker: self.clone(),
            },
            context,
        )
    }

    fn consumer(&self, topics: BTreeSet<String>) -> MemoryConsumer {
        let id = self
            .log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register();
        MemoryConsumer {
            log: Arc::clone(&self.log),
            id,
            topics,
            closed: AtomicBool::new(false),
        }
    }

    fn read_log<T>(&self, f: impl FnOnce(&VecDeque<StreamMessage>) -> T) -> T {
        let log = self.log.read().unwrap_or_else(PoisonError::into_inner);
        f(&log.messages)
    }
}

/// Send handle appending to an [`InMemoryBroker`].
pub struct MemoryProducer {
    broker: InMemoryBroker,
}

impl Producer for MemoryProducer {
    fn produce(&self, msg: &StreamMessage) -> Result<()> {
        self.broker.publish(msg.clone())
    }
}

/// Receive handle reading an [`InMemoryBroker`] log from its own position.
pub struct MemoryConsumer {
    log: Arc<RwLock<Log>>,
    /// Key of this consumer's read position in the log
    id: u64,
    topics: BTreeSet<String>,
    closed: AtomicBool,
}

impl MemoryConsumer {
    fn next_matching(&self) -> Result<Option<StreamMessage>> {
        let mut log = self.log.write().map_err(poisoned)?;
        Ok(log.next_for(self.id, &self.topics))
    }

    fn release(&self) {
        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .deregister(self.id);
    }
}

impl Consumer for MemoryConsumer {
    fn poll(&self, timeout: Option<Duration>) -> Result<Polled> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(StreamError::Closed);
            }

            if let Some(msg) = self.next_matching()? {
                return Ok(Polled::Message(msg));
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(Polled::Empty);
            }

            // Small sleep to avoid busy-waiting
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.release();
        Ok(())
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        self.release();
    }
}

/// Stream over a process-wide [`InMemoryBroker`] keyed by target.
pub struct MemoryStream {
    target: String,
    context: Option<ExecutionContext>,
    policy: EmptyPolicy,
    broker: InMemoryBroker,
}

impl MemoryStream {
    /// Build from a registry config. Fails after one empty window unless the
    /// config overrides the policy.
    pub fn from_config(config: StreamConfig) -> Self {
        let broker = InMemoryBroker::named(&config.target);
        Self::with_broker(broker, config)
    }

    /// Build over an explicit broker instead of the shared one for the target.
    pub fn with_broker(broker: InMemoryBroker, config: StreamConfig) -> Self {
        Self {
            policy: config.empty_policy_or(EmptyPolicy::Fail),
            target: config.target,
            context: config.context,
            broker,
        }
    }

    pub fn broker(&self) -> &InMemoryBroker {
        &self.broker
    }
}

impl Stream for MemoryStream {
    fn target(&self) -> &str {
        &self.target
    }

    fn execution_context(&self) -> Option<&ExecutionContext> {
        self.context.as_ref()
    }

    fn publish(&self) -> Result<Box<dyn Publisher>> {
        info!(target_addr = %self.target, "producing to memory broker");
        Ok(Box::new(self.broker.publisher(self.context.clone())))
    }

    fn subscribe(&self, topics: &[&str]) -> Result<Box<dyn Subscriber>> {
        info!(target_addr = %self.target, ?topics, "subscribing to memory broker");
        let topics = topic_set(topics);
        Ok(Box::new(StreamSubscriber::new(
            self.broker.consumer(topics.clone()),
            topics,
            self.policy,
            self.context.clone(),
        )))
    }
}
