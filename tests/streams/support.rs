//! Scriptable fake backend for exercising the core without a broker.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stream_bus::{
    Consumer, EmptyPolicy, ExecutionContext, Polled, Producer, Publisher, Result, Stream,
    StreamConfig, StreamError, StreamMessage, StreamPublisher, StreamRegistry, StreamSubscriber,
    Subscriber,
};

/// Connectivity fault raised by the fake backend's client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedFault(pub &'static str);

impl fmt::Display for SimulatedFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "simulated fault: {}", self.0)
    }
}

impl std::error::Error for SimulatedFault {}

/// Shared state behind every connection opened on a [`FakeStream`].
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    queued: Mutex<VecDeque<std::result::Result<Polled, SimulatedFault>>>,
    sent: Mutex<Vec<StreamMessage>>,
    publish_fault: Mutex<Option<SimulatedFault>>,
    polls: AtomicUsize,
    closes: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for the next poll.
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        self.push(Ok(Polled::Message(StreamMessage::new(topic, payload))));
    }

    pub fn push(&self, polled: std::result::Result<Polled, SimulatedFault>) {
        self.inner.queued.lock().unwrap().push_back(polled);
    }

    /// Make every subsequent send fail with `fault`.
    pub fn fail_sends(&self, fault: SimulatedFault) {
        *self.inner.publish_fault.lock().unwrap() = Some(fault);
    }

    pub fn sent(&self) -> Vec<StreamMessage> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub fn polls(&self) -> usize {
        self.inner.polls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }
}

impl Producer for FakeBackend {
    fn produce(&self, msg: &StreamMessage) -> Result<()> {
        if let Some(fault) = self.inner.publish_fault.lock().unwrap().clone() {
            return Err(StreamError::backend(
                format!("failed to produce {:?}", msg.payload()),
                fault,
            ));
        }
        self.inner.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Consumer for FakeBackend {
    fn poll(&self, timeout: Option<Duration>) -> Result<Polled> {
        self.inner.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.inner.queued.lock().unwrap().pop_front();
        match next {
            Some(Ok(polled)) => Ok(polled),
            Some(Err(fault)) => Err(StreamError::backend("failed to poll", fault)),
            None => {
                if let Some(timeout) = timeout {
                    std::thread::sleep(timeout);
                }
                Ok(Polled::Empty)
            }
        }
    }

    fn close(&self) -> Result<()> {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Stream over a [`FakeBackend`].
pub struct FakeStream {
    config: StreamConfig,
    backend: FakeBackend,
}

impl FakeStream {
    pub fn new(backend: FakeBackend, config: StreamConfig) -> Self {
        Self { config, backend }
    }
}

impl Stream for FakeStream {
    fn target(&self) -> &str {
        &self.config.target
    }

    fn execution_context(&self) -> Option<&ExecutionContext> {
        self.config.context.as_ref()
    }

    fn publish(&self) -> Result<Box<dyn Publisher>> {
        Ok(Box::new(StreamPublisher::new(
            self.backend.clone(),
            self.config.context.clone(),
        )))
    }

    fn subscribe(&self, topics: &[&str]) -> Result<Box<dyn Subscriber>> {
        Ok(Box::new(StreamSubscriber::new(
            self.backend.clone(),
            topics.iter().map(|t| t.to_string()).collect(),
            self.config.empty_policy_or(EmptyPolicy::Fail),
            self.config.context.clone(),
        )))
    }
}

/// Registry with `"mock"` bound to streams over `backend`.
pub fn mock_registry(backend: &FakeBackend) -> StreamRegistry {
    let backend = backend.clone();
    StreamRegistry::new().register("mock", move |config| -> Box<dyn Stream> {
        Box::new(FakeStream::new(backend.clone(), config))
    })
}

/// A two-worker runtime for tests that drive dispatch from sync code.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .build()
        .unwrap()
}
