//! Redis pub/sub stream.
//!
//! Uses the blocking `redis` client: `PUBLISH` to send, `SUBSCRIBE` plus a
//! socket read timeout to poll. Redis has no end-of-data marker, so by
//! default a subscriber keeps polling until a message arrives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use redis::{Client, Connection, Msg, RedisError};
use tracing::{debug, info};

use crate::config::{EmptyPolicy, StreamConfig};
use crate::connection::{
    Consumer, Polled, Producer, Publisher, StreamPublisher, StreamSubscriber, Subscriber,
};
use crate::error::{Result, StreamError};
use crate::execution::ExecutionContext;
use crate::message::StreamMessage;
use crate::stream::{topic_set, Stream};

/// Build a connection URL from a bare host (`127.0.0.1`) or a full URL.
pub fn redis_url(target: &str) -> String {
    if target.contains("://") {
        target.to_string()
    } else {
        format!("redis://{}", target)
    }
}

fn connect(target: &str) -> Result<Connection> {
    let url = redis_url(target);
    let client = Client::open(url.as_str())
        .map_err(|err| StreamError::backend(format!("invalid redis target {url}"), err))?;
    client
        .get_connection()
        .map_err(|err| StreamError::backend(format!("failed to connect to redis at {url}"), err))
}

fn lock(connection: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>> {
    connection
        .lock()
        .map_err(|_| StreamError::backend("redis connection lock poisoned", "poisoned lock"))
}

/// Send handle issuing `PUBLISH` on a dedicated connection.
pub struct RedisProducer {
    connection: Mutex<Connection>,
}

impl Producer for RedisProducer {
    fn produce(&self, msg: &StreamMessage) -> Result<()> {
        let mut connection = lock(&self.connection)?;
        redis::cmd("PUBLISH")
            .arg(msg.topic())
            .arg(msg.payload().to_vec())
            .query::<i64>(&mut *connection)
            .map(|receivers| debug!(topic = msg.topic(), receivers, "published to redis"))
            .map_err(|err| {
                StreamError::backend(format!("failed to produce to {}", msg.topic()), err)
            })
    }
}

/// Longest single blocking read. `close` waits at most this long for an
/// in-flight poll to release the connection.
const READ_SLICE: Duration = Duration::from_millis(100);

/// Receive handle reading pushed messages from a subscribed connection.
pub struct RedisConsumer {
    connection: Mutex<Connection>,
    closed: AtomicBool,
}

impl RedisConsumer {
    fn open(mut connection: Connection, topics: &[String]) -> Result<Self> {
        let subscribe = redis::cmd("SUBSCRIBE").arg(topics.to_vec()).get_packed_command();
        connection.send_packed_command(&subscribe).map_err(|err| {
            StreamError::backend(format!("failed to subscribe to {topics:?}"), err)
        })?;
        Ok(Self {
            connection: Mutex::new(connection),
            closed: AtomicBool::new(false),
        })
    }

    fn read(&self, slice: Duration) -> Result<Polled> {
        let mut connection = lock(&self.connection)?;
        connection
            .set_read_timeout(Some(slice))
            .map_err(|err| StreamError::backend("failed to set redis read timeout", err))?;
        translate(connection.recv_response())
    }
}

/// Map one pushed reply to a poll outcome. Subscription confirmations are
/// not messages; they count as end-of-data so the poll continues.
fn translate(reply: std::result::Result<redis::Value, RedisError>) -> Result<Polled> {
    match reply {
        Ok(value) => Ok(match Msg::from_value(&value) {
            Some(msg) => Polled::Message(StreamMessage::new(
                msg.get_channel_name(),
                msg.get_payload_bytes(),
            )),
            None => Polled::EndOfData,
        }),
        Err(err) if err.is_timeout() => Ok(Polled::Empty),
        Err(err) => Err(StreamError::backend("failed to poll redis subscription", err)),
    }
}

/// Run `read` in slices of at most [`READ_SLICE`] until it yields something
/// other than an empty slice, the window elapses, or `closed` is set.
fn read_in_slices(
    closed: &AtomicBool,
    timeout: Option<Duration>,
    mut read: impl FnMut(Duration) -> Result<Polled>,
) -> Result<Polled> {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);

    loop {
        if closed.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }

        // The socket rejects a zero read timeout.
        let slice = deadline
            .map_or(READ_SLICE, |deadline| {
                deadline.saturating_duration_since(Instant::now()).min(READ_SLICE)
            })
            .max(Duration::from_millis(1));

        let polled = read(slice)?;
        let expired = deadline.is_some_and(|deadline| Instant::now() >= deadline);
        if polled != Polled::Empty || expired {
            return Ok(polled);
        }
    }
}

impl Consumer for RedisConsumer {
    fn poll(&self, timeout: Option<Duration>) -> Result<Polled> {
        read_in_slices(&self.closed, timeout, |slice| self.read(slice))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        let mut connection = lock(&self.connection)?;
        let unsubscribe = redis::cmd("UNSUBSCRIBE").get_packed_command();
        connection
            .send_packed_command(&unsubscribe)
            .map_err(|err| StreamError::backend("failed to unsubscribe from redis", err))
    }
}

/// Redis stream.
pub struct RedisStream {
    target: String,
    context: Option<ExecutionContext>,
    policy: EmptyPolicy,
}

impl RedisStream {
    /// Build from a registry config. Keeps polling on empty windows unless
    /// the config overrides the policy.
    pub fn from_config(config: StreamConfig) -> Self {
        Self {
            policy: config.empty_policy_or(EmptyPolicy::KeepPolling),
            target: config.target,
            context: config.context,
        }
    }
}

impl Stream for RedisStream {
    fn target(&self) -> &str {
        &self.target
    }

    fn execution_context(&self) -> Option<&ExecutionContext> {
        self.context.as_ref()
    }

    fn publish(&self) -> Result<Box<dyn Publisher>> {
        info!(target_addr = %self.target, "producing to redis");
        let producer = RedisProducer {
            connection: Mutex::new(connect(&self.target)?),
        };
        Ok(Box::new(StreamPublisher::new(producer, self.context.clone())))
    }

    fn subscribe(&self, topics: &[&str]) -> Result<Box<dyn Subscriber>> {
        info!(target_addr = %self.target, "consuming from redis");
        let topics = topic_set(topics);
        info!(?topics, "subscribing redis consumer");

        let channels: Vec<String> = topics.iter().cloned().collect();
        let consumer = RedisConsumer::open(connect(&self.target)?, &channels)?;
        Ok(Box::new(StreamSubscriber::new(
            consumer,
            topics,
            self.policy,
            self.context.clone(),
        )))
    }
}
