//! Kafka stream.
//!
//! Uses librdkafka through `rdkafka`'s blocking `BaseProducer` and
//! `BaseConsumer`. A send only succeeds once the broker has acknowledged
//! the message; a failed delivery report fails the send. Reaching the end of
//! a partition is not a failure: the subscriber polls past it. An empty poll
//! window fails the receive with `StreamError::Empty` unless the config asks
//! to keep polling.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer as _};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::producer::{
    BaseProducer, BaseRecord, DeliveryResult, Producer as _, ProducerContext,
};
use rdkafka::util::Timeout;
use rdkafka::Message;
use tracing::{info, warn};

use crate::config::{EmptyPolicy, StreamConfig};
use crate::connection::{
    Consumer, Polled, Producer, Publisher, StreamPublisher, StreamSubscriber, Subscriber,
};
use crate::error::{Result, StreamError};
use crate::execution::ExecutionContext;
use crate::message::StreamMessage;
use crate::stream::{topic_set, Stream};

/// Consumer group used when the config has no `group.id` option.
pub const DEFAULT_GROUP_ID: &str = "stream-bus";

fn timeout(window: Option<Duration>) -> Timeout {
    match window {
        Some(window) => Timeout::After(window),
        None => Timeout::Never,
    }
}

/// Longest a closing producer waits for queued messages.
pub const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivery outcome of one message, settled by the producer's delivery
/// callback while the send flushes.
#[derive(Default)]
pub struct DeliveryReport {
    failure: Mutex<Option<KafkaError>>,
}

impl DeliveryReport {
    fn settle(&self, outcome: std::result::Result<(), &KafkaError>) {
        if let Err(err) = outcome {
            *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.clone());
        }
    }

    fn outcome(&self, topic: &str) -> Result<()> {
        match self.failure.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(err) => Err(StreamError::backend(format!("failed to deliver to {topic}"), err)),
            None => Ok(()),
        }
    }
}

/// Producer context routing each delivery report to its message's
/// [`DeliveryReport`].
pub struct DeliveryTracker;

impl ClientContext for DeliveryTracker {}

impl ProducerContext for DeliveryTracker {
    type DeliveryOpaque = Arc<DeliveryReport>;

    fn delivery(&self, result: &DeliveryResult<'_>, report: Self::DeliveryOpaque) {
        let outcome = result.as_ref().map(|_| ()).map_err(|(err, _)| err);
        if let Err(err) = outcome {
            warn!(error = %err, "kafka delivery failed");
        }
        report.settle(outcome);
    }
}

/// Send handle producing with `acks=all` and flushing after every message.
pub struct KafkaProducer {
    producer: BaseProducer<DeliveryTracker>,
}

impl Producer for KafkaProducer {
    fn produce(&self, msg: &StreamMessage) -> Result<()> {
        let report = Arc::new(DeliveryReport::default());
        let record: BaseRecord<'_, (), [u8], Arc<DeliveryReport>> =
            BaseRecord::with_opaque_to(msg.topic(), Arc::clone(&report)).payload(msg.payload());
        self.producer.send(record).map_err(|(err, _)| {
            StreamError::backend(format!("failed to produce to {}", msg.topic()), err)
        })?;

        // Bounded by `message.timeout.ms`: every queued message gets a report.
        self.producer
            .flush(Timeout::Never)
            .map_err(|err| StreamError::backend(format!("failed to flush {}", msg.topic()), err))?;
        report.outcome(msg.topic())
    }

    fn close(&self) -> Result<()> {
        self.producer
            .flush(Timeout::After(CLOSE_FLUSH_TIMEOUT))
            .map_err(|err| StreamError::backend("failed to flush kafka producer", err))
    }
}

/// Receive handle polling a subscribed consumer.
pub struct KafkaConsumer {
    consumer: BaseConsumer,
}

/// Map one poll result to a poll outcome.
fn translate<M: Message>(polled: Option<KafkaResult<M>>) -> Result<Polled> {
    match polled {
        None => Ok(Polled::Empty),
        Some(Err(KafkaError::PartitionEOF(_))) => Ok(Polled::EndOfData),
        Some(Err(err)) => Err(StreamError::backend("failed to poll kafka consumer", err)),
        Some(Ok(msg)) => Ok(Polled::Message(StreamMessage::new(
            msg.topic(),
            msg.payload().unwrap_or_default(),
        ))),
    }
}

impl Consumer for KafkaConsumer {
    fn poll(&self, window: Option<Duration>) -> Result<Polled> {
        translate(self.consumer.poll(timeout(window)))
    }

    fn close(&self) -> Result<()> {
        self.consumer.unsubscribe();
        Ok(())
    }
}

/// Kafka stream.
pub struct KafkaStream {
    config: StreamConfig,
    policy: EmptyPolicy,
}

impl KafkaStream {
    /// Build from a registry config. The `group.id` option selects the
    /// consumer group; other options are passed to librdkafka as-is.
    pub fn from_config(config: StreamConfig) -> Self {
        Self {
            policy: config.empty_policy_or(EmptyPolicy::Fail),
            config,
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new();
        client.set("bootstrap.servers", &self.config.target);
        for (key, value) in &self.config.options {
            client.set(key, value);
        }
        client
    }

    fn producer_config(&self) -> ClientConfig {
        let mut client = self.client_config();
        client.set("acks", "all");
        client
    }

    fn consumer_config(&self) -> ClientConfig {
        let mut client = self.client_config();
        client
            .set(
                "group.id",
                self.config.option("group.id").unwrap_or(DEFAULT_GROUP_ID),
            )
            .set("auto.offset.reset", "smallest")
            .set("enable.partition.eof", "true");
        client
    }
}

impl Stream for KafkaStream {
    fn target(&self) -> &str {
        &self.config.target
    }

    fn execution_context(&self) -> Option<&ExecutionContext> {
        self.config.context.as_ref()
    }

    fn publish(&self) -> Result<Box<dyn Publisher>> {
        info!(target_addr = %self.config.target, "producing to kafka");
        let producer = self
            .producer_config()
            .create_with_context(DeliveryTracker)
            .map_err(|err| StreamError::backend("failed to create kafka producer", err))?;
        Ok(Box::new(StreamPublisher::new(
            KafkaProducer { producer },
            self.config.context.clone(),
        )))
    }

    fn subscribe(&self, topics: &[&str]) -> Result<Box<dyn Subscriber>> {
        info!(target_addr = %self.config.target, "consuming from kafka");
        let consumer: BaseConsumer = self
            .consumer_config()
            .create()
            .map_err(|err| StreamError::backend("failed to create kafka consumer", err))?;

        info!(?topics, "subscribing kafka consumer");
        consumer.subscribe(topics).map_err(|err| {
            StreamError::backend(format!("failed to subscribe to {topics:?}"), err)
        })?;

        Ok(Box::new(StreamSubscriber::new(
            KafkaConsumer { consumer },
            topic_set(topics),
            self.policy,
            self.config.context.clone(),
        )))
    }
}
