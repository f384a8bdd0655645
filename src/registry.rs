//! Named stream factories and lookup.
//!
//! `StreamRegistry` maps a backend name (`"kafka"`, `"redis"`, ...) to a
//! factory that builds a [`Stream`] from a [`StreamConfig`]. The core never
//! names a concrete backend type: new backends are added by registering a
//! factory.
//!
//! ## Example
//!
//! ```
//! use stream_bus::{StreamMessage, StreamRegistry};
//!
//! let registry = StreamRegistry::builtin();
//! let stream = registry.by_name("memory", "registry-doc", None).unwrap();
//!
//! let subscriber = stream.subscribe(&["t1"]).unwrap();
//! stream.publish().unwrap().send(StreamMessage::new("t1", "hi")).wait().unwrap();
//!
//! let msg = subscriber.receive(Some(std::time::Duration::from_millis(100))).wait().unwrap();
//! assert_eq!(msg.payload(), b"hi");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::warn;

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::execution::ExecutionContext;
use crate::stream::Stream;

/// Constructor for a backend's stream.
pub type StreamFactory = Arc<dyn Fn(StreamConfig) -> Box<dyn Stream> + Send + Sync>;

/// Lookup table from backend name to stream factory.
///
/// Built once, then only read. Registering a name twice keeps the last
/// factory.
#[derive(Clone, Default)]
pub struct StreamRegistry {
    factories: HashMap<String, StreamFactory>,
}

impl StreamRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every backend compiled into this crate.
    pub fn builtin() -> Self {
        let registry = Self::new();

        #[cfg(feature = "memory")]
        let registry = registry.register("memory", |config| -> Box<dyn Stream> {
            Box::new(crate::backends::memory::MemoryStream::from_config(config))
        });

        #[cfg(feature = "redis")]
        let registry = registry.register("redis", |config| -> Box<dyn Stream> {
            Box::new(crate::backends::redis::RedisStream::from_config(config))
        });

        #[cfg(feature = "kafka")]
        let registry = registry.register("kafka", |config| -> Box<dyn Stream> {
            Box::new(crate::backends::kafka::KafkaStream::from_config(config))
        });

        registry
    }

    /// Register a factory under `name`.
    ///
    /// Returns `self` for chaining.
    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(StreamConfig) -> Box<dyn Stream> + Send + Sync + 'static,
    {
        self.insert(name, Arc::new(factory));
        self
    }

    /// Register a factory under `name`, replacing any previous one.
    pub fn insert(&mut self, name: &str, factory: StreamFactory) {
        if self.factories.insert(name.to_string(), factory).is_some() {
            warn!(name, "stream factory registered twice; keeping the last one");
        }
    }

    /// Look up the factory registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<StreamFactory> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| StreamError::NotFound {
                name: name.to_string(),
                known: self.names(),
            })
    }

    /// Resolve `name` and build its stream for `target`.
    pub fn by_name(
        &self,
        name: &str,
        target: &str,
        context: Option<ExecutionContext>,
    ) -> Result<Box<dyn Stream>> {
        self.by_config(name, StreamConfig::new(target).with_context(context))
    }

    /// Resolve `name` and build its stream from a full config.
    pub fn by_config(&self, name: &str, config: StreamConfig) -> Result<Box<dyn Stream>> {
        let factory = self.resolve(name)?;
        Ok(factory(config))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("names", &self.names())
            .finish()
    }
}

static GLOBAL: OnceLock<StreamRegistry> = OnceLock::new();

/// Install the process-wide registry.
///
/// Only the first call before any lookup succeeds; afterwards the table is
/// fixed and the rejected registry is handed back.
pub fn install(registry: StreamRegistry) -> std::result::Result<(), StreamRegistry> {
    GLOBAL.set(registry)
}

/// The process-wide registry, populated from [`StreamRegistry::builtin`] on
/// first use unless one was installed.
pub fn global() -> &'static StreamRegistry {
    GLOBAL.get_or_init(StreamRegistry::builtin)
}

/// Resolve `name` in the process-wide registry and build its stream.
pub fn by_name(
    name: &str,
    target: &str,
    context: Option<ExecutionContext>,
) -> Result<Box<dyn Stream>> {
    global().by_name(name, target, context)
}
