//! Stream configuration: what a backend factory receives, and the
//! environment-driven settings used to pick one.

use std::collections::BTreeMap;
use std::env;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::registry::StreamRegistry;
use crate::stream::Stream;

/// What a subscriber does when a poll window elapses with no message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyPolicy {
    /// Fail the receive with `StreamError::Empty`.
    Fail,
    /// Keep polling until a message or a real fault arrives.
    KeepPolling,
}

impl EmptyPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail" => Some(EmptyPolicy::Fail),
            "keep_polling" | "keep-polling" | "loop" => Some(EmptyPolicy::KeepPolling),
            _ => None,
        }
    }
}

/// Construction parameters handed to a registered stream factory.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Backend address or endpoint.
    pub target: String,
    /// Worker pool for non-blocking send/receive. `None` means blocking calls.
    pub context: Option<ExecutionContext>,
    /// Overrides the backend's default empty-poll policy.
    pub empty_policy: Option<EmptyPolicy>,
    /// Backend client options (e.g. Kafka `group.id`).
    pub options: BTreeMap<String, String>,
}

impl StreamConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            context: None,
            empty_policy: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, context: Option<ExecutionContext>) -> Self {
        self.context = context;
        self
    }

    pub fn with_empty_policy(mut self, policy: EmptyPolicy) -> Self {
        self.empty_policy = Some(policy);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// The configured policy, or `default` when none was set.
    pub fn empty_policy_or(&self, default: EmptyPolicy) -> EmptyPolicy {
        self.empty_policy.unwrap_or(default)
    }
}

/// Deployment settings naming a backend and how to reach it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    pub backend: String,
    pub target: String,
    #[serde(default)]
    pub empty_policy: Option<EmptyPolicy>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

const OPTION_PREFIX: &str = "STREAM_OPTION_";

impl StreamSettings {
    /// Read settings from the environment.
    ///
    /// - `STREAM_BACKEND` (default `memory`)
    /// - `STREAM_TARGET` (default `127.0.0.1`)
    /// - `STREAM_EMPTY_POLICY` (`fail` or `keep_polling`; anything else is
    ///   logged and ignored)
    /// - `STREAM_OPTION_<KEY>` for backend options, e.g.
    ///   `STREAM_OPTION_GROUP_ID` becomes `group.id`
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut settings = Self {
            backend: "memory".to_string(),
            target: "127.0.0.1".to_string(),
            empty_policy: None,
            options: BTreeMap::new(),
        };

        for (key, value) in vars {
            match key.as_str() {
                "STREAM_BACKEND" => settings.backend = value,
                "STREAM_TARGET" => settings.target = value,
                "STREAM_EMPTY_POLICY" => {
                    settings.empty_policy = EmptyPolicy::parse(&value);
                    if settings.empty_policy.is_none() {
                        warn!(
                            value = %value,
                            "unrecognised STREAM_EMPTY_POLICY, using the backend default"
                        );
                    }
                }
                _ => {
                    if let Some(option) = key.strip_prefix(OPTION_PREFIX) {
                        let option = option.to_ascii_lowercase().replace('_', ".");
                        settings.options.insert(option, value);
                    }
                }
            }
        }

        settings
    }

    pub fn to_config(&self, context: Option<ExecutionContext>) -> StreamConfig {
        StreamConfig {
            target: self.target.clone(),
            context,
            empty_policy: self.empty_policy,
            options: self.options.clone(),
        }
    }

    /// Resolve the configured backend and build its stream.
    pub fn open(
        &self,
        registry: &StreamRegistry,
        context: Option<ExecutionContext>,
    ) -> Result<Box<dyn Stream>> {
        registry.by_config(&self.backend, self.to_config(context))
    }
}
