//! The stream contract: a backend bound to a target address.

use std::collections::BTreeSet;

use crate::connection::{Publisher, Subscriber};
use crate::error::Result;
use crate::execution::ExecutionContext;

/// A backend configured with a target, able to open publishers and
/// subscribers.
///
/// A stream holds no open backend resources itself; every call to
/// [`publish`](Stream::publish) or [`subscribe`](Stream::subscribe) opens an
/// independent connection.
pub trait Stream: Send + Sync {
    /// Backend address or endpoint.
    fn target(&self) -> &str;

    /// Worker pool handed to every connection this stream opens.
    fn execution_context(&self) -> Option<&ExecutionContext>;

    /// Open a send connection to the target.
    fn publish(&self) -> Result<Box<dyn Publisher>>;

    /// Open a receive connection registered for `topics`.
    fn subscribe(&self, topics: &[&str]) -> Result<Box<dyn Subscriber>>;
}

/// Normalise a topic list into the fixed subscription set.
pub(crate) fn topic_set(topics: &[&str]) -> BTreeSet<String> {
    topics.iter().map(|topic| topic.to_string()).collect()
}
