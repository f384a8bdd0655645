//! Listen on one or more topics and print every message received.
//!
//! ```text
//! STREAM_BACKEND=redis STREAM_TARGET=127.0.0.1 cargo run --example listen -- test
//! ```

use std::process::ExitCode;
use std::time::Duration;

use stream_bus::{global, scoped, StreamError, StreamSettings};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn listen(settings: &StreamSettings, topics: &[&str]) -> Result<(), StreamError> {
    let stream = settings.open(global(), None)?;
    info!(backend = %settings.backend, target_addr = %settings.target, ?topics, "listening");

    scoped(stream.subscribe(topics)?, |subscriber| loop {
        match subscriber.receive(Some(Duration::from_secs(2))).wait() {
            Ok(msg) => println!(
                "{} {}",
                msg.topic(),
                msg.payload_str().unwrap_or("<binary payload>")
            ),
            Err(err) if err.is_empty() => continue,
            Err(err) => return Err(err),
        }
    })
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let topics: Vec<String> = std::env::args().skip(1).collect();
    let topics: Vec<&str> = if topics.is_empty() {
        vec!["test"]
    } else {
        topics.iter().map(String::as_str).collect()
    };

    match listen(&StreamSettings::from_env(), &topics) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "listener stopped");
            ExitCode::FAILURE
        }
    }
}
