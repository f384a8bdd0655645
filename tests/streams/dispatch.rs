//! Execution adapter: the same backend behind blocking and
//! worker-dispatched connections.

use std::error::Error;
use std::thread;
use std::time::{Duration, Instant};

use stream_bus::{
    Connection, EmptyPolicy, ExecutionContext, Publisher, StreamConfig, StreamError,
    StreamMessage, StreamRegistry, Subscriber,
};

use crate::support::{mock_registry, runtime, FakeBackend, SimulatedFault};

#[test]
fn without_context_send_completes_before_returning() {
    let backend = FakeBackend::new();
    let stream = mock_registry(&backend).by_name("mock", "addr", None).unwrap();
    let publisher = stream.publish().unwrap();

    assert!(publisher.execution_context().is_none());
    let dispatched = publisher.send(StreamMessage::new("t1", "hi"));

    assert!(!dispatched.is_pending());
    assert_eq!(backend.sent(), vec![StreamMessage::new("t1", "hi")]);
    dispatched.wait().unwrap();
}

#[test]
fn without_context_receive_blocks_for_the_window() {
    let backend = FakeBackend::new();
    let stream = mock_registry(&backend).by_name("mock", "addr", None).unwrap();
    let subscriber = stream.subscribe(&["t1"]).unwrap();

    let started = Instant::now();
    let dispatched = subscriber.receive(Some(Duration::from_millis(30)));

    assert!(started.elapsed() >= Duration::from_millis(30));
    assert!(!dispatched.is_pending());
    assert!(dispatched.wait().unwrap_err().is_empty());
}

#[test]
fn with_context_receive_returns_before_the_window() {
    let rt = runtime();
    let context = ExecutionContext::from(rt.handle().clone());
    let backend = FakeBackend::new();
    let stream = mock_registry(&backend)
        .by_name("mock", "addr", Some(context))
        .unwrap();
    let subscriber = stream.subscribe(&["t1"]).unwrap();

    let started = Instant::now();
    let dispatched = subscriber.receive(Some(Duration::from_millis(200)));

    assert!(dispatched.is_pending());
    assert!(started.elapsed() < Duration::from_millis(200));
    assert!(dispatched.wait().unwrap_err().is_empty());
}

#[test]
fn with_context_operations_run_off_the_caller_thread() {
    let rt = runtime();
    let context = ExecutionContext::from(rt.handle().clone());
    let caller = thread::current().id();

    let value = stream_bus::dispatch(Some(&context), move || Ok(thread::current().id()))
        .wait()
        .unwrap();
    assert_ne!(value, caller);
}

#[tokio::test(flavor = "multi_thread")]
async fn dispatched_results_match_blocking_results() {
    let blocking_backend = FakeBackend::new();
    let async_backend = FakeBackend::new();
    for backend in [&blocking_backend, &async_backend] {
        backend.inject("t1", b"first");
        backend.push(Err(SimulatedFault("broker gone")));
    }

    let blocking = mock_registry(&blocking_backend)
        .by_name("mock", "addr", None)
        .unwrap()
        .subscribe(&["t1"])
        .unwrap();
    let dispatched = mock_registry(&async_backend)
        .by_name("mock", "addr", ExecutionContext::current())
        .unwrap()
        .subscribe(&["t1"])
        .unwrap();

    let window = Some(Duration::from_millis(10));

    let sync_msg = blocking.receive(window).wait().unwrap();
    let async_msg = dispatched.receive(window).await.unwrap();
    assert_eq!(sync_msg, async_msg);

    let sync_err = blocking.receive(window).wait().unwrap_err();
    let async_err = dispatched.receive(window).await.unwrap_err();
    assert_eq!(sync_err.to_string(), async_err.to_string());
    for err in [&sync_err, &async_err] {
        let fault = err.source().unwrap().downcast_ref::<SimulatedFault>().unwrap();
        assert_eq!(fault, &SimulatedFault("broker gone"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn dispatched_send_failure_rejects_the_future() {
    let backend = FakeBackend::new();
    backend.fail_sends(SimulatedFault("connection refused"));

    let stream = mock_registry(&backend)
        .by_name("mock", "addr", ExecutionContext::current())
        .unwrap();
    let publisher = stream.publish().unwrap();

    let err = publisher.send(StreamMessage::new("t1", "hi")).await.unwrap_err();
    assert!(matches!(err, StreamError::Backend { .. }));
    assert!(backend.sent().is_empty());
}

#[test]
fn keep_polling_outlasts_the_nominal_window() {
    let backend = FakeBackend::new();
    let registry = mock_registry(&backend);
    let stream = registry
        .by_config(
            "mock",
            StreamConfig::new("addr").with_empty_policy(EmptyPolicy::KeepPolling),
        )
        .unwrap();
    let subscriber = stream.subscribe(&["t1"]).unwrap();

    let injector = {
        let backend = backend.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            backend.inject("t1", b"eventually");
        })
    };

    let msg = subscriber.receive(Some(Duration::from_millis(5))).wait().unwrap();
    injector.join().unwrap();

    assert_eq!(msg.payload(), b"eventually");
    assert!(backend.polls() > 1);
}

#[test]
fn memory_backend_dispatches_through_a_runtime() {
    let rt = runtime();
    let context = ExecutionContext::from(rt.handle().clone());
    let stream = StreamRegistry::builtin()
        .by_name("memory", "dispatch-memory", Some(context))
        .unwrap();

    let subscriber = stream.subscribe(&["jobs"]).unwrap();
    let publisher = stream.publish().unwrap();

    let receiving = subscriber.receive(Some(Duration::from_millis(500)));
    publisher.send(StreamMessage::new("jobs", "run")).wait().unwrap();

    assert_eq!(receiving.wait().unwrap().payload(), b"run");
}
