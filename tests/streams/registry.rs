//! Registry resolution by name and the not-found failure.

use stream_bus::{Stream, StreamConfig, StreamError, StreamRegistry};

use crate::support::{mock_registry, FakeBackend, FakeStream};

fn kafka_and_redis() -> StreamRegistry {
    let backend = FakeBackend::new();
    let kafka = backend.clone();
    let redis = backend;
    StreamRegistry::new()
        .register("kafka", move |config| -> Box<dyn Stream> {
            Box::new(FakeStream::new(kafka.clone(), config))
        })
        .register("redis", move |config| -> Box<dyn Stream> {
            Box::new(FakeStream::new(redis.clone(), config))
        })
}

#[test]
fn unknown_name_reports_name_and_known_names() {
    let registry = kafka_and_redis();

    match registry.resolve("doesnotexist") {
        Err(StreamError::NotFound { name, known }) => {
            assert_eq!(name, "doesnotexist");
            assert_eq!(known, vec!["kafka", "redis"]);
        }
        Err(other) => panic!("expected NotFound, got {other:?}"),
        Ok(_) => panic!("resolved a name that was never registered"),
    }
}

#[test]
fn by_name_fails_before_any_connection_is_opened() {
    let backend = FakeBackend::new();
    let registry = mock_registry(&backend);

    let err = registry.by_name("kafka", "broker:9092", None).err().unwrap();
    assert!(err.is_not_found());
    assert_eq!(backend.polls(), 0);
    assert_eq!(backend.closes(), 0);
}

#[test]
fn by_config_hands_options_to_factory() {
    let registry = StreamRegistry::new().register("echo", |config| -> Box<dyn Stream> {
        let target = format!("{}#{}", config.target, config.option("group.id").unwrap_or("-"));
        Box::new(FakeStream::new(FakeBackend::new(), StreamConfig::new(target)))
    });

    let stream = registry
        .by_config("echo", StreamConfig::new("broker:9092").with_option("group.id", "billing"))
        .unwrap();
    assert_eq!(stream.target(), "broker:9092#billing");
}

#[test]
fn streams_from_one_factory_are_independent() {
    let backend = FakeBackend::new();
    let registry = mock_registry(&backend);

    let first = registry.by_name("mock", "a", None).unwrap();
    let second = registry.by_name("mock", "b", None).unwrap();

    assert_eq!(first.target(), "a");
    assert_eq!(second.target(), "b");
}

#[test]
fn global_registry_resolves_builtin_backends() {
    let stream = stream_bus::by_name("memory", "global-registry-test", None).unwrap();
    assert_eq!(stream.target(), "global-registry-test");

    let err = stream_bus::by_name("doesnotexist", "addr", None).err().unwrap();
    match err {
        StreamError::NotFound { known, .. } => assert!(known.contains(&"memory".to_string())),
        other => panic!("expected NotFound, got {other:?}"),
    }
}
