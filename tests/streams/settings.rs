//! Deserialising deployment settings and opening streams.

use stream_bus::{EmptyPolicy, StreamRegistry, StreamSettings};

use crate::support::{mock_registry, FakeBackend};

#[test]
fn settings_deserialize_from_json() {
    let settings: StreamSettings = serde_json::from_str(
        r#"{
            "backend": "kafka",
            "target": "broker:9092",
            "empty_policy": "keep_polling",
            "options": { "group.id": "billing" }
        }"#,
    )
    .unwrap();

    assert_eq!(settings.backend, "kafka");
    assert_eq!(settings.empty_policy, Some(EmptyPolicy::KeepPolling));
    assert_eq!(settings.options["group.id"], "billing");
}

#[test]
fn optional_settings_fields_default() {
    let settings: StreamSettings =
        serde_json::from_str(r#"{ "backend": "redis", "target": "127.0.0.1" }"#).unwrap();

    assert_eq!(settings.empty_policy, None);
    assert!(settings.options.is_empty());
}

#[test]
fn settings_open_resolves_backend() {
    let backend = FakeBackend::new();
    let settings = StreamSettings {
        backend: "mock".to_string(),
        target: "addr:1".to_string(),
        empty_policy: None,
        options: Default::default(),
    };

    let stream = settings.open(&mock_registry(&backend), None).unwrap();
    assert_eq!(stream.target(), "addr:1");

    let missing = StreamSettings {
        backend: "nats".to_string(),
        ..settings
    };
    let err = missing.open(&StreamRegistry::new(), None).err().unwrap();
    assert!(err.is_not_found());
}
