use std::fs;
use std::path::PathBuf;

use serial_test::serial;
use tempfile::TempDir;

use super::settings::Settings;
use super::{PartialSettings, load_config_file};
use crate::broker::OffsetReset;
use crate::message::DateFormat;

const ENV_KEYS: [&str; 4] = [
    "LOGPIPE_SERVER__PORT",
    "LOGPIPE_BROKER__OFFSET_RESET",
    "LOGPIPE_PIPELINE__TOPIC",
    "LOGPIPE_LOG__LEVEL",
];

fn unset_env<F: FnOnce()>(f: F) {
    temp_env::with_vars_unset(ENV_KEYS, f);
}

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("logpipe.toml");
    fs::write(&path, contents).expect("write config file");
    path
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.broker.partitions, 3);
    assert_eq!(settings.broker.offset_reset, OffsetReset::Earliest);
    assert_eq!(settings.pipeline.topic, "mensagens");
    assert_eq!(settings.pipeline.date_format, DateFormat::Iso);
    assert_eq!(settings.consumers.len(), 2);
    assert_eq!(settings.consumers[0].group_id, "consumer-group-1");
    assert_eq!(settings.consumers[0].delay_ms, 100);
    assert_eq!(settings.consumers[1].group_id, "consumer-group-2");
    assert_eq!(settings.consumers[1].delay_ms, 150);
    assert_eq!(settings.log.level, "info");
}

#[test]
fn test_empty_partial_keeps_defaults() {
    let merged = Settings::default().merge(PartialSettings::default());
    assert_eq!(merged, Settings::default());
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    unset_env(|| {
        let dir = TempDir::new().unwrap();
        let settings = load_config_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    });
}

#[test]
#[serial]
fn test_file_overrides_defaults() {
    unset_env(|| {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
                [server]
                host = "0.0.0.0"
                port = 9000

                [broker]
                data_dir = "/var/lib/logpipe"
                partitions = 6
                offset_reset = "latest"
                retention_secs = 3600

                [pipeline]
                date_format = "array"

                [[consumers]]
                label = "audit"
                group_id = "audit-group"
                delay_ms = 5

                [[consumers]]
                label = "fast"
                group_id = "fast-group"
            "#,
        );

        let settings = load_config_file(&path).unwrap();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.broker.data_dir, Some(PathBuf::from("/var/lib/logpipe")));
        assert_eq!(settings.broker.partitions, 6);
        assert_eq!(settings.broker.offset_reset, OffsetReset::Latest);
        assert_eq!(settings.broker.retention().ttl_seconds, Some(3600));
        assert_eq!(settings.broker.retention().max_records_per_partition, None);
        assert_eq!(settings.pipeline.topic, "mensagens");
        assert_eq!(settings.pipeline.date_format, DateFormat::Array);
        assert_eq!(settings.consumers.len(), 2);
        assert_eq!(settings.consumers[0].label, "audit");
        assert_eq!(settings.consumers[0].delay().as_millis(), 5);
        assert_eq!(settings.consumers[1].delay_ms, 0);
        assert_eq!(settings.log.level, "info");
    });
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[server]\nport = 9000\n");

    temp_env::with_vars(
        [
            ("LOGPIPE_SERVER__PORT", Some("9100")),
            ("LOGPIPE_BROKER__OFFSET_RESET", Some("latest")),
            ("LOGPIPE_PIPELINE__TOPIC", Some("orders")),
            ("LOGPIPE_LOG__LEVEL", Some("debug")),
        ],
        || {
            let settings = load_config_file(&path).unwrap();
            assert_eq!(settings.server.port, 9100);
            assert_eq!(settings.broker.offset_reset, OffsetReset::Latest);
            assert_eq!(settings.pipeline.topic, "orders");
            assert_eq!(settings.log.level, "debug");
            assert_eq!(settings.server.host, "127.0.0.1");
        },
    );
}

#[test]
#[serial]
fn test_zero_partitions_is_rejected() {
    unset_env(|| {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[broker]\npartitions = 0\n");
        let err = load_config_file(&path).unwrap_err();
        assert!(err.to_string().contains("partitions"));
    });
}

#[test]
#[serial]
fn test_invalid_offset_reset_is_an_error() {
    unset_env(|| {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[broker]\noffset_reset = \"sometimes\"\n");
        assert!(load_config_file(&path).is_err());
    });
}

#[test]
#[serial]
fn test_retention_must_keep_records() {
    unset_env(|| {
        let dir = TempDir::new().unwrap();

        let path = write_config(&dir, "[broker]\nretention_secs = -5\n");
        let err = load_config_file(&path).unwrap_err();
        assert!(err.to_string().contains("retention_secs"));

        let path = write_config(&dir, "[broker]\nretention_secs = 0\n");
        assert!(load_config_file(&path).is_err());

        let path = write_config(&dir, "[broker]\nmax_records_per_partition = 0\n");
        let err = load_config_file(&path).unwrap_err();
        assert!(err.to_string().contains("max_records_per_partition"));

        let path = write_config(
            &dir,
            "[broker]\nretention_secs = 60\nmax_records_per_partition = 10\n",
        );
        let retention = load_config_file(&path).unwrap().broker.retention();
        assert_eq!(retention.ttl_seconds, Some(60));
        assert_eq!(retention.max_records_per_partition, Some(10));
    });
}
