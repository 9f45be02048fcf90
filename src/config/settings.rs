use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::broker::OffsetReset;
use crate::message::DateFormat;
use crate::persistence::Retention;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub pipeline: PipelineSettings,
    pub consumers: Vec<ConsumerSettings>,
    pub log: LogSettings,
}

/// Where the request surface listens.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Embedded broker storage and consumer-group behaviour.
///
/// Without a `data_dir` the broker keeps its log in a temporary database
/// that disappears on shutdown.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub data_dir: Option<PathBuf>,
    pub partitions: u32,
    pub offset_reset: OffsetReset,
    pub retention_secs: Option<i64>,
    pub max_records_per_partition: Option<usize>,
}

impl BrokerSettings {
    pub fn retention(&self) -> Retention {
        Retention {
            ttl_seconds: self.retention_secs,
            max_records_per_partition: self.max_records_per_partition,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PipelineSettings {
    pub topic: String,
    pub date_format: DateFormat,
}

/// One listener started by `serve`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ConsumerSettings {
    pub label: String,
    pub group_id: String,
    #[serde(default)]
    pub delay_ms: u64,
}

impl ConsumerSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from [`Settings::default`].
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub pipeline: Option<PartialPipelineSettings>,
    pub consumers: Option<Vec<ConsumerSettings>>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialBrokerSettings {
    pub data_dir: Option<PathBuf>,
    pub partitions: Option<u32>,
    pub offset_reset: Option<OffsetReset>,
    pub retention_secs: Option<i64>,
    pub max_records_per_partition: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialPipelineSettings {
    pub topic: Option<String>,
    pub date_format: Option<DateFormat>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Settings {
    /// Overlay whatever the partial settings provide on top of `self`.
    pub fn merge(self, partial: PartialSettings) -> Self {
        let server = partial.server.unwrap_or_default();
        let broker = partial.broker.unwrap_or_default();
        let pipeline = partial.pipeline.unwrap_or_default();
        let log = partial.log.unwrap_or_default();

        Self {
            server: ServerSettings {
                host: server.host.unwrap_or(self.server.host),
                port: server.port.unwrap_or(self.server.port),
            },
            broker: BrokerSettings {
                data_dir: broker.data_dir.or(self.broker.data_dir),
                partitions: broker.partitions.unwrap_or(self.broker.partitions),
                offset_reset: broker.offset_reset.unwrap_or(self.broker.offset_reset),
                retention_secs: broker.retention_secs.or(self.broker.retention_secs),
                max_records_per_partition: broker
                    .max_records_per_partition
                    .or(self.broker.max_records_per_partition),
            },
            pipeline: PipelineSettings {
                topic: pipeline.topic.unwrap_or(self.pipeline.topic),
                date_format: pipeline.date_format.unwrap_or(self.pipeline.date_format),
            },
            consumers: partial.consumers.unwrap_or(self.consumers),
            log: LogSettings {
                level: log.level.unwrap_or(self.log.level),
            },
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            broker: BrokerSettings {
                data_dir: Some(PathBuf::from("data")),
                partitions: 3,
                offset_reset: OffsetReset::Earliest,
                retention_secs: None,
                max_records_per_partition: None,
            },
            pipeline: PipelineSettings {
                topic: "mensagens".to_string(),
                date_format: DateFormat::Iso,
            },
            consumers: vec![
                ConsumerSettings {
                    label: "consumer-1".to_string(),
                    group_id: "consumer-group-1".to_string(),
                    delay_ms: 100,
                },
                ConsumerSettings {
                    label: "consumer-2".to_string(),
                    group_id: "consumer-group-2".to_string(),
                    delay_ms: 150,
                },
            ],
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}
