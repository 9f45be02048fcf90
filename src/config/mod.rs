mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File, FileFormat, FileSourceFile};

pub use settings::{
    BrokerSettings, ConsumerSettings, LogSettings, PartialSettings, PipelineSettings,
    ServerSettings, Settings,
};

const DEFAULT_CONFIG_FILE: &str = "config/default";
const ENV_PREFIX: &str = "LOGPIPE";

/// Loads the configuration from `config/default.*` (if present) and
/// `LOGPIPE_*` environment variables, merged over the built-in defaults.
///
/// Nested keys use a double underscore: `LOGPIPE_SERVER__PORT=9000`.
pub fn load_config() -> Result<Settings, ConfigError> {
    load(File::with_name(DEFAULT_CONFIG_FILE))
}

/// Same as [`load_config`] but reading the given file instead.
pub fn load_config_file(path: &Path) -> Result<Settings, ConfigError> {
    load(File::from(path))
}

fn load(file: File<FileSourceFile, FileFormat>) -> Result<Settings, ConfigError> {
    let config = Config::builder()
        .add_source(file.required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    let settings = Settings::default().merge(partial);
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.broker.partitions == 0 {
        return Err(ConfigError::Message(
            "broker.partitions must be at least 1".to_string(),
        ));
    }
    if settings.broker.retention_secs.is_some_and(|secs| secs <= 0) {
        return Err(ConfigError::Message(
            "broker.retention_secs must be positive".to_string(),
        ));
    }
    if settings.broker.max_records_per_partition == Some(0) {
        return Err(ConfigError::Message(
            "broker.max_records_per_partition must be at least 1".to_string(),
        ));
    }
    if settings.pipeline.topic.trim().is_empty() {
        return Err(ConfigError::Message("pipeline.topic must not be empty".to_string()));
    }
    for consumer in &settings.consumers {
        if consumer.group_id.trim().is_empty() {
            return Err(ConfigError::Message(format!(
                "consumer {} has an empty group_id",
                consumer.label
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
