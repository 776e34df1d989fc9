use super::types::*;
use crate::config::{expand_env_vars, expand_tilde};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML in '{path}': {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(&yaml_string);
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string).map_err(|e| {
        ConfigError::YamlParse {
            path: path.display().to_string(),
            source: e,
        }
    })?;

    config.connector.download_dir = expand_tilde(&config.connector.download_dir);

    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    use regex::Regex;

    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let mut unexpanded_vars: Vec<String> = re
        .captures_iter(yaml_string)
        .map(|cap| cap.get(1).unwrap().as_str().to_string())
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    Err(ConfigError::Validation(format!(
        "Environment variables are not set: {}\n\
         \n\
         To fix this, either:\n\
         1. Set the environment variables (e.g., export LDS_KEY=...)\n\
         2. Replace the variables in the config file with actual values",
        unexpanded_vars.join(", ")
    )))
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    validate_store(&config.store, &mut errors);
    validate_connector(&config.connector, &mut errors);
    validate_sink(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_store(store: &StoreConfig, errors: &mut Vec<String>) {
    if store.base_url.is_empty() {
        errors.push("store.base_url cannot be empty".to_string());
    }
    if store.account.is_empty() {
        errors.push("store.account cannot be empty".to_string());
    }
    if store.key.is_empty() {
        errors.push("store.key cannot be empty".to_string());
    }
    if store.path.is_empty() {
        errors.push("store.path cannot be empty".to_string());
    }
}

fn validate_connector(connector: &ConnectorConfig, errors: &mut Vec<String>) {
    if !connector.timestamp_pattern.contains("{timestamp}") {
        errors.push(format!(
            "connector.timestamp_pattern must contain the {{timestamp}} placeholder: {}",
            connector.timestamp_pattern
        ));
    }
    if connector.timestamp_format.is_empty() {
        errors.push("connector.timestamp_format cannot be empty".to_string());
    }
    if connector.log_poll_interval.is_zero() {
        errors.push("connector.log_poll_interval must be greater than zero".to_string());
    }
    if connector.record_poll_interval.is_zero() {
        errors.push("connector.record_poll_interval must be greater than zero".to_string());
    }
}

fn validate_sink(config: &Config, errors: &mut Vec<String>) {
    match config.sink.sink_type {
        SinkType::Hec => match &config.sink.hec {
            Some(hec) => validate_hec(hec, errors),
            None => errors.push("sink.type is 'hec' but the 'sink.hec' section is missing".to_string()),
        },
        SinkType::Syslog => match &config.sink.syslog {
            Some(syslog) => validate_syslog(syslog, errors),
            None => errors
                .push("sink.type is 'syslog' but the 'sink.syslog' section is missing".to_string()),
        },
    }

    if let Some(records) = &config.records {
        // Record forwarding needs a destination identity on the sink side.
        match config.sink.sink_type {
            SinkType::Hec => {
                let token = config
                    .sink
                    .hec
                    .as_ref()
                    .and_then(|h| h.record_token.as_deref())
                    .unwrap_or("");
                if token.is_empty() {
                    errors.push(
                        "records forwarding requires sink.hec.record_token".to_string(),
                    );
                }
            }
            SinkType::Syslog => {
                let app_name = config
                    .sink
                    .syslog
                    .as_ref()
                    .and_then(|s| s.record_app_name.as_deref())
                    .unwrap_or("");
                if app_name.is_empty() {
                    errors.push(
                        "records forwarding requires sink.syslog.record_app_name".to_string(),
                    );
                }
            }
        }

        if records.base_url.is_empty() {
            errors.push("records.base_url cannot be empty".to_string());
        }
        if records.zone.is_empty() {
            errors.push("records.zone cannot be empty".to_string());
        }
        if records.token.is_empty() {
            errors.push("records.token cannot be empty".to_string());
        }
    }
}

fn validate_hec(hec: &HecConfig, errors: &mut Vec<String>) {
    if hec.host.is_empty() {
        errors.push("sink.hec.host cannot be empty".to_string());
    }
    if hec.token.is_empty() {
        errors.push("sink.hec.token cannot be empty".to_string());
    }
    if hec.batch_size < 1 {
        errors.push("sink.hec.batch_size must be at least 1".to_string());
    }
    if hec.record_batch_size < 1 {
        errors.push("sink.hec.record_batch_size must be at least 1".to_string());
    }
}

fn validate_syslog(syslog: &SyslogConfig, errors: &mut Vec<String>) {
    if syslog.host.is_empty() {
        errors.push("sink.syslog.host cannot be empty".to_string());
    }
    if syslog.app_name.is_empty() {
        errors.push("sink.syslog.app_name cannot be empty".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID_YAML: &str = r#"
store:
  base_url: https://store.example.com
  account: acct
  key: secret
  path: 12345/logs
connector:
  download_dir: /tmp/logship
  timestamp_pattern: "{timestamp} - {}"
  timestamp_format: "%s"
  log_poll_interval: 60s
  record_poll_interval: 1h
sink:
  type: hec
  hec:
    host: splunk.example.com
    port: 8088
    token: hec-token
    batch_size: 10
"#;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_config_loads() {
        let file = write_config(VALID_YAML);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.sink.sink_type, SinkType::Hec);
        assert_eq!(
            config.connector.log_poll_interval,
            std::time::Duration::from_secs(60)
        );
        assert_eq!(
            config.connector.record_poll_interval,
            std::time::Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_invalid_yaml_reports_parse_error_with_path() {
        let file = write_config("sink: [not, a, mapping");
        let err = load_config(file.path()).unwrap_err();
        match err {
            ConfigError::YamlParse { path, .. } => {
                assert_eq!(path, file.path().display().to_string());
            }
            other => panic!("expected YAML parse error, got {other}"),
        }
    }

    #[test]
    fn test_sink_section_must_match_type() {
        let yaml = VALID_YAML.replace("type: hec", "type: syslog");
        let file = write_config(&yaml);
        let err = load_config(file.path()).unwrap_err();
        match err {
            ConfigError::ValidationList(errors) => {
                assert!(errors.iter().any(|e| e.contains("sink.syslog")));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_timestamp_pattern_requires_placeholder() {
        let yaml = VALID_YAML.replace("{timestamp} - {}", "no placeholder here");
        let file = write_config(&yaml);
        let err = load_config(file.path()).unwrap_err();
        match err {
            ConfigError::ValidationList(errors) => {
                assert!(errors.iter().any(|e| e.contains("{timestamp}")));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let yaml = VALID_YAML.replace("batch_size: 10", "batch_size: 0");
        let file = write_config(&yaml);
        let err = load_config(file.path()).unwrap_err();
        match err {
            ConfigError::ValidationList(errors) => {
                assert!(errors.iter().any(|e| e.contains("batch_size")));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_records_require_sink_side_record_settings() {
        let yaml = format!(
            "{VALID_YAML}records:\n  base_url: https://dns.example.com\n  zone: example.com\n  token: tok\n"
        );
        let file = write_config(&yaml);
        let err = load_config(file.path()).unwrap_err();
        match err {
            ConfigError::ValidationList(errors) => {
                assert!(errors.iter().any(|e| e.contains("record_token")));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_unset_env_var_is_reported() {
        let yaml = VALID_YAML.replace("key: secret", "key: $env{LOGSHIP_UNSET_KEY}");
        let file = write_config(&yaml);
        let err = load_config(file.path()).unwrap_err();
        match err {
            ConfigError::Validation(msg) => assert!(msg.contains("LOGSHIP_UNSET_KEY")),
            other => panic!("expected validation error, got {other}"),
        }
    }
}
