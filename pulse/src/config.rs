use serde::Deserialize;
use shared::storage::StorageConfig;
use std::fs::File;

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    fn new(host: &str, port: u16) -> Self {
        Listener {
            host: host.into(),
            port,
        }
    }
}

fn default_listener() -> Listener {
    Listener::new("127.0.0.1", 8080)
}

fn default_admin_listener() -> Listener {
    Listener::new("127.0.0.1", 8081)
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct AuthConfig {
    /// HMAC secret used to sign and verify bearer tokens
    pub token_secret: String,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    pub sentry_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            sentry_dsn: None,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(default = "default_listener")]
    pub listener: Listener,
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.listener.port == 0 || self.admin_listener.port == 0 {
            return Err(ConfigError::Invalid("listener port must not be 0".into()));
        }
        if self.listener == self.admin_listener {
            return Err(ConfigError::Invalid(
                "listener and admin_listener must differ".into(),
            ));
        }
        if self.auth.token_secret.is_empty() {
            return Err(ConfigError::Invalid("auth.token_secret is empty".into()));
        }
        if self.storage.url.is_empty() {
            return Err(ConfigError::Invalid("storage.url is empty".into()));
        }
        if self.storage.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "storage.max_connections must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn minimal_config() {
        let yaml = r#"
            storage:
                url: sqlite://pulse.db
            auth:
                token_secret: s3cret
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.listener, Listener::new("127.0.0.1", 8080));
        assert_eq!(config.admin_listener, Listener::new("127.0.0.1", 8081));
        assert_eq!(config.storage, StorageConfig::new("sqlite://pulse.db"));
        assert_eq!(config.auth.token_secret, "s3cret");
        assert_eq!(config.metrics, None);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn full_config() {
        let yaml = r#"
            listener:
                host: 0.0.0.0
                port: 9000
            admin_listener:
                host: 0.0.0.0
                port: 9001
            storage:
                url: sqlite:///var/lib/pulse/pulse.db
                max_connections: 10
                min_connections: 2
                max_lifetime_secs: 60
            auth:
                token_secret: s3cret
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            logging:
                level: debug
                sentry_dsn: https://key@sentry.example.com/1
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.listener, Listener::new("0.0.0.0", 9000));
        assert_eq!(config.storage.max_connections, 10);
        assert_eq!(config.storage.min_connections, 2);
        assert_eq!(config.storage.max_lifetime_secs, 60);
        assert_eq!(
            config.metrics,
            Some(MetricsConfig {
                statsd_host: "127.0.0.1".into(),
                statsd_port: 8125,
            })
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.logging.sentry_dsn.as_deref(),
            Some("https://key@sentry.example.com/1")
        );
    }

    #[test]
    fn invalid_configs() {
        let cases = [
            r#"
            storage:
                url: sqlite://pulse.db
            auth:
                token_secret: ""
            "#,
            r#"
            storage:
                url: sqlite://pulse.db
                max_connections: 0
            auth:
                token_secret: s3cret
            "#,
            r#"
            listener:
                host: 127.0.0.1
                port: 0
            storage:
                url: sqlite://pulse.db
            auth:
                token_secret: s3cret
            "#,
            r#"
            admin_listener:
                host: 127.0.0.1
                port: 8080
            storage:
                url: sqlite://pulse.db
            auth:
                token_secret: s3cret
            "#,
        ];

        for yaml in cases {
            let tmp = write_tmp_file(yaml);
            assert!(
                matches!(Config::from_file(tmp.path()), Err(ConfigError::Invalid(_))),
                "{yaml}"
            );
        }
    }

    #[test]
    fn missing_section_is_parse_error() {
        let tmp = write_tmp_file("storage:\n    url: sqlite://pulse.db\n");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn missing_file_is_load_error() {
        assert!(matches!(
            Config::from_file(std::path::Path::new("/nonexistent/pulse.yaml")),
            Err(ConfigError::LoadError(_))
        ));
    }
}
