//! Application configuration.
//!
//! Built-in defaults, then a YAML/JSON file, then `SCOPED_RAG__` environment
//! overlays (`__` separates path segments), then the direct
//! `SCOPED_RAG_AUTHZ_TOKEN` / `SCOPED_RAG_AUTHZ_ENDPOINT` variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scoped_rag_authz_client::{
    worst_case_duration, BackoffCfg, RetryPolicy, SecretString, DEFAULT_DOMAIN,
    DEFAULT_REQUEST_TIMEOUT,
};
use scoped_rag_retrieval_filter::FilterPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::errors::ConfigError;

const ENV_PREFIX: &str = "SCOPED_RAG__";
pub const ENV_TOKEN: &str = "SCOPED_RAG_AUTHZ_TOKEN";
pub const ENV_ENDPOINT: &str = "SCOPED_RAG_AUTHZ_ENDPOINT";
pub const DEFAULT_CONFIG_PATH: &str = "config/scoped-rag.yaml";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub authz: AuthzConfig,
    pub retry: RetryConfig,
    pub filter: FilterConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// Overrides the endpoint derived from `domain`.
    pub endpoint: Option<String>,
    pub domain: String,
    pub token: SecretString,
    pub subject_type: String,
    pub resource_type: String,
    #[serde(with = "human_duration")]
    pub request_timeout: Duration,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            domain: DEFAULT_DOMAIN.to_string(),
            token: SecretString::default(),
            subject_type: "user".to_string(),
            resource_type: "file".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl AuthzConfig {
    pub fn endpoint_url(&self) -> Result<Option<Url>, ConfigError> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|err| ConfigError::Invalid(format!("authz.endpoint {raw}: {err}")))
            })
            .transpose()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "human_duration")]
    pub base_delay: Duration,
    #[serde(with = "human_duration")]
    pub max_delay: Duration,
    pub multiplier: f32,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        let backoff = BackoffCfg::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay: backoff.base_delay,
            max_delay: backoff.max_delay,
            multiplier: backoff.multiplier,
            jitter: backoff.jitter,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            enabled: self.max_attempts > 1,
            max_attempts: self.max_attempts,
        }
    }

    pub fn backoff(&self) -> BackoffCfg {
        BackoffCfg {
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    #[serde(with = "human_duration")]
    pub check_timeout: Duration,
    #[serde(with = "human_duration")]
    pub call_deadline: Duration,
    /// `"session"` (or absent) keeps errors cached until the session ends.
    #[serde(with = "human_ttl")]
    pub error_ttl: Option<Duration>,
    pub concurrency: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let policy = FilterPolicy::default();
        Self {
            check_timeout: policy.check_timeout,
            call_deadline: policy.call_deadline,
            error_ttl: policy.error_ttl,
            concurrency: policy.concurrency,
        }
    }
}

impl FilterConfig {
    pub fn policy(&self) -> FilterPolicy {
        FilterPolicy {
            check_timeout: self.check_timeout,
            call_deadline: self.call_deadline,
            error_ttl: self.error_ttl,
            concurrency: self.concurrency,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.multiplier must be at least 1.0".into(),
            ));
        }
        if self.authz.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "authz.request_timeout must be positive".into(),
            ));
        }
        self.authz.endpoint_url()?;
        self.filter
            .policy()
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;

        // Retries happen inside one check; all of them must fit its timeout.
        let worst = worst_case_duration(
            &self.retry.policy(),
            &self.retry.backoff(),
            self.authz.request_timeout,
        );
        if worst > self.filter.check_timeout {
            return Err(ConfigError::Invalid(format!(
                "authz.request_timeout x retry.max_attempts plus backoff ({}) exceeds filter.check_timeout ({})",
                humantime::format_duration(worst),
                humantime::format_duration(self.filter.check_timeout),
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Explicit file; must exist. Without it the default path is tried.
    pub path: Option<PathBuf>,
    pub include_env: bool,
}

impl LoadOptions {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            include_env: true,
        }
    }
}

pub struct LoadedConfig {
    pub config: AppConfig,
    /// File that contributed to the config, if any.
    pub source: Option<PathBuf>,
}

pub fn load_config(options: &LoadOptions) -> Result<LoadedConfig, ConfigError> {
    let mut merged = serde_json::to_value(AppConfig::default())
        .map_err(|err| ConfigError::Invalid(err.to_string()))?;

    let source = match &options.path {
        Some(path) if !path.exists() => {
            return Err(ConfigError::Io {
                path: path.clone(),
                message: "file not found".into(),
            })
        }
        Some(path) => Some(path.clone()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|path| path.exists()),
    };

    if let Some(path) = &source {
        merge(&mut merged, value_from_file(path)?);
        debug!(target = "config", path = %path.display(), "applied config file");
    }

    if options.include_env {
        for (path, raw) in overlays_from_env() {
            let value = typed_env_value(&merged, &path, raw);
            debug!(target = "config", %path, "applied environment overlay");
            set_path(&mut merged, &path, value);
        }
        if let Ok(token) = env::var(ENV_TOKEN) {
            set_path(&mut merged, "authz.token", Value::String(token));
        }
        if let Ok(endpoint) = env::var(ENV_ENDPOINT) {
            set_path(&mut merged, "authz.endpoint", Value::String(endpoint));
        }
    }

    let config: AppConfig =
        serde_json::from_value(merged).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    config.validate()?;
    Ok(LoadedConfig { config, source })
}

fn value_from_file(path: &Path) -> Result<Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|err| ConfigError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    if content.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    if let Ok(value) = serde_json::from_str::<Value>(&content) {
        return Ok(value);
    }
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    serde_json::to_value(yaml).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn overlays_from_env() -> Vec<(String, String)> {
    let mut overlays: Vec<(String, String)> = env::vars()
        .filter_map(|(key, raw)| {
            let stripped = key.strip_prefix(ENV_PREFIX)?;
            let path = stripped
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join(".");
            (!path.is_empty()).then_some((path, raw))
        })
        .collect();
    overlays.sort_by(|a, b| a.0.cmp(&b.0));
    overlays
}

/// String-typed leaves (tokens, durations, names) keep the raw text; other
/// leaves accept JSON literals such as `4`, `true` or `null`.
fn typed_env_value(current: &Value, path: &str, raw: String) -> Value {
    let pointer = format!("/{}", path.replace('.', "/"));
    if matches!(current.pointer(&pointer), Some(Value::String(_))) {
        return Value::String(raw);
    }
    if raw.is_empty() {
        return Value::Null;
    }
    serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw))
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn set_path(root: &mut Value, path: &str, value: Value) {
    let nested = path.rsplit('.').fold(value, |inner, segment| {
        let mut map = Map::new();
        map.insert(segment.to_string(), inner);
        Value::Object(map)
    });
    merge(root, nested);
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Text(String),
    Seconds(u64),
}

/// Humantime text, or a bare integer meaning seconds.
fn parse_text_duration(raw: &str) -> Result<Duration, humantime::DurationError> {
    let raw = raw.trim();
    match raw.parse::<u64>() {
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => humantime::parse_duration(raw),
    }
}

mod human_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::RawDuration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Text(raw) => {
                super::parse_text_duration(&raw).map_err(serde::de::Error::custom)
            }
            RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        }
    }
}

mod human_ttl {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::RawDuration;

    const SESSION: &str = "session";

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ttl) => serializer.serialize_str(&humantime::format_duration(*ttl).to_string()),
            None => serializer.serialize_str(SESSION),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        match Option::<RawDuration>::deserialize(deserializer)? {
            None => Ok(None),
            Some(RawDuration::Text(raw)) => {
                let raw = raw.trim();
                if raw.is_empty() || raw.eq_ignore_ascii_case(SESSION) {
                    Ok(None)
                } else {
                    super::parse_text_duration(raw)
                        .map(Some)
                        .map_err(serde::de::Error::custom)
                }
            }
            Some(RawDuration::Seconds(secs)) => Ok(Some(Duration::from_secs(secs))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    fn file_only(path: PathBuf) -> LoadOptions {
        LoadOptions {
            path: Some(path),
            include_env: false,
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.authz.domain, DEFAULT_DOMAIN);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(200));
        assert_eq!(config.filter.check_timeout, Duration::from_secs(5));
        assert_eq!(config.filter.error_ttl, None);
    }

    #[test]
    #[serial]
    fn yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "scoped-rag.yaml",
            "authz:\n  token: pts_file\n  request_timeout: 1200ms\nfilter:\n  concurrency: 2\n  error_ttl: 30s\n",
        );
        let loaded = load_config(&file_only(path.clone())).unwrap();
        assert_eq!(loaded.source, Some(path));
        let config = loaded.config;
        assert_eq!(config.authz.token.expose(), "pts_file");
        assert_eq!(config.authz.request_timeout, Duration::from_millis(1200));
        assert_eq!(config.filter.concurrency, 2);
        assert_eq!(config.filter.error_ttl, Some(Duration::from_secs(30)));
        assert_eq!(config.filter.call_deadline, FilterPolicy::default().call_deadline);
    }

    #[test]
    #[serial]
    fn json_file_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "scoped-rag.json",
            r#"{"authz": {"request_timeout": "500ms"}, "retry": {"max_attempts": 4, "jitter": false}, "filter": {"error_ttl": "session"}}"#,
        );
        let config = load_config(&file_only(path)).unwrap().config;
        assert_eq!(config.retry.max_attempts, 4);
        assert!(!config.retry.jitter);
        assert_eq!(config.filter.error_ttl, None);
    }

    #[test]
    #[serial]
    fn environment_overlays_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "scoped-rag.yaml", "filter:\n  concurrency: 2\n");
        env::set_var("SCOPED_RAG__FILTER__CONCURRENCY", "4");
        env::set_var("SCOPED_RAG__FILTER__CHECK_TIMEOUT", "8s");
        env::set_var(ENV_TOKEN, "pts_env");
        env::set_var(ENV_ENDPOINT, "http://127.0.0.1:9999");

        let result = load_config(&LoadOptions::new(Some(path)));

        env::remove_var("SCOPED_RAG__FILTER__CONCURRENCY");
        env::remove_var("SCOPED_RAG__FILTER__CHECK_TIMEOUT");
        env::remove_var(ENV_TOKEN);
        env::remove_var(ENV_ENDPOINT);

        let config = result.unwrap().config;
        assert_eq!(config.filter.concurrency, 4);
        assert_eq!(config.filter.check_timeout, Duration::from_secs(8));
        assert_eq!(config.authz.token.expose(), "pts_env");
        assert_eq!(
            config.authz.endpoint_url().unwrap().unwrap().as_str(),
            "http://127.0.0.1:9999/"
        );
    }

    #[test]
    #[serial]
    fn deadline_shorter_than_check_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "scoped-rag.yaml",
            "filter:\n  check_timeout: 5s\n  call_deadline: 1s\n",
        );
        let err = load_config(&file_only(path)).err().unwrap();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn retry_budget_must_fit_inside_check_timeout() {
        let mut config = AppConfig::default();
        assert!(
            worst_case_duration(
                &config.retry.policy(),
                &config.retry.backoff(),
                config.authz.request_timeout
            ) < config.filter.check_timeout
        );

        config.authz.request_timeout = config.filter.check_timeout;
        let err = config.validate().err().unwrap();
        assert!(err.to_string().contains("filter.check_timeout"), "{err}");

        config.retry.max_attempts = 1;
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn numeric_env_values_stay_strings_for_string_fields() {
        env::set_var("SCOPED_RAG__AUTHZ__TOKEN", "12345");
        env::set_var("SCOPED_RAG__FILTER__CALL_DEADLINE", "20");
        env::set_var("SCOPED_RAG__RETRY__JITTER", "false");

        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "scoped-rag.yaml", "");
        let result = load_config(&LoadOptions::new(Some(path)));

        env::remove_var("SCOPED_RAG__AUTHZ__TOKEN");
        env::remove_var("SCOPED_RAG__FILTER__CALL_DEADLINE");
        env::remove_var("SCOPED_RAG__RETRY__JITTER");

        let config = result.unwrap().config;
        assert_eq!(config.authz.token.expose(), "12345");
        assert_eq!(config.filter.call_deadline, Duration::from_secs(20));
        assert!(!config.retry.jitter);
    }

    #[test]
    #[serial]
    fn zero_concurrency_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "scoped-rag.yaml", "filter:\n  concurrency: 0\n");
        assert!(load_config(&file_only(path)).is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(&file_only(PathBuf::from("/nonexistent/scoped-rag.yaml")))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn token_never_serializes_in_clear() {
        let mut config = AppConfig::default();
        config.authz.token = SecretString::new("pts_secret");
        let rendered = serde_json::to_string(&config).unwrap();
        assert!(!rendered.contains("pts_secret"));
        assert!(format!("{config:?}").contains("redacted"));
    }
}
