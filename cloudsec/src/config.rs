//! Provider configuration
//!
//! Settings come from three sources. Environment variables override the JSON
//! config file, which overrides the provider block.

use crate::api::{AuthType, ClientConfig, RetryConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tfplug::{AttributePath, Diagnostic, DynamicValue};

pub const DEFAULT_API_KEY_TYPE: &str = "api-key";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;
pub const SDK_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
pub const API_KEY_TYPES: [&str; 2] = ["api-key", "bearer"];

pub const CONFIG_FILE: &str = "config_file";
pub const API_URL: &str = "api_url";
pub const API_KEY: &str = "api_key";
pub const API_KEY_ID: &str = "api_key_id";
pub const API_KEY_TYPE: &str = "api_key_type";
pub const SDK_LOG_LEVEL: &str = "sdk_log_level";
pub const SKIP_SSL_VERIFY: &str = "skip_ssl_verify";
pub const REQUEST_TIMEOUT: &str = "request_timeout";
pub const REQUEST_RETRY_INTERVAL: &str = "request_retry_interval";
pub const CRASH_STACK_DIR: &str = "crash_stack_dir";

/// Environment variable names per setting, in lookup order
pub const ENV_VARS: [(&str, [&str; 3]); 10] = [
    (
        CONFIG_FILE,
        ["CLOUDSEC_CONFIG_FILE", "TF_CLOUDSEC_CONFIG_FILE", "CLOUDSEC_SDK_CONFIG_FILE"],
    ),
    (
        API_URL,
        ["CLOUDSEC_API_URL", "TF_CLOUDSEC_API_URL", "CLOUDSEC_SDK_API_URL"],
    ),
    (
        API_KEY,
        ["CLOUDSEC_API_KEY", "TF_CLOUDSEC_API_KEY", "CLOUDSEC_SDK_API_KEY"],
    ),
    (
        API_KEY_ID,
        ["CLOUDSEC_API_KEY_ID", "TF_CLOUDSEC_API_KEY_ID", "CLOUDSEC_SDK_API_KEY_ID"],
    ),
    (
        API_KEY_TYPE,
        ["CLOUDSEC_API_KEY_TYPE", "TF_CLOUDSEC_API_KEY_TYPE", "CLOUDSEC_SDK_API_KEY_TYPE"],
    ),
    (
        SDK_LOG_LEVEL,
        ["CLOUDSEC_SDK_LOG_LEVEL", "TF_CLOUDSEC_SDK_LOG_LEVEL", "CLOUDSEC_SDK_SDK_LOG_LEVEL"],
    ),
    (
        SKIP_SSL_VERIFY,
        ["CLOUDSEC_SKIP_SSL_VERIFY", "TF_CLOUDSEC_SKIP_SSL_VERIFY", "CLOUDSEC_SDK_SKIP_SSL_VERIFY"],
    ),
    (
        REQUEST_TIMEOUT,
        ["CLOUDSEC_REQUEST_TIMEOUT", "TF_CLOUDSEC_REQUEST_TIMEOUT", "CLOUDSEC_SDK_REQUEST_TIMEOUT"],
    ),
    (
        REQUEST_RETRY_INTERVAL,
        [
            "CLOUDSEC_REQUEST_RETRY_INTERVAL",
            "TF_CLOUDSEC_REQUEST_RETRY_INTERVAL",
            "CLOUDSEC_SDK_REQUEST_RETRY_INTERVAL",
        ],
    ),
    (
        CRASH_STACK_DIR,
        ["CLOUDSEC_CRASH_STACK_DIR", "TF_CLOUDSEC_CRASH_STACK_DIR", "CLOUDSEC_SDK_CRASH_STACK_DIR"],
    ),
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("environment variable {name} has invalid value '{value}': expected {expected}")]
    InvalidEnv {
        name: String,
        value: String,
        expected: &'static str,
    },
}

impl ConfigError {
    /// Provider attribute the error should be reported against
    pub fn attribute(&self) -> AttributePath {
        match self {
            ConfigError::ReadFile { .. } | ConfigError::ParseFile { .. } => {
                AttributePath::new(CONFIG_FILE)
            }
            ConfigError::InvalidEnv { name, .. } => ENV_VARS
                .iter()
                .find(|(_, names)| names.contains(&name.as_str()))
                .map(|(attribute, _)| AttributePath::new(attribute))
                .unwrap_or_else(AttributePath::root),
        }
    }
}

/// Raw settings from one source; unset fields defer to lower-precedence sources
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub config_file: Option<String>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub api_key_id: Option<String>,
    pub api_key_type: Option<String>,
    pub sdk_log_level: Option<String>,
    pub skip_ssl_verify: Option<bool>,
    pub request_timeout: Option<u64>,
    pub request_retry_interval: Option<u64>,
    pub crash_stack_dir: Option<String>,
}

impl ProviderSettings {
    /// Settings from the provider block; unknown values count as unset
    pub fn from_block(config: &DynamicValue, diagnostics: &mut Vec<Diagnostic>) -> Self {
        let mut string = |name: &str| {
            let path = AttributePath::new(name);
            config.get_optional_string(&path).unwrap_or_else(|e| {
                diagnostics.push(invalid(path, e.to_string()));
                None
            })
        };

        let config_file = string(CONFIG_FILE);
        let api_url = string(API_URL);
        let api_key = string(API_KEY);
        let api_key_id = string(API_KEY_ID);
        let api_key_type = string(API_KEY_TYPE);
        let sdk_log_level = string(SDK_LOG_LEVEL);
        let crash_stack_dir = string(CRASH_STACK_DIR);

        let skip_ssl_verify = config
            .get_optional_bool(&AttributePath::new(SKIP_SSL_VERIFY))
            .unwrap_or_else(|e| {
                diagnostics.push(invalid(AttributePath::new(SKIP_SSL_VERIFY), e.to_string()));
                None
            });

        let mut seconds = |name: &str| {
            let path = AttributePath::new(name);
            match config.get_optional_number(&path) {
                Ok(None) => None,
                Ok(Some(n)) if n >= 0.0 && n.fract() == 0.0 => Some(n as u64),
                Ok(Some(n)) => {
                    diagnostics.push(invalid(
                        path,
                        format!("expected a whole number of seconds, got {}", n),
                    ));
                    None
                }
                Err(e) => {
                    diagnostics.push(invalid(path, e.to_string()));
                    None
                }
            }
        };
        let request_timeout = seconds(REQUEST_TIMEOUT);
        let request_retry_interval = seconds(REQUEST_RETRY_INTERVAL);

        Self {
            config_file,
            api_url,
            api_key,
            api_key_id,
            api_key_type,
            sdk_log_level,
            skip_ssl_verify,
            request_timeout,
            request_retry_interval,
            crash_stack_dir,
        }
    }

    /// Settings from a JSON config file with the provider block's keys
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&contents).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |attribute: &str| -> Option<(String, String)> {
            let (_, names) = ENV_VARS.iter().find(|(a, _)| *a == attribute)?;
            names
                .iter()
                .find_map(|name| lookup(name).map(|value| (name.to_string(), value)))
        };
        let string = |attribute: &str| var(attribute).map(|(_, value)| value);

        let skip_ssl_verify = match var(SKIP_SSL_VERIFY) {
            None => None,
            Some((name, value)) => Some(match value.to_ascii_lowercase().as_str() {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name,
                        value,
                        expected: "true or false",
                    })
                }
            }),
        };

        let seconds = |attribute: &str| -> Result<Option<u64>, ConfigError> {
            match var(attribute) {
                None => Ok(None),
                Some((name, value)) => value.trim().parse().map(Some).map_err(|_| {
                    ConfigError::InvalidEnv {
                        name,
                        value,
                        expected: "a whole number of seconds",
                    }
                }),
            }
        };

        Ok(Self {
            config_file: string(CONFIG_FILE),
            api_url: string(API_URL),
            api_key: string(API_KEY),
            api_key_id: string(API_KEY_ID),
            api_key_type: string(API_KEY_TYPE),
            sdk_log_level: string(SDK_LOG_LEVEL),
            skip_ssl_verify,
            request_timeout: seconds(REQUEST_TIMEOUT)?,
            request_retry_interval: seconds(REQUEST_RETRY_INTERVAL)?,
            crash_stack_dir: string(CRASH_STACK_DIR),
        })
    }

    /// Overlay `higher` on top of `self`; set fields in `higher` win
    pub fn merge(self, higher: Self) -> Self {
        Self {
            config_file: higher.config_file.or(self.config_file),
            api_url: higher.api_url.or(self.api_url),
            api_key: higher.api_key.or(self.api_key),
            api_key_id: higher.api_key_id.or(self.api_key_id),
            api_key_type: higher.api_key_type.or(self.api_key_type),
            sdk_log_level: higher.sdk_log_level.or(self.sdk_log_level),
            skip_ssl_verify: higher.skip_ssl_verify.or(self.skip_ssl_verify),
            request_timeout: higher.request_timeout.or(self.request_timeout),
            request_retry_interval: higher.request_retry_interval.or(self.request_retry_interval),
            crash_stack_dir: higher.crash_stack_dir.or(self.crash_stack_dir),
        }
    }

    /// Check the merged settings. Every problem is reported, scoped to the
    /// attribute it concerns, before any network call is made.
    pub fn validate(self, diagnostics: &mut Vec<Diagnostic>) -> Option<ProviderConfig> {
        let start = diagnostics.len();

        let api_url = match self.api_url.as_deref().map(str::trim) {
            None | Some("") => {
                diagnostics.push(missing(API_URL, "CLOUDSEC_API_URL"));
                None
            }
            Some(raw) => match url::Url::parse(raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Some(raw.to_string()),
                Ok(url) => {
                    diagnostics.push(invalid(
                        AttributePath::new(API_URL),
                        format!("unsupported URL scheme '{}', use http or https", url.scheme()),
                    ));
                    None
                }
                Err(e) => {
                    diagnostics.push(invalid(
                        AttributePath::new(API_URL),
                        format!("'{}' is not a valid URL: {}", raw, e),
                    ));
                    None
                }
            },
        };

        let api_key = match self.api_key.filter(|k| !k.is_empty()) {
            Some(key) => Some(key),
            None => {
                diagnostics.push(missing(API_KEY, "CLOUDSEC_API_KEY"));
                None
            }
        };

        let key_type = self
            .api_key_type
            .unwrap_or_else(|| DEFAULT_API_KEY_TYPE.to_string());
        let auth_type = AuthType::parse(&key_type);
        if auth_type.is_none() {
            diagnostics.push(invalid(
                AttributePath::new(API_KEY_TYPE),
                format!("'{}' must be one of: {}", key_type, API_KEY_TYPES.join(", ")),
            ));
        }

        let api_key_id = self.api_key_id.filter(|id| !id.is_empty());
        if auth_type == Some(AuthType::ApiKey) && api_key_id.is_none() {
            diagnostics.push(missing(API_KEY_ID, "CLOUDSEC_API_KEY_ID"));
        }

        if let Some(level) = &self.sdk_log_level {
            if !SDK_LOG_LEVELS.contains(&level.as_str()) {
                diagnostics.push(invalid(
                    AttributePath::new(SDK_LOG_LEVEL),
                    format!("'{}' must be one of: {}", level, SDK_LOG_LEVELS.join(", ")),
                ));
            }
        }

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if request_timeout == 0 {
            diagnostics.push(invalid(
                AttributePath::new(REQUEST_TIMEOUT),
                "request_timeout must be at least 1 second",
            ));
        }

        if diagnostics.len() > start {
            return None;
        }
        let (Some(api_url), Some(api_key), Some(auth_type)) = (api_url, api_key, auth_type) else {
            return None;
        };

        Some(ProviderConfig {
            api_url,
            api_key,
            api_key_id,
            auth_type,
            sdk_log_level: self.sdk_log_level,
            skip_ssl_verify: self.skip_ssl_verify.unwrap_or(false),
            request_timeout: Duration::from_secs(request_timeout),
            request_retry_interval: Duration::from_secs(
                self.request_retry_interval
                    .unwrap_or(DEFAULT_RETRY_INTERVAL_SECS),
            ),
            crash_stack_dir: self.crash_stack_dir.map(PathBuf::from),
        })
    }
}

/// Validated provider configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub api_url: String,
    pub api_key: String,
    pub api_key_id: Option<String>,
    pub auth_type: AuthType,
    pub sdk_log_level: Option<String>,
    pub skip_ssl_verify: bool,
    pub request_timeout: Duration,
    pub request_retry_interval: Duration,
    pub crash_stack_dir: Option<PathBuf>,
}

impl ProviderConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            api_key_id: self.api_key_id.clone(),
            auth_type: self.auth_type,
            skip_ssl_verify: self.skip_ssl_verify,
            request_timeout: self.request_timeout,
            retry: RetryConfig {
                initial_backoff: self.request_retry_interval,
                ..RetryConfig::default()
            },
        }
    }
}

/// Resolve the provider block against the config file and environment
pub fn resolve(config: &DynamicValue, diagnostics: &mut Vec<Diagnostic>) -> Option<ProviderConfig> {
    resolve_with(config, ProviderSettings::from_env(), diagnostics)
}

fn resolve_with(
    config: &DynamicValue,
    env: Result<ProviderSettings, ConfigError>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<ProviderConfig> {
    let block = ProviderSettings::from_block(config, diagnostics);
    let env = match env {
        Ok(env) => env,
        Err(e) => {
            diagnostics.push(invalid(e.attribute(), e.to_string()));
            return None;
        }
    };

    let mut settings = block;
    if let Some(path) = env.config_file.as_ref().or(settings.config_file.as_ref()) {
        tracing::debug!(path = %path, "loading provider config file");
        match ProviderSettings::from_file(Path::new(path)) {
            Ok(file) => settings = settings.merge(file),
            Err(e) => {
                diagnostics.push(invalid(e.attribute(), e.to_string()));
                return None;
            }
        }
    }

    settings.merge(env).validate(diagnostics)
}

fn missing(attribute: &str, env_var: &str) -> Diagnostic {
    Diagnostic::error(
        format!("Missing {}", attribute),
        format!(
            "The provider requires {} to be set in the provider block, the config file or the {} environment variable",
            attribute, env_var
        ),
    )
    .with_attribute(AttributePath::new(attribute))
}

fn invalid(path: AttributePath, detail: impl Into<String>) -> Diagnostic {
    Diagnostic::error("Invalid provider configuration", detail).with_attribute(path)
}
