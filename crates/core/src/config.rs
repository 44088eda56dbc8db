use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::opportunity::DealStage;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub crm: CrmConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub base_url: String,
    pub access_token: SecretString,
    pub request_timeout_secs: u64,
    /// Queryable record property carrying the platform user identity.
    pub identity_property: String,
    pub pipeline: String,
    /// Domain for the deterministic per-identity contact email.
    pub contact_email_domain: String,
    pub stage_codes: StageCodes,
}

/// Concrete wire codes for the ordered stage set. The engine only ever sees
/// `DealStage`; the mapping to CRM-specific codes is configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCodes {
    pub inquiry: String,
    pub scheduled: String,
    pub payment_ready: String,
    pub won: String,
    pub lost: String,
}

impl StageCodes {
    pub fn code(&self, stage: DealStage) -> &str {
        match stage {
            DealStage::Inquiry => &self.inquiry,
            DealStage::Scheduled => &self.scheduled,
            DealStage::PaymentReady => &self.payment_ready,
            DealStage::Won => &self.won,
            DealStage::Lost => &self.lost,
        }
    }

    pub fn stage_for(&self, code: &str) -> Option<DealStage> {
        if code == self.inquiry {
            Some(DealStage::Inquiry)
        } else if code == self.scheduled {
            Some(DealStage::Scheduled)
        } else if code == self.payment_ready {
            Some(DealStage::PaymentReady)
        } else if code == self.won {
            Some(DealStage::Won)
        } else if code == self.lost {
            Some(DealStage::Lost)
        } else {
            None
        }
    }

    pub fn terminal_codes(&self) -> [&str; 2] {
        [&self.won, &self.lost]
    }
}

impl Default for StageCodes {
    fn default() -> Self {
        Self {
            inquiry: "new_inquiry".to_string(),
            scheduled: "appointmentscheduled".to_string(),
            payment_ready: "decisionmakerboughtin".to_string(),
            won: "closedwon".to_string(),
            lost: "closedlost".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Must exceed the remote search index's worst-case propagation delay.
    pub ttl_secs: u64,
    pub capacity: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub crm_base_url: Option<String>,
    pub crm_access_token: Option<String>,
    pub cache_ttl_secs: Option<u64>,
    pub cache_capacity: Option<usize>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            crm: CrmConfig {
                base_url: "https://api.hubapi.com".to_string(),
                access_token: String::new().into(),
                request_timeout_secs: 10,
                identity_property: "manychat_psid".to_string(),
                pipeline: "default".to_string(),
                contact_email_domain: "dealbridge.chat".to_string(),
                stage_codes: StageCodes::default(),
            },
            cache: CacheConfig { ttl_secs: 300, capacity: 1000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    crm: Option<CrmPatch>,
    cache: Option<CachePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    base_url: Option<String>,
    access_token: Option<String>,
    request_timeout_secs: Option<u64>,
    identity_property: Option<String>,
    pipeline: Option<String>,
    contact_email_domain: Option<String>,
    stage_codes: Option<StageCodes>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    ttl_secs: Option<u64>,
    capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("dealbridge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(crm) = patch.crm {
            if let Some(base_url) = crm.base_url {
                self.crm.base_url = base_url;
            }
            if let Some(access_token_value) = crm.access_token {
                self.crm.access_token = secret_value(access_token_value);
            }
            if let Some(request_timeout_secs) = crm.request_timeout_secs {
                self.crm.request_timeout_secs = request_timeout_secs;
            }
            if let Some(identity_property) = crm.identity_property {
                self.crm.identity_property = identity_property;
            }
            if let Some(pipeline) = crm.pipeline {
                self.crm.pipeline = pipeline;
            }
            if let Some(contact_email_domain) = crm.contact_email_domain {
                self.crm.contact_email_domain = contact_email_domain;
            }
            if let Some(stage_codes) = crm.stage_codes {
                self.crm.stage_codes = stage_codes;
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(ttl_secs) = cache.ttl_secs {
                self.cache.ttl_secs = ttl_secs;
            }
            if let Some(capacity) = cache.capacity {
                self.cache.capacity = capacity;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DEALBRIDGE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DEALBRIDGE_SERVER_PORT") {
            self.server.port = parse_u16("DEALBRIDGE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("DEALBRIDGE_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("DEALBRIDGE_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        if let Some(value) = read_env("DEALBRIDGE_CRM_BASE_URL") {
            self.crm.base_url = value;
        }
        if let Some(value) = read_env("DEALBRIDGE_CRM_ACCESS_TOKEN") {
            self.crm.access_token = secret_value(value);
        }
        if let Some(value) = read_env("DEALBRIDGE_CRM_REQUEST_TIMEOUT_SECS") {
            self.crm.request_timeout_secs =
                parse_u64("DEALBRIDGE_CRM_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("DEALBRIDGE_CRM_IDENTITY_PROPERTY") {
            self.crm.identity_property = value;
        }
        if let Some(value) = read_env("DEALBRIDGE_CRM_CONTACT_EMAIL_DOMAIN") {
            self.crm.contact_email_domain = value;
        }

        if let Some(value) = read_env("DEALBRIDGE_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_u64("DEALBRIDGE_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("DEALBRIDGE_CACHE_CAPACITY") {
            self.cache.capacity = parse_u64("DEALBRIDGE_CACHE_CAPACITY", &value)? as usize;
        }

        let log_level =
            read_env("DEALBRIDGE_LOGGING_LEVEL").or_else(|| read_env("DEALBRIDGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DEALBRIDGE_LOGGING_FORMAT").or_else(|| read_env("DEALBRIDGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(crm_base_url) = overrides.crm_base_url {
            self.crm.base_url = crm_base_url;
        }
        if let Some(crm_access_token) = overrides.crm_access_token {
            self.crm.access_token = secret_value(crm_access_token);
        }
        if let Some(cache_ttl_secs) = overrides.cache_ttl_secs {
            self.cache.ttl_secs = cache_ttl_secs;
        }
        if let Some(cache_capacity) = overrides.cache_capacity {
            self.cache.capacity = cache_capacity;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_crm(&self.crm)?;
        validate_cache(&self.cache)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("dealbridge.toml"), PathBuf::from("config/dealbridge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }
    if server.health_check_port == server.port {
        return Err(ConfigError::Validation(
            "server.health_check_port must differ from server.port".to_string(),
        ));
    }
    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if !crm.base_url.starts_with("http://") && !crm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "crm.base_url must be an http(s) URL".to_string(),
        ));
    }

    let token = crm.access_token.expose_secret();
    if token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crm.access_token is required. Create a private app token in your CRM portal"
                .to_string(),
        ));
    }

    if crm.request_timeout_secs == 0 || crm.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "crm.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if crm.identity_property.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crm.identity_property must not be empty".to_string(),
        ));
    }

    if crm.contact_email_domain.trim().is_empty() || crm.contact_email_domain.contains('@') {
        return Err(ConfigError::Validation(
            "crm.contact_email_domain must be a bare domain name".to_string(),
        ));
    }

    let codes = &crm.stage_codes;
    for (name, code) in [
        ("inquiry", &codes.inquiry),
        ("scheduled", &codes.scheduled),
        ("payment_ready", &codes.payment_ready),
        ("won", &codes.won),
        ("lost", &codes.lost),
    ] {
        if code.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "crm.stage_codes.{name} must not be empty"
            )));
        }
    }
    if codes.won == codes.lost {
        return Err(ConfigError::Validation(
            "crm.stage_codes.won and crm.stage_codes.lost must be distinct".to_string(),
        ));
    }

    Ok(())
}

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    if cache.ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "cache.ttl_secs must be greater than zero (it absorbs search-index lag)".to_string(),
        ));
    }
    if cache.capacity < 2 {
        return Err(ConfigError::Validation(
            "cache.capacity must be at least 2".to_string(),
        ));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}
