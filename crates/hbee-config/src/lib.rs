//! Shared configuration for HBEE tools.
//!
//! TOML profiles, environment overrides, credential resolution (env +
//! keyring + plaintext), and translation into `hbee_core::ClientConfig`
//! plus `hbee_api::BrokerConfig`.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use hbee_api::topic::is_device_id;
use hbee_api::BrokerConfig;
use hbee_core::{AccessPolicy, ClientConfig, HealthPolicy, ProbePolicy, ReconnectPolicy, SyncPolicy};

const KEYRING_SERVICE: &str = "hbee";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{0}' not found")]
    UnknownProfile(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
            .to_owned();
        let profile = self
            .profiles
            .get(&name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.clone()))?;
        Ok((name, profile))
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

/// One broker account.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Broker endpoint: `ws://`, `wss://`, `mqtt://`, or `mqtts://`.
    pub broker: String,

    /// Account the client acts for; first level after `HBEE/`.
    pub user_id: String,

    pub username: Option<String>,

    /// Plaintext password. Prefer keyring or `password_env`.
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// Fixed MQTT client id. Generated per run when absent.
    pub client_id: Option<String>,

    /// Secondary accounts whose devices are also visible.
    #[serde(default)]
    pub permitted_ids: Vec<String>,

    /// Devices owned by `user_id`.
    #[serde(default)]
    pub devices: Vec<String>,

    /// Drop traffic from devices not listed in `devices`.
    #[serde(default)]
    pub restrict_to_devices: bool,

    /// Backend readiness endpoint, e.g. `https://host/api/mqtt/status`.
    pub status_url: Option<String>,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_true")]
    pub clean_session: bool,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_health_interval")]
    pub health_check_secs: u64,

    #[serde(default)]
    pub reconnect: ReconnectSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl Profile {
    pub fn new(broker: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            user_id: user_id.into(),
            username: None,
            password: None,
            password_env: None,
            client_id: None,
            permitted_ids: Vec::new(),
            devices: Vec::new(),
            restrict_to_devices: false,
            status_url: None,
            keep_alive_secs: default_keep_alive(),
            clean_session: true,
            connect_timeout_secs: default_connect_timeout(),
            health_check_secs: default_health_interval(),
            reconnect: ReconnectSettings::default(),
            sync: SyncSettings::default(),
        }
    }
}

fn default_keep_alive() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_health_interval() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub offline_recheck_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 5_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
            offline_recheck_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    pub enabled: bool,
    pub settings_delay_ms: u64,
    pub status_delay_ms: u64,
    pub cooldown_ms: u64,
    pub max_attempts: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            settings_delay_ms: 500,
            status_delay_ms: 2_000,
            cooldown_ms: 5_000,
            max_attempts: 3,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "hbee", "hbee").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hbee");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + `HBEE_*` environment overrides.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HBEE_").split("_"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the broker password: env var, then keyring, then plaintext.
/// `None` means the broker is used without a password.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    // 1. Profile's password_env, then the generic variable
    let env_names = profile
        .password_env
        .iter()
        .map(String::as_str)
        .chain(std::iter::once("HBEE_PASSWORD"));
    for name in env_names {
        if let Ok(val) = std::env::var(name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if profile.username.is_some() {
        let key = format!("{profile_name}/password");
        if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &key) {
            if let Ok(pw) = entry.get_password() {
                return Some(SecretString::from(pw));
            }
        }
    }

    // 3. Plaintext in config
    profile.password.clone().map(SecretString::from)
}

/// Store `password` for `profile_name` in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| invalid("password", format!("keyring: {e}")))
}

// ── Translation ─────────────────────────────────────────────────────

/// Everything a client needs, built from one profile.
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub name: String,
    pub client: ClientConfig,
    pub broker: BrokerConfig,
    pub status_url: Option<Url>,
    /// Devices owned by the profile's user.
    pub devices: Vec<String>,
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse()
        .map_err(|e| invalid(field, format!("'{raw}' is not a valid URL: {e}")))
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Validate a profile and build the runtime configuration from it.
pub fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
) -> Result<ResolvedProfile, ConfigError> {
    let broker_url = parse_url("broker", &profile.broker)?;

    if profile.user_id.is_empty() || profile.user_id.contains(['/', '+', '#']) {
        return Err(invalid(
            "user_id",
            "must be non-empty and free of '/', '+' and '#'",
        ));
    }
    if let Some(bad) = profile.devices.iter().find(|d| !is_device_id(d)) {
        return Err(invalid(
            "devices",
            format!("'{bad}' is neither a UUID nor a 12-digit hardware address"),
        ));
    }
    if profile.sync.status_delay_ms < profile.sync.settings_delay_ms {
        return Err(invalid("sync.status_delay_ms", "must not be shorter than settings_delay_ms"));
    }
    if profile.reconnect.max_delay_ms < profile.reconnect.base_delay_ms {
        return Err(invalid("reconnect.max_delay_ms", "must not be shorter than base_delay_ms"));
    }

    let mut broker = BrokerConfig::new(
        broker_url,
        profile.client_id.clone().unwrap_or_else(generated_client_id),
    );
    broker.scheme().map_err(|e| invalid("broker", e.to_string()))?;
    broker.username.clone_from(&profile.username);
    broker.password = resolve_password(profile, profile_name);
    broker.keep_alive = Duration::from_secs(profile.keep_alive_secs);
    broker.clean_session = profile.clean_session;
    broker.connect_timeout = Duration::from_secs(profile.connect_timeout_secs);

    let status_url = profile
        .status_url
        .as_deref()
        .map(|raw| parse_url("status_url", raw))
        .transpose()?;

    let access = AccessPolicy {
        user_id: profile.user_id.clone(),
        permitted_ids: profile.permitted_ids.iter().cloned().collect(),
        known_devices: if profile.restrict_to_devices {
            profile.devices.iter().cloned().collect()
        } else {
            BTreeSet::new()
        },
    };

    let reconnect = &profile.reconnect;
    let sync = &profile.sync;
    let client = ClientConfig {
        access,
        reconnect: ReconnectPolicy {
            base_delay: millis(reconnect.base_delay_ms),
            max_delay: millis(reconnect.max_delay_ms),
            max_attempts: reconnect.max_attempts,
            offline_recheck: millis(reconnect.offline_recheck_ms),
        },
        health: HealthPolicy {
            interval: Duration::from_secs(profile.health_check_secs),
        },
        probe: ProbePolicy::default(),
        sync: SyncPolicy {
            enabled: sync.enabled,
            settings_delay: millis(sync.settings_delay_ms),
            status_delay: millis(sync.status_delay_ms),
            cooldown: millis(sync.cooldown_ms),
            max_attempts: sync.max_attempts,
        },
        qos: hbee_api::QoS::default(),
    };

    Ok(ResolvedProfile {
        name: profile_name.to_owned(),
        client,
        broker,
        status_url,
        devices: profile.devices.clone(),
    })
}

fn generated_client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("hbee-{}", &id[..12])
}

// ── Tests ────────────────────────────────────────────────────────────
