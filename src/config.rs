use crate::env::{env_or, CONFIG_ENV_PREFIX, CONFIG_ENV_SPLIT, CONFIG_FILE_ENV};
use crate::severity::Severity;
use figment::providers::{Env, Format, Json, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Top-level keys that only exist because of how the process was launched
/// and are left out of diagnostic snapshots.
pub const SNAPSHOT_EXCLUDED_KEYS: &[&str] = &["args", "config_file"];

/// Errors raised while loading or interpreting configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("configuration parsing error: {0}")]
    Parsing(#[from] figment::Error),

    #[error("error reporting is enabled but `log.sentry.dsn` is not set")]
    MissingDsn,

    #[error("invalid sentry DSN: {0}")]
    InvalidDsn(#[from] sentry::types::ParseDsnError),
}

/// Typed view over the settings the pipeline itself consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub environment: EnvironmentSettings,
    pub log: LogSettings,
    pub proxy: ProxySettings,
    pub job: JobSettings,
    pub metadata: MetadataSettings,
    pub process: ProcessSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    /// Environment name reported to Sentry. `develop` also turns on JSON
    /// highlighting in the terminal.
    pub level: String,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            level: "develop".to_string(),
        }
    }
}

impl EnvironmentSettings {
    pub fn is_develop(&self) -> bool {
        self.level == "develop"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Minimum severity printed to the console.
    pub level: Severity,
    pub colors: bool,
    /// Skip formatting entirely and print `level: message`.
    pub fast: bool,
    /// Duplicate `warn` records to stderr.
    pub warn_to_stderr: bool,
    pub sentry: SentrySettings,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Severity::Info,
            colors: true,
            fast: false,
            warn_to_stderr: false,
            sentry: SentrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentrySettings {
    pub enabled: bool,
    pub dsn: Option<String>,
    pub debug: bool,
    /// Configuration keys whose values are attached as event tags.
    pub tags: Vec<String>,
    /// Configuration keys whose values are attached as event extras.
    pub extra: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub enabled: bool,
    pub address: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "http://proxy:3128".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Breadcrumb category.
    pub name: String,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    pub release: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSettings {
    /// Install the process guard during `init`.
    pub guard: bool,
    pub flush_timeout_ms: u64,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            guard: true,
            flush_timeout_ms: 2_000,
        }
    }
}

impl ProcessSettings {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

impl Settings {
    /// Validated DSN when error reporting is enabled, `Ok(None)` when it
    /// is disabled.
    pub fn sentry_dsn(&self) -> Result<Option<sentry::types::Dsn>, ConfigError> {
        if !self.log.sentry.enabled {
            return Ok(None);
        }
        let raw = self
            .log
            .sentry
            .dsn
            .as_deref()
            .map(str::trim)
            .filter(|dsn| !dsn.is_empty())
            .ok_or(ConfigError::MissingDsn)?;
        Ok(Some(raw.parse()?))
    }

    pub fn proxy_address(&self) -> Option<&str> {
        self.proxy.enabled.then_some(self.proxy.address.as_str())
    }
}

/// Process-wide, read-only configuration store.
///
/// Holds the typed [`Settings`] together with the raw merged tree so that
/// arbitrary application keys (for tags and extras) can be looked up by
/// dotted path.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    settings: Settings,
    tree: Value,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_settings(Settings::default())
    }
}

impl Config {
    /// Load configuration from, in increasing priority:
    /// 1. built-in defaults,
    /// 2. the JSON/YAML file named by `APP_CONFIG_FILE`, if any,
    /// 3. `APP_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));

        let file = env_or(CONFIG_FILE_ENV, "");
        if !file.is_empty() {
            figment = merge_file(figment, Path::new(&file));
        }

        Self::from_figment(figment.merge(Env::prefixed(CONFIG_ENV_PREFIX).split(CONFIG_ENV_SPLIT)))
    }

    /// Build from an already layered [`Figment`].
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Settings = figment.extract()?;
        let tree: Value = figment.extract()?;
        Ok(Self { settings, tree })
    }

    pub fn from_settings(settings: Settings) -> Self {
        let tree = serde_json::to_value(&settings).unwrap_or(Value::Null);
        Self { settings, tree }
    }

    /// Defaults overlaid with an arbitrary JSON document.
    pub fn from_json(overrides: Value) -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Settings::default()))
                .merge(Serialized::defaults(overrides)),
        )
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Look up a dotted key such as `log.sentry.dsn` or `clientName`.
    ///
    /// Each segment matches exactly first, then case-insensitively:
    /// environment overrides arrive lowercased (`APP_CLIENTNAME` is stored
    /// as `clientname`).
    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split('.').try_fold(&self.tree, |node, part| {
            let map = node.as_object()?;
            map.get(part).or_else(|| {
                map.iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(part))
                    .map(|(_, value)| value)
            })
        })
    }

    /// Full resolved configuration without launch-only noise keys.
    pub fn snapshot(&self) -> Value {
        let mut tree = self.tree.clone();
        if let Value::Object(map) = &mut tree {
            for key in SNAPSHOT_EXCLUDED_KEYS {
                map.remove(*key);
            }
        }
        tree
    }
}

fn merge_file(figment: Figment, path: &Path) -> Figment {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => figment.merge(Yaml::file(path)),
        _ => figment.merge(Json::file(path)),
    }
}
