//! Layered configuration loading with per-field provenance.
//!
//! The priority chain (later overrides earlier):
//! 1. Built-in defaults ([`PageChatConfig::default()`])
//! 2. User-level: `~/.pagechat/config.toml`
//! 3. Workspace-level: `./.pagechat/config.toml`
//! 4. An explicit file passed with `--config`
//! 5. `PAGECHAT_*` environment variables
//! 6. CLI flag overrides registered with [`ConfigLoader::with_override`]
//!
//! Each field in the final [`EffectiveConfig`] is annotated with the
//! [`ConfigSource`] that determined its value.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{PageChatConfig, CONFIG_FILENAME};
use crate::PageChatError;

/// Files larger than this are rejected outright.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    BuiltinDefault,
    UserFile(PathBuf),
    WorkspaceFile(PathBuf),
    ExplicitFile(PathBuf),
    EnvVar(String),
    CliFlag(String),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::BuiltinDefault => write!(f, "built-in default"),
            ConfigSource::UserFile(p) => write!(f, "user file: {}", p.display()),
            ConfigSource::WorkspaceFile(p) => write!(f, "workspace file: {}", p.display()),
            ConfigSource::ExplicitFile(p) => write!(f, "config file: {}", p.display()),
            ConfigSource::EnvVar(name) => write!(f, "env var: {name}"),
            ConfigSource::CliFlag(name) => write!(f, "CLI flag: {name}"),
        }
    }
}

/// The merged config plus provenance for each dotted field path.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub config: PageChatConfig,
    pub sources: BTreeMap<String, ConfigSource>,
    /// Config files that were found and merged, lowest priority first.
    pub source_files: Vec<PathBuf>,
}

impl EffectiveConfig {
    /// Source of a dotted field path such as `timing.poll_interval_ms`.
    ///
    /// Falls back to the closest recorded parent, then to the built-in default.
    pub fn source_of(&self, path: &str) -> ConfigSource {
        let mut key = path;
        loop {
            if let Some(source) = self.sources.get(key) {
                return source.clone();
            }
            match key.rfind('.') {
                Some(idx) => key = &key[..idx],
                None => return ConfigSource::BuiltinDefault,
            }
        }
    }
}

struct CliOverride {
    flag: String,
    path: &'static [&'static str],
    value: toml::Value,
}

/// Layered configuration loader.
#[derive(Default)]
pub struct ConfigLoader {
    user_config_path: Option<PathBuf>,
    workspace_config_path: Option<PathBuf>,
    explicit_path: Option<PathBuf>,
    skip_env: bool,
    overrides: Vec<CliOverride>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the user config file path.
    #[must_use]
    pub fn with_user_path(mut self, path: PathBuf) -> Self {
        self.user_config_path = Some(path);
        self
    }

    /// Override the workspace config file path.
    #[must_use]
    pub fn with_workspace_path(mut self, path: PathBuf) -> Self {
        self.workspace_config_path = Some(path);
        self
    }

    /// Merge an explicitly requested file. Unlike the implicit layers, it must exist.
    #[must_use]
    pub fn with_explicit_path(mut self, path: PathBuf) -> Self {
        self.explicit_path = Some(path);
        self
    }

    /// Ignore `PAGECHAT_*` environment variables.
    #[must_use]
    pub fn without_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Register a CLI flag value for the field at `path`.
    #[must_use]
    pub fn with_override(
        mut self,
        flag: &str,
        path: &'static [&'static str],
        value: impl Into<toml::Value>,
    ) -> Self {
        self.overrides.push(CliOverride {
            flag: flag.to_string(),
            path,
            value: value.into(),
        });
        self
    }

    /// Load and merge configuration from all sources.
    pub fn load(&self) -> Result<EffectiveConfig, PageChatError> {
        let mut sources = BTreeMap::new();
        let mut source_files = Vec::new();

        let mut merged = toml::Value::try_from(PageChatConfig::default())
            .map_err(|e| PageChatError::ConfigError(format!("failed to serialize defaults: {e}")))?;

        let user_path = self.user_config_path.clone().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            PathBuf::from(home).join(".pagechat").join(CONFIG_FILENAME)
        });
        if user_path.exists() {
            merge_file(&mut merged, &user_path, &mut sources, ConfigSource::UserFile(user_path.clone()))?;
            source_files.push(user_path);
        }

        let workspace_path = self
            .workspace_config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(".pagechat").join(CONFIG_FILENAME));
        if workspace_path.exists() {
            merge_file(
                &mut merged,
                &workspace_path,
                &mut sources,
                ConfigSource::WorkspaceFile(workspace_path.clone()),
            )?;
            source_files.push(workspace_path);
        }

        if let Some(path) = &self.explicit_path {
            if !path.exists() {
                return Err(PageChatError::ConfigError(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            merge_file(&mut merged, path, &mut sources, ConfigSource::ExplicitFile(path.clone()))?;
            source_files.push(path.clone());
        }

        if !self.skip_env {
            apply_env_overrides(&mut merged, &mut sources, |name| std::env::var(name).ok())?;
        }

        for o in &self.overrides {
            set_nested_value(&mut merged, o.path, o.value.clone());
            sources.insert(o.path.join("."), ConfigSource::CliFlag(o.flag.clone()));
        }

        let config: PageChatConfig = merged
            .try_into()
            .map_err(|e| PageChatError::ConfigError(format!("failed to parse merged config: {e}")))?;

        validate_config(&config)?;

        tracing::debug!(files = source_files.len(), "configuration loaded");

        Ok(EffectiveConfig {
            config,
            sources,
            source_files,
        })
    }
}

fn merge_file(
    merged: &mut toml::Value,
    path: &Path,
    sources: &mut BTreeMap<String, ConfigSource>,
    source: ConfigSource,
) -> Result<(), PageChatError> {
    let content = read_config_file(path)?;
    let layer: toml::Value = toml::from_str(&content).map_err(|e| {
        PageChatError::ConfigError(format!("invalid config {}: {e}", path.display()))
    })?;
    deep_merge(merged, &layer);
    record_sources(&layer, sources, &source, "");
    Ok(())
}

/// Read a config file with a size limit and a NUL-byte check.
fn read_config_file(path: &Path) -> Result<String, PageChatError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        PageChatError::ConfigError(format!("cannot read config file {}: {e}", path.display()))
    })?;

    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(PageChatError::ConfigError(format!(
            "config file {} exceeds maximum size of {} bytes (actual: {} bytes)",
            path.display(),
            MAX_CONFIG_FILE_SIZE,
            metadata.len()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        PageChatError::ConfigError(format!("cannot read config file {}: {e}", path.display()))
    })?;

    if content.contains('\0') {
        return Err(PageChatError::ConfigError(format!(
            "config file {} contains null bytes",
            path.display()
        )));
    }

    Ok(content)
}

/// Deep-merge `overlay` into `base`. Tables merge key by key; anything else is replaced.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Record `source` for every key in `layer`, using dot-separated paths.
fn record_sources(
    layer: &toml::Value,
    sources: &mut BTreeMap<String, ConfigSource>,
    source: &ConfigSource,
    prefix: &str,
) {
    if let toml::Value::Table(table) = layer {
        for (key, value) in table {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            sources.insert(path.clone(), source.clone());
            record_sources(value, sources, source, &path);
        }
    }
}

/// Known environment variable mappings.
pub struct EnvMapping {
    pub env_var: &'static str,
    /// Dot-separated TOML path segments.
    pub toml_path: &'static [&'static str],
}

/// All supported `PAGECHAT_*` variables. A double underscore marks nesting.
pub const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        env_var: "PAGECHAT_URL",
        toml_path: &["page", "url"],
    },
    EnvMapping {
        env_var: "PAGECHAT_PROXY",
        toml_path: &["browser", "proxy"],
    },
    EnvMapping {
        env_var: "PAGECHAT_STREAMING",
        toml_path: &["streaming"],
    },
    EnvMapping {
        env_var: "PAGECHAT_BROWSER__BINARY",
        toml_path: &["browser", "binary"],
    },
    EnvMapping {
        env_var: "PAGECHAT_BROWSER__HEADLESS",
        toml_path: &["browser", "headless"],
    },
    EnvMapping {
        env_var: "PAGECHAT_TIMING__FIRST_TOKEN_TIMEOUT_MS",
        toml_path: &["timing", "first_token_timeout_ms"],
    },
    EnvMapping {
        env_var: "PAGECHAT_TIMING__POLL_INTERVAL_MS",
        toml_path: &["timing", "poll_interval_ms"],
    },
    EnvMapping {
        env_var: "PAGECHAT_TIMING__KEY_DELAY_MS",
        toml_path: &["timing", "key_delay_ms"],
    },
    EnvMapping {
        env_var: "PAGECHAT_TIMING__STREAM_LIMIT_SECS",
        toml_path: &["timing", "stream_limit_secs"],
    },
];

/// Apply environment overrides, reading variables through `lookup`.
fn apply_env_overrides(
    merged: &mut toml::Value,
    sources: &mut BTreeMap<String, ConfigSource>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), PageChatError> {
    for mapping in ENV_MAPPINGS {
        if let Some(raw_value) = lookup(mapping.env_var) {
            validate_env_value(mapping.env_var, &raw_value)?;
            let value = env_value_to_toml(mapping.env_var, mapping.toml_path, &raw_value)?;
            set_nested_value(merged, mapping.toml_path, value);
            sources.insert(
                mapping.toml_path.join("."),
                ConfigSource::EnvVar(mapping.env_var.to_string()),
            );
        }
    }
    Ok(())
}

/// Reject NUL bytes and control characters other than whitespace.
fn validate_env_value(var_name: &str, value: &str) -> Result<(), PageChatError> {
    for ch in value.chars() {
        if ch.is_control() && ch != '\t' && ch != '\n' && ch != '\r' {
            return Err(PageChatError::ConfigError(format!(
                "environment variable {var_name} contains control character U+{:04X}",
                ch as u32
            )));
        }
    }
    Ok(())
}

/// Convert a raw environment string to a TOML value typed by the target field.
fn env_value_to_toml(
    env_var: &str,
    toml_path: &[&str],
    raw: &str,
) -> Result<toml::Value, PageChatError> {
    let last = toml_path.last().copied().unwrap_or("");

    if last == "streaming" || last == "headless" {
        return match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" => Ok(toml::Value::Boolean(false)),
            _ => Err(PageChatError::InvalidValue {
                field: env_var.to_string(),
                reason: format!("expected a boolean, got {raw:?}"),
            }),
        };
    }

    if last.ends_with("_ms") || last.ends_with("_secs") {
        let n: i64 = raw.trim().parse().map_err(|_| PageChatError::InvalidValue {
            field: env_var.to_string(),
            reason: format!("expected a non-negative integer, got {raw:?}"),
        })?;
        if n < 0 {
            return Err(PageChatError::InvalidValue {
                field: env_var.to_string(),
                reason: format!("expected a non-negative integer, got {raw:?}"),
            });
        }
        return Ok(toml::Value::Integer(n));
    }

    Ok(toml::Value::String(raw.to_string()))
}

/// Set a value at a nested path, creating intermediate tables as needed.
fn set_nested_value(root: &mut toml::Value, path: &[&str], value: toml::Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = root;
    for segment in parents {
        let toml::Value::Table(table) = current else {
            return;
        };
        current = table
            .entry(segment.to_string())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    if let toml::Value::Table(table) = current {
        table.insert(last.to_string(), value);
    }
}

/// Validate the merged configuration.
fn validate_config(config: &PageChatConfig) -> Result<(), PageChatError> {
    let url = url::Url::parse(&config.page.url).map_err(|e| PageChatError::InvalidValue {
        field: "page.url".into(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PageChatError::InvalidValue {
            field: "page.url".into(),
            reason: format!("scheme must be http or https, got {}", url.scheme()),
        });
    }

    if let Some(proxy) = &config.browser.proxy {
        url::Url::parse(proxy).map_err(|e| PageChatError::InvalidValue {
            field: "browser.proxy".into(),
            reason: format!("{proxy:?} is not a proxy URL: {e}"),
        })?;
    }

    if config.timing.poll_interval_ms == 0 {
        return Err(PageChatError::InvalidValue {
            field: "timing.poll_interval_ms".into(),
            reason: "must be greater than zero".into(),
        });
    }
    if config.timing.stream_limit_secs == Some(0) {
        return Err(PageChatError::InvalidValue {
            field: "timing.stream_limit_secs".into(),
            reason: "must be greater than zero; leave unset for no limit".into(),
        });
    }
    if config.timing.first_token_timeout_ms < config.timing.poll_interval_ms {
        return Err(PageChatError::InvalidValue {
            field: "timing.first_token_timeout_ms".into(),
            reason: "must be at least one poll interval".into(),
        });
    }

    let selectors = &config.selectors;
    for (field, value) in [
        ("selectors.prompt_input", &selectors.prompt_input),
        ("selectors.send_button", &selectors.send_button),
        ("selectors.assistant_message", &selectors.assistant_message),
        ("selectors.message_id_attribute", &selectors.message_id_attribute),
        ("selectors.composing_marker", &selectors.composing_marker),
        ("selectors.streaming_marker", &selectors.streaming_marker),
    ] {
        if value.trim().is_empty() {
            return Err(PageChatError::InvalidValue {
                field: field.into(),
                reason: "cannot be empty".into(),
            });
        }
    }

    Ok(())
}
