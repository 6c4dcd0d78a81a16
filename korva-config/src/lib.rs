//! Process-wide configuration: HTTP server port, SSDP timing, icon cache
//! location, D-Bus bus name. The host lease idle timeout is not
//! configurable — `korva_httpd::lease::FILE_SERVER_DEFAULT_TIMEOUT` is
//! fixed at 30s per spec.
//!
//! Scaled down from `pmoconfig`: no encryption module, no REST API (Korva's
//! IPC surface is out of scope for this crate) — just the embedded-YAML +
//! env-override + singleton pattern.

use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use serde_yaml::{Mapping, Value};

const DEFAULT_CONFIG: &str = include_str!("korva.yaml");
const ENV_CONFIG_DIR: &str = "KORVA_CONFIG";
const ENV_PREFIX: &str = "KORVA_CONFIG__";

const DEFAULT_HTTP_PORT: u16 = 4004;
const DEFAULT_SSDP_RESEND_SECS: u64 = 30;
const DEFAULT_SSDP_SEARCH_TIMEOUT_SECS: u64 = 3;

static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("failed to load Korva configuration"));

/// Returns the process-wide configuration singleton.
pub fn get_config() -> &'static Config {
    &CONFIG
}

#[derive(Debug)]
pub struct Config {
    config_dir: PathBuf,
    data: Mutex<Value>,
}

impl Config {
    fn find_config_dir() -> PathBuf {
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            return PathBuf::from(env_path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("korva")
    }

    fn load() -> Result<Self> {
        let config_dir = Self::find_config_dir();
        fs::create_dir_all(&config_dir)?;

        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        let override_path = config_dir.join("config.yaml");
        if let Ok(raw) = fs::read(&override_path) {
            let external: Value = serde_yaml::from_slice(&raw)?;
            merge_yaml(&mut value, &external);
        }
        apply_env_overrides(&mut value);

        Ok(Config {
            config_dir,
            data: Mutex::new(value),
        })
    }

    fn get_value(&self, path: &[&str]) -> Option<Value> {
        let data = self.data.lock().unwrap();
        get_value_internal(&data, path)
    }

    /// The D-Bus-style bus name Korva identifies itself under, matching the
    /// original implementation's error-domain prefix.
    pub fn bus_name(&self) -> String {
        match self.get_value(&["bus_name"]) {
            Some(Value::String(s)) => s,
            _ => "org.jensge.Korva".to_string(),
        }
    }

    pub fn http_port(&self) -> u16 {
        match self.get_value(&["http", "port"]) {
            Some(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap() as u16,
            _ => DEFAULT_HTTP_PORT,
        }
    }

    pub fn ssdp_resend_interval_secs(&self) -> u64 {
        match self.get_value(&["ssdp", "resend_interval_secs"]) {
            Some(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap(),
            _ => DEFAULT_SSDP_RESEND_SECS,
        }
    }

    pub fn ssdp_search_timeout_secs(&self) -> u64 {
        match self.get_value(&["ssdp", "search_timeout_secs"]) {
            Some(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap(),
            _ => DEFAULT_SSDP_SEARCH_TIMEOUT_SECS,
        }
    }

    /// Resolves (and creates) the icon cache directory. Relative paths in
    /// config are resolved against the platform cache dir, not `config_dir`.
    pub fn icon_cache_dir(&self) -> Result<PathBuf> {
        let configured = match self.get_value(&["cache", "icon_dir"]) {
            Some(Value::String(s)) => s,
            _ => "icons".to_string(),
        };
        let path = Path::new(&configured);
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("korva")
                .join(path)
        };
        fs::create_dir_all(&resolved)?;
        Ok(resolved)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

fn get_value_internal(data: &Value, path: &[&str]) -> Option<Value> {
    let mut current = data;
    for key in path {
        let map = current.as_mapping()?;
        current = map.get(&Value::String(key.to_string()))?;
    }
    Some(current.clone())
}

fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

fn apply_env_overrides(config: &mut Value) {
    for (key, value) in env::vars() {
        if let Some(rest) = key.strip_prefix(ENV_PREFIX) {
            let path: Vec<&str> = rest.split("__").collect();
            let yaml_value = serde_yaml::from_str::<Value>(&value)
                .unwrap_or_else(|_| Value::String(value.clone()));
            set_value_internal(config, &path, yaml_value);
        }
    }
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) {
    if path.is_empty() {
        *data = value;
        return;
    }
    if !matches!(data, Value::Mapping(_)) {
        *data = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(map) = data {
        let key = Value::String(path[0].to_lowercase());
        if path.len() == 1 {
            map.insert(key, value);
        } else {
            let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
            set_value_internal(entry, &path[1..], value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_and_apply() {
        let value: Value = serde_yaml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(
            get_value_internal(&value, &["bus_name"]),
            Some(Value::String("org.jensge.Korva".to_string()))
        );
    }

    #[test]
    fn merge_keeps_unset_defaults_and_overrides_set_ones() {
        let mut default: Value = serde_yaml::from_str(DEFAULT_CONFIG).unwrap();
        let external: Value = serde_yaml::from_str("http:\n  port: 9000\n").unwrap();
        merge_yaml(&mut default, &external);

        assert_eq!(
            get_value_internal(&default, &["http", "port"]),
            Some(Value::Number(9000.into()))
        );
        assert_eq!(
            get_value_internal(&default, &["ssdp", "resend_interval_secs"]),
            Some(Value::Number(30.into()))
        );
    }

    #[test]
    fn env_override_sets_nested_path() {
        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG).unwrap();
        set_value_internal(&mut value, &["http", "port"], Value::Number(9999.into()));
        assert_eq!(
            get_value_internal(&value, &["http", "port"]),
            Some(Value::Number(9999.into()))
        );
    }
}
