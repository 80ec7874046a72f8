//! INI file configuration adapter, with an environment-variable overlay.

use crate::domain::error::SticklabError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::collections::HashMap;
use std::path::Path;

pub const ENV_PREFIX: &str = "STICKLAB_";

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SticklabError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| SticklabError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, SticklabError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| SticklabError::ConfigParse {
                file: "<string>".into(),
                reason,
            })?;
        Ok(Self { config })
    }

    /// No file: every lookup falls through to its default.
    pub fn empty() -> Self {
        Self { config: Ini::new() }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(default)
    }
}

/// Lets `STICKLAB_<SECTION>_<KEY>` variables override any inner config.
///
/// Variables are captured once at construction. A variable that does not
/// parse as the requested type is ignored.
pub struct EnvOverlay<C> {
    inner: C,
    vars: HashMap<String, String>,
}

impl<C: ConfigPort> EnvOverlay<C> {
    pub fn from_env(inner: C) -> Self {
        Self::with_vars(inner, std::env::vars())
    }

    pub fn with_vars<I>(inner: C, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars = vars
            .into_iter()
            .filter(|(name, _)| name.starts_with(ENV_PREFIX))
            .collect();
        Self { inner, vars }
    }

    pub fn var_name(section: &str, key: &str) -> String {
        format!("{ENV_PREFIX}{section}_{key}").to_uppercase()
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&str> {
        self.vars
            .get(&Self::var_name(section, key))
            .map(String::as_str)
    }
}

impl<C: ConfigPort> ConfigPort for EnvOverlay<C> {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        match self.lookup(section, key) {
            Some(value) => Some(value.to_string()),
            None => self.inner.get_string(section, key),
        }
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.lookup(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_else(|| self.inner.get_int(section, key, default))
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.lookup(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_else(|| self.inner.get_double(section, key, default))
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.lookup(section, key)
            .and_then(parse_bool)
            .unwrap_or_else(|| self.inner.get_bool(section, key, default))
    }
}
