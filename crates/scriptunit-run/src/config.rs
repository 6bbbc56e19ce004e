use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use scriptunit::{LineNo, Value};
use serde::Deserialize;

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ConfigError {
    #[error("failed to read configuration `{}`", .path.display())]
    #[diagnostic(code(scriptunit_run::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration `{}`", .path.display())]
    #[diagnostic(code(scriptunit_run::config::parse), help("see `scriptunit --help` for the supported keys"))]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Settings read from `config.toml`, then overridden by the environment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Install the line probe.
    pub debug: bool,
    /// `EnvFilter` directives used when `RUST_LOG` is not set.
    pub log_level: String,
    pub search_paths: Vec<PathBuf>,
    pub breakpoints: Vec<LineNo>,
    pub globals: toml::Table,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "warn".to_string(),
            search_paths: Vec::new(),
            breakpoints: Vec::new(),
            globals: toml::Table::new(),
        }
    }
}

/// `SCRIPTUNIT_CONFIG_DIR`, else the platform configuration directory.
pub fn config_dir() -> Option<PathBuf> {
    env::var_os("SCRIPTUNIT_CONFIG_DIR")
        .map(PathBuf::from)
        .or_else(|| dirs::config_dir().map(|d| d.join("scriptunit")))
}

impl Config {
    /// Reads `path`, or the default file when `path` is `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match config_dir().map(|dir| dir.join(CONFIG_FILE)) {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| env::var(key).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(log_level) = lookup("SCRIPTUNIT_LOG_LEVEL") {
            self.log_level = log_level;
        }

        if let Some(debug) = lookup("SCRIPTUNIT_DEBUG") {
            match debug.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.debug = true,
                "0" | "false" | "no" | "off" => self.debug = false,
                _ => eprintln!(
                    "Warning: Invalid SCRIPTUNIT_DEBUG value '{}', keeping {}",
                    debug, self.debug
                ),
            }
        }
    }

    /// The `[globals]` table as script bindings.
    pub fn globals(&self) -> Vec<(String, Value)> {
        self.globals
            .iter()
            .map(|(name, value)| (name.clone(), to_value(value)))
            .collect()
    }
}

fn to_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(n) => Value::Integer(*n),
        toml::Value::Float(n) => Value::Number(*n),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::List(items.iter().map(to_value).collect()),
        toml::Value::Table(table) => Value::Table(
            table
                .iter()
                .map(|(key, item)| (key.clone(), to_value(item)))
                .collect(),
        ),
    }
}
