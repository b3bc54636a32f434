//! JSON-path configuration accessor.
//!
//! Paths are dot-separated object keys, each optionally followed by one or
//! more `[index]` suffixes: `job.content[0].reader.name`.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

/// Well-known configuration paths.
pub mod keys {
    pub const JOB_ID: &str = "core.container.job.id";
    pub const TASK_GROUP_ID: &str = "core.container.taskGroup.id";
    pub const JOB_SLEEP_INTERVAL: &str = "core.container.job.sleepInterval";
    pub const TASK_FAILOVER_MAX_RETRY_TIMES: &str = "core.container.task.failover.maxRetryTimes";
    // 以前は retry interval を MAX_RETRY_TIMES のパスから読んでいた。別パスで読むこと。
    pub const TASK_FAILOVER_RETRY_INTERVAL_IN_MSEC: &str =
        "core.container.task.failover.retryIntervalInMsec";
    pub const TASK_GROUP_MAX_WORKER_NUMBER: &str = "core.container.taskGroup.maxWorkerNumber";
    pub const JOB_CONTENT: &str = "job.content";

    pub const TASK_ID: &str = "taskId";
    pub const READER_NAME: &str = "reader.name";
    pub const READER_PARAMETER: &str = "reader.parameter";
    pub const WRITER_NAME: &str = "writer.name";
    pub const WRITER_PARAMETER: &str = "writer.parameter";
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config path not found: {0}")]
    NotFound(String),

    #[error("config path {path} is not a {expected}")]
    TypeMismatch { path: String, expected: &'static str },

    #[error("invalid config path: {0}")]
    InvalidPath(String),

    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<Segment>, ConfigError> {
    let invalid = || ConfigError::InvalidPath(path.to_string());
    let mut segments = Vec::new();
    if path.is_empty() {
        return Ok(segments);
    }
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => part.split_at(pos),
            None => (part, ""),
        };
        if key.is_empty() {
            return Err(invalid());
        }
        segments.push(Segment::Key(key.to_string()));
        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(invalid)?;
            if !rest.starts_with('[') {
                return Err(invalid());
            }
            let index = rest[1..close].parse::<usize>().map_err(|_| invalid())?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
        }
    }
    Ok(segments)
}

/// Immutable-by-convention view over a JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    root: Value,
}

impl Config {
    pub fn empty() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments = parse_path(path).ok()?;
        let mut current = &self.root;
        for segment in &segments {
            current = match segment {
                Segment::Key(key) => current.get(key.as_str())?,
                Segment::Index(index) => current.get(*index)?,
            };
        }
        Some(current)
    }

    fn require(&self, path: &str) -> Result<&Value, ConfigError> {
        parse_path(path)?;
        self.get(path)
            .filter(|v| !v.is_null())
            .ok_or_else(|| ConfigError::NotFound(path.to_string()))
    }

    pub fn get_config(&self, path: &str) -> Result<Config, ConfigError> {
        let value = self.require(path)?;
        if !value.is_object() {
            return Err(ConfigError::TypeMismatch {
                path: path.to_string(),
                expected: "object",
            });
        }
        Ok(Config::from_value(value.clone()))
    }

    /// Like [`Config::get_config`] but a missing path yields an empty object.
    pub fn get_config_or_empty(&self, path: &str) -> Result<Config, ConfigError> {
        match self.get_config(path) {
            Err(ConfigError::NotFound(_)) => Ok(Config::empty()),
            other => other,
        }
    }

    pub fn get_configs(&self, path: &str) -> Result<Vec<Config>, ConfigError> {
        let value = self.require(path)?;
        let items = value.as_array().ok_or_else(|| ConfigError::TypeMismatch {
            path: path.to_string(),
            expected: "array",
        })?;
        Ok(items.iter().cloned().map(Config::from_value).collect())
    }

    pub fn get_string(&self, path: &str) -> Result<String, ConfigError> {
        let value = self.require(path)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ConfigError::TypeMismatch {
                path: path.to_string(),
                expected: "string",
            })
    }

    /// Reads an integer. Numeric strings are accepted as well.
    pub fn get_int64(&self, path: &str) -> Result<i64, ConfigError> {
        let value = self.require(path)?;
        let parsed = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| ConfigError::TypeMismatch {
            path: path.to_string(),
            expected: "int64",
        })
    }

    pub fn get_bool(&self, path: &str) -> Result<bool, ConfigError> {
        let value = self.require(path)?;
        value.as_bool().ok_or_else(|| ConfigError::TypeMismatch {
            path: path.to_string(),
            expected: "bool",
        })
    }

    /// Missing paths fall back to `default`; present but mistyped values are errors.
    pub fn get_int64_or_default(&self, path: &str, default: i64) -> Result<i64, ConfigError> {
        match self.get_int64(path) {
            Err(ConfigError::NotFound(_)) => Ok(default),
            other => other,
        }
    }

    pub fn get_string_or_default(&self, path: &str, default: &str) -> Result<String, ConfigError> {
        match self.get_string(path) {
            Err(ConfigError::NotFound(_)) => Ok(default.to_string()),
            other => other,
        }
    }

    /// Writes `value` at `path`, creating intermediate objects as needed.
    /// Array indices must already exist.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let segments = parse_path(path)?;
        let Some((last, parents)) = segments.split_last() else {
            self.root = value.into();
            return Ok(());
        };

        let mut current = &mut self.root;
        for segment in parents {
            current = match segment {
                Segment::Key(key) => {
                    if !current.is_object() {
                        *current = Value::Object(Map::new());
                    }
                    current
                        .as_object_mut()
                        .ok_or_else(|| ConfigError::InvalidPath(path.to_string()))?
                        .entry(key.clone())
                        .or_insert_with(|| Value::Object(Map::new()))
                }
                Segment::Index(index) => current
                    .get_mut(*index)
                    .ok_or_else(|| ConfigError::NotFound(path.to_string()))?,
            };
        }

        match last {
            Segment::Key(key) => {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::InvalidPath(path.to_string()))?
                    .insert(key.clone(), value.into());
            }
            Segment::Index(index) => {
                let slot = current
                    .get_mut(*index)
                    .ok_or_else(|| ConfigError::NotFound(path.to_string()))?;
                *slot = value.into();
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_value(serde_json::from_str(s)?))
    }
}

impl From<Value> for Config {
    fn from(root: Value) -> Self {
        Self::from_value(root)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}
