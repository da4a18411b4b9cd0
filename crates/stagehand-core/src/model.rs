use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constants::env;

/// Substitution parameters handed to task rendering.
pub type Params = serde_json::Map<String, Value>;

/// Environment variables exported to job scripts.
pub type EnvVars = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Prolog,
    Cycles,
    Epilog,
}

impl Stage {
    /// Stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Prolog, Stage::Cycles, Stage::Epilog];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prolog => "prolog",
            Stage::Cycles => "cycles",
            Stage::Epilog => "epilog",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStageError(pub String);

impl fmt::Display for ParseStageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid stage: '{}'. Valid values are: prolog, cycles, epilog",
            self.0
        )
    }
}

impl std::error::Error for ParseStageError {}

impl FromStr for Stage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prolog" => Ok(Stage::Prolog),
            "cycles" => Ok(Stage::Cycles),
            "epilog" => Ok(Stage::Epilog),
            _ => Err(ParseStageError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerType {
    #[default]
    Background,
    Slurm,
    Pbspro,
}

impl SchedulerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerType::Background => "background",
            SchedulerType::Slurm => "slurm",
            SchedulerType::Pbspro => "pbspro",
        }
    }

    pub fn is_batch(&self) -> bool {
        !matches!(self, SchedulerType::Background)
    }
}

impl fmt::Display for SchedulerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSchedulerTypeError(pub String);

impl fmt::Display for ParseSchedulerTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid scheduler type: '{}'. Valid values are: background, slurm, pbspro",
            self.0
        )
    }
}

impl std::error::Error for ParseSchedulerTypeError {}

impl FromStr for SchedulerType {
    type Err = ParseSchedulerTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "background" => Ok(SchedulerType::Background),
            "slurm" => Ok(SchedulerType::Slurm),
            "pbspro" => Ok(SchedulerType::Pbspro),
            _ => Err(ParseSchedulerTypeError(s.to_string())),
        }
    }
}

/// Render a parameter value the way it is exported to a shell.
pub fn value_to_env_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => (*b as u8).to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Convert parameters to `STAGEHAND_<KEY>` environment variables.
///
/// When `select` is given, only those keys are exported.
pub fn params_to_env_vars(params: &Params, select: Option<&[&str]>) -> EnvVars {
    params
        .iter()
        .filter(|(key, _)| select.is_none_or(|keys| keys.contains(&key.as_str())))
        .map(|(key, value)| {
            (
                format!("{}{}", env::PREFIX, key.to_uppercase()),
                value_to_env_string(value),
            )
        })
        .collect()
}
