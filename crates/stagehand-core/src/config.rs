use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::cycles::{self, Cycle, CycleSpec};
use crate::ensemble::{self, Member};
use crate::errors::ConfigError;
use crate::graph::{SequenceDecl, TaskGraph};
use crate::model::{Params, Stage};
use crate::pages::PageSelection;

fn default_true() -> bool {
    true
}

fn default_max_files() -> usize {
    10
}

fn default_max_age_days() -> u64 {
    7
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_age_days: default_max_age_days(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub name: Option<String>,
    pub conf: Option<String>,
    pub exp: Option<String>,
}

impl AppConfig {
    /// Non-empty parts of `name/conf/exp`, in that order.
    pub fn path_parts(&self) -> Vec<&str> {
        [&self.name, &self.conf, &self.exp]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .filter(|part| !part.is_empty())
            .collect()
    }

    pub fn params(&self) -> Params {
        let mut params = Params::new();
        for (key, value) in [("name", &self.name), ("conf", &self.conf), ("exp", &self.exp)] {
            params.insert(
                format!("app_{}", key),
                value.clone().map(Value::String).unwrap_or(Value::Null),
            );
        }
        params
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CyclesConfig {
    pub begin_date: Option<String>,
    pub end_date: Option<String>,
    pub freq: Option<String>,
    pub ncycles: Option<u32>,
    pub round: Option<String>,
    #[serde(default = "default_true")]
    pub as_intervals: bool,
    #[serde(default)]
    pub indep: bool,
}

impl Default for CyclesConfig {
    fn default() -> Self {
        Self {
            begin_date: None,
            end_date: None,
            freq: None,
            ncycles: None,
            round: None,
            as_intervals: true,
            indep: false,
        }
    }
}

impl CyclesConfig {
    pub fn spec(&self) -> CycleSpec {
        CycleSpec {
            begin_date: self.begin_date.clone(),
            end_date: self.end_date.clone(),
            freq: self.freq.clone(),
            ncycles: self.ncycles,
            round: self.round.clone(),
            as_intervals: self.as_intervals,
        }
    }

    pub fn params(&self) -> Params {
        let opt = |v: &Option<String>| v.clone().map(Value::String).unwrap_or(Value::Null);
        let mut params = Params::new();
        params.insert("cycles_begin_date".into(), opt(&self.begin_date));
        params.insert("cycles_end_date".into(), opt(&self.end_date));
        params.insert("cycles_freq".into(), opt(&self.freq));
        params.insert(
            "cycles_ncycles".into(),
            self.ncycles.map(Value::from).unwrap_or(Value::Null),
        );
        params.insert("cycles_round".into(), opt(&self.round));
        params.insert("cycles_as_intervals".into(), Value::Bool(self.as_intervals));
        params.insert("cycles_indep".into(), Value::Bool(self.indep));
        params
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnsembleConfig {
    pub size: Option<usize>,
    pub skip: Option<String>,
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub iters: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequenceConfig {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StagesConfig {
    #[serde(default)]
    pub prolog: Vec<SequenceConfig>,
    #[serde(default)]
    pub cycles: Vec<SequenceConfig>,
    #[serde(default)]
    pub epilog: Vec<SequenceConfig>,
}

impl StagesConfig {
    pub fn get(&self, stage: Stage) -> &[SequenceConfig] {
        match stage {
            Stage::Prolog => &self.prolog,
            Stage::Cycles => &self.cycles,
            Stage::Epilog => &self.epilog,
        }
    }
}

/// The `[params]` table: free scalars plus per-task and per-host tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParamsConfig {
    #[serde(default)]
    pub tasks: BTreeMap<String, Params>,
    #[serde(default)]
    pub hosts: BTreeMap<String, Params>,
    #[serde(flatten)]
    pub values: Params,
}

/// Drop nested tables, keeping scalars and arrays.
pub fn scalars(params: &Params) -> Params {
    params
        .iter()
        .filter(|(_, value)| !value.is_object())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub cycles: CyclesConfig,
    #[serde(default)]
    pub ensemble: EnsembleConfig,
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub stages: StagesConfig,
    #[serde(default)]
    pub params: ParamsConfig,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Values given on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub app_name: Option<String>,
    pub app_conf: Option<String>,
    pub app_exp: Option<String>,
    pub begin_date: Option<String>,
    pub end_date: Option<String>,
    pub freq: Option<String>,
    pub ncycles: Option<u32>,
}

pub fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = fs_err::read_to_string(path).map_err(|source| ConfigError::PathIo {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

impl WorkflowConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: WorkflowConfig = load_toml(path)?;
        config.validate()?;
        tracing::debug!("Loaded workflow configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for stage in Stage::ALL {
            let mut names: Vec<&str> = Vec::new();
            for sequence in self.stages.get(stage) {
                if names.contains(&sequence.name.as_str()) {
                    return Err(ConfigError::General(format!(
                        "sequence '{}' is declared twice in stage '{}'",
                        sequence.name, stage
                    )));
                }
                names.push(&sequence.name);
            }
        }
        if let Some(skip) = &self.ensemble.skip {
            skip.parse::<PageSelection>()?;
        }
        Ok(())
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        let set = |target: &mut Option<String>, value: &Option<String>| {
            if value.is_some() {
                target.clone_from(value);
            }
        };
        set(&mut self.app.name, &overrides.app_name);
        set(&mut self.app.conf, &overrides.app_conf);
        set(&mut self.app.exp, &overrides.app_exp);
        set(&mut self.cycles.begin_date, &overrides.begin_date);
        set(&mut self.cycles.end_date, &overrides.end_date);
        set(&mut self.cycles.freq, &overrides.freq);
        if overrides.ncycles.is_some() {
            self.cycles.ncycles = overrides.ncycles;
        }
    }

    pub fn task_graph(&self) -> TaskGraph {
        let stages = Stage::ALL
            .iter()
            .map(|stage| {
                let decls = self
                    .stages
                    .get(*stage)
                    .iter()
                    .map(|s| SequenceDecl {
                        name: s.name.clone(),
                        tokens: s.tasks.clone(),
                    })
                    .collect();
                (*stage, decls)
            })
            .collect();
        let groups: HashMap<String, Vec<String>> = self
            .groups
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        TaskGraph::new(stages, groups)
    }

    /// Cycles of the workflow. Without any cycles stage, there is none.
    pub fn gen_cycles(&self) -> Result<Vec<Cycle>, ConfigError> {
        if self.stages.cycles.iter().all(|s| s.tasks.is_empty()) {
            return Ok(Vec::new());
        }
        cycles::gen_cycles(&self.cycles.spec())
    }

    pub fn gen_members(&self) -> Result<Vec<Member>, ConfigError> {
        let skip = self
            .ensemble
            .skip
            .as_deref()
            .map(str::parse::<PageSelection>)
            .transpose()?;
        ensemble::gen_ensemble(self.ensemble.size, skip.as_ref(), &self.ensemble.iters)
    }
}
