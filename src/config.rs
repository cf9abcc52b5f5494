//! Run configuration: `adapt.inp` and the solver's opaque input tables.
//!
//! `adapt.inp` holds one `keyword value` pair per line; `#` starts a comment.
//! Every keyword has a default, unknown keywords are logged and ignored.
//!
//! The loop never edits a configuration in place. [`AdaptConfig::for_step`]
//! derives the settings of the next iteration from the loaded ones, so every
//! iteration's effective configuration is a plain value.

use crate::loop_error::LoopError;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Adaptation strategy requested from the adaptation engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdaptStrategy {
    /// Initial setup; no error-based adaptation.
    Initial,
    /// Target sizes derived from the solver's error field.
    ErrorField,
    /// Target sizes taken directly from the size estimator.
    SizeField,
}

impl FromStr for AdaptStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" | "initial" => Ok(AdaptStrategy::Initial),
            "1" | "error" => Ok(AdaptStrategy::ErrorField),
            "2" | "size" => Ok(AdaptStrategy::SizeField),
            other => Err(format!("unknown adapt strategy `{other}`")),
        }
    }
}

/// When the driver runs adaptation after a solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdaptTrigger {
    /// Every iteration with `0 < step < max`.
    Always,
    /// Only when the quality gate reports an inadequate mesh.
    QualityGated,
}

impl FromStr for AdaptTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" | "1" => Ok(AdaptTrigger::Always),
            "quality" | "0" => Ok(AdaptTrigger::QualityGated),
            other => Err(format!("unknown adapt trigger `{other}`")),
        }
    }
}

impl fmt::Display for AdaptTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdaptTrigger::Always => write!(f, "always"),
            AdaptTrigger::QualityGated => write!(f, "quality"),
        }
    }
}

/// Adaptation configuration loaded from `adapt.inp`.
#[derive(Clone, Debug, PartialEq)]
pub struct AdaptConfig {
    /// Partition split factor applied during preprocessing.
    pub split_factor: u32,
    /// Convert mixed elements to simplices during preprocessing.
    pub tetrahedronize: bool,
    pub adapt_strategy: AdaptStrategy,
    /// Adaptation requested for this iteration.
    pub adapt_flag: bool,
    /// Quality gate threshold on `meshQ`.
    pub mesh_quality_threshold: f64,
    /// Time step the configuration refers to.
    pub time_step_number: u32,
    /// Reference to the geometric attribute file.
    pub attribute_file_name: String,
    /// Write geometry files during preprocessing.
    pub write_geom_bc_files: bool,
    /// Carry solution fields through adaptation.
    pub solution_migration: bool,
    pub adapt_trigger: AdaptTrigger,
    /// Prefix of sequence checkpoints.
    pub checkpoint_prefix: String,
    /// Directory receiving checkpoints.
    pub checkpoint_dir: PathBuf,
    /// Initial mesh file (rank pieces use `<name>.rank<r>.json`).
    pub mesh_file_name: String,
    /// Step of the restart payload handed back by the last solve.
    pub restart_step: Option<u32>,
}

impl Default for AdaptConfig {
    fn default() -> Self {
        Self {
            split_factor: 1,
            tetrahedronize: false,
            adapt_strategy: AdaptStrategy::Initial,
            adapt_flag: false,
            mesh_quality_threshold: 0.2,
            time_step_number: 0,
            attribute_file_name: String::new(),
            write_geom_bc_files: true,
            solution_migration: true,
            adapt_trigger: AdaptTrigger::Always,
            checkpoint_prefix: "test_".to_string(),
            checkpoint_dir: PathBuf::from("."),
            mesh_file_name: "mesh.json".to_string(),
            restart_step: None,
        }
    }
}

fn parse_value<T: FromStr>(location: &str, key: &str, raw: &str) -> Result<T, LoopError>
where
    T::Err: fmt::Display,
{
    raw.parse::<T>().map_err(|e| LoopError::ConfigParse {
        location: location.to_string(),
        message: format!("invalid value `{raw}` for {key}: {e}"),
    })
}

fn parse_flag(location: &str, key: &str, raw: &str) -> Result<bool, LoopError> {
    match raw {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(LoopError::ConfigParse {
            location: location.to_string(),
            message: format!("invalid flag `{raw}` for {key}"),
        }),
    }
}

impl AdaptConfig {
    /// Parse `adapt.inp` contents. `origin` names the source in errors.
    pub fn parse(text: &str, origin: &str) -> Result<Self, LoopError> {
        let mut cfg = AdaptConfig::default();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let location = format!("{origin}:{}", lineno + 1);
            let (key, value) = line
                .split_once(char::is_whitespace)
                .map(|(k, v)| (k, v.trim()))
                .ok_or_else(|| LoopError::ConfigParse {
                    location: location.clone(),
                    message: format!("missing value for `{line}`"),
                })?;
            match key {
                "splitFactor" => cfg.split_factor = parse_value(&location, key, value)?,
                "tetrahedronize" => cfg.tetrahedronize = parse_flag(&location, key, value)?,
                "adaptStrategy" => cfg.adapt_strategy = parse_value(&location, key, value)?,
                "adaptFlag" => cfg.adapt_flag = parse_flag(&location, key, value)?,
                "meshqCrtn" => cfg.mesh_quality_threshold = parse_value(&location, key, value)?,
                "timeStepNumber" => cfg.time_step_number = parse_value(&location, key, value)?,
                "attributeFileName" => cfg.attribute_file_name = value.to_string(),
                "writeGeomBCFiles" => cfg.write_geom_bc_files = parse_flag(&location, key, value)?,
                "solutionMigration" => cfg.solution_migration = parse_flag(&location, key, value)?,
                "adaptTrigger" => cfg.adapt_trigger = parse_value(&location, key, value)?,
                "checkpointPrefix" => cfg.checkpoint_prefix = value.to_string(),
                "checkpointDir" => cfg.checkpoint_dir = PathBuf::from(value),
                "meshFileName" => cfg.mesh_file_name = value.to_string(),
                other => log::warn!("{location}: ignoring unknown keyword `{other}`"),
            }
        }
        if cfg.split_factor == 0 {
            return Err(LoopError::ConfigParse {
                location: origin.to_string(),
                message: "splitFactor must be positive".into(),
            });
        }
        Ok(cfg)
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoopError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| LoopError::ConfigParse {
            location: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Configuration for the iteration following a solve that ended at `step`.
    ///
    /// Re-splitting and tetrahedronization are always off after the initial
    /// load. Once `step > 0` the run switches to error-based adaptation and
    /// stops writing geometry files.
    pub fn for_step(&self, step: u32) -> AdaptConfig {
        let mut next = self.clone();
        next.split_factor = 1;
        next.tetrahedronize = false;
        next.time_step_number = step;
        if step > 0 {
            next.adapt_strategy = AdaptStrategy::ErrorField;
            next.adapt_flag = true;
            next.write_geom_bc_files = false;
        }
        next
    }

    /// Record the restart payload handed back by the solver.
    pub fn with_restart(&self, step: u32) -> AdaptConfig {
        AdaptConfig {
            restart_step: Some(step),
            ..self.clone()
        }
    }
}

/// Opaque solver input assembled from `solver.inp` over `input.config`.
///
/// Both files hold `Key Name: value` lines. Keys in `solver.inp` override the
/// defaults from `input.config`. The loop never interprets the table; it only
/// hands it to the solver.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolverInput {
    entries: BTreeMap<String, String>,
}

impl SolverInput {
    fn parse_into(
        entries: &mut BTreeMap<String, String>,
        text: &str,
        origin: &str,
    ) -> Result<(), LoopError> {
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| LoopError::ConfigParse {
                location: format!("{origin}:{}", lineno + 1),
                message: format!("expected `key: value`, found `{line}`"),
            })?;
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(())
    }

    /// Parse from in-memory texts; `defaults` is `input.config`.
    pub fn parse(user: &str, defaults: &str) -> Result<Self, LoopError> {
        let mut entries = BTreeMap::new();
        Self::parse_into(&mut entries, defaults, "input.config")?;
        Self::parse_into(&mut entries, user, "solver.inp")?;
        Ok(Self { entries })
    }

    /// Load `solver.inp` and `input.config`. A missing `input.config` is
    /// treated as empty.
    pub fn load(user: impl AsRef<Path>, defaults: impl AsRef<Path>) -> Result<Self, LoopError> {
        let user = user.as_ref();
        let user_text = std::fs::read_to_string(user).map_err(|e| LoopError::ConfigParse {
            location: user.display().to_string(),
            message: e.to_string(),
        })?;
        let defaults_text = match std::fs::read_to_string(defaults.as_ref()) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        Self::parse(&user_text, &defaults_text)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Typed lookup; `Ok(None)` when the key is absent.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, LoopError>
    where
        T::Err: fmt::Display,
    {
        self.get(key)
            .map(|raw| parse_value("solver input", key, raw))
            .transpose()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
