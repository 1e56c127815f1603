use crate::catalog::CatalogFormat;
use crate::factorial::{FactorAxis, ParameterGroup, ParameterValues};
use crate::naming::NamingStrategy;
use crate::paths::PathLayout;
use crate::pipeline::PipelineError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_GUESS_PATH: &str = "guess";

#[derive(Debug, Deserialize)]
struct RawRunConfig {
    insfiles: Vec<String>,
    #[serde(default)]
    pfts: Vec<String>,
    #[serde(default)]
    parameters: BTreeMap<String, toml::Value>,
    #[serde(default)]
    full_factorial: bool,
    #[serde(default)]
    dry_run: bool,
    #[serde(default = "default_run_local")]
    run_local: bool,
    #[serde(default)]
    parallel: bool,
    cpu_count: u16,
    #[serde(default)]
    cpu_affinity: bool,
    #[serde(default)]
    memory: Option<u32>,
    #[serde(default)]
    walltime: Option<String>,
    #[serde(default)]
    queue: Option<String>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    email_notifications: bool,
    #[serde(default)]
    email_address: Option<String>,
    #[serde(default)]
    job_name: Option<String>,
    output_directory: String,
    #[serde(default)]
    guess_path: Option<String>,
    input_module: String,
    #[serde(default)]
    naming: Option<String>,
    #[serde(default)]
    layout: Option<String>,
    #[serde(default)]
    catalog_format: Option<String>,
}

fn default_run_local() -> bool {
    true
}

/// Cluster submission settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbsSettings {
    pub job_name: String,
    pub memory_gb: u32,
    pub walltime: Duration,
    pub queue: String,
    pub project: String,
    pub email_notifications: bool,
    pub email_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerSettings {
    Local,
    Pbs(PbsSettings),
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub insfiles: Vec<PathBuf>,
    pub pfts: Vec<String>,
    pub factors: Vec<FactorAxis>,
    pub full_factorial: bool,
    pub dry_run: bool,
    pub parallel: bool,
    pub cpu_count: u16,
    /// Pin each local job to its own CPU.
    pub cpu_affinity: bool,
    pub output_directory: PathBuf,
    pub guess_path: PathBuf,
    pub input_module: String,
    pub naming: NamingStrategy,
    pub layout: PathLayout,
    pub catalog_format: CatalogFormat,
    pub runner: RunnerSettings,
}

impl RunConfig {
    /// Parses a run configuration; relative paths are resolved against
    /// `base_dir`.
    pub fn parse(toml_src: &str, base_dir: &Path) -> Result<Self, PipelineError> {
        let raw: RawRunConfig = toml::from_str(toml_src)
            .map_err(|err| PipelineError::Config(format!("invalid config: {err}")))?;

        if raw.insfiles.is_empty() {
            return Err(PipelineError::Config(
                "insfiles must list at least one instruction file".to_string(),
            ));
        }
        if raw.cpu_count == 0 {
            return Err(PipelineError::Config("cpu_count must be at least 1".to_string()));
        }

        let runner = if raw.run_local {
            RunnerSettings::Local
        } else {
            RunnerSettings::Pbs(parse_pbs(&raw)?)
        };

        let guess_path = match raw.guess_path.as_deref() {
            None => PathBuf::from(DEFAULT_GUESS_PATH),
            Some(path) if path.contains(std::path::MAIN_SEPARATOR) || path.contains('/') => {
                resolve(base_dir, path)
            }
            Some(path) => PathBuf::from(path),
        };

        Ok(RunConfig {
            insfiles: raw
                .insfiles
                .iter()
                .map(|path| resolve(base_dir, path))
                .collect(),
            pfts: raw.pfts.clone(),
            factors: parse_factors(&raw.parameters)?,
            full_factorial: raw.full_factorial,
            dry_run: raw.dry_run,
            parallel: raw.parallel,
            cpu_count: raw.cpu_count,
            cpu_affinity: raw.cpu_affinity,
            output_directory: resolve(base_dir, &raw.output_directory),
            guess_path,
            input_module: raw.input_module.clone(),
            naming: parse_choice(raw.naming.as_deref())?,
            layout: parse_choice(raw.layout.as_deref())?,
            catalog_format: parse_choice(raw.catalog_format.as_deref())?,
            runner,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let src = fs::read_to_string(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => PipelineError::NotFound(path.to_path_buf()),
            _ => PipelineError::Io(err),
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&src, base_dir)
    }

    pub fn run_local(&self) -> bool {
        matches!(self.runner, RunnerSettings::Local)
    }
}

fn parse_choice<T>(value: Option<&str>) -> Result<T, PipelineError>
where
    T: FromStr<Err = String> + Default,
{
    match value {
        Some(value) => T::from_str(value).map_err(PipelineError::Config),
        None => Ok(T::default()),
    }
}

fn parse_pbs(raw: &RawRunConfig) -> Result<PbsSettings, PipelineError> {
    let email_address = raw
        .email_address
        .as_ref()
        .filter(|address| !address.trim().is_empty())
        .cloned();
    if raw.email_notifications && email_address.is_none() {
        return Err(PipelineError::Config(
            "email_address is required when email_notifications is enabled".to_string(),
        ));
    }
    let walltime = raw
        .walltime
        .as_deref()
        .ok_or_else(|| missing("walltime"))
        .and_then(|value| parse_walltime(value).map_err(PipelineError::Config))?;
    Ok(PbsSettings {
        job_name: raw.job_name.clone().ok_or_else(|| missing("job_name"))?,
        memory_gb: raw.memory.ok_or_else(|| missing("memory"))?,
        walltime,
        queue: raw.queue.clone().ok_or_else(|| missing("queue"))?,
        project: raw.project.clone().ok_or_else(|| missing("project"))?,
        email_notifications: raw.email_notifications,
        email_address,
    })
}

fn missing(key: &str) -> PipelineError {
    PipelineError::Config(format!("{key} is required when run_local is false"))
}

/// Accepts `HH:MM:SS` or `D.HH:MM:SS`.
pub fn parse_walltime(value: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid walltime '{value}': expected HH:MM:SS or D.HH:MM:SS");
    let (days, clock) = match value.split_once('.') {
        Some((days, clock)) => (days.parse::<u64>().map_err(|_| invalid())?, clock),
        None => (0, value),
    };
    let parts = clock
        .split(':')
        .map(|part| part.parse::<u64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    let [hours, minutes, seconds] = parts.as_slice() else {
        return Err(invalid());
    };
    if *hours > 23 || *minutes > 59 || *seconds > 59 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(
        days * 86_400 + hours * 3_600 + minutes * 60 + seconds,
    ))
}

fn parse_factors(parameters: &BTreeMap<String, toml::Value>) -> Result<Vec<FactorAxis>, PipelineError> {
    let mut axes = Vec::new();
    for (name, value) in parameters {
        match value {
            toml::Value::Table(members) => {
                let mut values = Vec::new();
                for (member, member_values) in members {
                    let qualified = if member.contains('.') {
                        member.clone()
                    } else {
                        format!("{name}.{member}")
                    };
                    values.push(ParameterValues::new(
                        qualified.clone(),
                        value_list(&qualified, member_values)?,
                    ));
                }
                axes.push(FactorAxis::Group(ParameterGroup::new(name.clone(), values)?));
            }
            other => axes.push(FactorAxis::Values(ParameterValues::new(
                name.clone(),
                value_list(name, other)?,
            ))),
        }
    }
    Ok(axes)
}

fn value_list(name: &str, value: &toml::Value) -> Result<Vec<String>, PipelineError> {
    let toml::Value::Array(items) = value else {
        return Err(PipelineError::Config(format!(
            "parameter '{name}' must be an array of values"
        )));
    };
    items
        .iter()
        .map(|item| match item {
            toml::Value::String(value) => Ok(value.clone()),
            toml::Value::Integer(value) => Ok(value.to_string()),
            toml::Value::Float(value) => Ok(value.to_string()),
            toml::Value::Boolean(value) => Ok(if *value { "1" } else { "0" }.to_string()),
            other => Err(PipelineError::Config(format!(
                "parameter '{name}' has unsupported value {other}"
            ))),
        })
        .collect()
}

fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    simbatch_ins::normaliser::lexical_join(base_dir, Path::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walltime_formats() {
        assert_eq!(parse_walltime("02:30:00"), Ok(Duration::from_secs(9_000)));
        assert_eq!(
            parse_walltime("1.00:00:10"),
            Ok(Duration::from_secs(86_410))
        );
        assert!(parse_walltime("2:30").is_err());
        assert!(parse_walltime("00:61:00").is_err());
    }

    #[test]
    fn group_members_are_block_scoped() {
        let src = r#"
            [TeBE]
            sla = [10, 20]
            "C3G.g0" = [0.1, 0.2]
        "#;
        let parameters: BTreeMap<String, toml::Value> = toml::from_str(src).expect("toml");
        let axes = parse_factors(&parameters).expect("factors");
        let FactorAxis::Group(group) = &axes[0] else {
            panic!("expected a group");
        };
        let names: Vec<&str> = group
            .parameters()
            .iter()
            .map(|parameter| parameter.name.as_str())
            .collect();
        assert_eq!(names, vec!["C3G.g0", "TeBE.sla"]);
        assert_eq!(group.value_count(), 2);
    }
}
