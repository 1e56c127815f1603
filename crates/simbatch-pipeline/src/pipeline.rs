use crate::catalog::{ResultCatalog, SimulationIndex, SimulationManifest};
use crate::config::RunConfig;
use crate::factorial::{expand, Factorial};
use crate::paths::{JobPaths, PathResolver};
use chrono::Utc;
use rayon::prelude::*;
use simbatch_ins::{InsError, ParsedFile};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One run of the model against one generated instruction file.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub name: String,
    pub ins_file: PathBuf,
    pub manifest: SimulationManifest,
}

#[derive(Debug)]
pub struct GenerationReport {
    pub jobs: Vec<Job>,
    pub index_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Ins(#[from] InsError),
    #[error("config error: {0}")]
    Config(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error(
        "parameter '{parameter}' in group '{group}' has {found} values, expected {expected}"
    )]
    GroupLength {
        group: String,
        parameter: String,
        expected: usize,
        found: usize,
    },
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("catalog error: {0}")]
    Catalog(String),
    #[error("failed to generate simulations from {}: {source}", ins_file.display())]
    Generation {
        ins_file: PathBuf,
        #[source]
        source: Box<PipelineError>,
    },
    #[error("job generation cancelled")]
    Cancelled,
}

impl PipelineError {
    fn for_template(self, ins_file: &Path) -> Self {
        match self {
            PipelineError::Cancelled | PipelineError::Generation { .. } => self,
            other => PipelineError::Generation {
                ins_file: ins_file.to_path_buf(),
                source: Box::new(other),
            },
        }
    }
}

struct Template {
    path: PathBuf,
    parsed: ParsedFile,
}

/// Expands the configured factors against every instruction file, writes the
/// generated files with their manifests and finally the simulation index.
///
/// `is_cancelled` is polled before each simulation is generated.
pub fn generate_jobs(
    config: &RunConfig,
    is_cancelled: &(dyn Fn() -> bool + Sync),
) -> Result<GenerationReport, PipelineError> {
    let factorials = expand(&config.factors, config.full_factorial)?;
    let resolver = PathResolver::new(
        &config.output_directory,
        config.layout,
        config.naming,
        config.insfiles.len(),
        factorials.len(),
    );
    let catalog = ResultCatalog::new(config.catalog_format);

    let templates = config
        .insfiles
        .iter()
        .map(|path| {
            ParsedFile::from_file(path)
                .map(|parsed| Template {
                    path: path.clone(),
                    parsed,
                })
                .map_err(|err| PipelineError::from(err).for_template(path))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut work = Vec::with_capacity(templates.len() * factorials.len());
    let mut seen = BTreeSet::new();
    for template in &templates {
        for factorial in &factorials {
            let paths = resolver.resolve(&template.path, factorial);
            if !seen.insert(paths.ins_file.clone()) {
                return Err(PipelineError::Validation(format!(
                    "several simulations resolve to {}",
                    paths.ins_file.display()
                )));
            }
            work.push((template, factorial, paths));
        }
    }
    info!(
        templates = templates.len(),
        simulations = factorials.len(),
        jobs = work.len(),
        "generating jobs"
    );

    let generate = |(template, factorial, paths): &(&Template, &Factorial, JobPaths)| {
        if is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        generate_job(config, &resolver, &catalog, template, factorial, paths)
            .map_err(|err| err.for_template(&template.path))
    };
    let jobs = if config.parallel {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(usize::from(config.cpu_count))
            .build()
            .map_err(|err| PipelineError::Config(format!("failed to start worker pool: {err}")))?;
        pool.install(|| work.par_iter().map(generate).collect::<Result<Vec<_>, _>>())?
    } else {
        work.iter().map(generate).collect::<Result<Vec<_>, _>>()?
    };

    let mut simulations = Vec::new();
    for job in &jobs {
        let relative = resolver.relative_path(&job.manifest.path);
        if !simulations.contains(&relative) {
            simulations.push(relative);
        }
    }
    let index_path = catalog.write_index(&config.output_directory, &SimulationIndex { simulations })?;
    info!(jobs = jobs.len(), index = %index_path.display(), "job generation complete");

    Ok(GenerationReport { jobs, index_path })
}

fn generate_job(
    config: &RunConfig,
    resolver: &PathResolver,
    catalog: &ResultCatalog,
    template: &Template,
    factorial: &Factorial,
    paths: &JobPaths,
) -> Result<Job, PipelineError> {
    let content = render(&template.parsed, factorial, &config.pfts)?;
    ensure_dir(&paths.directory)?;

    let manifest = SimulationManifest {
        key: paths.simulation_name.clone(),
        naming: resolver.naming().key().to_string(),
        name: factorial.name(),
        path: paths.directory.clone(),
        base_ins: template.path.clone(),
        ins_file: paths.ins_file.clone(),
        pfts: config.pfts.clone(),
        generated_at: Utc::now(),
        factors: factorial.factors().to_vec(),
    };

    let written = fs::write(&paths.ins_file, content)
        .map_err(PipelineError::from)
        .and_then(|()| catalog.write_manifest(&manifest));
    if let Err(err) = written {
        remove_partial(&paths.ins_file);
        return Err(err);
    }
    debug!(job = %paths.job_name, ins_file = %paths.ins_file.display(), "generated job");

    Ok(Job {
        name: paths.job_name.clone(),
        ins_file: paths.ins_file.clone(),
        manifest,
    })
}

/// Applies a factorial and the PFT selection to a copy of the template.
pub fn render(
    template: &ParsedFile,
    factorial: &Factorial,
    pfts: &[String],
) -> Result<String, PipelineError> {
    let mut file = template.clone();
    for factor in factorial.factors() {
        file.apply_factor(factor)?;
    }
    if !pfts.is_empty() {
        file.disable_all_pfts()?;
        for pft in pfts {
            file.enable_pft(pft)?;
        }
    }
    Ok(file.generate())
}

fn remove_partial(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "failed to remove partial instruction file");
    }
}

pub fn ensure_dir(path: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path).map_err(PipelineError::Io)
}
