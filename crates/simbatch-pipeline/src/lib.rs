pub mod catalog;
pub mod config;
pub mod factorial;
pub mod naming;
pub mod paths;
pub mod pipeline;

pub use crate::catalog::{CatalogFormat, ResultCatalog, SimulationIndex, SimulationManifest};
pub use crate::config::{PbsSettings, RunConfig, RunnerSettings};
pub use crate::factorial::{expand, FactorAxis, Factorial, ParameterGroup, ParameterValues};
pub use crate::naming::NamingStrategy;
pub use crate::paths::{sanitize_segment, JobPaths, PathLayout, PathResolver};
pub use crate::pipeline::{generate_jobs, GenerationReport, Job, PipelineError};
pub use simbatch_ins::Factor;
