use crate::pipeline::PipelineError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use simbatch_ins::Factor;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

const MANIFEST_STEM: &str = "manifest";
const INDEX_STEM: &str = "index";

/// How one simulation's instruction file was generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationManifest {
    /// Identifier produced by the naming strategy.
    pub key: String,
    /// Naming strategy that produced `key`.
    pub naming: String,
    pub name: String,
    pub path: PathBuf,
    pub base_ins: PathBuf,
    pub ins_file: PathBuf,
    pub pfts: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub factors: Vec<Factor>,
}

/// Simulation directories relative to the output root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationIndex {
    pub simulations: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CatalogFormat {
    #[default]
    Toml,
    Json,
}

impl CatalogFormat {
    pub fn extension(self) -> &'static str {
        match self {
            CatalogFormat::Toml => "toml",
            CatalogFormat::Json => "json",
        }
    }

    fn render<T: Serialize>(self, value: &T) -> Result<String, PipelineError> {
        match self {
            CatalogFormat::Toml => toml::to_string_pretty(value)
                .map_err(|err| PipelineError::Catalog(format!("toml encode failed: {err}"))),
            CatalogFormat::Json => serde_json::to_string_pretty(value)
                .map_err(|err| PipelineError::Catalog(format!("json encode failed: {err}"))),
        }
    }

    fn load<T: DeserializeOwned>(self, path: &Path, src: &str) -> Result<T, PipelineError> {
        match self {
            CatalogFormat::Toml => toml::from_str(src).map_err(|err| {
                PipelineError::Catalog(format!("invalid {}: {err}", path.display()))
            }),
            CatalogFormat::Json => serde_json::from_str(src).map_err(|err| {
                PipelineError::Catalog(format!("invalid {}: {err}", path.display()))
            }),
        }
    }
}

impl FromStr for CatalogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "toml" => Ok(CatalogFormat::Toml),
            "json" => Ok(CatalogFormat::Json),
            other => Err(format!("unknown catalog format: {other}")),
        }
    }
}

/// Reads and writes manifests and the simulation index.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultCatalog {
    format: CatalogFormat,
}

impl ResultCatalog {
    pub fn new(format: CatalogFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> CatalogFormat {
        self.format
    }

    pub fn manifest_path(&self, simulation_dir: &Path) -> PathBuf {
        simulation_dir.join(format!("{MANIFEST_STEM}.{}", self.format.extension()))
    }

    pub fn index_path(&self, output_root: &Path) -> PathBuf {
        output_root.join(format!("{INDEX_STEM}.{}", self.format.extension()))
    }

    /// Writes `manifest.<fmt>` into the manifest's simulation directory, which
    /// must already exist.
    pub fn write_manifest(&self, manifest: &SimulationManifest) -> Result<PathBuf, PipelineError> {
        if !manifest.path.is_dir() {
            return Err(PipelineError::NotFound(manifest.path.clone()));
        }
        let path = self.manifest_path(&manifest.path);
        fs::write(&path, self.format.render(manifest)?)?;
        debug!(path = %path.display(), key = %manifest.key, "wrote manifest");
        Ok(path)
    }

    pub fn read_manifest(&self, simulation_dir: &Path) -> Result<SimulationManifest, PipelineError> {
        let path = self.manifest_path(simulation_dir);
        let src = read_existing(&path)?;
        self.format.load(&path, &src)
    }

    pub fn write_index(
        &self,
        output_root: &Path,
        index: &SimulationIndex,
    ) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(output_root)?;
        let path = self.index_path(output_root);
        fs::write(&path, self.format.render(index)?)?;
        debug!(
            path = %path.display(),
            simulations = index.simulations.len(),
            "wrote simulation index"
        );
        Ok(path)
    }

    pub fn read_index(&self, output_root: &Path) -> Result<SimulationIndex, PipelineError> {
        let path = self.index_path(output_root);
        let src = read_existing(&path)?;
        self.format.load(&path, &src)
    }
}

fn read_existing(path: &Path) -> Result<String, PipelineError> {
    fs::read_to_string(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => PipelineError::NotFound(path.to_path_buf()),
        _ => PipelineError::Io(err),
    })
}
