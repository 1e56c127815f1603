use crate::factorial::Factorial;
use crate::naming::NamingStrategy;
use pathdiff::diff_paths;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const MAX_SEGMENT_LENGTH: usize = 64;
const FALLBACK_SEGMENT: &str = "sim";
const INVALID_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// How job directories are nested under the output root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PathLayout {
    /// Always `root/<ins>/<simulation>/`.
    Static,
    /// Drops the instruction-file or simulation level when there is only
    /// one of it.
    #[default]
    Dynamic,
}

impl FromStr for PathLayout {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "static" => Ok(PathLayout::Static),
            "dynamic" => Ok(PathLayout::Dynamic),
            other => Err(format!("unknown path layout: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub simulation_name: String,
    pub job_name: String,
    pub directory: PathBuf,
    pub ins_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    output_directory: PathBuf,
    layout: PathLayout,
    naming: NamingStrategy,
    ins_count: usize,
    simulation_count: usize,
}

impl PathResolver {
    pub fn new(
        output_directory: impl Into<PathBuf>,
        layout: PathLayout,
        naming: NamingStrategy,
        ins_count: usize,
        simulation_count: usize,
    ) -> Self {
        Self {
            output_directory: output_directory.into(),
            layout,
            naming,
            ins_count,
            simulation_count,
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn naming(&self) -> NamingStrategy {
        self.naming
    }

    pub fn job_name(&self, simulation_name: &str, ins_name: &str) -> String {
        match self.layout {
            PathLayout::Static => format!("{ins_name}-{simulation_name}"),
            PathLayout::Dynamic if self.simulation_count == 1 => ins_name.to_string(),
            PathLayout::Dynamic if self.ins_count == 1 => simulation_name.to_string(),
            PathLayout::Dynamic => format!("{ins_name}-{simulation_name}"),
        }
    }

    pub fn job_directory(&self, ins_name: &str, simulation_name: &str) -> PathBuf {
        let ins_segment = sanitize_segment(ins_name);
        let simulation_segment = sanitize_segment(simulation_name);
        let mut directory = self.output_directory.clone();
        match self.layout {
            PathLayout::Static => {
                directory.push(ins_segment);
                directory.push(simulation_segment);
            }
            PathLayout::Dynamic => {
                if self.ins_count > 1 {
                    directory.push(ins_segment);
                }
                if self.simulation_count > 1 {
                    directory.push(simulation_segment);
                }
            }
        }
        directory
    }

    /// Resolves every name and path for one (template, factorial) pair.
    pub fn resolve(&self, template: &Path, factorial: &Factorial) -> JobPaths {
        let simulation_name = self.naming.simulation_name(factorial);
        let ins_name = template
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| FALLBACK_SEGMENT.to_string());
        let job_name = self.job_name(&simulation_name, &ins_name);
        let directory = self.job_directory(&ins_name, &simulation_name);
        let ins_file = self.target_ins_file(&directory, &job_name);
        JobPaths {
            simulation_name,
            job_name,
            directory,
            ins_file,
        }
    }

    pub fn target_ins_file(&self, directory: &Path, job_name: &str) -> PathBuf {
        directory.join(format!("{}.ins", sanitize_segment(job_name)))
    }

    /// `path` relative to the output root; `.` for the root itself.
    pub fn relative_path(&self, path: &Path) -> PathBuf {
        let absolute = self.absolute_path(path);
        match diff_paths(&absolute, &self.output_directory) {
            Some(relative) if relative.as_os_str().is_empty() => PathBuf::from("."),
            Some(relative) => relative,
            None => absolute,
        }
    }

    pub fn absolute_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.output_directory.join(path)
        }
    }
}

/// Makes `input` safe as a single path segment: whitespace becomes `_`,
/// separators and reserved characters are dropped and the result is capped
/// at [`MAX_SEGMENT_LENGTH`] characters. Never returns an empty string.
pub fn sanitize_segment(input: &str) -> String {
    let sanitized: String = input
        .trim()
        .chars()
        .filter_map(|ch| {
            if ch.is_whitespace() {
                Some('_')
            } else if ch.is_control() || INVALID_CHARS.contains(&ch) {
                None
            } else {
                Some(ch)
            }
        })
        .take(MAX_SEGMENT_LENGTH)
        .collect();
    match sanitized.as_str() {
        "" | "." | ".." => FALLBACK_SEGMENT.to_string(),
        _ => sanitized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_segments() {
        assert_eq!(sanitize_segment(" a b/c:d "), "a_bcd");
        assert_eq!(sanitize_segment("///"), "sim");
        assert_eq!(sanitize_segment(".."), "sim");
        assert_eq!(sanitize_segment(&"x".repeat(100)).len(), MAX_SEGMENT_LENGTH);
    }

    #[test]
    fn dynamic_layout_drops_singleton_levels() {
        let one_ins = PathResolver::new("/out", PathLayout::Dynamic, NamingStrategy::Manual, 1, 3);
        assert_eq!(one_ins.job_name("sla_10", "global"), "sla_10");
        assert_eq!(
            one_ins.job_directory("global", "sla_10"),
            PathBuf::from("/out/sla_10")
        );

        let one_sim = PathResolver::new("/out", PathLayout::Dynamic, NamingStrategy::Manual, 2, 1);
        assert_eq!(one_sim.job_name("base", "global"), "global");
        assert_eq!(one_sim.job_directory("global", "base"), PathBuf::from("/out/global"));

        let both = PathResolver::new("/out", PathLayout::Dynamic, NamingStrategy::Manual, 2, 2);
        assert_eq!(both.job_name("a_1", "europe"), "europe-a_1");
        assert_eq!(
            both.job_directory("europe", "a_1"),
            PathBuf::from("/out/europe/a_1")
        );
    }

    #[test]
    fn static_layout_always_nests() {
        let resolver = PathResolver::new("/out", PathLayout::Static, NamingStrategy::Manual, 1, 1);
        let paths = resolver.resolve(Path::new("/templates/global.ins"), &Factorial::base());
        assert_eq!(paths.job_name, "global-base");
        assert_eq!(paths.directory, PathBuf::from("/out/global/base"));
        assert_eq!(paths.ins_file, PathBuf::from("/out/global/base/global-base.ins"));
        assert_eq!(resolver.relative_path(&paths.directory), PathBuf::from("global/base"));
        assert_eq!(resolver.relative_path(Path::new("/out")), PathBuf::from("."));
    }
}
