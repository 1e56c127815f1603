use crate::InsError;
use regex::{Captures, Regex};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Parameters holding input file paths that are rewritten to absolute paths,
/// both as `name "value"` and as `param "name" (str "value")`.
const FILE_PARAMETERS: &[&str] = &[
    "file_met_forcing",
    "file_met_spinup",
    "file_gridlist",
    "file_gridlist_cf",
    "file_soildata",
    "file_co2",
    "file_ndep",
];

#[derive(Debug, Clone)]
pub struct NormalisedFile {
    pub path: PathBuf,
    pub content: String,
    /// Absolute paths of every imported file, in the order they were visited.
    pub imports: Vec<PathBuf>,
}

/// Flattens `import` directives and rewrites relative input file references
/// against the directory of `path`.
pub fn normalise(path: &Path) -> Result<NormalisedFile, InsError> {
    let path = absolute_path(path)?;
    let mut imports = Vec::new();
    let mut chain = Vec::new();
    let flat = flatten(&path, &mut chain, &mut imports)?;
    let base = path.parent().unwrap_or_else(|| Path::new("/"));
    let content = absolutise_file_references(&flat, base)?;
    debug!(
        path = %path.display(),
        imports = imports.len(),
        "normalised instruction file"
    );
    Ok(NormalisedFile {
        path,
        content,
        imports,
    })
}

pub fn resolve_imports(path: &Path) -> Result<Vec<PathBuf>, InsError> {
    Ok(normalise(path)?.imports)
}

fn import_regex() -> Result<&'static Regex, InsError> {
    static IMPORT: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    IMPORT
        .get_or_init(|| Regex::new(r#"(?m)^[ \t]*import[ \t]+"([^"]+)"[^\n]*(\n|$)"#))
        .as_ref()
        .map_err(|err| InsError::Pattern(err.clone()))
}

fn flatten(
    path: &Path,
    chain: &mut Vec<PathBuf>,
    imports: &mut Vec<PathBuf>,
) -> Result<String, InsError> {
    if chain.iter().any(|visited| visited == path) {
        let mut cycle = chain.clone();
        cycle.push(path.to_path_buf());
        return Err(InsError::ImportCycle { chain: cycle });
    }
    let content = fs::read_to_string(path).map_err(|source| InsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new("/"));

    chain.push(path.to_path_buf());
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for captures in import_regex()?.captures_iter(&content) {
        let (Some(whole), Some(target)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        out.push_str(&content[last..whole.start()]);
        last = whole.end();

        let resolved = lexical_join(base, Path::new(target.as_str()));
        debug!(from = %path.display(), import = %resolved.display(), "resolving import");
        imports.push(resolved.clone());
        let imported = flatten(&resolved, chain, imports)?;
        out.push_str(&imported);

        let directive = whole.as_str();
        if directive.ends_with('\n') && !imported.is_empty() && !imported.ends_with('\n') {
            out.push_str(if directive.ends_with("\r\n") {
                "\r\n"
            } else {
                "\n"
            });
        }
    }
    out.push_str(&content[last..]);
    chain.pop();
    Ok(out)
}

struct FileReferencePatterns {
    top_level: Regex,
    param_block: Regex,
}

fn file_reference_patterns() -> Result<&'static [FileReferencePatterns], InsError> {
    static PATTERNS: OnceLock<Result<Vec<FileReferencePatterns>, regex::Error>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            FILE_PARAMETERS
                .iter()
                .map(|name| {
                    let name = regex::escape(name);
                    Ok(FileReferencePatterns {
                        top_level: Regex::new(&format!(
                            r#"(?mR)^([ \t]*{name}[ \t]+"?)((?:[ \t]*[^!" \r\n])+)("?.*)$"#
                        ))?,
                        param_block: Regex::new(&format!(
                            r#"(?mR)^([ \t]*param[ \t]+"{name}"[ \t]+\([ \t]*str[ \t]+")([^"]+)(".*)$"#
                        ))?,
                    })
                })
                .collect()
        })
        .as_deref()
        .map_err(|err| InsError::Pattern(err.clone()))
}

fn absolutise_file_references(content: &str, base: &Path) -> Result<String, InsError> {
    let rewrite = |captures: &Captures| {
        let value = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        let path = Path::new(value);
        let value = if path.is_absolute() {
            value.to_string()
        } else {
            lexical_join(base, path).display().to_string()
        };
        format!(
            "{}{}{}",
            captures.get(1).map(|m| m.as_str()).unwrap_or_default(),
            value,
            captures.get(3).map(|m| m.as_str()).unwrap_or_default()
        )
    };

    let mut content = content.to_string();
    for patterns in file_reference_patterns()? {
        content = patterns
            .top_level
            .replace_all(&content, &rewrite)
            .into_owned();
        content = patterns
            .param_block
            .replace_all(&content, &rewrite)
            .into_owned();
    }
    Ok(content)
}

fn absolute_path(path: &Path) -> Result<PathBuf, InsError> {
    if path.is_absolute() {
        Ok(lexical_join(Path::new("/"), path))
    } else {
        Ok(lexical_join(&std::env::current_dir()?, path))
    }
}

/// Joins `relative` onto `base` and folds `.` and `..` components without
/// touching the filesystem.
pub fn lexical_join(base: &Path, relative: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in base.join(relative).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_relative_file_references() {
        let content = "file_gridlist \"grids/list.txt\" ! cells\nfile_co2 /data/co2.txt\n";
        let out = absolutise_file_references(content, Path::new("/runs/base")).expect("rewrite");
        assert_eq!(
            out,
            "file_gridlist \"/runs/base/grids/list.txt\" ! cells\nfile_co2 /data/co2.txt\n"
        );
    }

    #[test]
    fn rewrites_param_blocks() {
        let content = "param \"file_ndep\" (str \"../ndep.bin\")\r\n";
        let out = absolutise_file_references(content, Path::new("/runs/base")).expect("rewrite");
        assert_eq!(out, "param \"file_ndep\" (str \"/runs/ndep.bin\")\r\n");
    }

    #[test]
    fn patterns_compile() {
        assert!(import_regex().is_ok());
        assert_eq!(
            file_reference_patterns().expect("patterns").len(),
            FILE_PARAMETERS.len()
        );
    }

    #[test]
    fn lexical_join_folds_dots() {
        assert_eq!(
            lexical_join(Path::new("/a/b"), Path::new("./c/../d.ins")),
            PathBuf::from("/a/b/d.ins")
        );
    }
}
