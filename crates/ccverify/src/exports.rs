use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Data,
    Weak,
    Other,
}

impl SymbolKind {
    fn from_nm_type(t: char) -> Self {
        match t {
            'T' | 'i' => SymbolKind::Function,
            'D' | 'B' | 'R' | 'G' | 'S' | 'C' => SymbolKind::Data,
            'W' | 'V' => SymbolKind::Weak,
            _ => SymbolKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportDescriptor {
    pub kind: SymbolKind,
    pub nm_type: char,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageExports {
    pub package: String,
    pub library: PathBuf,
    pub symbols: BTreeMap<String, ExportDescriptor>,
}

#[derive(Debug)]
pub enum ExportError {
    NotFound {
        package: String,
        searched: Vec<PathBuf>,
    },
    Analyze {
        path: PathBuf,
        message: String,
    },
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::NotFound { package, searched } => {
                write!(f, "package not found: {package}")?;
                if !searched.is_empty() {
                    let dirs: Vec<String> =
                        searched.iter().map(|p| p.display().to_string()).collect();
                    write!(f, " (searched: {})", dirs.join(", "))?;
                }
                Ok(())
            }
            ExportError::Analyze { path, message } => {
                write!(f, "cannot read symbols of {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for ExportError {}

/// Maps a package identifier to the symbols it exports.
pub trait ExportLookup {
    fn exports(&self, package: &str) -> Result<PackageExports, ExportError>;
}

/// Reads defined global symbols of a static or shared library with `nm`.
#[derive(Debug, Clone)]
pub struct NmExports {
    pub nm: PathBuf,
    pub search_dirs: Vec<PathBuf>,
}

impl NmExports {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            nm: PathBuf::from("nm"),
            search_dirs,
        }
    }

    /// An existing path wins; otherwise `lib<name>.so` then `lib<name>.a` per search dir.
    pub fn locate(&self, package: &str) -> Result<PathBuf, ExportError> {
        let direct = Path::new(package);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }
        let stem = package.strip_prefix("lib").unwrap_or(package);
        for dir in &self.search_dirs {
            for candidate in [format!("lib{stem}.so"), format!("lib{stem}.a")] {
                let path = dir.join(candidate);
                if path.is_file() {
                    return Ok(path);
                }
            }
        }
        Err(ExportError::NotFound {
            package: package.to_string(),
            searched: self.search_dirs.clone(),
        })
    }
}

impl ExportLookup for NmExports {
    fn exports(&self, package: &str) -> Result<PackageExports, ExportError> {
        let library = self.locate(package)?;
        let analyze = |message: String| ExportError::Analyze {
            path: library.clone(),
            message,
        };

        let mut cmd = Command::new(&self.nm);
        cmd.arg("-P").arg("--defined-only");
        if is_shared_object(&library) {
            cmd.arg("-D");
        }
        let out = cmd
            .arg(&library)
            .output()
            .map_err(|e| analyze(format!("spawn {}: {e}", self.nm.display())))?;
        if !out.status.success() {
            return Err(analyze(format!(
                "{} exited with {}: {}",
                self.nm.display(),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        Ok(PackageExports {
            package: package.to_string(),
            symbols: parse_nm_posix(&String::from_utf8_lossy(&out.stdout)),
            library,
        })
    }
}

fn is_shared_object(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".so") || n.contains(".so."))
}

/// Parses `nm -P` output, keeping global symbols (and GNU indirect functions).
pub fn parse_nm_posix(text: &str) -> BTreeMap<String, ExportDescriptor> {
    let mut out = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        // Archive member headers look like `libfoo.a[foo.o]:`.
        if line.is_empty() || line.ends_with(':') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(name), Some(ty)) = (fields.next(), fields.next()) else {
            continue;
        };
        let mut ty_chars = ty.chars();
        let (Some(t), None) = (ty_chars.next(), ty_chars.next()) else {
            continue;
        };
        if t == 'U' || !(t.is_ascii_uppercase() || t == 'i') {
            continue;
        }
        out.entry(name.to_string()).or_insert(ExportDescriptor {
            kind: SymbolKind::from_nm_type(t),
            nm_type: t,
            value: fields.next().map(str::to_string),
            size: fields.next().map(str::to_string),
        });
    }
    out
}
