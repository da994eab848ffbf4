use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::CorpusSpec;
use crate::error::{fs_err, CorpusError};
use crate::extract::{extract_file, ExtractStats};
use crate::fetch::{fetch, FetchOptions};
use crate::scratch::ScratchDir;

/// Written inside a corpus root once its archive has been fully extracted.
pub const COMPLETE_MARKER: &str = ".ccverify-complete";

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub assets_dir: PathBuf,
    pub allow_download: bool,
    pub allow_developer: bool,
    pub download_timeout: Option<Duration>,
}

#[derive(Debug)]
pub enum ResolveOutcome {
    Present,
    NotADirectory,
    Skipped { reason: String },
    Fetched { stats: ExtractStats },
    Failed { error: CorpusError },
}

impl ResolveOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveOutcome::Present => "present",
            ResolveOutcome::NotADirectory => "not_a_directory",
            ResolveOutcome::Skipped { .. } => "skipped",
            ResolveOutcome::Fetched { .. } => "fetched",
            ResolveOutcome::Failed { .. } => "failed",
        }
    }

    /// Whether the corpus root is usable after resolution.
    pub fn is_available(&self) -> bool {
        matches!(self, ResolveOutcome::Present | ResolveOutcome::Fetched { .. })
    }
}

#[derive(Debug)]
pub struct CorpusResolution {
    pub corpus: String,
    pub root: PathBuf,
    pub outcome: ResolveOutcome,
}

/// Resolves every corpus in order. A failing corpus never stops the pass.
pub fn resolve_all(
    corpora: &[CorpusSpec],
    opts: &ResolveOptions,
    progress: &mut dyn FnMut(&str),
) -> Vec<CorpusResolution> {
    corpora
        .iter()
        .map(|spec| CorpusResolution {
            corpus: spec.name.clone(),
            root: spec.root_in(&opts.assets_dir),
            outcome: resolve_one(spec, opts, progress),
        })
        .collect()
}

pub fn resolve_one(
    spec: &CorpusSpec,
    opts: &ResolveOptions,
    progress: &mut dyn FnMut(&str),
) -> ResolveOutcome {
    let root = spec.root_in(&opts.assets_dir);
    if root.is_dir() {
        return ResolveOutcome::Present;
    }
    if root.exists() {
        progress(&format!(
            "{}: {} exists but is not a directory",
            spec.name,
            root.display()
        ));
        return ResolveOutcome::NotADirectory;
    }
    if !opts.allow_download {
        return ResolveOutcome::Skipped {
            reason: format!(
                "{} missing ({} KB at {}); use --download",
                root.display(),
                spec.approx_size_kb,
                spec.url
            ),
        };
    }
    if spec.developer_only && !opts.allow_developer {
        return ResolveOutcome::Skipped {
            reason: format!(
                "developer resource ({} KB at {}); use --dev",
                spec.approx_size_kb, spec.url
            ),
        };
    }

    match acquire(spec, &root, opts, progress) {
        Ok(stats) => ResolveOutcome::Fetched { stats },
        Err(error) => ResolveOutcome::Failed { error },
    }
}

fn acquire(
    spec: &CorpusSpec,
    root: &Path,
    opts: &ResolveOptions,
    progress: &mut dyn FnMut(&str),
) -> Result<ExtractStats, CorpusError> {
    let format = spec.format().ok_or_else(|| CorpusError::UnsupportedFormat {
        url: spec.url.clone(),
    })?;
    let root_name = root.file_name().ok_or_else(|| CorpusError::InvalidPath {
        path: root.to_path_buf(),
        why: "corpus root has no final component",
    })?;
    let parent = root
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&parent).map_err(fs_err("create_dir_all", &parent))?;

    progress(&format!(
        "{}: download {} ({} KB)",
        spec.name, spec.url, spec.approx_size_kb
    ));
    let fetched = fetch(
        &spec.url,
        &FetchOptions {
            timeout: opts.download_timeout,
            expected_sha256: spec.sha256.clone(),
        },
    )?;

    progress(&format!(
        "{}: extract {} ({} bytes)",
        spec.name,
        format.as_str(),
        fetched.len()
    ));
    let staging = ScratchDir::new_in(&parent, &format!(".ccverify-staging-{}", spec.name))
        .map_err(fs_err("create staging dir", &parent))?;
    let stats = extract_file(format, fetched.path(), staging.path())?;

    let staged_root = staging.path().join(root_name);
    if !staged_root.is_dir() {
        return Err(CorpusError::InvalidPath {
            path: root.to_path_buf(),
            why: "archive did not produce the corpus root",
        });
    }
    let marker = staged_root.join(COMPLETE_MARKER);
    std::fs::write(&marker, spec.url.as_bytes()).map_err(fs_err("write", &marker))?;

    promote_staged(staging.path(), &parent, root_name)?;
    Ok(stats)
}

// Siblings first; the corpus root appears last and only once complete.
fn promote_staged(
    staging: &Path,
    parent: &Path,
    root_name: &std::ffi::OsStr,
) -> Result<(), CorpusError> {
    let entries = std::fs::read_dir(staging).map_err(fs_err("read_dir", staging))?;
    for entry in entries {
        let entry = entry.map_err(fs_err("read_dir", staging))?;
        let name = entry.file_name();
        if name == root_name {
            continue;
        }
        let dst = parent.join(&name);
        if dst.exists() {
            continue;
        }
        std::fs::rename(entry.path(), &dst).map_err(fs_err("rename", &dst))?;
    }

    let dst = parent.join(root_name);
    std::fs::rename(staging.join(root_name), &dst).map_err(fs_err("rename", &dst))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, url: &str, developer_only: bool) -> CorpusSpec {
        CorpusSpec {
            name: name.to_string(),
            local_root: PathBuf::from(name),
            url: url.to_string(),
            approx_size_kb: 1,
            developer_only,
            test_dir: None,
            sha256: None,
        }
    }

    #[test]
    fn file_in_place_of_root_is_reported_not_fetched() {
        let assets = tempfile::tempdir().expect("tempdir");
        std::fs::write(assets.path().join("c"), b"not a dir").expect("write");
        let opts = ResolveOptions {
            assets_dir: assets.path().to_path_buf(),
            allow_download: true,
            allow_developer: true,
            download_timeout: None,
        };
        let mut lines = Vec::new();
        let outcome = resolve_one(
            &spec("c", "http://127.0.0.1:9/c.tar.gz", false),
            &opts,
            &mut |m: &str| lines.push(m.to_string()),
        );
        assert!(matches!(outcome, ResolveOutcome::NotADirectory));
        assert_eq!(lines.len(), 1, "{lines:?}");
    }

    #[test]
    fn unknown_format_fails_before_network() {
        let assets = tempfile::tempdir().expect("tempdir");
        let opts = ResolveOptions {
            assets_dir: assets.path().to_path_buf(),
            allow_download: true,
            allow_developer: false,
            download_timeout: None,
        };
        let outcome = resolve_one(
            &spec("x", "http://127.0.0.1:9/x.tar.xz", false),
            &opts,
            &mut |_: &str| {},
        );
        match outcome {
            ResolveOutcome::Failed { error } => assert_eq!(error.category(), "unsupported_format"),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
