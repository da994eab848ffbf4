use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use ccverify_corpus::CorpusSpec;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::golden::GoldenMode;

pub const CONFIG_SCHEMA_VERSION: &str = "ccverify.config@0.1.0";

pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub schema_version: String,
    #[serde(default)]
    pub corpora: Vec<CorpusSpec>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Self =
            serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
        if cfg.schema_version != CONFIG_SCHEMA_VERSION {
            bail!(
                "unsupported config schema_version: {} (expected {CONFIG_SCHEMA_VERSION})",
                cfg.schema_version
            );
        }
        let mut names = std::collections::BTreeSet::new();
        for c in &cfg.corpora {
            if c.name.is_empty() {
                bail!("{}: corpus with empty name", path.display());
            }
            if !names.insert(c.name.as_str()) {
                bail!("{}: duplicate corpus {:?}", path.display(), c.name);
            }
        }
        Ok(cfg)
    }

    /// The configured corpora, or `fallback` when the file lists none.
    pub fn corpora_or(self, fallback: Vec<CorpusSpec>) -> Vec<CorpusSpec> {
        if self.corpora.is_empty() {
            fallback
        } else {
            self.corpora
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceFlags {
    /// Keep a backtrace when the compiler faults.
    pub on_crash: bool,
    pub tested_paths: bool,
    pub output: bool,
    pub source: bool,
}

/// Everything a run needs, fixed before the first corpus is touched.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub filter: Option<Regex>,
    pub trace: TraceFlags,
    pub golden: GoldenMode,
    pub exec_timeout: Duration,
}

impl HarnessConfig {
    pub fn new(
        filter: Option<&str>,
        trace: TraceFlags,
        golden_dir: &Path,
        no_golden: bool,
        exec_timeout: Duration,
    ) -> Result<Self> {
        let filter = filter
            .map(|pat| Regex::new(pat).with_context(|| format!("invalid --filter {pat:?}")))
            .transpose()?;
        let golden = if filter.is_some() || no_golden {
            GoldenMode::Discard
        } else {
            GoldenMode::Record {
                dir: golden_dir.to_path_buf(),
            }
        };
        Ok(Self {
            filter,
            trace,
            golden,
            exec_timeout,
        })
    }

    pub fn selects(&self, path: &Path) -> bool {
        match &self.filter {
            Some(re) => re.is_match(&path.to_string_lossy()),
            None => true,
        }
    }
}
