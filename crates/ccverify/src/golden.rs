use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoldenMode {
    Record { dir: PathBuf },
    /// Exploratory run: nothing is written.
    Discard,
}

/// Base names of passing cases, in run order, for one corpus.
#[derive(Debug)]
pub struct GoldenLog {
    corpus: String,
    mode: GoldenMode,
    names: Vec<String>,
}

impl GoldenLog {
    pub fn new(corpus: &str, mode: GoldenMode) -> Self {
        Self {
            corpus: corpus.to_string(),
            mode,
            names: Vec::new(),
        }
    }

    pub fn push(&mut self, base_name: &str) {
        self.names.push(base_name.to_string());
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Writes the log once and returns its path, or `None` in discard mode.
    pub fn finish(self) -> Result<Option<PathBuf>> {
        let GoldenMode::Record { dir } = &self.mode else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir).with_context(|| format!("mkdir {}", dir.display()))?;
        let path = dir.join(golden_file_name(&self.corpus));
        write_lines(&path, &self.names)?;
        Ok(Some(path))
    }
}

pub fn golden_file_name(corpus: &str) -> String {
    format!(
        "{corpus}_{}_{}.golden",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for line in lines {
        writeln!(w, "{line}").with_context(|| format!("write {}", path.display()))?;
    }
    w.flush()
        .with_context(|| format!("flush {}", path.display()))?;
    let f = w
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("flush {}", path.display()))?;
    f.sync_all()
        .with_context(|| format!("close {}", path.display()))?;
    Ok(())
}
