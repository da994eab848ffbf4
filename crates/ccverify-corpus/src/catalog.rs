use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::extract::ArchiveFormat;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusSpec {
    pub name: String,
    /// Relative paths are resolved against the assets directory.
    pub local_root: PathBuf,
    pub url: String,
    pub approx_size_kb: u64,
    #[serde(default)]
    pub developer_only: bool,
    /// Directory of C test sources, relative to `local_root`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl CorpusSpec {
    pub fn format(&self) -> Option<ArchiveFormat> {
        ArchiveFormat::from_url(&self.url)
    }

    pub fn root_in(&self, assets_dir: &Path) -> PathBuf {
        assets_dir.join(&self.local_root)
    }

    pub fn test_root_in(&self, assets_dir: &Path) -> Option<PathBuf> {
        self.test_dir
            .as_ref()
            .map(|dir| self.root_in(assets_dir).join(dir))
    }
}

/// Built-in corpora, in resolution order.
pub fn known_corpora() -> Vec<CorpusSpec> {
    vec![
        CorpusSpec {
            name: "tcc-0.9.27".to_string(),
            local_root: PathBuf::from("tcc-0.9.27"),
            url: "https://download.savannah.gnu.org/releases/tinycc/tcc-0.9.27.tar.bz2"
                .to_string(),
            approx_size_kb: 620,
            developer_only: false,
            test_dir: Some(PathBuf::from("tests/tests2")),
            sha256: None,
        },
        CorpusSpec {
            name: "sqlite-amalgamation-3310100".to_string(),
            local_root: PathBuf::from("sqlite-amalgamation-3310100"),
            url: "https://www.sqlite.org/2020/sqlite-amalgamation-3310100.zip".to_string(),
            approx_size_kb: 2_400,
            developer_only: false,
            test_dir: None,
            sha256: None,
        },
        CorpusSpec {
            name: "gcc-9.1.0".to_string(),
            local_root: PathBuf::from("gcc-9.1.0"),
            url: "https://ftp.gnu.org/gnu/gcc/gcc-9.1.0/gcc-9.1.0.tar.gz".to_string(),
            approx_size_kb: 118_000,
            developer_only: true,
            test_dir: Some(PathBuf::from("gcc/testsuite/gcc.c-torture/execute")),
            sha256: None,
        },
    ]
}
