//! Acquisition of third-party C test corpora: download, archive extraction,
//! and per-corpus resolution against a local assets directory.

pub mod catalog;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod resolve;
pub mod scratch;

pub use catalog::{known_corpora, CorpusSpec};
pub use error::CorpusError;
pub use extract::{
    extract_file, extract_tar_bz2, extract_tar_gz, extract_zip, ArchiveFormat, EntryKind,
    ExtractStats,
};
pub use fetch::{fetch, FetchOptions, Fetched};
pub use resolve::{
    resolve_all, resolve_one, CorpusResolution, ResolveOptions, ResolveOutcome, COMPLETE_MARKER,
};
pub use scratch::ScratchDir;
