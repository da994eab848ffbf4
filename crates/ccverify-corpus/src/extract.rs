use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;

use crate::error::{fs_err, CorpusError};

const DEFAULT_FILE_MODE: u32 = 0o644;

const S_IFMT: u32 = 0o170_000;
const S_IFREG: u32 = 0o100_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFLNK: u32 = 0o120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarBz2,
    Zip,
}

impl ArchiveFormat {
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz2") {
            Some(ArchiveFormat::TarBz2)
        } else if lower.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarBz2 => "tar.bz2",
            ArchiveFormat::Zip => "zip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    RegularFile,
    Symlink,
    GlobalHeader,
    Other(String),
}

impl EntryKind {
    fn name(&self) -> String {
        match self {
            EntryKind::Directory => "directory".to_string(),
            EntryKind::RegularFile => "regular file".to_string(),
            EntryKind::Symlink => "symlink".to_string(),
            EntryKind::GlobalHeader => "global header".to_string(),
            EntryKind::Other(name) => name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub dirs: usize,
    pub files: usize,
    pub skipped: usize,
}

pub fn extract_file(
    format: ArchiveFormat,
    archive: &Path,
    dest: &Path,
) -> Result<ExtractStats, CorpusError> {
    let f = File::open(archive).map_err(fs_err("open", archive))?;
    match format {
        ArchiveFormat::TarGz => extract_tar_gz(f, dest),
        ArchiveFormat::TarBz2 => extract_tar_bz2(f, dest),
        ArchiveFormat::Zip => extract_zip(f, dest),
    }
}

pub fn extract_tar_gz<R: Read>(reader: R, dest: &Path) -> Result<ExtractStats, CorpusError> {
    extract_tar(tar::Archive::new(GzDecoder::new(reader)), dest)
}

pub fn extract_tar_bz2<R: Read>(reader: R, dest: &Path) -> Result<ExtractStats, CorpusError> {
    extract_tar(tar::Archive::new(BzDecoder::new(reader)), dest)
}

fn extract_tar<R: Read>(
    mut ar: tar::Archive<R>,
    dest: &Path,
) -> Result<ExtractStats, CorpusError> {
    let archive_err = |e: std::io::Error| CorpusError::Archive {
        path: dest.to_path_buf(),
        message: e.to_string(),
    };

    let mut stats = ExtractStats::default();
    for entry in ar.entries().map_err(archive_err)? {
        let mut entry = entry.map_err(archive_err)?;
        let entry_path = entry.path().map_err(archive_err)?.into_owned();
        let kind = tar_entry_kind(entry.header().entry_type());

        match kind {
            EntryKind::Directory => {
                let rel = sanitize_rel_path(&entry_path)?;
                let out = dest.join(rel);
                std::fs::create_dir_all(&out).map_err(fs_err("create_dir_all", &out))?;
                stats.dirs += 1;
            }
            EntryKind::RegularFile => {
                let rel = sanitize_rel_path(&entry_path)?;
                if rel.as_os_str().is_empty() {
                    return Err(CorpusError::InvalidPath {
                        path: entry_path,
                        why: "empty file name",
                    });
                }
                let mode = entry.header().mode().map_err(archive_err)?;
                write_regular(&dest.join(rel), mode, &mut entry)?;
                stats.files += 1;
            }
            EntryKind::Symlink | EntryKind::GlobalHeader => {
                stats.skipped += 1;
            }
            other => {
                return Err(CorpusError::UnsupportedEntry {
                    path: entry_path,
                    kind: other.name(),
                })
            }
        }
    }
    Ok(stats)
}

fn tar_entry_kind(t: tar::EntryType) -> EntryKind {
    match t {
        tar::EntryType::Directory => EntryKind::Directory,
        tar::EntryType::Regular | tar::EntryType::Continuous => EntryKind::RegularFile,
        tar::EntryType::Symlink => EntryKind::Symlink,
        tar::EntryType::XGlobalHeader => EntryKind::GlobalHeader,
        tar::EntryType::Link => EntryKind::Other("hard link".to_string()),
        tar::EntryType::Char => EntryKind::Other("character device".to_string()),
        tar::EntryType::Block => EntryKind::Other("block device".to_string()),
        tar::EntryType::Fifo => EntryKind::Other("fifo".to_string()),
        other => EntryKind::Other(format!("tar type {:?}", other.as_byte() as char)),
    }
}

/// Zip has no skip path: anything other than a directory or regular file is fatal.
pub fn extract_zip<R: Read + Seek>(reader: R, dest: &Path) -> Result<ExtractStats, CorpusError> {
    let zip_err = |e: zip::result::ZipError| CorpusError::Archive {
        path: dest.to_path_buf(),
        message: e.to_string(),
    };

    let mut z = zip::ZipArchive::new(reader).map_err(zip_err)?;
    let mut stats = ExtractStats::default();
    for i in 0..z.len() {
        let mut file = z.by_index(i).map_err(zip_err)?;
        let entry_path = PathBuf::from(file.name());
        let mode = file.unix_mode();
        let kind = zip_entry_kind(file.is_dir(), mode);

        match kind {
            EntryKind::Directory => {
                let rel = sanitize_rel_path(&entry_path)?;
                let out = dest.join(rel);
                std::fs::create_dir_all(&out).map_err(fs_err("create_dir_all", &out))?;
                stats.dirs += 1;
            }
            EntryKind::RegularFile => {
                let rel = sanitize_rel_path(&entry_path)?;
                if rel.as_os_str().is_empty() {
                    return Err(CorpusError::InvalidPath {
                        path: entry_path,
                        why: "empty file name",
                    });
                }
                let mode = mode.map(|m| m & 0o7777).unwrap_or(DEFAULT_FILE_MODE);
                write_regular(&dest.join(rel), mode, &mut file)?;
                stats.files += 1;
            }
            other => {
                return Err(CorpusError::UnsupportedEntry {
                    path: entry_path,
                    kind: other.name(),
                })
            }
        }
    }
    Ok(stats)
}

fn zip_entry_kind(is_dir: bool, mode: Option<u32>) -> EntryKind {
    if is_dir {
        return EntryKind::Directory;
    }
    match mode.map(|m| m & S_IFMT) {
        None | Some(0) | Some(S_IFREG) => EntryKind::RegularFile,
        Some(S_IFDIR) => EntryKind::Directory,
        Some(S_IFLNK) => EntryKind::Symlink,
        Some(other) => EntryKind::Other(format!("unix file type {other:o}")),
    }
}

fn write_regular<R: Read>(out_path: &Path, mode: u32, content: &mut R) -> Result<(), CorpusError> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(fs_err("create_dir_all", parent))?;
    }

    let f = create_with_mode(out_path, mode)?;
    let mut w = BufWriter::new(f);
    std::io::copy(content, &mut w).map_err(fs_err("write", out_path))?;
    w.flush().map_err(fs_err("flush", out_path))?;
    let f = w
        .into_inner()
        .map_err(|e| fs_err("flush", out_path)(e.into_error()))?;
    f.sync_all().map_err(fs_err("close", out_path))?;
    drop(f);

    apply_mode(out_path, mode)
}

#[cfg(unix)]
fn create_with_mode(path: &Path, mode: u32) -> Result<File, CorpusError> {
    use std::os::unix::fs::OpenOptionsExt as _;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode & 0o7777)
        .open(path)
        .map_err(fs_err("create", path))
}

#[cfg(not(unix))]
fn create_with_mode(path: &Path, _mode: u32) -> Result<File, CorpusError> {
    File::create(path).map_err(fs_err("create", path))
}

// The umask applies at open time, so the recorded bits are set again afterwards.
#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> Result<(), CorpusError> {
    use std::os::unix::fs::PermissionsExt as _;
    let perm = std::fs::Permissions::from_mode(mode & 0o7777);
    std::fs::set_permissions(path, perm).map_err(fs_err("chmod", path))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> Result<(), CorpusError> {
    Ok(())
}

pub fn sanitize_rel_path(path: &Path) -> Result<PathBuf, CorpusError> {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::Prefix(_) | Component::RootDir => {
                return Err(CorpusError::InvalidPath {
                    path: path.to_path_buf(),
                    why: "absolute",
                })
            }
            Component::ParentDir => {
                return Err(CorpusError::InvalidPath {
                    path: path.to_path_buf(),
                    why: "contains '..'",
                })
            }
            Component::CurDir => {}
            Component::Normal(p) => out.push(p),
        }
    }
    Ok(out)
}
