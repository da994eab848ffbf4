use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest as _, Sha256};
use url::Url;

use crate::error::{fs_err, CorpusError};
use crate::scratch::ScratchDir;

const CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Bound on the whole transfer; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub expected_sha256: Option<String>,
}

/// A downloaded body. The backing scratch directory is deleted when this is dropped.
#[derive(Debug)]
pub struct Fetched {
    _scratch: ScratchDir,
    path: PathBuf,
    len: u64,
    sha256: String,
}

impl Fetched {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

pub fn fetch(url: &str, opts: &FetchOptions) -> Result<Fetched, CorpusError> {
    let parsed = Url::parse(url).map_err(|e| CorpusError::Network {
        url: url.to_string(),
        message: format!("invalid url: {e}"),
    })?;

    let scratch = ScratchDir::new("ccverify_fetch")
        .map_err(fs_err("create scratch dir", &std::env::temp_dir()))?;
    let filename = url_filename(url).unwrap_or_else(|| "download.bin".to_string());
    let path = scratch.path().join(filename);

    let (len, sha256) = match parsed.scheme() {
        "http" | "https" => {
            let agent: ureq::Agent = ureq::Agent::config_builder()
                .timeout_global(opts.timeout)
                .build()
                .into();
            let resp = agent
                .get(parsed.as_str())
                .call()
                .map_err(|e| CorpusError::Network {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            let reader = resp.into_body().into_reader();
            stream_to_file(url, reader, &path, true)?
        }
        "file" => {
            let src = parsed.to_file_path().map_err(|_| CorpusError::Network {
                url: url.to_string(),
                message: "file url could not be converted to a path".to_string(),
            })?;
            let f = File::open(&src).map_err(fs_err("open", &src))?;
            stream_to_file(url, f, &path, false)?
        }
        other => {
            return Err(CorpusError::Network {
                url: url.to_string(),
                message: format!("unsupported url scheme {other:?}"),
            })
        }
    };

    if let Some(expected) = &opts.expected_sha256 {
        if !expected.trim().eq_ignore_ascii_case(&sha256) {
            return Err(CorpusError::Network {
                url: url.to_string(),
                message: format!("sha256 mismatch: expected {expected}, got {sha256}"),
            });
        }
    }

    Ok(Fetched {
        _scratch: scratch,
        path,
        len,
        sha256,
    })
}

fn stream_to_file<R: Read>(
    url: &str,
    mut reader: R,
    dest: &Path,
    network: bool,
) -> Result<(u64, String), CorpusError> {
    let f = File::create(dest).map_err(fs_err("create", dest))?;
    let mut w = BufWriter::new(f);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    let mut total: u64 = 0;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) if network => {
                return Err(CorpusError::Network {
                    url: url.to_string(),
                    message: format!("read body: {err}"),
                })
            }
            Err(err) => return Err(fs_err("read", dest)(err)),
        };
        hasher.update(&buf[..n]);
        w.write_all(&buf[..n]).map_err(fs_err("write", dest))?;
        total += n as u64;
    }

    w.flush().map_err(fs_err("flush", dest))?;
    let f = w
        .into_inner()
        .map_err(|e| fs_err("flush", dest)(e.into_error()))?;
    f.sync_all().map_err(fs_err("close", dest))?;

    Ok((total, hex_lower(&hasher.finalize())))
}

pub fn url_filename(url: &str) -> Option<String> {
    let parsed = url.split(['?', '#']).next().unwrap_or(url);
    let file = parsed.rsplit('/').next()?;
    if file.is_empty() {
        return None;
    }
    Some(file.to_string())
}

fn hex_lower(bytes: &[u8]) -> String {
    const LUT: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(LUT[(b >> 4) as usize] as char);
        out.push(LUT[(b & 0x0F) as usize] as char);
    }
    out
}
