#![allow(dead_code)]

use std::io::{Read as _, Write as _};
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

pub enum Item<'a> {
    Dir(&'a str, u32),
    File(&'a str, u32, &'a [u8]),
    Symlink(&'a str, &'a str),
    HardLink(&'a str, &'a str),
    GlobalHeader,
    /// Written with the raw name bytes, bypassing tar::Builder path checks.
    RawFile(&'a [u8], &'a [u8]),
}

pub fn tar_bytes(items: &[Item<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for item in items {
        match item {
            Item::Dir(path, mode) => {
                let mut h = tar::Header::new_gnu();
                h.set_entry_type(tar::EntryType::Directory);
                h.set_mode(*mode);
                h.set_size(0);
                builder
                    .append_data(&mut h, path, std::io::empty())
                    .expect("append dir");
            }
            Item::File(path, mode, body) => {
                let mut h = tar::Header::new_gnu();
                h.set_entry_type(tar::EntryType::Regular);
                h.set_mode(*mode);
                h.set_size(body.len() as u64);
                builder
                    .append_data(&mut h, path, *body)
                    .expect("append file");
            }
            Item::Symlink(path, target) => {
                let mut h = tar::Header::new_gnu();
                h.set_entry_type(tar::EntryType::Symlink);
                h.set_mode(0o777);
                h.set_size(0);
                h.set_link_name(target).expect("link name");
                builder
                    .append_data(&mut h, path, std::io::empty())
                    .expect("append symlink");
            }
            Item::HardLink(path, target) => {
                let mut h = tar::Header::new_gnu();
                h.set_entry_type(tar::EntryType::Link);
                h.set_mode(0o644);
                h.set_size(0);
                h.set_link_name(target).expect("link name");
                builder
                    .append_data(&mut h, path, std::io::empty())
                    .expect("append hard link");
            }
            Item::GlobalHeader => {
                let body: &[u8] = b"17 comment=hello\n";
                let mut h = tar::Header::new_ustar();
                h.set_entry_type(tar::EntryType::XGlobalHeader);
                h.set_mode(0o644);
                h.set_size(body.len() as u64);
                builder
                    .append_data(&mut h, "pax_global_header", body)
                    .expect("append global header");
            }
            Item::RawFile(name, body) => {
                let mut h = tar::Header::new_gnu();
                h.set_entry_type(tar::EntryType::Regular);
                h.set_mode(0o644);
                h.set_size(body.len() as u64);
                h.as_old_mut().name[..name.len()].copy_from_slice(name);
                h.set_cksum();
                builder.append(&h, *body).expect("append raw");
            }
        }
    }
    builder.into_inner().expect("finish tar")
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(bytes).expect("gzip write");
    enc.finish().expect("gzip finish")
}

pub fn bzip2(bytes: &[u8]) -> Vec<u8> {
    let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    enc.write_all(bytes).expect("bzip2 write");
    enc.finish().expect("bzip2 finish")
}

pub fn zip_bytes(items: &[Item<'_>]) -> Vec<u8> {
    let mut w = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for item in items {
        match item {
            Item::Dir(path, mode) => {
                w.add_directory(*path, zip_options(*mode))
                    .expect("zip dir");
            }
            Item::File(path, mode, body) => {
                w.start_file(*path, zip_options(*mode))
                    .expect("zip file");
                w.write_all(body).expect("zip write");
            }
            Item::Symlink(path, target) => {
                w.add_symlink(*path, *target, zip_options(0o777))
                    .expect("zip symlink");
            }
            Item::HardLink(..) | Item::GlobalHeader | Item::RawFile(..) => {
                panic!("not representable in zip")
            }
        }
    }
    w.finish().expect("zip finish").into_inner()
}

fn zip_options(mode: u32) -> zip::write::SimpleFileOptions {
    zip::write::SimpleFileOptions::default().unix_permissions(mode)
}

#[cfg(unix)]
pub fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt as _;
    std::fs::metadata(path).expect("metadata").permissions().mode() & 0o7777
}

pub fn file_url(path: &Path) -> String {
    url::Url::from_file_path(path)
        .expect("absolute path")
        .to_string()
}

/// Serves exactly one HTTP response on a fresh local port.
pub fn start_http_server_once(status_line: &str, body: Vec<u8>, file_name: &str) -> String {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    let status_line = status_line.to_string();

    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let _ = stream.set_read_timeout(Some(Duration::from_secs(1)));

        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        for _ in 0..64 {
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&tmp[..n]);
                    if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        let head = format!(
            "HTTP/1.1 {status_line}\r\n\
Content-Type: application/octet-stream\r\n\
Content-Length: {}\r\n\
Connection: close\r\n\
\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).expect("write head");
        stream.write_all(&body).expect("write body");
        let _ = stream.flush();
    });

    format!("http://{addr}/{file_name}")
}
