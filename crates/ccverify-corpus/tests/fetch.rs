mod common;

use std::time::Duration;

use ccverify_corpus::{fetch, FetchOptions};
use sha2::{Digest as _, Sha256};

fn opts() -> FetchOptions {
    FetchOptions {
        timeout: Some(Duration::from_secs(10)),
        expected_sha256: None,
    }
}

#[test]
fn http_body_lands_in_scratch_file_removed_on_drop() {
    let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let url = common::start_http_server_once("200 OK", body.clone(), "corpus.tar.gz");

    let fetched = fetch(&url, &opts()).expect("fetch");
    assert_eq!(fetched.len(), body.len() as u64);
    assert!(fetched.path().ends_with("corpus.tar.gz"));
    assert_eq!(std::fs::read(fetched.path()).expect("read"), body);

    let expected: String = Sha256::digest(&body)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    assert_eq!(fetched.sha256(), expected);

    let scratch = fetched.path().parent().expect("parent").to_path_buf();
    drop(fetched);
    assert!(!scratch.exists(), "scratch dir must be deleted");
}

#[test]
fn http_error_status_is_a_network_error() {
    let url = common::start_http_server_once("404 Not Found", b"nope".to_vec(), "x.zip");
    let err = fetch(&url, &opts()).expect_err("404");
    assert_eq!(err.category(), "network");
    assert!(err.to_string().contains("x.zip"), "{err}");
}

#[test]
fn refused_connection_is_a_network_error() {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = fetch(&format!("http://{addr}/x.tar.gz"), &opts()).expect_err("refused");
    assert_eq!(err.category(), "network");
}

#[test]
fn file_url_is_copied_and_digest_checked() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("local.tar.bz2");
    std::fs::write(&src, b"payload").expect("write");
    let url = common::file_url(&src);

    let fetched = fetch(&url, &opts()).expect("fetch");
    assert_eq!(std::fs::read(fetched.path()).expect("read"), b"payload");

    let good = FetchOptions {
        expected_sha256: Some(fetched.sha256().to_ascii_uppercase()),
        ..opts()
    };
    fetch(&url, &good).expect("matching digest, case-insensitive");

    let bad = FetchOptions {
        expected_sha256: Some("00".repeat(32)),
        ..opts()
    };
    let err = fetch(&url, &bad).expect_err("digest mismatch");
    assert_eq!(err.category(), "network");
    assert!(err.to_string().contains("sha256 mismatch"), "{err}");
}

#[test]
fn missing_local_file_is_a_filesystem_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = common::file_url(&dir.path().join("absent.zip"));
    let err = fetch(&url, &opts()).expect_err("missing");
    assert_eq!(err.category(), "filesystem");
}

#[test]
fn unsupported_scheme_is_rejected() {
    let err = fetch("ftp://example.invalid/x.tar.gz", &opts()).expect_err("ftp");
    assert_eq!(err.category(), "network");
}
