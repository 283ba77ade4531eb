use crate::streams::DirectoryStreamProvider;

use woof_core::server::stream::{StreamProvider, read_fragment};

use std::fs;

use tempfile::TempDir;

fn provider_with_files() -> (TempDir, DirectoryStreamProvider) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("hello.txt"), b"hello, woof").unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("nested").join("data.bin"), [7u8; 10]).unwrap();
    let provider = DirectoryStreamProvider::new(dir.path());
    (dir, provider)
}

/// **VALUE**: Files below the root are served as streams.
///
/// **BUG THIS CATCHES**: Would catch the provider returning a stream that is not
/// positioned at the requested offset after a seek.
#[tokio::test]
async fn given_existing_file_when_fragment_read_then_bytes_match() {
    // GIVEN: A directory with hello.txt
    let (_dir, provider) = provider_with_files();

    // WHEN: Reading bytes 7.. of the file
    let mut stream = provider.get_stream_by_id("hello.txt").await.unwrap().unwrap();
    let fragment = read_fragment(&mut stream, 7, 100).await.unwrap();

    // THEN: The tail is returned and marked as the end
    assert_eq!(fragment.data, b"woof");
    assert!(fragment.is_end);
}

#[tokio::test]
async fn given_nested_stream_id_when_resolved_then_served() {
    let (_dir, provider) = provider_with_files();

    let stream = provider.get_stream_by_id("nested/data.bin").await.unwrap();

    assert!(stream.is_some());
}

#[tokio::test]
async fn given_unknown_stream_id_when_requested_then_none() {
    let (_dir, provider) = provider_with_files();

    let stream = provider.get_stream_by_id("missing.txt").await.unwrap();

    assert!(stream.is_none());
}

/// **VALUE**: Stream ids cannot escape the configured directory.
///
/// **WHY THIS MATTERS**: Stream ids come straight from the network.
///
/// **BUG THIS CATCHES**: Would catch `..` or absolute ids being joined onto
/// the root, exposing arbitrary files.
#[tokio::test]
async fn given_traversal_stream_id_when_requested_then_rejected() {
    // GIVEN: A file outside the served directory
    let outer = TempDir::new().unwrap();
    let served = outer.path().join("served");
    fs::create_dir(&served).unwrap();
    fs::write(outer.path().join("secret.txt"), b"top secret").unwrap();
    let provider = DirectoryStreamProvider::new(&served);

    // WHEN / THEN: Relative, absolute and empty ids all resolve to nothing
    assert!(provider.resolve("../secret.txt").is_none());
    assert!(provider.resolve("./hello.txt").is_none());
    assert!(provider.resolve("").is_none());
    let absolute = outer.path().join("secret.txt");
    assert!(provider.resolve(absolute.to_str().unwrap()).is_none());

    let stream = provider.get_stream_by_id("../secret.txt").await.unwrap();
    assert!(stream.is_none());
}

#[tokio::test]
async fn given_directory_stream_id_when_requested_then_none() {
    let (_dir, provider) = provider_with_files();

    let stream = provider.get_stream_by_id("nested").await.unwrap();

    assert!(stream.is_none());
}
