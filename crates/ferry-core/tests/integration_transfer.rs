//! End-to-end tests over loopback sockets.
//!
//! Each test starts a real server (or peer) on an ephemeral port and drives
//! it through the public services.

mod common;

use std::sync::Arc;

use tokio::net::TcpStream;

use async_trait::async_trait;
use common::{
    assert_files_equal, create_temp_dir, create_test_file, entries, eventually, random_bytes,
    CountingReporter, TestServer,
};
use ferry_core::config::{Config, Transport};
use ferry_core::file::{FileSink, FileSource};
use ferry_core::peer::PeerNode;
use ferry_core::protocol::{
    self, encode_chunk, encode_payload, Chunk, FileListing, MessageType, OperationResult,
    TransferManifest, UploadResult,
};
use ferry_core::relay::Relay;
use ferry_core::report;
use ferry_core::service::{self, ConnectOptions, FileService, LocalService, RemoteService};
use ferry_core::storage::{RootLock, StorageRoot};
use ferry_core::transfer::{ChunkSink, ChunkSource, TransferSummary};
use ferry_core::Error;

async fn client(server: &TestServer) -> RemoteService {
    RemoteService::connect(server.addr(), ConnectOptions::default())
        .await
        .expect("Failed to connect")
}

/// Upload then download through a server reproduces the bytes exactly.
#[tokio::test]
async fn test_round_trip_through_server() {
    let dir = create_temp_dir();
    let server = TestServer::start(dir.path().join("server"), 1000).await;
    let remote = client(&server).await;

    let content = random_bytes(10_000 + 37);
    let original = create_test_file(&dir.path().join("local"), "data.bin", &content);

    let mut source = FileSource::open(&original)
        .await
        .expect("open source")
        .with_chunk_size(1000);
    let result = remote.upload(&mut source).await.expect("upload");
    assert!(result.success);
    assert_eq!(result.bytes_received, content.len() as u64);
    assert_files_equal(&original, &server.root.join("data.bin"));

    let fetched = dir.path().join("fetched.bin");
    let mut sink = FileSink::new(&fetched);
    let summary = remote.download("data.bin", &mut sink).await.expect("download");
    assert_eq!(summary.chunks, 11);
    assert_files_equal(&original, &fetched);

    server.stop().await;
}

/// A zero-byte file round-trips as a zero-byte file.
#[tokio::test]
async fn test_empty_file_round_trip() {
    let dir = create_temp_dir();
    let server = TestServer::start(dir.path().join("server"), 4).await;
    let remote = client(&server).await;

    let original = create_test_file(&dir.path().join("local"), "empty.txt", b"");
    let mut source = FileSource::open(&original).await.expect("open source");
    let result = remote.upload(&mut source).await.expect("upload");
    assert_eq!(result.bytes_received, 0);

    let fetched = dir.path().join("fetched.txt");
    let mut sink = FileSink::new(&fetched);
    let summary = remote.download("empty.txt", &mut sink).await.expect("download");
    assert_eq!(summary.chunks, 0);
    assert_eq!(std::fs::read(&fetched).expect("read"), b"");

    server.stop().await;
}

/// A file that is an exact multiple of the chunk size has no empty tail chunk.
#[tokio::test]
async fn test_exact_chunk_multiple() {
    let dir = create_temp_dir();
    let server = TestServer::start(dir.path().join("server"), 4).await;
    let remote = client(&server).await;

    let original = create_test_file(&dir.path().join("local"), "eight.txt", b"ABCDEFGH");
    let mut source = FileSource::open(&original)
        .await
        .expect("open source")
        .with_chunk_size(4);
    remote.upload(&mut source).await.expect("upload");

    let fetched = dir.path().join("eight.txt");
    let mut sink = FileSink::new(&fetched);
    let summary = remote.download("eight.txt", &mut sink).await.expect("download");
    assert_eq!(summary.chunks, 2);
    assert_eq!(summary.bytes, 8);

    server.stop().await;
}

/// Traversal names are rejected on upload and the connection stays usable.
#[tokio::test]
async fn test_upload_traversal_rejected() {
    let dir = create_temp_dir();
    let server = TestServer::start(dir.path().join("server"), 4).await;
    let remote = client(&server).await;

    let original = create_test_file(&dir.path().join("local"), "evil.txt", b"payload");
    let mut source = FileSource::open_as(&original, "../evil.txt")
        .await
        .expect("open source")
        .with_chunk_size(2);
    let err = remote.upload(&mut source).await.expect_err("rejected");
    assert!(matches!(err, Error::InvalidFilename(_)), "got {err:?}");

    assert!(!dir.path().join("evil.txt").exists());
    assert!(entries(&server.root).is_empty());

    let listing = remote.list().await.expect("list after rejection");
    assert!(listing.files.is_empty());

    server.stop().await;
}

/// A rejected upload name fails before a single chunk is read or sent.
#[tokio::test]
async fn test_rejected_upload_sends_nothing() {
    let dir = create_temp_dir();
    let server = TestServer::start(dir.path().join("server"), 10).await;
    let counter = Arc::new(CountingReporter::default());
    let remote = client(&server).await.with_reporter(counter.clone());

    let original = create_test_file(&dir.path().join("local"), "evil.txt", &[9u8; 1000]);
    let mut source = FileSource::open_as(&original, "../evil.txt")
        .await
        .expect("open source")
        .with_chunk_size(10);
    let err = remote.upload(&mut source).await.expect_err("rejected");
    assert!(matches!(err, Error::InvalidFilename(_)), "got {err:?}");
    assert_eq!(counter.progress_reports(), 0);

    let listing = remote.list().await.expect("list after rejection");
    assert!(listing.files.is_empty());

    server.stop().await;
}

/// Traversal names are rejected on download before anything is written.
#[tokio::test]
async fn test_download_traversal_rejected() {
    let dir = create_temp_dir();
    let server = TestServer::start(dir.path().join("server"), 4).await;
    let remote = client(&server).await;

    let target = dir.path().join("out.txt");
    let mut sink = FileSink::new(&target);
    let err = remote
        .download("../../etc/passwd", &mut sink)
        .await
        .expect_err("rejected");
    assert!(matches!(err, Error::InvalidFilename(_)));
    assert!(!target.exists());

    server.stop().await;
}

/// Downloading a missing file fails with `NotFound` and creates nothing.
#[tokio::test]
async fn test_missing_download_creates_nothing() {
    let dir = create_temp_dir();
    let server = TestServer::start(dir.path().join("server"), 4).await;
    let remote = client(&server).await;

    let local = dir.path().join("local");
    std::fs::create_dir_all(&local).expect("mkdir");
    let mut sink = FileSink::new(local.join("ghost.txt"));
    let err = remote.download("ghost.txt", &mut sink).await.expect_err("missing");
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
    assert!(entries(&local).is_empty());

    server.stop().await;
}

/// Deleting a missing file is a negative result, not an error.
#[tokio::test]
async fn test_delete_missing_file() {
    let dir = create_temp_dir();
    let server = TestServer::start(dir.path().join("server"), 4).await;
    let remote = client(&server).await;

    let result = remote.delete("nothing.txt").await.expect("delete");
    assert!(!result.success);

    create_test_file(&server.root, "present.txt", b"x");
    let result = remote.delete("present.txt").await.expect("delete");
    assert!(result.success);
    assert!(!server.root.join("present.txt").exists());

    server.stop().await;
}

/// An empty storage root lists as an empty sequence.
#[tokio::test]
async fn test_empty_listing() {
    let dir = create_temp_dir();
    let server = TestServer::start(dir.path().join("server"), 4).await;
    let remote = client(&server).await;

    let listing = remote.list().await.expect("list");
    assert!(listing.files.is_empty());

    server.stop().await;
}

/// Concurrent deletes of one file: exactly one succeeds.
#[tokio::test]
async fn test_concurrent_deletes() {
    let dir = create_temp_dir();
    let server = TestServer::start(dir.path().join("server"), 4).await;
    create_test_file(&server.root, "shared.txt", b"contended");

    let first = Arc::new(client(&server).await);
    let second = Arc::new(client(&server).await);

    let a = tokio::spawn({
        let first = Arc::clone(&first);
        async move { first.delete("shared.txt").await }
    });
    let b = tokio::spawn({
        let second = Arc::clone(&second);
        async move { second.delete("shared.txt").await }
    });

    let a = a.await.expect("join").expect("delete");
    let b = b.await.expect("join").expect("delete");
    assert!(a.success ^ b.success, "exactly one delete should succeed");

    server.stop().await;
}

/// A relay copies a file between two servers and leaves no staging behind.
#[tokio::test]
async fn test_relay_between_servers() {
    let dir = create_temp_dir();
    let server_a = TestServer::start(dir.path().join("a"), 3).await;
    let server_b = TestServer::start(dir.path().join("b"), 3).await;
    let original = create_test_file(&server_a.root, "report.txt", b"quarterly numbers");

    let a = client(&server_a).await;
    let b = client(&server_b).await;

    let staging = dir.path().join("staging");
    std::fs::create_dir_all(&staging).expect("mkdir");
    let result = Relay::new()
        .with_chunk_size(5)
        .with_staging_root(&staging)
        .sync_file(&a, &b, "report.txt", None)
        .await
        .expect("relay");

    assert_eq!(result.bytes_received, 17);
    assert_files_equal(&original, &server_b.root.join("report.txt"));
    assert!(entries(&staging).is_empty());

    server_a.stop().await;
    server_b.stop().await;
}

/// A relay with a missing source file fails and stores nothing.
#[tokio::test]
async fn test_relay_missing_source() {
    let dir = create_temp_dir();
    let server_a = TestServer::start(dir.path().join("a"), 3).await;
    let server_b = TestServer::start(dir.path().join("b"), 3).await;

    let a = client(&server_a).await;
    let b = client(&server_b).await;

    let err = Relay::new()
        .sync_file(&a, &b, "absent.txt", None)
        .await
        .expect_err("missing");
    assert!(matches!(err, Error::NotFound(_)));
    assert!(entries(&server_b.root).is_empty());

    server_a.stop().await;
    server_b.stop().await;
}

/// Raw peer mode: a pushed file lands as `received_<name>`.
#[tokio::test]
async fn test_raw_peer_transfer() {
    let dir = create_temp_dir();
    let inbox = dir.path().join("inbox");
    let receiver = LocalService::open(StorageRoot::new(&inbox, RootLock::new()).with_prefix("received_"))
        .await
        .expect("open receiver");
    let node = PeerNode::bind("127.0.0.1:0", receiver.shared())
        .await
        .expect("bind peer")
        .with_chunk_size(7);
    let handle = node.spawn().expect("spawn peer");

    let mut config = Config::default();
    config.transfer.transport = Transport::Raw;
    let sender = service::remote_service(handle.local_addr().to_string(), &config, report::noop());

    let content = random_bytes(5000);
    let original = create_test_file(&dir.path().join("outbox"), "photo.jpg", &content);
    let mut source = FileSource::open(&original).await.expect("open source");
    let result = sender.upload(&mut source).await.expect("send");
    assert_eq!(result.bytes_received, 5000);

    let stored = inbox.join("received_photo.jpg");
    assert!(eventually(|| stored.exists()).await, "peer never stored the file");
    assert_files_equal(&original, &stored);

    handle.shutdown().await.expect("stop peer");
}

/// A sender that disconnects mid-upload leaves no file or partial behind.
#[tokio::test]
async fn test_truncated_upload_leaves_nothing() {
    let dir = create_temp_dir();
    let server = TestServer::start(dir.path().join("server"), 4).await;

    let mut stream = TcpStream::connect(server.addr()).await.expect("connect");
    let manifest = TransferManifest::new("cut.txt", 12, 4);
    protocol::write_frame(
        &mut stream,
        MessageType::UploadOpen,
        &encode_payload(&manifest).expect("encode"),
    )
    .await
    .expect("write open");
    let chunk = Chunk {
        filename: "cut.txt".to_string(),
        payload: b"ABCD".to_vec(),
        index: 0,
        total_count: 3,
        file_size: 12,
    };
    protocol::write_frame(&mut stream, MessageType::Chunk, &encode_chunk(&chunk))
        .await
        .expect("write chunk");
    drop(stream);

    // Give the server time to observe the disconnect and clean up.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(eventually(|| entries(&server.root).is_empty()).await);

    server.stop().await;
}

/// A malformed frame is answered with an `Error` frame.
#[tokio::test]
async fn test_bad_magic_gets_error_frame() {
    let dir = create_temp_dir();
    let server = TestServer::start(dir.path().join("server"), 4).await;

    let mut stream = TcpStream::connect(server.addr()).await.expect("connect");
    tokio::io::AsyncWriteExt::write_all(&mut stream, b"NOPE\x01\x00\x20\x00\x00\x00\x00")
        .await
        .expect("write");

    let (header, payload) = protocol::read_frame(&mut stream).await.expect("read reply");
    assert_eq!(header.message_type, MessageType::Error);
    let err = protocol::expect_message(&header, &payload, MessageType::FileListing)
        .expect_err("error frame");
    assert!(matches!(err, Error::ProtocolError(_)), "got {err:?}");

    server.stop().await;
}

/// A failed call does not poison the persistent connection.
#[tokio::test]
async fn test_connection_reused_after_error() {
    let dir = create_temp_dir();
    let server = TestServer::start(dir.path().join("server"), 4).await;
    let remote = client(&server).await;

    let mut sink = FileSink::new(dir.path().join("nothing.txt"));
    assert!(remote.download("nothing.txt", &mut sink).await.is_err());

    let original = create_test_file(&dir.path().join("local"), "after.txt", b"still works");
    let mut source = FileSource::open(&original).await.expect("open source");
    remote.upload(&mut source).await.expect("upload after error");

    let listing = remote.list().await.expect("list");
    assert_eq!(listing.files, vec!["after.txt".to_string()]);

    server.stop().await;
}

/// A lazy client connects on first use.
#[tokio::test]
async fn test_lazy_client_connects_on_first_call() {
    let dir = create_temp_dir();
    let server = TestServer::start(dir.path().join("server"), 4).await;
    create_test_file(&server.root, "one.txt", b"1");

    let remote = RemoteService::lazy(server.addr(), ConnectOptions::default());
    let listing = remote.list().await.expect("list");
    assert_eq!(listing.files, vec!["one.txt".to_string()]);

    server.stop().await;
}

/// Sends the first chunk of every download, then fails.
struct FailingDisk;

#[async_trait]
impl FileService for FailingDisk {
    async fn upload(&self, _source: &mut dyn ChunkSource) -> ferry_core::Result<UploadResult> {
        Err(Error::Unsupported("upload".to_string()))
    }

    async fn download(
        &self,
        filename: &str,
        sink: &mut dyn ChunkSink,
    ) -> ferry_core::Result<TransferSummary> {
        let manifest = TransferManifest::new(filename, 8, 4);
        sink.open(&manifest).await?;
        sink.send_chunk(Chunk {
            filename: filename.to_string(),
            payload: b"ABCD".to_vec(),
            index: 0,
            total_count: 2,
            file_size: 8,
        })
        .await?;
        Err(Error::storage("/disk/f", std::io::Error::other("disk gone")))
    }

    async fn list(&self) -> ferry_core::Result<FileListing> {
        Ok(FileListing {
            files: vec!["ok".to_string()],
        })
    }

    async fn delete(&self, _filename: &str) -> ferry_core::Result<OperationResult> {
        Err(Error::Unsupported("delete".to_string()))
    }

    fn endpoint(&self) -> String {
        "failing-disk".to_string()
    }
}

/// A server failing mid-download: the client gets the error, keeps no
/// partial file, and can keep using the connection.
#[tokio::test]
async fn test_download_failing_midway() {
    let dir = create_temp_dir();
    let server = TestServer::serve(Arc::new(FailingDisk), dir.path().join("unused")).await;
    let remote = client(&server).await;

    let local = dir.path().join("local");
    std::fs::create_dir_all(&local).expect("mkdir");
    let mut sink = FileSink::new(local.join("f.bin"));
    let err = remote.download("f.bin", &mut sink).await.expect_err("failed midway");

    assert!(matches!(err, Error::Storage { .. }), "got {err:?}");
    let message = err.to_string();
    assert!(message.contains("disk gone"));
    assert_eq!(message.matches("storage error").count(), 1, "{message}");

    assert!(entries(&local).is_empty(), "left behind: {:?}", entries(&local));
    assert!(sink.stored_path().is_none());

    let listing = remote.list().await.expect("connection reused");
    assert_eq!(listing.files, vec!["ok".to_string()]);

    server.stop().await;
}
