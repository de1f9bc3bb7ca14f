#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::io::{Read as _, Write as _};
use std::os::fd::OwnedFd;

use fs_proxy::ErrorKind;
use fs_proxy::fs::PIPE_CAPACITY;

use common::{fifo_pair, payload, wait_for_streams};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_stream_delivers_the_whole_file() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service();
    let source = tmp.path().join("source");
    let data = payload(PIPE_CAPACITY * 5 + 123);
    std::fs::write(&source, &data).unwrap();

    let (mut reader, sink) = fifo_pair(tmp.path(), "out");
    service
        .open_read_stream(source.to_str().unwrap(), sink)
        .unwrap();

    let received = tokio::task::spawn_blocking(move || {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        buf
    })
    .await
    .unwrap();

    assert_eq!(received.len(), data.len());
    assert!(received == data, "streamed bytes differ from the file");
    wait_for_streams(&service).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_stream_of_empty_file_closes_the_conduit() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service();
    let source = tmp.path().join("empty");
    std::fs::write(&source, b"").unwrap();

    let (mut reader, sink) = fifo_pair(tmp.path(), "out");
    service
        .open_read_stream(source.to_str().unwrap(), sink)
        .unwrap();

    let received = tokio::task::spawn_blocking(move || {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        buf
    })
    .await
    .unwrap();
    assert!(received.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_stream_stores_everything_written() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service();
    let dest = tmp.path().join("dest");
    let data = payload(PIPE_CAPACITY * 3 + 7);

    let fifo = common::mkfifo(tmp.path(), "in");
    let source = OwnedFd::from(common::fifo_reader(&fifo));
    let mut writer = common::fifo_writer(&fifo);

    service
        .open_write_stream(dest.to_str().unwrap(), source, false)
        .unwrap();

    let sent = data.clone();
    tokio::task::spawn_blocking(move || {
        writer.write_all(&sent).unwrap();
    })
    .await
    .unwrap();

    wait_for_streams(&service).await;
    assert!(std::fs::read(&dest).unwrap() == data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_stream_appends_or_truncates() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service();
    let dest = tmp.path().join("dest");
    std::fs::write(&dest, b"head-").unwrap();

    for (append, body, expected) in [
        (true, &b"tail"[..], &b"head-tail"[..]),
        (false, &b"fresh"[..], &b"fresh"[..]),
    ] {
        let fifo = common::mkfifo(tmp.path(), if append { "a" } else { "t" });
        let source = OwnedFd::from(common::fifo_reader(&fifo));
        let mut writer = common::fifo_writer(&fifo);
        service
            .open_write_stream(dest.to_str().unwrap(), source, append)
            .unwrap();
        writer.write_all(body).unwrap();
        drop(writer);
        wait_for_streams(&service).await;
        assert_eq!(std::fs::read(&dest).unwrap(), expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_stream_of_missing_file_fails_synchronously() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service();
    let (_reader, sink) = fifo_pair(tmp.path(), "out");

    let err = service
        .open_read_stream(tmp.path().join("missing").to_str().unwrap(), sink)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathResolution);
    assert_eq!(err.errno(), libc::ENOENT);
    assert_eq!(service.streams().active(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_stream_into_missing_directory_fails_synchronously() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service();
    let fifo = common::mkfifo(tmp.path(), "in");
    let source = OwnedFd::from(common::fifo_reader(&fifo));

    let err = service
        .open_write_stream(
            tmp.path().join("no/such/dir/file").to_str().unwrap(),
            source,
            false,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathResolution);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reader_hanging_up_ends_the_stream() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service();
    let source = tmp.path().join("source");
    std::fs::write(&source, payload(PIPE_CAPACITY * 8)).unwrap();

    let (reader, sink) = fifo_pair(tmp.path(), "out");
    drop(reader);
    service
        .open_read_stream(source.to_str().unwrap(), sink)
        .unwrap();

    // EPIPE inside the worker is logged and swallowed.
    wait_for_streams(&service).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_streams_do_not_interfere() {
    let tmp = tempfile::tempdir().unwrap();
    let service = std::sync::Arc::new(common::service());

    let mut set = tokio::task::JoinSet::new();
    for i in 0..8usize {
        let source = tmp.path().join(format!("src{i}"));
        let data = payload(PIPE_CAPACITY + i * 1000);
        std::fs::write(&source, &data).unwrap();
        let (mut reader, sink) = fifo_pair(tmp.path(), &format!("out{i}"));
        service
            .open_read_stream(source.to_str().unwrap(), sink)
            .unwrap();
        set.spawn_blocking(move || {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).unwrap();
            assert!(buf == data, "stream {i} corrupted");
        });
    }
    while let Some(res) = set.join_next().await {
        res.unwrap();
    }
    wait_for_streams(&service).await;
}
