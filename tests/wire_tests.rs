#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::fs::File;
use std::io::{Read as _, Write as _};

use fs_proxy::wire::{Call, Reply, Request, Value};
use fs_proxy::{Envelope, ErrorKind, FsService, OwnerId};
use serde_json::json;

const OWNER: OwnerId = OwnerId(3);

/// Decode `call`, dispatch it, and return the encoded reply.
fn round_trip(service: &FsService, call: serde_json::Value) -> serde_json::Value {
    let call: Call = serde_json::from_value(call).unwrap();
    let reply = Reply {
        id: call.id,
        envelope: service.dispatch(OWNER, call.request),
    };
    serde_json::to_value(&reply).unwrap()
}

#[test]
fn requests_decode_from_tagged_json() {
    let call: Call = serde_json::from_value(json!({
        "id": 9,
        "op": "set_writable",
        "path": "/tmp/x",
        "enable": true,
        "owner_only": false,
    }))
    .unwrap();
    assert_eq!(call.id, 9);
    assert_eq!(
        call.request,
        Request::SetWritable {
            path: "/tmp/x".to_owned(),
            enable: true,
            owner_only: false,
        }
    );

    assert!(serde_json::from_value::<Call>(json!({"id": 1, "op": "format_disk"})).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn success_reply_carries_the_value() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service();

    let reply = round_trip(
        &service,
        json!({"id": 7, "op": "is_directory", "path": tmp.path()}),
    );
    assert_eq!(reply, json!({"id": 7, "status": "ok", "value": true}));

    let reply = round_trip(
        &service,
        json!({"id": 8, "op": "mkdir", "path": tmp.path().join("d")}),
    );
    assert_eq!(reply, json!({"id": 8, "status": "ok", "value": null}));

    let reply = round_trip(&service, json!({"id": 9, "op": "list", "path": tmp.path()}));
    assert_eq!(reply, json!({"id": 9, "status": "ok", "value": ["d"]}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failure_reply_carries_kind_and_code() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service();

    let reply = round_trip(
        &service,
        json!({"id": 1, "op": "length", "path": tmp.path().join("missing")}),
    );
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["status"], "err");
    assert_eq!(reply["kind"], "path_resolution");
    assert_eq!(reply["code"], libc::ENOENT);
    assert!(reply["message"].as_str().unwrap().contains("missing"));

    let reply = round_trip(&service, json!({"id": 2, "op": "size", "handle": 12345}));
    assert_eq!(reply["kind"], "stale_handle");
    assert_eq!(reply["code"], libc::EBADF);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_of_unknown_handle_succeeds() {
    let service = common::service();
    let envelope = service.dispatch(OWNER, Request::Close { handle: 77 });
    assert_eq!(envelope, Envelope::Ok { value: Value::Unit });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn channel_over_dispatch() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service();
    let target = tmp.path().join("target");
    let fifo = common::mkfifo(tmp.path(), "relay");

    let envelope = service.dispatch(
        OWNER,
        Request::OpenChannel {
            path: target.to_str().unwrap().to_owned(),
            mode: libc::O_RDWR | libc::O_CREAT,
            fifo: fifo.to_str().unwrap().to_owned(),
        },
    );
    let Envelope::Ok {
        value: Value::Unsigned(handle),
    } = &envelope
    else {
        panic!("open_channel failed: {envelope:?}");
    };
    let handle = *handle;

    let mut tx = common::fifo_writer(&fifo);
    tx.write_all(b"wire").unwrap();
    assert_eq!(
        service.dispatch(
            OWNER,
            Request::Pwrite {
                handle,
                len: 4,
                offset: 0
            }
        ),
        Envelope::Ok {
            value: Value::Unsigned(4)
        }
    );

    let mut rx = common::fifo_reader_nonblocking(&fifo);
    assert_eq!(
        service.dispatch(
            OWNER,
            Request::Pread {
                handle,
                len: 16,
                offset: 0
            }
        ),
        Envelope::Ok {
            value: Value::Unsigned(4)
        }
    );
    let mut buf = [0u8; 4];
    rx.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"wire");

    // Another owner cannot see the handle.
    let foreign = service.dispatch(OwnerId(99), Request::Size { handle });
    assert_eq!(foreign.error_kind(), Some(ErrorKind::StaleHandle));

    assert!(service.dispatch(OWNER, Request::Close { handle }).is_ok());
    let after = service.dispatch(OWNER, Request::Size { handle });
    assert_eq!(after.error_kind(), Some(ErrorKind::StaleHandle));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_stream_over_dispatch() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service();
    let source = tmp.path().join("source");
    let data = common::payload(100_000);
    std::fs::write(&source, &data).unwrap();

    let fifo = common::mkfifo(tmp.path(), "conduit");
    let mut reader = common::fifo_reader(&fifo);

    let envelope = service.dispatch(
        OWNER,
        Request::OpenReadStream {
            path: source.to_str().unwrap().to_owned(),
            conduit: fifo.to_str().unwrap().to_owned(),
        },
    );
    assert!(envelope.is_ok(), "{envelope:?}");

    let received = tokio::task::spawn_blocking(move || {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        buf
    })
    .await
    .unwrap();
    assert!(received == data);
    common::wait_for_streams(&service).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_without_a_peer_fails_fast() {
    let tmp = tempfile::tempdir().unwrap();
    let service = common::service();
    let source = tmp.path().join("source");
    File::create(&source).unwrap();
    let fifo = common::mkfifo(tmp.path(), "lonely");

    // Nobody holds the read end, so the non-blocking write open fails with ENXIO.
    let envelope = service.dispatch(
        OWNER,
        Request::OpenReadStream {
            path: source.to_str().unwrap().to_owned(),
            conduit: fifo.to_str().unwrap().to_owned(),
        },
    );
    assert_eq!(envelope.error_kind(), Some(ErrorKind::PathResolution));
    assert_eq!(service.streams().active(), 0);
}
