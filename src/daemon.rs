use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::select;
use tracing::{debug, error, info, warn};

use fs_proxy::link::DeathRecipients;
use fs_proxy::wire::{Call, Reply, Value};
use fs_proxy::{Envelope, FsError, FsService, OwnerId, ServiceOptions};

use crate::app_config;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Prepares the socket path.
///
/// - Creates the parent directory if it does not exist.
/// - Removes a stale socket left behind by a previous run.
async fn prepare_socket(socket_path: &Path) -> Result<(), std::io::Error> {
    if let Some(parent) = socket_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match tokio::fs::remove_file(socket_path).await {
        Ok(()) => {
            debug!(path = %socket_path.display(), "Removed stale socket.");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

async fn wait_for_exit() -> Result<(), std::io::Error> {
    use tokio::signal;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut sighup = signal::unix::signal(signal::unix::SignalKind::hangup())?;
    select! {
        _ = signal::ctrl_c() => {
            debug!("Received Ctrl+C signal, shutting down...");
        },
        _ = sigterm.recv() => {
            debug!("Received termination signal, shutting down...");
        },
        _ = sighup.recv() => {
            debug!("Received hangup signal, shutting down...");
        },
    }
    Ok(())
}

fn decode_failure(e: &serde_json::Error) -> Reply {
    warn!(error = %e, "Discarding malformed call.");
    Reply {
        id: 0,
        envelope: Envelope::from(Err::<Value, _>(FsError::io("decode", libc::EINVAL))),
    }
}

async fn answer(service: &Arc<FsService>, owner: OwnerId, line: &str) -> Reply {
    let call = match serde_json::from_str::<Call>(line) {
        Ok(call) => call,
        Err(e) => return decode_failure(&e),
    };

    let svc = Arc::clone(service);
    let envelope = tokio::task::spawn_blocking(move || svc.dispatch(owner, call.request))
        .await
        .unwrap_or_else(|e| {
            error!(%owner, error = %e, "Dispatch task failed.");
            Envelope::from(Err::<Value, _>(FsError::io("dispatch", libc::EIO)))
        });

    Reply {
        id: call.id,
        envelope,
    }
}

/// Serve newline-delimited JSON calls from one peer until it hangs up.
async fn serve_connection(service: Arc<FsService>, owner: OwnerId, stream: UnixStream) {
    let peer = DeathRecipients::new();
    if let Err(e) = service.register(owner, &peer) {
        warn!(%owner, error = %e, "Refusing connection without a liveness link.");
        return;
    }
    debug!(%owner, "Peer connected.");

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(%owner, error = %e, "Failed to read from peer.");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = answer(&service, owner, &line).await;
        let mut encoded = match serde_json::to_string(&reply) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(%owner, error = %e, "Failed to encode reply.");
                break;
            }
        };
        encoded.push('\n');
        if let Err(e) = write_half.write_all(encoded.as_bytes()).await {
            warn!(%owner, error = %e, "Failed to write to peer.");
            break;
        }
    }

    peer.notify();
}

async fn accept_loop(listener: UnixListener, service: Arc<FsService>) -> Result<(), std::io::Error> {
    let mut next_owner: u64 = 1;
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let owner = OwnerId(next_owner);
                next_owner += 1;
                tokio::spawn(serve_connection(Arc::clone(&service), owner, stream));
            }
            Err(e) => accept_failed(&e).await,
        }
    }
}

/// Pause after a failed `accept` so a persistent error (e.g. `EMFILE`) does not spin the loop.
async fn accept_failed(e: &std::io::Error) {
    warn!(error = %e, "Failed to accept connection.");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

/// Main entry point for the daemon.
pub async fn run(
    config: app_config::Config,
    handle: tokio::runtime::Handle,
) -> Result<(), std::io::Error> {
    prepare_socket(&config.socket_path).await?;

    let listener = UnixListener::bind(&config.socket_path)?;
    let service = Arc::new(FsService::new(
        ServiceOptions {
            path_cache_capacity: config.path_cache_capacity,
        },
        handle,
    ));

    info!(socket = %config.socket_path.display(), "fs-proxy is running. Press Ctrl+C to stop.");

    let result = select! {
        r = accept_loop(listener, service) => r,
        r = wait_for_exit() => r,
    };

    if let Err(e) = tokio::fs::remove_file(&config.socket_path).await {
        debug!(error = %e, "Socket was already gone at shutdown.");
    }
    result
}

pub fn spawn(config: app_config::Config) -> Result<(), std::io::Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config, runtime.handle().clone()))
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    async fn next_reply(
        replies: &mut tokio::io::Lines<BufReader<tokio::net::unix::OwnedReadHalf>>,
    ) -> serde_json::Value {
        let line = replies
            .next_line()
            .await
            .unwrap_or_else(|e| panic!("read: {e}"))
            .unwrap_or_else(|| panic!("server hung up"));
        serde_json::from_str(&line).unwrap_or_else(|e| panic!("reply: {e}"))
    }

    #[tokio::test]
    async fn failed_accept_backs_off() {
        let started = Instant::now();
        accept_failed(&std::io::Error::from_raw_os_error(libc::EMFILE)).await;
        assert!(started.elapsed() >= ACCEPT_BACKOFF);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn accepted_peer_gets_replies_per_line() {
        let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let socket = tmp.path().join("sock").join("fs-proxy.sock");
        prepare_socket(&socket)
            .await
            .unwrap_or_else(|e| panic!("prepare: {e}"));
        let listener = UnixListener::bind(&socket).unwrap_or_else(|e| panic!("bind: {e}"));
        let service = Arc::new(FsService::new(
            ServiceOptions::default(),
            tokio::runtime::Handle::current(),
        ));
        let server = tokio::spawn(accept_loop(listener, service));

        let stream = UnixStream::connect(&socket)
            .await
            .unwrap_or_else(|e| panic!("connect: {e}"));
        let (read_half, mut write_half) = stream.into_split();
        let mut replies = BufReader::new(read_half).lines();

        let call = serde_json::json!({"id": 4, "op": "is_directory", "path": tmp.path()});
        let garbage = "{not json";
        write_half
            .write_all(format!("{call}\n\n{garbage}\n").as_bytes())
            .await
            .unwrap_or_else(|e| panic!("write: {e}"));

        assert_eq!(
            next_reply(&mut replies).await,
            serde_json::json!({"id": 4, "status": "ok", "value": true})
        );
        let rejected = next_reply(&mut replies).await;
        assert_eq!(rejected["id"], 0);
        assert_eq!(rejected["code"], libc::EINVAL);

        server.abort();
    }
}
