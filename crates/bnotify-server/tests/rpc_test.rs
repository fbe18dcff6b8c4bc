//! End-to-end tests of the local RPC surface, client to queue.

mod common;

use bnotify_client::{ClientError, send_notification};
use bnotify_proto::{MAX_CONTENT_SIZE, RpcAddr, RpcErrorKind};
use bnotify_server::{
    ChaoticStorage, DispatcherConfig, MemoryStorage, NotifyService, RpcListener, ServerError,
    Storage,
};
use common::{RecordingEnv, ScriptedGateway, test_key};
use tokio::sync::oneshot;

async fn start(
    addr: &RpcAddr,
    service: NotifyService<impl Storage, ScriptedGateway, RecordingEnv>,
) -> (RpcAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = RpcListener::bind(addr).await.unwrap();
    let local = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        listener
            .serve(service, async {
                let _ = stopped.await;
            })
            .await
            .unwrap();
    });
    (local, stop, server)
}

fn memory_service(
    storage: &MemoryStorage,
) -> NotifyService<MemoryStorage, ScriptedGateway, RecordingEnv> {
    NotifyService::new(
        storage.clone(),
        ScriptedGateway::default(),
        RecordingEnv::default(),
        test_key(),
        DispatcherConfig::default(),
    )
}

fn loopback() -> RpcAddr {
    "tcp://127.0.0.1:0".parse().unwrap()
}

#[tokio::test]
async fn send_over_tcp_queues_notification() {
    let storage = MemoryStorage::new();
    let (addr, stop, server) = start(&loopback(), memory_service(&storage)).await;

    send_notification(&addr, "T", "X").await.unwrap();
    send_notification(&addr, "T", "Y").await.unwrap();

    // Both allocated, in request order
    assert_eq!(storage.next_sequence().unwrap(), 3);

    stop.send(()).unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn missing_fields_rejected_without_persisting() {
    let storage = MemoryStorage::new();
    let (addr, stop, server) = start(&loopback(), memory_service(&storage)).await;

    match send_notification(&addr, "", "X").await {
        Err(ClientError::Rejected { kind, .. }) => assert_eq!(kind, RpcErrorKind::MissingTitle),
        other => panic!("Expected MissingTitle, got: {other:?}"),
    }
    match send_notification(&addr, "T", "").await {
        Err(ClientError::Rejected { kind, .. }) => assert_eq!(kind, RpcErrorKind::MissingText),
        other => panic!("Expected MissingText, got: {other:?}"),
    }
    match send_notification(&addr, "", "").await {
        Err(ClientError::Rejected { kind, .. }) => assert_eq!(kind, RpcErrorKind::MissingTitle),
        other => panic!("Expected MissingTitle, got: {other:?}"),
    }

    assert_eq!(storage.next_sequence().unwrap(), 1);
    assert_eq!(storage.pending_count(), 0);

    stop.send(()).unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn oversized_notification_rejected_without_persisting() {
    let storage = MemoryStorage::new();
    let (addr, stop, server) = start(&loopback(), memory_service(&storage)).await;

    let text = "x".repeat(MAX_CONTENT_SIZE);
    match send_notification(&addr, "T", &text).await {
        Err(ClientError::Rejected { kind, .. }) => assert_eq!(kind, RpcErrorKind::TooLarge),
        other => panic!("Expected TooLarge, got: {other:?}"),
    }
    assert_eq!(storage.next_sequence().unwrap(), 1);

    // One byte less is the largest accepted notification
    send_notification(&addr, "T", &text[1..]).await.unwrap();
    assert_eq!(storage.next_sequence().unwrap(), 2);

    stop.send(()).unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn storage_failure_is_internal_error() {
    let storage = ChaoticStorage::new(MemoryStorage::new(), 1.0);
    let service = NotifyService::new(
        storage.clone(),
        ScriptedGateway::default(),
        RecordingEnv::default(),
        test_key(),
        DispatcherConfig::default(),
    );
    let (addr, stop, server) = start(&loopback(), service).await;

    match send_notification(&addr, "T", "X").await {
        Err(ClientError::Rejected { kind, .. }) => assert_eq!(kind, RpcErrorKind::Internal),
        other => panic!("Expected Internal, got: {other:?}"),
    }
    assert_eq!(storage.inner().pending_count(), 0);

    stop.send(()).unwrap();
    server.await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn unix_socket_removed_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bnotify.sock");
    let addr = RpcAddr::Unix(path.clone());

    let storage = MemoryStorage::new();
    let (addr, stop, server) = start(&addr, memory_service(&storage)).await;
    assert!(path.exists());

    send_notification(&addr, "T", "X").await.unwrap();
    assert_eq!(storage.next_sequence().unwrap(), 2);

    stop.send(()).unwrap();
    server.await.unwrap();
    assert!(!path.exists());

    // A stale socket left behind is replaced on the next bind
    let stale = std::os::unix::net::UnixListener::bind(&path).unwrap();
    drop(stale);
    let (addr, stop, server) = start(&addr, memory_service(&storage)).await;
    send_notification(&addr, "T", "Y").await.unwrap();
    stop.send(()).unwrap();
    server.await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn live_socket_not_taken_over() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bnotify.sock");
    let addr = RpcAddr::Unix(path.clone());

    let storage = MemoryStorage::new();
    let (addr, stop, server) = start(&addr, memory_service(&storage)).await;

    match RpcListener::bind(&addr).await {
        Err(ServerError::Config(message)) => assert!(message.contains("in use")),
        Err(e) => panic!("Expected Config error, got: {e}"),
        Ok(_) => panic!("Expected bind to fail"),
    }

    // The first daemon still owns the socket
    assert!(path.exists());
    send_notification(&addr, "T", "X").await.unwrap();
    assert_eq!(storage.next_sequence().unwrap(), 2);

    stop.send(()).unwrap();
    server.await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn refuses_to_replace_regular_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-a-socket");
    std::fs::write(&path, b"keep me").unwrap();

    assert!(RpcListener::bind(&RpcAddr::Unix(path.clone())).await.is_err());
    assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
}

#[tokio::test]
async fn unreachable_daemon_fails() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = RpcAddr::Tcp(listener.local_addr().unwrap());
    drop(listener);

    assert!(send_notification(&addr, "T", "X").await.is_err());
}
