//! Bytes flow through the gateway to a real Unix socket.

use std::net::SocketAddr;
use std::time::Duration;

use adjoin_proxy::{GatewayConfig, ProxyError, ProxyRuntime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixListener};
use tokio_util::sync::CancellationToken;

/// Echo server standing in for the identity daemon.
fn spawn_echo(listener: UnixListener) {
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
}

fn config(socket: std::path::PathBuf) -> GatewayConfig {
    GatewayConfig {
        listen: SocketAddr::from(([127, 0, 0, 1], 0)),
        socket,
        startup_timeout: Duration::from_secs(2),
    }
}

async fn roundtrip(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut tcp = TcpStream::connect(addr).await.unwrap();
    tcp.write_all(payload).await.unwrap();
    let mut buf = vec![0u8; payload.len()];
    tcp.read_exact(&mut buf).await.unwrap();
    buf
}

#[tokio::test]
async fn concurrent_sessions_are_forwarded_independently() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("pipe");
    spawn_echo(UnixListener::bind(&socket).unwrap());
    let smb_conf = dir.path().join("smb.conf");

    let allow = vec!["127.0.0.1".to_string(), "10.44.0.0/20".to_string()];
    let runtime = ProxyRuntime::start(config(socket), &smb_conf, &allow, CancellationToken::new())
        .await
        .unwrap();
    let addr = runtime.local_addr();

    let (a, b) = tokio::join!(roundtrip(addr, b"getpwnam alice"), roundtrip(addr, b"getgrnam staff"));
    assert_eq!(a, b"getpwnam alice");
    assert_eq!(b, b"getgrnam staff");
    assert_eq!(runtime.status().total_sessions, 2);

    let conf = std::fs::read_to_string(&smb_conf).unwrap();
    assert!(conf.contains("[global]"));
    assert!(conf.contains("hosts allow = 127.0.0.1 10.44.0.0/20"));

    runtime.shutdown().await;
}

#[tokio::test]
async fn missing_socket_fails_with_startup_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path().join("pipe"));
    cfg.startup_timeout = Duration::from_millis(300);

    let result = ProxyRuntime::start(
        cfg,
        &dir.path().join("smb.conf"),
        &["127.0.0.1".to_string()],
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(result, Err(ProxyError::StartupTimeout { .. })));
}

#[tokio::test]
async fn cancellation_stops_accepting() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("pipe");
    spawn_echo(UnixListener::bind(&socket).unwrap());

    let cancel = CancellationToken::new();
    let runtime = ProxyRuntime::start(
        config(socket),
        &dir.path().join("smb.conf"),
        &["127.0.0.1".to_string()],
        cancel.clone(),
    )
    .await
    .unwrap();
    let addr = runtime.local_addr();
    assert!(runtime.status().running);

    cancel.cancel();
    runtime.shutdown().await;
    assert!(TcpStream::connect(addr).await.is_err());
}
