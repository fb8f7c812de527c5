//! Integration tests for the pipe-backed listener: rendezvous pairing,
//! idempotent close, and dial cancellation.

mod common;

use common::{init_tracing, within};
use rand::Rng;
use socketpair_tokio::{NoAddr, PipeConfig, PipeListener, SocketPairError};
use std::collections::HashSet;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const BOUND: Duration = Duration::from_millis(100);

#[tokio::test]
async fn test_ping_over_accepted_pipe() {
    init_tracing();
    let listener = PipeListener::new();

    let server = listener.clone();
    let accepted = tokio::spawn(async move { server.accept().await });

    let mut client = listener.dial().await.expect("dial");
    let mut server_end = accepted.await.unwrap().expect("accept");

    // The default pipe is unbuffered, so each write needs a concurrent read.
    let mut buf = [0u8; 4];
    let (sent, received) = tokio::join!(client.write_all(b"ping"), server_end.read_exact(&mut buf));
    sent.unwrap();
    received.unwrap();
    assert_eq!(&buf, b"ping");

    let (sent, received) = tokio::join!(server_end.write_all(b"pong"), client.read_exact(&mut buf));
    sent.unwrap();
    received.unwrap();
    assert_eq!(&buf, b"pong");

    listener.close().unwrap();
}

/// Accept loop that closes every connection until the listener shuts down.
#[tokio::test]
async fn test_accept_loop_ends_on_close() {
    init_tracing();
    let listener = PipeListener::new();

    let server = listener.clone();
    let accept_loop = tokio::spawn(async move {
        let mut served = 0;
        loop {
            match server.accept().await {
                Ok(conn) => {
                    conn.close().unwrap();
                    served += 1;
                }
                Err(e) => {
                    assert!(e.is_closed(), "unexpected accept error: {e}");
                    assert_eq!(e.to_string(), "use of closed network connection");
                    return served;
                }
            }
        }
    });

    let client = listener.dial().await.unwrap();
    client.close().unwrap();
    listener.close().unwrap();

    let served = within(BOUND, "accept loop", accept_loop).await.unwrap();
    assert_eq!(served, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dials_pair_one_to_one() {
    init_tracing();
    const N: usize = 32;
    let listener = PipeListener::new();
    let mut tasks = JoinSet::new();

    for i in 0..N {
        let dialer = listener.clone();
        tasks.spawn(async move {
            let jitter = rand::thread_rng().gen_range(0..5);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
            let mut conn = dialer.dial().await.expect("dial");
            conn.write_all(&(i as u32).to_be_bytes()).await.unwrap();
            None
        });

        let acceptor = listener.clone();
        tasks.spawn(async move {
            let jitter = rand::thread_rng().gen_range(0..5);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
            let mut conn = acceptor.accept().await.expect("accept");
            let mut id = [0u8; 4];
            conn.read_exact(&mut id).await.unwrap();
            Some(u32::from_be_bytes(id))
        });
    }

    let mut seen = HashSet::new();
    within(Duration::from_secs(5), "all pairings", async {
        while let Some(res) = tasks.join_next().await {
            if let Some(id) = res.unwrap() {
                assert!(seen.insert(id), "dialer {id} paired twice");
            }
        }
    })
    .await;
    assert_eq!(seen.len(), N);
}

#[tokio::test]
async fn test_dial_waits_for_acceptor() {
    init_tracing();
    let listener = PipeListener::new();

    let dialer = listener.clone();
    let dial = tokio::spawn(async move { dialer.dial().await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!dial.is_finished(), "dial must not complete without an accept");

    let _server = listener.accept().await.unwrap();
    within(BOUND, "dial", dial).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_close_is_idempotent() {
    init_tracing();
    let listener = PipeListener::new();
    let mut closers = JoinSet::new();

    for _ in 0..16 {
        let l = listener.clone();
        closers.spawn(async move { l.close() });
    }
    while let Some(res) = closers.join_next().await {
        assert!(res.unwrap().is_ok());
    }

    assert!(listener.is_closed());
    assert!(listener.close().is_ok());
}

#[tokio::test]
async fn test_operations_after_close_fail_immediately() {
    init_tracing();
    let listener = PipeListener::new();
    listener.close().unwrap();

    let err = within(BOUND, "accept", listener.accept()).await.unwrap_err();
    assert!(matches!(err, SocketPairError::Closed));

    let err = within(BOUND, "dial", listener.dial()).await.unwrap_err();
    assert!(matches!(err, SocketPairError::Closed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_unblocks_waiters() {
    init_tracing();
    let listener = PipeListener::new();
    let mut acceptors = JoinSet::new();
    for _ in 0..4 {
        let l = listener.clone();
        acceptors.spawn(async move { l.accept().await });
    }

    let other = PipeListener::new();
    let mut dialers = JoinSet::new();
    for _ in 0..4 {
        let l = other.clone();
        dialers.spawn(async move { l.dial().await });
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    listener.close().unwrap();
    other.close().unwrap();

    within(BOUND, "blocked accepts", async {
        while let Some(res) = acceptors.join_next().await {
            assert!(matches!(res.unwrap(), Err(SocketPairError::Closed)));
        }
    })
    .await;
    within(BOUND, "blocked dials", async {
        while let Some(res) = dialers.join_next().await {
            assert!(matches!(res.unwrap(), Err(SocketPairError::Closed)));
        }
    })
    .await;
}

#[tokio::test]
async fn test_dial_with_fired_token() {
    init_tracing();
    let listener = PipeListener::new();

    let acceptor = listener.clone();
    let accept = tokio::spawn(async move { acceptor.accept().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let token = CancellationToken::new();
    token.cancel();
    let err = within(BOUND, "cancelled dial", listener.dial_with_cancellation(&token))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(err.is_recoverable());
    assert!(!accept.is_finished(), "cancelled dial must not pair");

    // A later dial still pairs with the same waiting acceptor.
    let mut client = listener.dial().await.unwrap();
    let mut server = within(BOUND, "accept", accept).await.unwrap().unwrap();
    let mut buf = [0u8; 2];
    let (sent, received) = tokio::join!(client.write_all(b"ok"), server.read_exact(&mut buf));
    sent.unwrap();
    received.unwrap();
    assert_eq!(&buf, b"ok");
}

#[tokio::test]
async fn test_cancel_while_waiting() {
    init_tracing();
    let listener = PipeListener::new();
    let token = CancellationToken::new();

    let dialer = listener.clone();
    let dial_token = token.clone();
    let dial = tokio::spawn(async move { dialer.dial_with_cancellation(&dial_token).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    let err = within(BOUND, "dial", dial).await.unwrap().unwrap_err();
    assert!(matches!(err, SocketPairError::Cancelled));
    assert!(!listener.is_closed());
}

#[tokio::test]
async fn test_dropped_accept_is_skipped() {
    init_tracing();
    let listener = PipeListener::new();

    // Start an accept and abandon it before any dial arrives.
    let abandoned = tokio::time::timeout(Duration::from_millis(10), listener.accept()).await;
    assert!(abandoned.is_err());

    let acceptor = listener.clone();
    let accept = tokio::spawn(async move { acceptor.accept().await });

    let mut client = within(BOUND, "dial", listener.dial()).await.unwrap();
    let mut server = within(BOUND, "accept", accept).await.unwrap().unwrap();
    let mut buf = [0u8; 4];
    let (sent, received) = tokio::join!(server.write_all(b"live"), client.read_exact(&mut buf));
    sent.unwrap();
    received.unwrap();
    assert_eq!(&buf, b"live");
}

/// An accept dropped after a dial reached it but before it returned must not
/// count as a pairing: the dial keeps waiting and pairs with the next accept.
#[tokio::test]
async fn test_accept_dropped_mid_handoff() {
    init_tracing();
    let listener = PipeListener::new();

    let mut accept = Box::pin(listener.accept());
    assert!(futures::poll!(accept.as_mut()).is_pending());

    let dialer = listener.clone();
    let dial = tokio::spawn(async move { dialer.dial().await });

    // The dial offers its pipe to the registered accept, which is never
    // polled again.
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(accept);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!dial.is_finished(), "dial must not succeed without an accept");

    let mut server = within(BOUND, "accept", listener.accept()).await.unwrap();
    let mut client = within(BOUND, "dial", dial).await.unwrap().unwrap();
    let mut buf = [0u8; 4];
    let (sent, received) = tokio::join!(server.write_all(b"live"), client.read_exact(&mut buf));
    sent.unwrap();
    received.unwrap();
    assert_eq!(&buf, b"live");
}

#[tokio::test]
async fn test_default_pipe_is_unbuffered() {
    init_tracing();
    let listener = PipeListener::new();

    let acceptor = listener.clone();
    let accept = tokio::spawn(async move { acceptor.accept().await });
    let mut client = listener.dial().await.unwrap();
    let _server = accept.await.unwrap().unwrap();

    // Nobody reads, so the write cannot complete.
    let pending = tokio::time::timeout(BOUND, client.write_all(&[7u8; 4096])).await;
    assert!(pending.is_err(), "write completed without a reader");
}

#[tokio::test]
async fn test_config_and_addresses() {
    init_tracing();
    let listener = PipeConfig::unbuffered().listen().unwrap();
    assert_eq!(listener.config().pipe_buffer_size, 1);
    assert_eq!(listener.local_addr(), NoAddr);

    let acceptor = listener.clone();
    let accept = tokio::spawn(async move { acceptor.accept().await });
    let mut client = listener.dial().await.unwrap();
    let mut server = accept.await.unwrap().unwrap();
    assert_eq!(client.remote_addr(), NoAddr);

    // With a one-byte pipe the writer makes progress only as the reader drains.
    let writer = tokio::spawn(async move {
        client.write_all(b"synchronous").await.unwrap();
    });
    let mut buf = [0u8; 11];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"synchronous");
    writer.await.unwrap();
}
