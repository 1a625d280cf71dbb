//! Wire-level conformance tests for the arena protocol server

use arena_broker::arena::{Arena, ArenaServer, MatchPhase};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn start_arena() -> (SocketAddr, JoinHandle<()>, Arc<Arena>) {
    let arena = Arc::new(Arena::new());
    let server = ArenaServer::bind(("127.0.0.1", 0), arena.clone())
        .await
        .expect("bind");
    let addr = server.local_addr();
    let handle = tokio::spawn(async move {
        server.run().await.expect("server run");
    });
    (addr, handle, arena)
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("send");
    }

    async fn recv(&mut self) -> String {
        let mut line = String::new();
        timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("reply within timeout")
            .expect("read");
        line.trim_end().to_string()
    }
}

#[tokio::test]
async fn test_initial_state_and_unknown_handling() {
    let (addr, handle, arena) = start_arena().await;
    let mut client = TestClient::connect(addr).await;

    client.send("GET_STATE").await;
    assert_eq!(client.recv().await, "STATE open");

    client.send("GET_RUNNING_LENGTH").await;
    assert_eq!(client.recv().await, "RUNNING_LENGTH 0");

    client.send("DANCE").await;
    assert_eq!(client.recv().await, "UNKNOWN");

    // A protocol error never terminates the connection.
    client.send("get_state").await;
    assert_eq!(client.recv().await, "STATE open");

    arena.trigger_shutdown();
    timeout(RECV_TIMEOUT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_invalid_durations_are_rejected_without_state_change() {
    let (addr, handle, arena) = start_arena().await;
    let mut client = TestClient::connect(addr).await;

    for bad in ["REQUEST_MATCH 0", "REQUEST_MATCH -3", "REQUEST_MATCH 86401", "REQUEST_MATCH soon"] {
        client.send(bad).await;
        assert_eq!(client.recv().await, "UNKNOWN");
    }

    client.send("GET_STATE").await;
    assert_eq!(client.recv().await, "STATE open");

    arena.trigger_shutdown();
    timeout(RECV_TIMEOUT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_first_request_wins_and_match_stops_on_expiry() {
    let (addr, handle, _arena) = start_arena().await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;

    // Make sure both clients are attached before the match starts.
    b.send("GET_STATE").await;
    assert_eq!(b.recv().await, "STATE open");

    a.send("REQUEST_MATCH 1").await;
    assert_eq!(a.recv().await, "RUNNING_LENGTH 1");
    assert_eq!(a.recv().await, "STATE running");
    assert_eq!(b.recv().await, "STATE running");

    // The second requester's value loses; the fixed length is echoed back.
    b.send("REQUEST_MATCH 9999").await;
    assert_eq!(b.recv().await, "RUNNING_LENGTH 1");

    b.send("GET_RUNNING_LENGTH").await;
    assert_eq!(b.recv().await, "RUNNING_LENGTH 1");

    // Countdown expiry: both clients see the stop and the process's serve
    // loop finishes — the unit's natural termination signal.
    assert_eq!(a.recv().await, "STATE stop");
    assert_eq!(b.recv().await, "STATE stop");
    timeout(RECV_TIMEOUT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_last_disconnect_while_running_stops_immediately() {
    let (addr, handle, arena) = start_arena().await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;

    b.send("GET_STATE").await;
    assert_eq!(b.recv().await, "STATE open");

    a.send("REQUEST_MATCH 600").await;
    assert_eq!(a.recv().await, "RUNNING_LENGTH 600");

    // One client leaving keeps the match alive.
    drop(a);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(arena.phase().await, MatchPhase::Running);

    // The last client leaving stops it well before the 600s countdown.
    drop(b);
    timeout(RECV_TIMEOUT, handle).await.unwrap().unwrap();
    assert_eq!(arena.phase().await, MatchPhase::Stop);
}

#[tokio::test]
async fn test_disconnect_while_open_keeps_arena_alive() {
    let (addr, mut handle, arena) = start_arena().await;

    let client = TestClient::connect(addr).await;
    drop(client);

    // No match is running; an empty arena stays up waiting for players.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(arena.phase().await, MatchPhase::Open);
    assert!(
        timeout(Duration::from_millis(100), &mut handle).await.is_err(),
        "server must still be running"
    );

    arena.trigger_shutdown();
    timeout(RECV_TIMEOUT, handle).await.unwrap().unwrap();
}
