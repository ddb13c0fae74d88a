//! Integration tests for the stream client state machine
//!
//! All tests run under a paused clock with a scripted transport, so backoff
//! delays and heartbeat timeouts are exercised in virtual time.

mod common;

use common::{ConnectOutcome, ScriptedTransport};
use presence_feed::domain::types::ConnectionState;
use presence_feed::io::feed_channel::{FeedEvent, FeedSink, FeedSource};
use presence_feed::io::stream::StreamClient;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration, Instant};

fn spawn_client(transport: Arc<ScriptedTransport>) -> (StreamClient, mpsc::Receiver<FeedEvent>) {
    let (tx, rx) = mpsc::channel(1024);
    let sink = FeedSink::new(FeedSource::Live, tx);
    let client = StreamClient::spawn("ws://test/stream".to_string(), transport, sink);
    (client, rx)
}

/// Next state-change event, skipping data and error events
async fn next_state(rx: &mut mpsc::Receiver<FeedEvent>) -> ConnectionState {
    loop {
        match timeout(Duration::from_secs(120), rx.recv()).await {
            Ok(Some(FeedEvent::State(state))) => return state,
            Ok(Some(_)) => continue,
            Ok(None) => panic!("feed channel closed"),
            Err(_) => panic!("no state event within 120s of simulated time"),
        }
    }
}

/// Assert that no state event arrives within the given simulated window
async fn assert_no_state_event(rx: &mut mpsc::Receiver<FeedEvent>, window: Duration) {
    let result = timeout(window, async {
        loop {
            match rx.recv().await {
                Some(FeedEvent::State(state)) => return state,
                Some(_) => continue,
                None => std::future::pending().await,
            }
        }
    })
    .await;
    if let Ok(state) = result {
        panic!("unexpected state event: {state}");
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_immediate_success_reaches_open_without_retry() {
    let transport = ScriptedTransport::succeeding();
    let (client, mut rx) = spawn_client(transport.clone());

    client.connect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Open);
    assert!(client.is_connected());
    assert_eq!(transport.attempts(), 1);

    // Keep the liveness clock happy and verify no retry timer is armed
    let server = transport.last_server();
    for _ in 0..6 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        server.send_pong();
    }
    assert_no_state_event(&mut rx, Duration::from_secs(1)).await;
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fall_back_to_demo() {
    let transport = ScriptedTransport::failing();
    let (client, mut rx) = spawn_client(transport.clone());

    let start = Instant::now();
    client.connect();

    for _ in 0..6 {
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Closed);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Retrying);
    }
    assert_eq!(next_state(&mut rx).await, ConnectionState::Demo);

    // Six attempts, delays 1+2+5+10+20+30 seconds
    assert_eq!(transport.attempts(), 6);
    assert_eq!(start.elapsed(), Duration::from_secs(68));

    // Demo is stable: no further attempts without an explicit connect
    assert_no_state_event(&mut rx, Duration::from_secs(120)).await;
    assert_eq!(transport.attempts(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_demo_leaves_only_via_explicit_connect_with_fresh_schedule() {
    let transport = ScriptedTransport::failing();
    let (client, mut rx) = spawn_client(transport.clone());

    client.connect();
    let mut state = next_state(&mut rx).await;
    while state != ConnectionState::Demo {
        state = next_state(&mut rx).await;
    }

    // Explicit request leaves demo; the retry counter was reset so the
    // backoff schedule starts over at 1s
    client.connect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Closed);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Retrying);

    let retry_started = Instant::now();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
    assert_eq!(retry_started.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_timeout_forces_reconnect() {
    let transport = ScriptedTransport::new(vec![ConnectOutcome::Succeed], ConnectOutcome::Fail);
    let (client, mut rx) = spawn_client(transport.clone());

    client.connect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Open);
    let opened = Instant::now();

    // Total silence: no global, tracks or pong traffic at all
    assert_eq!(next_state(&mut rx).await, ConnectionState::Closed);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Retrying);
    assert_eq!(opened.elapsed(), Duration::from_secs(15));

    // Pings were sent while the connection was open
    assert!(transport.last_server().pings() >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_any_traffic_resets_the_liveness_clock() {
    let transport = ScriptedTransport::new(vec![ConnectOutcome::Succeed], ConnectOutcome::Fail);
    let (client, mut rx) = spawn_client(transport.clone());

    client.connect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Open);
    let opened = Instant::now();
    let server = transport.last_server();

    // Pong every 10s keeps the connection alive well past the 15s window
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        server.send_pong();
    }
    assert!(rx.try_recv().is_err(), "no events expected while traffic flows");

    // Silence from t=30s: timeout lands at t=45s
    assert_eq!(next_state(&mut rx).await, ConnectionState::Closed);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Retrying);
    assert_eq!(opened.elapsed(), Duration::from_secs(45));
}

#[tokio::test(start_paused = true)]
async fn test_remote_close_schedules_reconnect() {
    let transport = ScriptedTransport::new(vec![ConnectOutcome::Succeed], ConnectOutcome::Fail);
    let (client, mut rx) = spawn_client(transport.clone());

    client.connect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Open);

    transport.last_server().close();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Closed);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Retrying);
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_connecting_is_noop() {
    let transport = ScriptedTransport::new(vec![ConnectOutcome::Hang], ConnectOutcome::Fail);
    let (client, mut rx) = spawn_client(transport.clone());

    client.connect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);

    client.connect();
    client.connect();
    settle().await;
    assert_eq!(transport.attempts(), 1, "no second underlying connection");

    // Disconnect cancels the in-flight attempt
    client.disconnect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_open_is_noop() {
    let transport = ScriptedTransport::succeeding();
    let (client, mut rx) = spawn_client(transport.clone());

    client.connect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Open);

    client.connect();
    settle().await;
    assert_eq!(transport.attempts(), 1);
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_connect_during_retry_cancels_pending_delay() {
    let transport = ScriptedTransport::failing();
    let (client, mut rx) = spawn_client(transport.clone());

    client.connect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Closed);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Retrying);

    let retrying_at = Instant::now();
    client.connect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
    assert_eq!(retrying_at.elapsed(), Duration::ZERO, "retry delay was not awaited");
    assert_eq!(transport.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent_and_leaves_no_timers() {
    let transport = ScriptedTransport::failing();
    let (client, mut rx) = spawn_client(transport.clone());

    // Tear down while a retry timer is pending
    client.connect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Closed);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Retrying);

    client.disconnect();
    client.disconnect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Idle);

    // A full backoff cycle of simulated time passes without any callback
    assert_no_state_event(&mut rx, Duration::from_secs(120)).await;
    assert_eq!(transport.attempts(), 1);

    // Reconnecting after teardown behaves like first use
    client.connect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
    assert_eq!(transport.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_data_events_are_forwarded_while_open() {
    let transport = ScriptedTransport::succeeding();
    let (client, mut rx) = spawn_client(transport.clone());

    client.connect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Open);

    let server = transport.last_server();
    server.send_global(common::snapshot_with_queue(4));
    server.send_tracks(vec![common::track(
        "t-9",
        3.0,
        presence_feed::domain::types::TrackState::Present,
    )]);

    let mut saw_global = false;
    let mut saw_tracks = false;
    for _ in 0..2 {
        match timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap() {
            FeedEvent::Global { source, snapshot } => {
                assert_eq!(source, FeedSource::Live);
                assert_eq!(snapshot.queue, 4);
                saw_global = true;
            }
            FeedEvent::Tracks { source, tracks } => {
                assert_eq!(source, FeedSource::Live);
                assert_eq!(tracks.len(), 1);
                saw_tracks = true;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(saw_global && saw_tracks);
    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_protocol_error_is_reported_and_recovered() {
    let transport = ScriptedTransport::new(
        vec![ConnectOutcome::Succeed, ConnectOutcome::Succeed],
        ConnectOutcome::Fail,
    );
    let (client, mut rx) = spawn_client(transport.clone());

    client.connect();
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Open);

    transport.last_server().send_error("malformed frame");

    // The error surfaces as an error event, then the usual reconnect path
    let mut saw_error = false;
    loop {
        match timeout(Duration::from_secs(120), rx.recv()).await.unwrap().unwrap() {
            FeedEvent::SourceError { message, .. } => {
                assert!(message.contains("malformed frame"));
                saw_error = true;
            }
            FeedEvent::State(ConnectionState::Closed) => break,
            FeedEvent::State(state) => panic!("unexpected state {state}"),
            _ => {}
        }
    }
    assert!(saw_error);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Retrying);

    // Second scripted success: the client recovers on the next attempt
    assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut rx).await, ConnectionState::Open);
}
