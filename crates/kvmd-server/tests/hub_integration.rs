//! Integration tests for the session hub and the connection loop.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream;
use kvmd_core::{EventPayload, InputEvent};
use kvmd_server::application::{
    run_connection, run_heartbeat, Exposed, ExposedRegistry, HidApi, HidService, InboundFrame,
    NoopHooks, SessionHub, SystemApi, WsExposed, WsRoutes,
};
use kvmd_server::domain::{
    ApiError, HidConfig, SessionContext, TransportError, WsFrame, WsProtocol, WsSession,
    WsTransport,
};
use kvmd_server::infrastructure::DummyHid;
use serde_json::json;
use tokio::time::timeout;

use common::{CountingHooks, RecordingTransport};

fn payload(value: serde_json::Value) -> EventPayload {
    value.as_object().cloned().expect("object payload")
}

async fn open(hub: &SessionHub, transport: Arc<RecordingTransport>) -> Arc<WsSession> {
    hub.open_session(transport, WsProtocol::Current, SessionContext::new())
        .await
}

// ── Hub ───────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_opens_register_distinct_sessions() {
    // Arrange
    let hooks = Arc::new(CountingHooks::default());
    let hub = Arc::new(SessionHub::new(hooks.clone()));

    // Act: open ten sessions concurrently
    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                let transport: Arc<dyn WsTransport> = RecordingTransport::new();
                hub.open_session(transport, WsProtocol::Current, SessionContext::new())
                    .await
                    .id()
            })
        })
        .collect();
    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }

    // Assert
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 10);
    assert_eq!(hub.len().await, 10);
    assert_eq!(hooks.opened(), 10);
}

#[tokio::test]
async fn test_close_session_twice_is_a_noop() {
    // Arrange
    let hooks = Arc::new(CountingHooks::default());
    let hub = SessionHub::new(hooks.clone());
    let transport = RecordingTransport::new();
    let session = open(&hub, transport.clone()).await;

    // Act
    hub.close_session(&session).await;
    hub.close_session(&session).await;

    // Assert: removed once, closed once, hook fired once
    assert!(hub.is_empty().await);
    assert_eq!(transport.close_calls(), 1);
    assert_eq!(hooks.closed(), 1);
    assert!(!session.is_alive());
}

#[tokio::test]
async fn test_close_all_reports_whether_sessions_existed() {
    let hub = SessionHub::default();
    assert!(!hub.close_all().await);

    let a = RecordingTransport::new();
    let b = RecordingTransport::new();
    open(&hub, a.clone()).await;
    open(&hub, b.clone()).await;

    assert!(hub.close_all().await);
    assert!(hub.is_empty().await);
    assert_eq!(a.close_calls(), 1);
    assert_eq!(b.close_calls(), 1);
}

#[tokio::test]
async fn test_broadcast_survives_a_failing_session() {
    // Arrange: three sessions, the middle one's writes fail
    let hub = SessionHub::default();
    let first = RecordingTransport::new();
    let broken = RecordingTransport::failing();
    let last = RecordingTransport::new();
    open(&hub, first.clone()).await;
    open(&hub, broken.clone()).await;
    open(&hub, last.clone()).await;

    // Act
    hub.broadcast("hid", &payload(json!({"online": true}))).await;

    // Assert
    let expected = vec![r#"{"event":{"online":true},"event_type":"hid"}"#.to_string()];
    assert_eq!(first.texts(), expected);
    assert_eq!(last.texts(), expected);
    assert!(broken.texts().is_empty());
    assert_eq!(hub.len().await, 3);
}

#[tokio::test]
async fn test_broadcast_skips_dead_sessions() {
    let hub = SessionHub::default();
    let alive = RecordingTransport::new();
    let dead = RecordingTransport::new();
    open(&hub, alive.clone()).await;
    open(&hub, dead.clone()).await;
    dead.drop_connection();

    hub.broadcast("hid", &EventPayload::new()).await;

    assert_eq!(alive.texts().len(), 1);
    assert!(dead.frames().is_empty());
}

// ── Connection loop ───────────────────────────────────────────────────────────

struct Fixture {
    hub: Arc<SessionHub>,
    routes: Arc<WsRoutes>,
    hid: Arc<DummyHid>,
}

fn fixture() -> Fixture {
    let hid = Arc::new(DummyHid::new());
    let service = Arc::new(HidService::new(hid.clone(), &HidConfig::default()));
    let hid_api = HidApi::new(service);
    let hub = Arc::new(SessionHub::new(Arc::new(NoopHooks)));
    let system_api = SystemApi::new(Arc::clone(&hub));
    let components: [&dyn Exposed; 2] = [&hid_api, &system_api];
    let registry = ExposedRegistry::build(&components).expect("route table");
    let (_, routes) = registry.into_parts();
    Fixture { hub, routes, hid }
}

async fn drive(fixture: &Fixture, frames: Vec<InboundFrame>) -> Arc<RecordingTransport> {
    let transport = RecordingTransport::new();
    let session = open(&fixture.hub, transport.clone()).await;
    let frames = stream::iter(frames.into_iter().map(Ok::<_, TransportError>));
    run_connection(
        Arc::clone(&fixture.hub),
        Arc::clone(&fixture.routes),
        session,
        frames,
    )
    .await;
    transport
}

fn ping() -> InboundFrame {
    InboundFrame::Text(r#"{"event_type":"ping","event":{}}"#.to_string())
}

const PONG: &str = r#"{"event":{},"event_type":"pong"}"#;

#[tokio::test]
async fn test_binary_key_frame_reaches_key_handler() {
    // Arrange: [opcode=1][mask=0x01 (pressed)]["KeyA"]
    let fixture = fixture();
    let mut frame = vec![1u8, 0x01];
    frame.extend_from_slice(b"KeyA");

    // Act
    drive(&fixture, vec![InboundFrame::Binary(frame)]).await;

    // Assert
    assert_eq!(fixture.hid.pressed_keys().await, vec!["KeyA".to_string()]);
}

#[tokio::test]
async fn test_binary_move_frame_reaches_move_handler() {
    // Arrange: [3][x=10 as i16 BE][y=-5 as i16 BE]
    let fixture = fixture();
    let frame = vec![3u8, 0x00, 0x0A, 0xFF, 0xFB];

    // Act
    drive(&fixture, vec![InboundFrame::Binary(frame)]).await;

    // Assert
    assert_eq!(fixture.hid.position().await, (10, -5));
}

#[tokio::test]
async fn test_encoded_input_event_is_accepted() {
    let fixture = fixture();
    let event = InputEvent::MouseButton {
        button: "left".to_string(),
        state: true,
    };

    drive(&fixture, vec![InboundFrame::Binary(event.encode())]).await;

    assert_eq!(fixture.hid.pressed_buttons().await, vec!["left".to_string()]);
}

#[tokio::test]
async fn test_text_key_event_reaches_hid() {
    let fixture = fixture();
    let key = InboundFrame::Text(
        r#"{"event_type":"key","event":{"key":"ShiftLeft","state":true}}"#.to_string(),
    );

    drive(&fixture, vec![key]).await;

    assert_eq!(fixture.hid.pressed_keys().await, vec!["ShiftLeft".to_string()]);
}

#[tokio::test]
async fn test_bad_json_and_unknown_events_do_not_end_the_loop() {
    // Arrange
    let fixture = fixture();
    let frames = vec![
        InboundFrame::Text("{not json".to_string()),
        InboundFrame::Text(r#"{"event_type":"no_such_event","event":{}}"#.to_string()),
        InboundFrame::Binary(vec![200, 1, 2]),
        InboundFrame::Text(r#"{"event_type":"key","event":{"key":"Key A","state":true}}"#.to_string()),
        InboundFrame::Ping,
        ping(),
    ];

    // Act
    let transport = drive(&fixture, frames).await;

    // Assert: the ping after the bad frames was still answered
    assert_eq!(transport.texts(), vec![PONG.to_string()]);
    assert!(fixture.hid.pressed_keys().await.is_empty());
}

#[tokio::test]
async fn test_empty_binary_frame_ends_the_loop() {
    let fixture = fixture();

    let transport = drive(&fixture, vec![InboundFrame::Binary(Vec::new()), ping()]).await;

    assert!(transport.texts().is_empty());
    assert!(fixture.hub.is_empty().await);
}

#[tokio::test]
async fn test_close_frame_ends_the_loop_and_closes_session() {
    let fixture = fixture();

    let transport = drive(&fixture, vec![InboundFrame::Close, ping()]).await;

    assert!(transport.texts().is_empty());
    assert_eq!(transport.close_calls(), 1);
    assert!(fixture.hub.is_empty().await);
}

#[tokio::test]
async fn test_receive_error_ends_the_loop() {
    // Arrange
    let fixture = fixture();
    let transport = RecordingTransport::new();
    let session = open(&fixture.hub, transport.clone()).await;
    let frames = stream::iter(vec![
        Err(TransportError::Io("reset".to_string())),
        Ok(ping()),
    ]);

    // Act
    run_connection(
        Arc::clone(&fixture.hub),
        Arc::clone(&fixture.routes),
        session,
        frames,
    )
    .await;

    // Assert
    assert!(transport.texts().is_empty());
    assert!(fixture.hub.is_empty().await);
}

#[tokio::test]
async fn test_session_opened_with_hid_hooks_receives_state_and_is_cleared_on_close() {
    // Arrange
    let hid = Arc::new(DummyHid::new());
    let service = Arc::new(HidService::new(hid.clone(), &HidConfig::default()));
    let hid_api = Arc::new(HidApi::new(service));
    let hub = Arc::new(SessionHub::new(hid_api.clone()));
    let components: [&dyn Exposed; 1] = [hid_api.as_ref()];
    let registry = ExposedRegistry::build(&components).unwrap();
    let (_, routes) = registry.into_parts();
    let transport = RecordingTransport::new();

    // Act
    let session = open(&hub, transport.clone()).await;
    let mut press = vec![1u8, 0x01];
    press.extend_from_slice(b"KeyB");
    let frames = stream::iter(vec![Ok::<_, TransportError>(InboundFrame::Binary(press))]);
    run_connection(Arc::clone(&hub), routes, session, frames).await;

    // Assert: initial "hid" event delivered, keys released on close
    let texts = transport.texts();
    assert_eq!(texts.len(), 1);
    let first: serde_json::Value = serde_json::from_str(&texts[0]).unwrap();
    assert_eq!(first["event_type"], "hid");
    assert_eq!(first["event"]["online"], true);
    assert_eq!(first["event"]["jiggler"]["enabled"], false);
    assert!(hid.pressed_keys().await.is_empty());
}

// ── Server-side close and handler failures ────────────────────────────────────

fn idle_frames() -> stream::Pending<Result<InboundFrame, TransportError>> {
    stream::pending()
}

#[tokio::test]
async fn test_close_all_ends_loop_blocked_on_read() {
    // Arrange: a peer that never sends anything
    let hooks = Arc::new(CountingHooks::default());
    let hub = Arc::new(SessionHub::new(hooks.clone()));
    let transport = RecordingTransport::new();
    let session = open(&hub, transport.clone()).await;
    let task = tokio::spawn(run_connection(
        Arc::clone(&hub),
        Arc::new(WsRoutes::default()),
        Arc::clone(&session),
        idle_frames(),
    ));

    // Act
    assert!(hub.close_all().await);

    // Assert
    timeout(Duration::from_secs(1), task)
        .await
        .expect("connection loop still blocked on read after close_all")
        .unwrap();
    assert!(hub.is_empty().await);
    assert!(!session.is_alive());
    assert_eq!(transport.close_calls(), 1);
    assert_eq!(hooks.closed(), 1);
}

async fn failing_handler(_session: Arc<WsSession>, event: EventPayload) -> Result<(), ApiError> {
    panic!("handler failed on {event:?}");
}

#[tokio::test]
async fn test_panicking_handler_still_closes_session_once() {
    // Arrange
    let hooks = Arc::new(CountingHooks::default());
    let hub = Arc::new(SessionHub::new(hooks.clone()));
    let mut registry = ExposedRegistry::default();
    registry
        .add_ws(WsExposed::text("explode", failing_handler))
        .unwrap();
    let (_, routes) = registry.into_parts();
    let transport = RecordingTransport::new();
    let session = open(&hub, transport.clone()).await;
    let frames = stream::iter(vec![
        Ok::<_, TransportError>(InboundFrame::Text(
            r#"{"event_type":"explode","event":{}}"#.to_string(),
        )),
        Ok(ping()),
    ]);

    // Act
    run_connection(Arc::clone(&hub), routes, session, frames).await;

    // Assert: the loop stopped at the panic and cleanup ran exactly once
    assert!(hub.is_empty().await);
    assert_eq!(transport.close_calls(), 1);
    assert_eq!(hooks.closed(), 1);
    assert!(transport.texts().is_empty());
}

#[tokio::test]
async fn test_frames_are_handled_in_arrival_order() {
    // Arrange: the first handler suspends before recording
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ExposedRegistry::default();
    let slow_log = Arc::clone(&log);
    registry
        .add_ws(WsExposed::text("slow", move |_session, _event| {
            let log = Arc::clone(&slow_log);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                log.lock().unwrap().push("slow");
                Ok::<(), ApiError>(())
            }
        }))
        .unwrap();
    let fast_log = Arc::clone(&log);
    registry
        .add_ws(WsExposed::binary(9, move |_session, _data| {
            let log = Arc::clone(&fast_log);
            async move {
                log.lock().unwrap().push("fast");
                Ok::<(), ApiError>(())
            }
        }))
        .unwrap();
    let (_, routes) = registry.into_parts();
    let hub = Arc::new(SessionHub::default());
    let session = open(&hub, RecordingTransport::new()).await;
    let frames = stream::iter(vec![
        Ok::<_, TransportError>(InboundFrame::Text(
            r#"{"event_type":"slow","event":{}}"#.to_string(),
        )),
        Ok(InboundFrame::Binary(vec![9])),
    ]);

    // Act
    run_connection(Arc::clone(&hub), routes, session, frames).await;

    // Assert
    assert_eq!(*log.lock().unwrap(), vec!["slow", "fast"]);
}

// ── Heartbeat ─────────────────────────────────────────────────────────────────

const HEARTBEAT: Duration = Duration::from_millis(30);

#[tokio::test]
async fn test_heartbeat_closes_silent_peer() {
    // Arrange: a connection whose peer never answers pings
    let hooks = Arc::new(CountingHooks::default());
    let hub = Arc::new(SessionHub::new(hooks.clone()));
    let transport = RecordingTransport::new();
    let session = open(&hub, transport.clone()).await;
    let connection = tokio::spawn(run_connection(
        Arc::clone(&hub),
        Arc::new(WsRoutes::default()),
        Arc::clone(&session),
        idle_frames(),
    ));

    // Act
    let heartbeat = tokio::spawn(run_heartbeat(Arc::clone(&hub), Arc::clone(&session), HEARTBEAT));

    // Assert
    timeout(Duration::from_secs(2), heartbeat)
        .await
        .expect("heartbeat never gave up on the silent peer")
        .unwrap();
    timeout(Duration::from_secs(1), connection)
        .await
        .expect("connection loop outlived the heartbeat close")
        .unwrap();
    assert!(transport.frames().contains(&WsFrame::Ping));
    assert!(hub.is_empty().await);
    assert_eq!(hooks.closed(), 1);
}

#[tokio::test]
async fn test_heartbeat_keeps_answering_peer() {
    // Arrange: a peer that keeps sending frames
    let hub = Arc::new(SessionHub::default());
    let transport = RecordingTransport::new();
    let session = open(&hub, transport.clone()).await;
    let responder = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            while session.is_alive() {
                session.mark_seen();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };
    let heartbeat = tokio::spawn(run_heartbeat(Arc::clone(&hub), Arc::clone(&session), HEARTBEAT));

    // Act
    tokio::time::sleep(HEARTBEAT * 6).await;

    // Assert: still registered after several periods, pings were sent
    assert!(session.is_alive());
    assert_eq!(hub.len().await, 1);
    assert!(transport.frames().iter().filter(|f| **f == WsFrame::Ping).count() >= 2);

    hub.close_session(&session).await;
    timeout(Duration::from_secs(1), heartbeat)
        .await
        .expect("heartbeat kept running after close")
        .unwrap();
    responder.await.unwrap();
}
