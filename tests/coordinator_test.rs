//! End-to-end session behaviour against the synthetic backend and transport.
//!
//! Transport events arrive on the lanes as separate tasks, so assertions on
//! their effects wait on the snapshot watch channel or the event stream.

use castlane::testing::{Behavior, SyntheticBackend, SyntheticSource, SyntheticTransport, TransportCall};
use castlane::transport::{PublisherEvent, SubscriberEvent};
use castlane::{
    CaptureState, Category, MediaKind, MemoryStore, PublisherState, Role, SessionConfig,
    SessionCoordinator, SessionError, SessionEvent, SessionSnapshot, SubscriberState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    session: SessionCoordinator,
    backend: Arc<SyntheticBackend>,
    transport: SyntheticTransport,
}

fn config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.credentials.account_id = "acct".to_string();
    config.credentials.pub_token = "publish-token".to_string();
    config.credentials.sub_token = "subscribe-token".to_string();
    config
}

fn harness_with(config: SessionConfig, behavior: Behavior) -> Harness {
    let backend = Arc::new(SyntheticBackend::new());
    let transport = SyntheticTransport::with_behavior(behavior);
    let session = SessionCoordinator::new(
        config,
        backend.clone(),
        Arc::new(transport.clone()),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();
    Harness {
        session,
        backend,
        transport,
    }
}

fn harness() -> Harness {
    harness_with(config(), Behavior::default())
}

fn quiet() -> Behavior {
    Behavior {
        auto_events: false,
        ..Behavior::default()
    }
}

async fn wait_for<F>(session: &SessionCoordinator, mut done: F) -> SessionSnapshot
where
    F: FnMut(&SessionSnapshot) -> bool,
{
    let mut rx = session.watch();
    let result = timeout(WAIT, rx.wait_for(|s| done(s))).await;
    let snapshot = result.expect("timed out waiting for snapshot").expect("hub closed");
    snapshot.clone()
}

async fn next_event<F>(events: &mut broadcast::Receiver<SessionEvent>, mut matches: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    loop {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if matches(&event) {
            return event;
        }
    }
}

async fn publishing(h: &Harness) {
    h.session.start_capture().wait().await.unwrap();
    h.session.connect_publisher().wait().await.unwrap();
    wait_for(&h.session, |s| s.publisher == PublisherState::Publishing).await;
}

#[tokio::test]
async fn test_switch_camera_while_idle_captures_next_camera() {
    let h = harness();
    assert_eq!(h.session.registry().selected_index(Category::VideoSource), 0);

    let index = h.session.switch_video_source(true).wait().await.unwrap();

    assert_eq!(index, 1);
    assert_eq!(h.session.registry().video_source_name(), "Back Camera");
    assert_eq!(h.session.snapshot().capture, CaptureState::IsCaptured);
    let front = h.backend.camera(0).unwrap();
    let back = h.backend.camera(1).unwrap();
    assert_eq!(front.stop_count(), 0);
    assert_eq!(back.start_count(), 1);
}

#[tokio::test]
async fn test_switch_camera_while_publishing_republishes() {
    let h = harness();
    let mut events = h.session.events();
    publishing(&h).await;
    next_event(&mut events, |e| {
        matches!(
            e,
            SessionEvent::PublisherChanged {
                now: PublisherState::Publishing,
                ..
            }
        )
    })
    .await;

    h.session.switch_video_source(true).wait().await.unwrap();

    let mut publisher = Vec::new();
    let mut capture = Vec::new();
    loop {
        let event = next_event(&mut events, |e| {
            matches!(
                e,
                SessionEvent::PublisherChanged { .. } | SessionEvent::CaptureChanged { .. }
            )
        })
        .await;
        match event {
            SessionEvent::CaptureChanged { now, .. } => capture.push(now),
            SessionEvent::PublisherChanged { now, .. } => {
                publisher.push(now);
                if now == PublisherState::Publishing {
                    break;
                }
            }
            _ => unreachable!(),
        }
    }

    assert_eq!(
        publisher,
        vec![
            PublisherState::Connected,
            PublisherState::Disconnected,
            PublisherState::Connecting,
            PublisherState::Connected,
            PublisherState::Publishing,
        ]
    );
    assert_eq!(
        capture,
        vec![
            CaptureState::NotCaptured,
            CaptureState::TryCapture,
            CaptureState::IsCaptured,
        ]
    );
    assert_eq!(h.transport.count(&TransportCall::Publish), 2);
    assert_eq!(h.transport.count(&TransportCall::Create(Role::Publisher)), 2);
    assert_eq!(h.backend.camera(0).unwrap().stop_count(), 1);
}

#[tokio::test]
async fn test_empty_capability_list_rolls_capture_back() {
    let h = harness();
    h.backend
        .set_video_sources(vec![SyntheticSource::camera("Blank Camera", Vec::new())]);
    h.session.refresh_devices();
    let mut events = h.session.events();

    let result = h.session.start_capture_video().wait().await;

    assert!(matches!(result, Err(SessionError::ResourceUnavailable(_))));
    assert_eq!(h.session.snapshot().capture, CaptureState::NotCaptured);
    assert!(matches!(
        next_event(&mut events, |e| matches!(e, SessionEvent::CaptureChanged { .. })).await,
        SessionEvent::CaptureChanged {
            now: CaptureState::TryCapture,
            ..
        }
    ));
    assert!(matches!(
        next_event(&mut events, |e| matches!(e, SessionEvent::CaptureChanged { .. })).await,
        SessionEvent::CaptureChanged {
            now: CaptureState::NotCaptured,
            was: CaptureState::TryCapture
        }
    ));
}

#[tokio::test]
async fn test_failing_camera_rolls_capture_back() {
    let h = harness();
    h.backend.camera(0).unwrap().fail_capture(true);

    let result = h.session.start_capture_video().wait().await;

    assert!(matches!(result, Err(SessionError::Device(_))));
    assert_eq!(h.session.snapshot().capture, CaptureState::NotCaptured);
    assert!(!h.session.registry().is_active(Category::VideoSource));
}

#[tokio::test]
async fn test_mute_without_track_is_unavailable() {
    let h = harness();

    let result = h
        .session
        .toggle_media(Role::Publisher, MediaKind::Audio)
        .wait()
        .await;

    assert!(matches!(result, Err(SessionError::ResourceUnavailable(_))));
    let snapshot = h.session.snapshot();
    assert!(!snapshot.media.pub_audio_enabled);
    assert!(snapshot.alert.is_some());
}

#[tokio::test]
async fn test_mute_reports_confirmed_state() {
    let h = harness();
    h.session.start_capture().wait().await.unwrap();
    assert!(h.session.snapshot().media.pub_audio_enabled);

    let enabled = h
        .session
        .toggle_media(Role::Publisher, MediaKind::Audio)
        .wait()
        .await
        .unwrap();
    assert!(!enabled);
    assert!(!h.session.snapshot().media.pub_audio_enabled);

    let track = h.backend.microphone(0).unwrap().last_track().unwrap();
    track.refuse_toggle(true);
    let enabled = h
        .session
        .toggle_media(Role::Publisher, MediaKind::Audio)
        .wait()
        .await
        .unwrap();
    assert!(!enabled);
    assert!(!h.session.snapshot().media.pub_audio_enabled);
}

#[tokio::test]
async fn test_connect_twice_issues_one_transport_connect() {
    let h = harness_with(config(), quiet());

    h.session.connect_publisher().wait().await.unwrap();
    h.session.connect_publisher().wait().await.unwrap();

    assert_eq!(h.session.snapshot().publisher, PublisherState::Connecting);
    assert_eq!(h.transport.count(&TransportCall::Connect(Role::Publisher)), 1);
    assert_eq!(h.transport.count(&TransportCall::Create(Role::Publisher)), 1);
}

#[tokio::test]
async fn test_connect_without_credentials_is_refused() {
    let h = harness_with(SessionConfig::default(), Behavior::default());

    let result = h.session.connect_publisher().wait().await;

    assert!(matches!(result, Err(SessionError::InvalidCredentials(_))));
    assert_eq!(h.session.snapshot().publisher, PublisherState::Disconnected);
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn test_publish_requires_connection_and_tracks() {
    let mut cfg = config();
    cfg.session.auto_publish_on_connect = false;
    let h = harness_with(cfg, Behavior::default());

    let result = h.session.start_publish().wait().await;
    assert!(matches!(result, Err(SessionError::InvalidTransition(_))));

    h.session.connect_publisher().wait().await.unwrap();
    wait_for(&h.session, |s| s.publisher == PublisherState::Connected).await;

    let result = h.session.start_publish().wait().await;
    assert!(matches!(result, Err(SessionError::InvalidTransition(_))));
    assert_eq!(h.session.snapshot().publisher, PublisherState::Connected);
    assert_eq!(h.transport.count(&TransportCall::Publish), 0);

    h.session.start_capture_audio().wait().await.unwrap();
    h.session.start_publish().wait().await.unwrap();
    wait_for(&h.session, |s| s.publisher == PublisherState::Publishing).await;
    assert_eq!(h.transport.count(&TransportCall::AddTrack(MediaKind::Audio)), 1);
    assert_eq!(h.transport.count(&TransportCall::AddTrack(MediaKind::Video)), 0);
}

#[tokio::test]
async fn test_high_resolution_publish_swaps_codec() {
    let h = harness();
    h.session.toggle_video_source(true).wait().await.unwrap();
    h.session.toggle_capability(true).wait().await.unwrap();
    h.session.toggle_capability(true).wait().await.unwrap();
    h.session.switch_codec(MediaKind::Video, true).wait().await.unwrap();
    assert_eq!(h.session.switch_codec(MediaKind::Video, true).wait().await.unwrap(), 2);
    assert_eq!(h.session.registry().capability_name(), "1920x1440 fps:30 PixelFormat:NV12");

    publishing(&h).await;

    let calls = h.transport.calls();
    assert!(calls.contains(&TransportCall::SetOptions {
        role: Role::Publisher,
        audio_codec: Some("OPUS".to_string()),
        video_codec: Some("VP9".to_string()),
    }));
    assert_eq!(h.session.registry().codec_name(MediaKind::Video), "H264");

    let result = h.session.switch_codec(MediaKind::Video, true).wait().await;
    assert!(matches!(result, Err(SessionError::ResourceBusy(_))));
}

#[tokio::test]
async fn test_selections_are_refused_while_in_use() {
    let h = harness();
    h.session.start_capture().wait().await.unwrap();

    let camera = h.session.toggle_video_source(true).wait().await;
    assert!(matches!(camera, Err(SessionError::ResourceBusy(_))));
    let capability = h.session.toggle_capability(false).wait().await;
    assert!(matches!(capability, Err(SessionError::ResourceBusy(_))));
    let microphone = h.session.switch_audio_source(true).wait().await;
    assert!(matches!(microphone, Err(SessionError::ResourceBusy(_))));

    h.session.stop_capture().wait().await.unwrap();
    assert_eq!(h.session.switch_audio_source(false).wait().await.unwrap(), 1);
    assert_eq!(h.session.registry().audio_source_name(), "Headset Microphone");
}

#[tokio::test]
async fn test_rejected_publish_reports_and_stays_connected() {
    let behavior = Behavior {
        reject_publish: true,
        ..Behavior::default()
    };
    let h = harness_with(config(), behavior);
    h.session.start_capture().wait().await.unwrap();
    h.session.connect_publisher().wait().await.unwrap();

    let snapshot = wait_for(&h.session, |s| s.alert.is_some()).await;

    assert_eq!(snapshot.publisher, PublisherState::Connected);
    assert!(snapshot.alert.unwrap().contains("Failed to publish"));
    assert!(!h.session.registry().is_active(Category::VideoCodec));
}

#[tokio::test]
async fn test_connection_error_disconnects_with_alert() {
    let h = harness_with(config(), quiet());
    h.session.connect_publisher().wait().await.unwrap();

    assert!(h.transport.emit_publisher(PublisherEvent::ConnectionError {
        status: 401,
        reason: "Unauthorized".to_string(),
    }));
    let snapshot = wait_for(&h.session, |s| s.alert.is_some()).await;

    assert_eq!(snapshot.publisher, PublisherState::Disconnected);
    assert!(snapshot
        .alert
        .unwrap()
        .contains("Failed to connect as Unauthorized! Status: 401"));
}

#[tokio::test]
async fn test_events_from_released_publisher_are_ignored() {
    let h = harness_with(config(), quiet());
    h.session.connect_publisher().wait().await.unwrap();
    h.session.disconnect_publisher().wait().await.unwrap();
    assert_eq!(h.session.snapshot().publisher, PublisherState::Disconnected);

    h.transport.emit_publisher(PublisherEvent::Connected);
    // Queued behind the stale event.
    h.session.stop_publish().wait().await.unwrap();

    assert_eq!(h.session.snapshot().publisher, PublisherState::Disconnected);
}

#[tokio::test]
async fn test_stop_publish_and_capture_tears_everything_down() {
    let h = harness();
    publishing(&h).await;

    h.session.stop_publish_and_capture().wait().await.unwrap();

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.publisher, PublisherState::Disconnected);
    assert_eq!(snapshot.capture, CaptureState::NotCaptured);
    assert!(!snapshot.media.pub_audio_enabled);
    assert!(!snapshot.media.pub_video_enabled);
    assert_eq!(h.transport.count(&TransportCall::Unpublish), 1);
    assert_eq!(h.transport.count(&TransportCall::Disconnect(Role::Publisher)), 1);
}

#[tokio::test]
async fn test_publisher_notifications_reach_observers() {
    let h = harness();
    publishing(&h).await;
    let mut events = h.session.events();

    h.transport.emit_publisher(PublisherEvent::ViewerCount(3));

    let event = next_event(&mut events, |e| matches!(e, SessionEvent::ViewerCount { .. })).await;
    assert!(matches!(
        event,
        SessionEvent::ViewerCount {
            role: Role::Publisher,
            count: 3
        }
    ));
}

#[tokio::test]
async fn test_refresh_pub_video_needs_a_track() {
    let h = harness();
    let result = h.session.refresh_pub_video().wait().await;
    assert!(matches!(result, Err(SessionError::ResourceUnavailable(_))));

    h.session.start_capture_video().wait().await.unwrap();
    let mut events = h.session.events();
    h.session.refresh_pub_video().wait().await.unwrap();

    let event = next_event(&mut events, |e| matches!(e, SessionEvent::RenderRequested { .. })).await;
    let track = h.backend.camera(0).unwrap().last_track().unwrap();
    match event {
        SessionEvent::RenderRequested { role, kind, track_id } => {
            assert_eq!(role, Role::Publisher);
            assert_eq!(kind, MediaKind::Video);
            assert_eq!(track_id, castlane::MediaTrack::id(track.as_ref()));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_subscribe_flow_with_volume_and_playback() {
    let h = harness();

    h.session.connect_subscriber().wait().await.unwrap();
    let snapshot = wait_for(&h.session, |s| {
        s.subscriber == SubscriberState::Subscribing
            && s.media.sub_audio_enabled
            && s.media.sub_video_enabled
    })
    .await;
    assert_eq!(snapshot.publisher, PublisherState::Disconnected);
    assert_eq!(h.backend.speaker(0).unwrap().init_count(), 1);

    h.session.set_remote_audio_volume(0.5).wait().await.unwrap();
    let (audio, _) = h.transport.remote_tracks();
    assert_eq!(audio.unwrap().volume(), 0.5);

    let result = h.session.set_remote_audio_volume(1.5).wait().await;
    assert!(matches!(result, Err(SessionError::InvalidArgument(_))));
    let result = h.session.switch_audio_playback(true).wait().await;
    assert!(matches!(result, Err(SessionError::ResourceBusy(_))));

    let enabled = h
        .session
        .toggle_media(Role::Subscriber, MediaKind::Video)
        .wait()
        .await
        .unwrap();
    assert!(!enabled);

    h.session.stop_subscribe().wait().await.unwrap();
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.subscriber, SubscriberState::Disconnected);
    assert!(!snapshot.media.sub_audio_enabled);
    assert!(!snapshot.media.sub_video_enabled);

    let result = h.session.set_remote_audio_volume(0.2).wait().await;
    assert!(matches!(result, Err(SessionError::ResourceUnavailable(_))));
    assert_eq!(h.session.switch_audio_playback(true).wait().await.unwrap(), 1);
    assert_eq!(h.session.registry().playback_name(), "Headphones");
}

#[tokio::test]
async fn test_subscriber_stream_notifications_are_forwarded() {
    let h = harness();
    h.session.connect_subscriber().wait().await.unwrap();
    wait_for(&h.session, |s| s.subscriber == SubscriberState::Subscribing).await;
    let mut events = h.session.events();

    h.transport.emit_subscriber(SubscriberEvent::Active {
        stream_id: "acct/castlane".to_string(),
        tracks: vec!["audio".to_string(), "video".to_string()],
        source_id: None,
    });
    h.transport.emit_subscriber(SubscriberEvent::Stopped);

    let event = next_event(&mut events, |e| matches!(e, SessionEvent::SourceActivity { .. })).await;
    assert!(matches!(
        event,
        SessionEvent::SourceActivity {
            role: Role::Subscriber,
            active: true,
            ..
        }
    ));
    let snapshot = wait_for(&h.session, |s| s.subscriber == SubscriberState::Connected).await;
    assert!(!snapshot.media.sub_audio_enabled);
}

#[tokio::test]
async fn test_lanes_are_independent() {
    let h = harness();
    publishing(&h).await;
    h.session.connect_subscriber().wait().await.unwrap();
    let snapshot = wait_for(&h.session, |s| s.subscriber == SubscriberState::Subscribing).await;
    assert_eq!(snapshot.publisher, PublisherState::Publishing);
    assert_eq!(snapshot.capture, CaptureState::IsCaptured);
}

#[tokio::test]
async fn test_operations_after_shutdown_report_lane_closed() {
    let mut h = harness();
    h.session.shutdown();

    let result = h.session.start_capture().wait().await;
    assert!(matches!(result, Err(SessionError::LaneClosed(_))));
    let result = h.session.connect_subscriber().wait().await;
    assert!(matches!(result, Err(SessionError::LaneClosed(_))));
    assert!(h.session.snapshot().alert.is_none());
}

#[test]
fn test_blocking_tickets_work_from_sync_code() {
    let h = harness();
    h.session.start_capture().wait_blocking().unwrap();
    assert_eq!(h.session.snapshot().capture, CaptureState::IsCaptured);
    let snapshot = serde_json::to_value(h.session.snapshot()).unwrap();
    assert_eq!(snapshot["capture"], "IsCaptured");
}

#[tokio::test]
async fn test_queued_selection_changes_apply_in_order() {
    let h = harness();
    let tickets = vec![
        h.session.toggle_video_source(true),
        h.session.toggle_video_source(true),
        h.session.toggle_video_source(true),
        h.session.toggle_video_source(false),
    ];

    let results: Vec<usize> = futures::future::join_all(tickets.into_iter().map(|t| t.wait()))
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(results, vec![1, 2, 0, 2]);
    assert_eq!(h.session.registry().video_source_name(), "External Camera");
}

#[test]
fn test_tickets_can_be_driven_by_any_executor() {
    let h = harness();
    let result = tokio_test::block_on(h.session.start_capture_audio().wait());
    assert!(result.is_ok());
    assert!(h.session.snapshot().media.pub_audio_enabled);
    assert_eq!(h.session.snapshot().capture, CaptureState::NotCaptured);
}

#[tokio::test]
async fn test_refused_connect_falls_back_to_disconnected() {
    let behavior = Behavior {
        fail_connect: true,
        ..Behavior::default()
    };
    let h = harness_with(config(), behavior);
    h.session.start_capture().wait().await.unwrap();
    let mut events = h.session.events();

    let result = h.session.connect_publisher().wait().await;

    assert!(matches!(result, Err(SessionError::TransportFailure(_))));
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.publisher, PublisherState::Disconnected);
    assert_eq!(snapshot.capture, CaptureState::IsCaptured);
    assert!(snapshot.alert.unwrap().contains("Could not connect publisher"));

    let mut publisher = Vec::new();
    while publisher.len() < 2 {
        if let SessionEvent::PublisherChanged { now, .. } =
            next_event(&mut events, |e| matches!(e, SessionEvent::PublisherChanged { .. })).await
        {
            publisher.push(now);
        }
    }
    assert_eq!(
        publisher,
        vec![PublisherState::Connecting, PublisherState::Disconnected]
    );
    assert_eq!(h.transport.count(&TransportCall::Connect(Role::Publisher)), 1);
    assert_eq!(h.transport.count(&TransportCall::Publish), 0);
}

#[tokio::test]
async fn test_switch_camera_stops_when_new_camera_fails() {
    let h = harness();
    publishing(&h).await;
    h.backend.camera(1).unwrap().fail_capture(true);

    let result = h.session.switch_video_source(true).wait().await;

    assert!(matches!(result, Err(SessionError::Device(_))));
    // Flush anything the failed switch might have queued.
    h.session.stop_publish().wait().await.unwrap();

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.publisher, PublisherState::Disconnected);
    assert_eq!(snapshot.capture, CaptureState::NotCaptured);
    assert!(snapshot.alert.unwrap().contains("refused to start capturing"));
    assert_eq!(h.session.registry().selected_index(Category::VideoSource), 1);
    assert!(!h.session.registry().is_active(Category::VideoSource));
    assert_eq!(h.transport.count(&TransportCall::Create(Role::Publisher)), 1);
    assert_eq!(h.transport.count(&TransportCall::Publish), 1);
}

#[tokio::test]
async fn test_switch_camera_keeps_new_capture_when_reconnect_is_refused() {
    let h = harness();
    publishing(&h).await;
    h.transport.set_behavior(Behavior {
        fail_connect: true,
        ..Behavior::default()
    });

    let result = h.session.switch_video_source(true).wait().await;

    assert!(matches!(result, Err(SessionError::TransportFailure(_))));
    h.session.stop_publish().wait().await.unwrap();

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.publisher, PublisherState::Disconnected);
    assert_eq!(snapshot.capture, CaptureState::IsCaptured);
    assert!(snapshot.alert.is_some());
    assert_eq!(h.session.registry().video_source_name(), "Back Camera");
    assert_eq!(h.backend.camera(1).unwrap().start_count(), 1);
    assert_eq!(h.transport.count(&TransportCall::Connect(Role::Publisher)), 2);
    assert_eq!(h.transport.count(&TransportCall::Publish), 1);
}
