//! Voice transport client integration tests over a scripted transport.

mod support;

use hearth_voice::audio::PlaybackScheduler;
use hearth_voice::config::TransportConfig;
use hearth_voice::error::VoiceError;
use hearth_voice::transport::protocol::{
    AudioFormat, ClientMessage, ServerMessage, VoiceSelection,
};
use hearth_voice::transport::{SessionState, VoiceClient, VoiceHandlers};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::{MockTransport, RecordingSink, SentFrame};
use tokio_util::sync::CancellationToken;

fn test_config(timeout_ms: u64) -> TransportConfig {
    TransportConfig {
        voice_url: "ws://voice.test.invalid/session".into(),
        connect_timeout_ms: timeout_ms,
        ..TransportConfig::default()
    }
}

/// Poll until the condition holds or a short deadline passes.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn second_connect_while_open_is_a_noop() {
    let (provider, _handle) = MockTransport::accepting();
    let client = VoiceClient::new(provider.clone(), test_config(5_000));
    let cancel = CancellationToken::new();

    client
        .connect(VoiceHandlers::default(), &cancel)
        .await
        .expect("first connect");
    assert_eq!(client.state(), SessionState::Open);

    client
        .connect(VoiceHandlers::default(), &cancel)
        .await
        .expect("second connect is a no-op");
    assert_eq!(provider.connect_calls(), 1);
}

#[tokio::test]
async fn connect_times_out_at_the_configured_bound() {
    let provider = MockTransport::hanging();
    let client = VoiceClient::new(provider.clone(), test_config(50));
    let cancel = CancellationToken::new();

    let err = client
        .connect(VoiceHandlers::default(), &cancel)
        .await
        .expect_err("hanging connect must time out");
    assert!(matches!(err, VoiceError::ConnectTimeout));
    assert_eq!(client.state(), SessionState::Error);
    assert_eq!(provider.connect_calls(), 1);
}

#[tokio::test]
async fn cancellation_token_aborts_a_pending_connect() {
    let provider = MockTransport::hanging();
    let client = VoiceClient::new(provider, test_config(60_000));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client
        .connect(VoiceHandlers::default(), &cancel)
        .await
        .expect_err("cancelled connect must fail");
    assert!(matches!(err, VoiceError::ConnectCancelled));
    assert_eq!(client.state(), SessionState::Error);
}

#[tokio::test]
async fn provider_refusal_surfaces_as_transport_error() {
    let provider = MockTransport::refusing("service full");
    let client = VoiceClient::new(provider, test_config(5_000));
    let cancel = CancellationToken::new();

    let err = client
        .connect(VoiceHandlers::default(), &cancel)
        .await
        .expect_err("refused connect must fail");
    match err {
        VoiceError::Transport(reason) => assert_eq!(reason, "service full"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(client.state(), SessionState::Error);
}

#[tokio::test]
async fn send_fails_when_not_open() {
    let (provider, _handle) = MockTransport::accepting();
    let client = VoiceClient::new(provider, test_config(5_000));

    let err = client
        .send(&ClientMessage::SpeechStart {})
        .expect_err("send before connect must fail");
    assert!(matches!(err, VoiceError::Transport(_)));
    let err = client
        .send_audio(vec![0, 0])
        .expect_err("send_audio before connect must fail");
    assert!(matches!(err, VoiceError::Transport(_)));
}

#[tokio::test]
async fn malformed_json_is_dropped_and_later_frames_still_dispatch() {
    let (provider, handle) = MockTransport::accepting();
    let client = VoiceClient::new(provider, test_config(5_000));
    let cancel = CancellationToken::new();

    let events: Arc<Mutex<Vec<ServerMessage>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let handlers = VoiceHandlers {
        on_event: Box::new(move |msg| sink.lock().expect("events lock").push(msg)),
        ..VoiceHandlers::default()
    };
    client.connect(handlers, &cancel).await.expect("connect");

    handle.push_text("{this is not json");
    handle.push_text(r#"{"type":"unknownKind","x":1}"#);
    handle.push_text(r#"{"type":"ready","sessionId":"s1"}"#);

    wait_until(|| !events.lock().expect("events lock").is_empty()).await;
    let events = events.lock().expect("events lock");
    assert_eq!(
        *events,
        vec![ServerMessage::Ready {
            session_id: "s1".into()
        }]
    );
}

#[tokio::test]
async fn binary_frames_pass_through_uninterpreted() {
    let (provider, handle) = MockTransport::accepting();
    let client = VoiceClient::new(provider, test_config(5_000));
    let cancel = CancellationToken::new();

    let audio: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&audio);
    let handlers = VoiceHandlers {
        on_audio: Box::new(move |pcm| sink.lock().expect("audio lock").push(pcm)),
        ..VoiceHandlers::default()
    };
    client.connect(handlers, &cancel).await.expect("connect");

    // Not valid UTF-8 or JSON; must arrive byte for byte.
    handle.push_binary(vec![0xff, 0x00, 0x80, 0x7f]);
    wait_until(|| !audio.lock().expect("audio lock").is_empty()).await;
    assert_eq!(
        *audio.lock().expect("audio lock"),
        vec![vec![0xff, 0x00, 0x80, 0x7f]]
    );
}

#[tokio::test]
async fn remote_close_sets_error_state_and_notifies() {
    let (provider, handle) = MockTransport::accepting();
    let client = VoiceClient::new(provider, test_config(5_000));
    let cancel = CancellationToken::new();

    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let handlers = VoiceHandlers {
        on_error: Box::new(move |e| sink.lock().expect("errors lock").push(e.to_string())),
        ..VoiceHandlers::default()
    };
    client.connect(handlers, &cancel).await.expect("connect");

    handle.push_closed();
    wait_until(|| !errors.lock().expect("errors lock").is_empty()).await;
    assert_eq!(client.state(), SessionState::Error);

    // No automatic reconnect: a failed session stays failed until the
    // caller asks again.
    assert_eq!(errors.lock().expect("errors lock").len(), 1);
}

#[tokio::test]
async fn client_close_is_idempotent_and_does_not_report_an_error() {
    let (provider, handle) = MockTransport::accepting();
    let client = VoiceClient::new(provider, test_config(5_000));
    let cancel = CancellationToken::new();

    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let handlers = VoiceHandlers {
        on_error: Box::new(move |e| sink.lock().expect("errors lock").push(e.to_string())),
        ..VoiceHandlers::default()
    };
    client.connect(handlers, &cancel).await.expect("connect");

    client.close();
    client.close();
    assert_eq!(client.state(), SessionState::Closed);

    wait_until(|| handle.sent_frames().contains(&SentFrame::Close)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        errors.lock().expect("errors lock").is_empty(),
        "client-initiated close must not fire the error handler"
    );
}

#[tokio::test]
async fn handshake_streams_audio_both_ways() {
    let (provider, handle) = MockTransport::accepting();
    let client = VoiceClient::new(provider, test_config(5_000));
    let cancel = CancellationToken::new();

    let events: Arc<Mutex<Vec<ServerMessage>>> = Arc::new(Mutex::new(Vec::new()));
    let (recording, log) = RecordingSink::new();
    let scheduler = Arc::new(Mutex::new(
        PlaybackScheduler::new(Box::new(recording), 24_000, Duration::from_millis(50))
            .expect("scheduler"),
    ));

    let event_sink = Arc::clone(&events);
    let playback = Arc::clone(&scheduler);
    let handlers = VoiceHandlers {
        on_event: Box::new(move |msg| event_sink.lock().expect("events lock").push(msg)),
        on_audio: Box::new(move |pcm| {
            playback
                .lock()
                .expect("scheduler lock")
                .play_chunk(&pcm)
                .expect("schedule chunk");
        }),
        ..VoiceHandlers::default()
    };
    client.connect(handlers, &cancel).await.expect("connect");

    client
        .send(&ClientMessage::Auth {
            token: "tok".into(),
            book_id: "b1".into(),
            chapter_id: "c1".into(),
            page_id: "p1".into(),
        })
        .expect("auth");
    client
        .send(&ClientMessage::Start {
            input_audio: AudioFormat::pcm_s16le(16_000),
            output_audio: AudioFormat::pcm_s16le(24_000),
            voice: VoiceSelection {
                provider: "narrator".into(),
                voice_id: "warm-reader".into(),
            },
            mode: "conversation".into(),
        })
        .expect("start");

    handle.push_text(r#"{"type":"ready","sessionId":"s1"}"#);
    wait_until(|| !events.lock().expect("events lock").is_empty()).await;

    client.send_audio(vec![1, 2, 3, 4]).expect("capture frame");
    wait_until(|| {
        handle
            .sent_frames()
            .iter()
            .any(|f| matches!(f, SentFrame::Binary(_)))
    })
    .await;

    // Outbound order: auth JSON, start JSON, then the binary frame.
    let sent = handle.sent_frames();
    match (&sent[0], &sent[1], &sent[2]) {
        (SentFrame::Text(auth), SentFrame::Text(start), SentFrame::Binary(pcm)) => {
            assert!(auth.contains(r#""type":"auth""#));
            assert!(start.contains(r#""type":"start""#));
            assert_eq!(pcm, &vec![1, 2, 3, 4]);
        }
        other => panic!("unexpected outbound sequence: {other:?}"),
    }

    // 1200 samples at 24 kHz is 50 ms of audio.
    handle.push_binary(vec![0u8; 2_400]);
    wait_until(|| !log.lock().expect("sink lock").written.is_empty()).await;
    {
        let mut sched = scheduler.lock().expect("scheduler lock");
        assert_eq!(sched.pending(), 1);
    }
    let log = log.lock().expect("sink lock");
    assert_eq!(log.written.len(), 1);
    assert_eq!(log.written[0].len(), 1_200);
}
