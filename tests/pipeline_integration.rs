//! Delivery Pipeline Integration Tests
//!
//! Drives `DeliverySession` end to end with in-memory transports: ordering,
//! sequence numbers, body formatting, failure suppression, live config
//! updates and shutdown behaviour. No network involved.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use caption_relay::config::{DeliveryConfig, SharedDeliveryConfig};
use caption_relay::delivery::{CaptionRequest, CaptionTransport, DeliveryError};
use caption_relay::pipeline::{DeliverySession, IngressError};
use caption_relay::types::SessionState;

const ENDPOINT: &str = "https://cc.example.com/closedcaption?id=42&signature=abc";

const ALICE: &str = r#""2020-01-01 10:00:00","Alice","Hello","こんにちは""#;
const BOB: &str = r#""2020-01-01","Bob","Hi there","""#;

// ============================================================================
// Test Transports
// ============================================================================

/// Records every request; replies from a script (None = 200 OK), then OK.
#[derive(Clone, Default)]
struct Recorder {
    requests: Arc<Mutex<Vec<CaptionRequest>>>,
    script: Arc<Mutex<VecDeque<Option<StatusCode>>>>,
}

impl Recorder {
    fn scripted(replies: &[Option<StatusCode>]) -> Self {
        let recorder = Self::default();
        recorder.script.lock().unwrap().extend(replies.iter().copied());
        recorder
    }

    fn requests(&self) -> Vec<CaptionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CaptionTransport for Recorder {
    async fn send(
        &mut self,
        request: &CaptionRequest,
        _config: &DeliveryConfig,
    ) -> Result<(), DeliveryError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front().flatten() {
            Some(status) => Err(DeliveryError::Status(status)),
            None => Ok(()),
        }
    }

    fn transport_name(&self) -> &str {
        "recorder"
    }
}

/// Never answers; signals when a request is in flight.
struct Hanging {
    entered: Arc<Notify>,
}

#[async_trait]
impl CaptionTransport for Hanging {
    async fn send(
        &mut self,
        _request: &CaptionRequest,
        _config: &DeliveryConfig,
    ) -> Result<(), DeliveryError> {
        self.entered.notify_one();
        std::future::pending::<()>().await;
        Ok(())
    }

    fn transport_name(&self) -> &str {
        "hanging"
    }
}

/// Flips `include_speaker_name` on the live config during the first send.
struct TogglesSpeakerNames {
    shared: SharedDeliveryConfig,
    inner: Recorder,
}

#[async_trait]
impl CaptionTransport for TogglesSpeakerNames {
    async fn send(
        &mut self,
        request: &CaptionRequest,
        config: &DeliveryConfig,
    ) -> Result<(), DeliveryError> {
        self.shared.update(|c| c.include_speaker_name = true);
        self.inner.send(request, config).await
    }

    fn transport_name(&self) -> &str {
        "toggle"
    }
}

fn shared_config(include_speaker_name: bool) -> SharedDeliveryConfig {
    SharedDeliveryConfig::new(DeliveryConfig {
        include_speaker_name,
        ..DeliveryConfig::with_endpoint(ENDPOINT)
    })
}

fn caption(n: usize) -> String {
    format!(r#""2020-01-01 10:00:{n:02}","Alice","line {n}","""#)
}

// ============================================================================
// Ordering and Formatting
// ============================================================================

#[tokio::test]
async fn attempts_follow_enqueue_order_with_consecutive_seq() {
    let recorder = Recorder::default();
    let (session, _failures) =
        DeliverySession::start(shared_config(false), recorder.clone(), CancellationToken::new());

    for n in 0..20 {
        session.enqueue(caption(n)).unwrap();
    }
    let stats = session.finish().await.unwrap();

    let requests = recorder.requests();
    assert_eq!(stats.attempted, 20);
    assert_eq!(stats.delivered, 20);
    for (i, request) in requests.iter().enumerate() {
        assert_eq!(request.seq, i as u64 + 1, "seq must start at 1 and step by 1");
        assert_eq!(request.body, format!("line {i}\n"));
        assert_eq!(
            request.url,
            format!("{ENDPOINT}&seq={}&lang=ja-JP", i + 1)
        );
    }
}

#[tokio::test]
async fn translated_text_is_sent_when_present() {
    let recorder = Recorder::default();
    let (session, _failures) =
        DeliverySession::start(shared_config(false), recorder.clone(), CancellationToken::new());
    session.enqueue(ALICE).unwrap();
    session.finish().await.unwrap();

    assert_eq!(recorder.requests()[0].body, "こんにちは\n");
}

#[tokio::test]
async fn speaker_name_prefix_when_enabled() {
    let recorder = Recorder::default();
    let (session, _failures) =
        DeliverySession::start(shared_config(true), recorder.clone(), CancellationToken::new());
    session.enqueue(ALICE).unwrap();
    session.finish().await.unwrap();

    assert_eq!(recorder.requests()[0].body, "[Alice]\nこんにちは\n");
}

#[tokio::test]
async fn empty_translation_falls_back_to_original() {
    let recorder = Recorder::default();
    let (session, _failures) =
        DeliverySession::start(shared_config(false), recorder.clone(), CancellationToken::new());
    let status = session.status();
    session.enqueue(BOB).unwrap();
    session.finish().await.unwrap();

    assert_eq!(recorder.requests()[0].body, "Hi there\n");
    let status = status.read().await;
    assert_eq!(status.last_message, "2020-01-01 00:00:00 Hi there");
    assert!(status.last_delivery_time.is_some());
}

#[tokio::test]
async fn malformed_lines_are_skipped_without_attempts() {
    let recorder = Recorder::default();
    let (session, mut failures) =
        DeliverySession::start(shared_config(false), recorder.clone(), CancellationToken::new());

    session.enqueue(r#""2020-01-01","Bob","only three""#).unwrap();
    session.enqueue(r#""not a date","Bob","Hi","""#).unwrap();
    session.enqueue(BOB).unwrap();
    let stats = session.finish().await.unwrap();

    assert_eq!(stats.received, 3);
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.attempted, 1);
    let requests = recorder.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].seq, 1, "dropped lines do not consume sequence numbers");
    assert!(failures.recv().await.is_none(), "parse errors are never surfaced");
}

// ============================================================================
// Failure Suppression
// ============================================================================

#[tokio::test]
async fn identical_failures_notify_once_then_new_text_notifies_again() {
    let recorder = Recorder::scripted(&[
        Some(StatusCode::UNAUTHORIZED),
        Some(StatusCode::UNAUTHORIZED),
        Some(StatusCode::SERVICE_UNAVAILABLE),
    ]);
    let (session, mut failures) =
        DeliverySession::start(shared_config(false), recorder.clone(), CancellationToken::new());

    for n in 0..3 {
        session.enqueue(caption(n)).unwrap();
    }
    let stats = session.finish().await.unwrap();

    assert_eq!(stats.failed, 3);
    assert_eq!(stats.suppressed, 1);

    let first = failures.recv().await.unwrap();
    assert_eq!(first.seq, 1);
    assert_eq!(first.message, "server returned status 401 Unauthorized");
    assert_eq!(first.display_text, "line 0");

    let second = failures.recv().await.unwrap();
    assert_eq!(second.seq, 3);
    assert_eq!(second.message, "server returned status 503 Service Unavailable");

    assert!(failures.recv().await.is_none());
}

#[tokio::test]
async fn success_resets_suppression() {
    let recorder = Recorder::scripted(&[
        Some(StatusCode::UNAUTHORIZED),
        None,
        Some(StatusCode::UNAUTHORIZED),
    ]);
    let (session, mut failures) =
        DeliverySession::start(shared_config(false), recorder.clone(), CancellationToken::new());
    let status = session.status();

    for n in 0..3 {
        session.enqueue(caption(n)).unwrap();
    }
    let stats = session.finish().await.unwrap();

    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.suppressed, 0);
    assert_eq!(failures.recv().await.map(|f| f.seq), Some(1));
    assert_eq!(failures.recv().await.map(|f| f.seq), Some(3));
    assert!(failures.recv().await.is_none());

    let status = status.read().await;
    assert_eq!(status.last_error, "server returned status 401 Unauthorized");
    assert_eq!(status.last_message, "2020-01-01 10:00:01 line 1");
}

#[tokio::test]
async fn failures_never_stop_the_worker() {
    let replies: Vec<_> = (0..50).map(|_| Some(StatusCode::BAD_GATEWAY)).collect();
    let recorder = Recorder::scripted(&replies);
    let (session, failures) =
        DeliverySession::start(shared_config(false), recorder.clone(), CancellationToken::new());
    drop(failures);

    for n in 0..51 {
        session.enqueue(caption(n % 60)).unwrap();
    }
    let stats = session.finish().await.unwrap();

    assert_eq!(stats.attempted, 51);
    assert_eq!(stats.failed, 50);
    assert_eq!(stats.delivered, 1);
    assert_eq!(recorder.requests().last().map(|r| r.seq), Some(51));
}

// ============================================================================
// Live Configuration
// ============================================================================

#[tokio::test]
async fn config_change_applies_from_next_record() {
    let shared = shared_config(false);
    let recorder = Recorder::default();
    let transport = TogglesSpeakerNames {
        shared: shared.clone(),
        inner: recorder.clone(),
    };
    let (session, _failures) = DeliverySession::start(shared, transport, CancellationToken::new());

    session.enqueue(ALICE).unwrap();
    session.enqueue(ALICE).unwrap();
    session.finish().await.unwrap();

    let requests = recorder.requests();
    assert_eq!(requests[0].body, "こんにちは\n");
    assert_eq!(requests[1].body, "[Alice]\nこんにちは\n");
}

#[tokio::test]
async fn stored_endpoint_is_used_for_later_lines() {
    let shared = shared_config(false);
    let recorder = Recorder::default();
    let (session, _failures) =
        DeliverySession::start(shared.clone(), recorder.clone(), CancellationToken::new());

    shared.store(DeliveryConfig {
        language: "en-US".to_string(),
        ..DeliveryConfig::with_endpoint("http://localhost:9000/captions")
    });
    session.enqueue(BOB).unwrap();
    session.finish().await.unwrap();

    assert_eq!(
        recorder.requests()[0].url,
        "http://localhost:9000/captions?seq=1&lang=en-US"
    );
}

// ============================================================================
// Lifecycle and Cancellation
// ============================================================================

#[tokio::test]
async fn stop_unblocks_idle_worker_promptly() {
    let (session, _failures) =
        DeliverySession::start(shared_config(false), Recorder::default(), CancellationToken::new());
    let status = session.status();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(status.read().await.state, SessionState::Running);

    let stats = tokio::time::timeout(Duration::from_secs(1), session.stop())
        .await
        .expect("idle worker must stop promptly")
        .unwrap();

    assert_eq!(stats.received, 0);
    assert_eq!(status.read().await.state, SessionState::Stopped);
}

#[tokio::test]
async fn enqueue_after_stop_reports_closed() {
    let (session, _failures) =
        DeliverySession::start(shared_config(false), Recorder::default(), CancellationToken::new());
    let ingress = session.ingress();
    session.stop().await.unwrap();

    assert!(ingress.is_closed());
    assert_eq!(ingress.enqueue(ALICE), Err(IngressError::Closed));
}

#[tokio::test]
async fn cancel_during_send_aborts_without_notification() {
    let entered = Arc::new(Notify::new());
    let transport = Hanging {
        entered: Arc::clone(&entered),
    };
    let (session, mut failures) =
        DeliverySession::start(shared_config(false), transport, CancellationToken::new());

    session.enqueue(ALICE).unwrap();
    session.enqueue(BOB).unwrap();
    entered.notified().await;

    let stats = tokio::time::timeout(Duration::from_secs(1), session.stop())
        .await
        .expect("in-flight send must not block shutdown")
        .unwrap();

    assert_eq!(stats.attempted, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.delivered, 0);
    assert!(failures.recv().await.is_none());
}

#[tokio::test]
async fn parent_token_cancels_session() {
    let parent = CancellationToken::new();
    let (session, _failures) = DeliverySession::start(
        shared_config(false),
        Recorder::default(),
        parent.child_token(),
    );
    let _producer = session.ingress();

    parent.cancel();
    let stats = tokio::time::timeout(Duration::from_secs(1), session.finish())
        .await
        .expect("cancelled worker must exit even with the queue open")
        .unwrap();
    assert_eq!(stats.attempted, 0);
}

#[tokio::test]
async fn new_session_starts_fresh() {
    let first = Recorder::default();
    let (session, _failures) =
        DeliverySession::start(shared_config(false), first.clone(), CancellationToken::new());
    session.enqueue(ALICE).unwrap();
    session.enqueue(BOB).unwrap();
    session.finish().await.unwrap();

    let second = Recorder::default();
    let (session, _failures) =
        DeliverySession::start(shared_config(false), second.clone(), CancellationToken::new());
    let status = session.status();
    assert_eq!(status.read().await.next_seq, 1);
    session.enqueue(BOB).unwrap();
    session.finish().await.unwrap();

    assert_eq!(first.requests().len(), 2);
    assert_eq!(second.requests()[0].seq, 1);
}
