//! Delivery tests for WebhookDispatcher against wiremock partner endpoints.
//!
//! | Scenario | Test |
//! |----------|------|
//! | 2xx response | `successful_delivery_*` |
//! | non-2xx response | `non_success_status_*` |
//! | slow endpoint | `timeout_*` |
//! | closed port | `network_failure_*` |
//! | explicit retry | `retry_*` |
//! | racing retries | `concurrent_retries_*` |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pgw_core::{CanonicalBytes, IntegrationRecord, IntegrationStatus, PartnerType};
use pgw_crypto::{verify, WebhookSecret};
use pgw_webhook::{
    DeliveryError, DispatchError, DispatcherConfig, InMemoryIntegrationStore, IntegrationFilter,
    IntegrationStore, RecordVersion, StoreError, WebhookDispatcher, WebhookTarget,
};
use uuid::Uuid;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "whsec_partner_test";

fn dispatcher(store: &InMemoryIntegrationStore, timeout: Duration) -> WebhookDispatcher {
    let config = DispatcherConfig {
        timeout,
        ..DispatcherConfig::default()
    };
    WebhookDispatcher::new(config, Arc::new(store.clone())).unwrap()
}

fn target(url: &str) -> WebhookTarget {
    WebhookTarget {
        partner_type: PartnerType::new("prelafit").unwrap(),
        url: url.parse().unwrap(),
        secret: WebhookSecret::new(SECRET).unwrap(),
    }
}

fn data() -> serde_json::Value {
    serde_json::json!({"treatment_id": "rat-42", "risk": {"level": "ALTO", "score": 55}})
}

// ── Success ──────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_delivery_marks_record_sent_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/rat"))
        .and(header_exists("X-Signature"))
        .and(header_exists("X-Webhook-Id"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"received\":true}"))
        .expect(1)
        .mount(&server)
        .await;

    let store = InMemoryIntegrationStore::new();
    let d = dispatcher(&store, Duration::from_secs(5));
    let record = d
        .dispatch(&target(&format!("{}/hooks/rat", server.uri())), "rat-42", data())
        .await
        .unwrap();

    assert_eq!(record.status, IntegrationStatus::Sent);
    assert_eq!(record.retry_count, 0);
    assert_eq!(record.response_body.as_deref(), Some("{\"received\":true}"));
    assert!(record.success_at.is_some());

    let stored = store.get(record.id).await.unwrap().unwrap();
    assert_eq!(stored, record);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn successful_delivery_body_is_signed_canonical_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let store = InMemoryIntegrationStore::new();
    let d = dispatcher(&store, Duration::from_secs(5));
    let record = d.dispatch(&target(&server.uri()), "rat-42", data()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let signature = request.headers.get("X-Signature").unwrap().to_str().unwrap();
    let secret = WebhookSecret::new(SECRET).unwrap();
    verify(&secret, &request.body, signature).unwrap();

    let expected = CanonicalBytes::from_value(&record.payload).unwrap();
    assert_eq!(request.body, expected.as_bytes());

    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["event"], "rat_completed");
    assert_eq!(body["source"], "lpdp-gateway");
    assert_eq!(body["data"]["treatment_id"], "rat-42");
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));

    let webhook_id = request.headers.get("X-Webhook-Id").unwrap().to_str().unwrap();
    assert_eq!(webhook_id, record.id.to_string());
}

// ── Failure ──────────────────────────────────────────────────────────

#[tokio::test]
async fn non_success_status_marks_record_error_with_zero_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("mantenimiento"))
        .expect(1)
        .mount(&server)
        .await;

    let store = InMemoryIntegrationStore::new();
    let d = dispatcher(&store, Duration::from_secs(5));
    let err = d
        .dispatch(&target(&server.uri()), "rat-42", data())
        .await
        .unwrap_err();

    let DispatchError::Delivery { record, source } = err else {
        panic!("expected delivery error");
    };
    assert!(matches!(
        source,
        DeliveryError::NonSuccessStatus { status: 503, ref body, .. } if body == "mantenimiento"
    ));
    assert_eq!(record.status, IntegrationStatus::Error);
    assert_eq!(record.retry_count, 0);
    assert!(record.error_message.as_deref().unwrap().contains("503"));
    assert!(record.last_attempt_at.is_some());

    let stored = store.get(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, IntegrationStatus::Error);
}

#[tokio::test]
async fn timeout_is_reported_as_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let store = InMemoryIntegrationStore::new();
    let d = dispatcher(&store, Duration::from_millis(200));
    let err = d
        .dispatch(&target(&server.uri()), "rat-42", data())
        .await
        .unwrap_err();

    match err {
        DispatchError::Delivery { record, source } => {
            assert!(matches!(source, DeliveryError::Timeout { timeout_ms: 200, .. }));
            assert_eq!(record.status, IntegrationStatus::Error);
        }
        other => panic!("expected delivery error, got {other:?}"),
    }
}

#[tokio::test]
async fn network_failure_is_reported_as_network_error() {
    let store = InMemoryIntegrationStore::new();
    let d = dispatcher(&store, Duration::from_secs(2));
    let err = d
        .dispatch(&target("http://127.0.0.1:1/hooks"), "rat-42", data())
        .await
        .unwrap_err();

    match err {
        DispatchError::Delivery { record, source } => {
            assert_eq!(source.kind(), "network");
            assert_eq!(record.status, IntegrationStatus::Error);
        }
        other => panic!("expected delivery error, got {other:?}"),
    }
    assert_eq!(store.len(), 1);
}

// ── Retry ────────────────────────────────────────────────────────────

#[tokio::test]
async fn retry_increments_count_and_can_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let store = InMemoryIntegrationStore::new();
    let d = dispatcher(&store, Duration::from_secs(5));
    let t = target(&server.uri());

    let first = match d.dispatch(&t, "rat-42", data()).await {
        Err(DispatchError::Delivery { record, .. }) => record,
        other => panic!("expected delivery error, got {other:?}"),
    };
    assert_eq!(first.retry_count, 0);

    let second = match d.retry(&t, first.id).await {
        Err(DispatchError::Delivery { record, .. }) => record,
        other => panic!("expected delivery error, got {other:?}"),
    };
    assert_eq!(second.id, first.id);
    assert_eq!(second.retry_count, 1);
    assert_eq!(second.status, IntegrationStatus::Error);

    let third = d.retry(&t, first.id).await.unwrap();
    assert_eq!(third.retry_count, 2);
    assert_eq!(third.status, IntegrationStatus::Sent);
    assert!(third.error_message.is_none());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].body, requests[2].body);
    assert_eq!(
        requests[0].headers.get("X-Signature"),
        requests[2].headers.get("X-Signature")
    );
}

#[tokio::test]
async fn retry_of_sent_record_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = InMemoryIntegrationStore::new();
    let d = dispatcher(&store, Duration::from_secs(5));
    let t = target(&server.uri());
    let sent = d.dispatch(&t, "rat-42", data()).await.unwrap();

    let err = d.retry(&t, sent.id).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::NotRetryable { status: IntegrationStatus::Sent, .. }
    ));
}

#[tokio::test]
async fn retry_of_unknown_or_foreign_record_is_not_found() {
    let store = InMemoryIntegrationStore::new();
    let d = dispatcher(&store, Duration::from_secs(1));
    let t = target("http://127.0.0.1:1/");

    let unknown = uuid::Uuid::new_v4();
    assert!(matches!(d.retry(&t, unknown).await, Err(DispatchError::NotFound(id)) if id == unknown));

    let failed = match d.dispatch(&t, "rat-1", data()).await {
        Err(DispatchError::Delivery { record, .. }) => record,
        other => panic!("expected delivery error, got {other:?}"),
    };
    let foreign = WebhookTarget {
        partner_type: PartnerType::new("datacompliance").unwrap(),
        ..t.clone()
    };
    assert!(matches!(d.retry(&foreign, failed.id).await, Err(DispatchError::NotFound(_))));
}

// ── Racing retries ───────────────────────────────────────────────────

/// In-memory store that yields before every call, the way a networked
/// store suspends, so concurrent callers interleave between read and write.
#[derive(Clone, Default)]
struct YieldingStore(InMemoryIntegrationStore);

#[async_trait]
impl IntegrationStore for YieldingStore {
    async fn insert(&self, record: &IntegrationRecord) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.0.insert(record).await
    }

    async fn update(&self, record: &IntegrationRecord) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.0.update(record).await
    }

    async fn transition(&self, expected: RecordVersion, record: &IntegrationRecord) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.0.transition(expected, record).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<IntegrationRecord>, StoreError> {
        tokio::task::yield_now().await;
        self.0.get(id).await
    }

    async fn select(&self, filter: &IntegrationFilter) -> Result<Vec<IntegrationRecord>, StoreError> {
        tokio::task::yield_now().await;
        self.0.select(filter).await
    }
}

#[tokio::test]
async fn concurrent_retries_post_once_and_keep_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let store = YieldingStore::default();
    let config = DispatcherConfig {
        timeout: Duration::from_secs(5),
        ..DispatcherConfig::default()
    };
    let d = WebhookDispatcher::new(config, Arc::new(store.clone())).unwrap();
    let t = target(&server.uri());

    let failed = match d.dispatch(&t, "rat-42", data()).await {
        Err(DispatchError::Delivery { record, .. }) => record,
        other => panic!("expected delivery error, got {other:?}"),
    };

    let (a, b) = tokio::join!(d.retry(&t, failed.id), d.retry(&t, failed.id));
    let (winner, loser) = match (a, b) {
        (Ok(record), Err(e)) | (Err(e), Ok(record)) => (record, e),
        other => panic!("expected exactly one retry to win, got {other:?}"),
    };
    assert_eq!(winner.status, IntegrationStatus::Sent);
    assert_eq!(winner.retry_count, 1);
    assert!(matches!(loser, DispatchError::NotRetryable { id, .. } if id == failed.id));

    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    let stored = store.get(failed.id).await.unwrap().unwrap();
    assert_eq!(stored.status, IntegrationStatus::Sent);
    assert_eq!(stored.retry_count, 1);
}

#[tokio::test]
async fn concurrent_failing_retries_count_every_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = YieldingStore::default();
    let d = WebhookDispatcher::new(DispatcherConfig::default(), Arc::new(store.clone())).unwrap();
    let t = target(&server.uri());

    let failed = match d.dispatch(&t, "rat-42", data()).await {
        Err(DispatchError::Delivery { record, .. }) => record,
        other => panic!("expected delivery error, got {other:?}"),
    };

    let (a, b) = tokio::join!(d.retry(&t, failed.id), d.retry(&t, failed.id));
    let attempted = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(DispatchError::Delivery { .. })))
        .count();
    assert!(attempted >= 1);
    let posts = server.received_requests().await.unwrap().len();
    assert_eq!(posts, 1 + attempted);

    let stored = store.get(failed.id).await.unwrap().unwrap();
    assert_eq!(stored.status, IntegrationStatus::Error);
    assert_eq!(stored.retry_count as usize, attempted);
}
