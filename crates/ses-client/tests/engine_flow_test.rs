//! # End-to-End Entitlement Flow
//!
//! Drives `EntitlementWorker` → `EntitlementEngine` → `HttpsTransport`
//! against a wiremock server. The engine only accepts `https` URLs, so a
//! small forwarding transport points the requests at the plain-HTTP mock.
//! Request bodies are gzip-compressed; a custom matcher decodes them to
//! route Auth Challenge and Get-Pseudonym requests.

use std::io::Read;
use std::sync::Arc;

use flate2::read::GzDecoder;
use serde_json::{json, Value};
use ses_client::{
    AkaResponse, EapAkaResponder, EntitlementEngine, EntitlementRequest, EntitlementResponse,
    EntitlementWorker, FailureReason, HttpsTransport, RequestFactory, SubscriberInfo, Transport,
    TransportConfig, TransportError, WorkerError,
};
use ses_core::{CarrierId, Imsi, HOUR_IN_MILLIS};
use tokio::runtime::Handle;
use url::Url;
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const IMSI: &str = "310260000000001";

/// Sends every request to `target` instead of the configured URL.
struct ForwardingTransport {
    inner: HttpsTransport,
    target: Url,
}

impl Transport for ForwardingTransport {
    fn send(&self, request: &EntitlementRequest) -> Result<EntitlementResponse, TransportError> {
        let forwarded = EntitlementRequest {
            url: self.target.clone(),
            body: request.body.clone(),
        };
        self.inner.send(&forwarded)
    }

    fn transport_name(&self) -> &str {
        "forwarding"
    }
}

struct FixedAka;

impl EapAkaResponder for FixedAka {
    fn compute(&self, challenge: &str) -> Option<AkaResponse> {
        assert_eq!(challenge, "Y2hhbGxlbmdl");
        Some(AkaResponse::challenge("cmVzcG9uc2U="))
    }
}

fn decoded_body(request: &Request) -> Option<Value> {
    let mut out = String::new();
    GzDecoder::new(&request.body[..])
        .read_to_string(&mut out)
        .ok()?;
    serde_json::from_str(&out).ok()
}

/// Matches requests whose decoded JSON array has `len` entries.
struct EntryCount(usize);

impl wiremock::Match for EntryCount {
    fn matches(&self, request: &Request) -> bool {
        decoded_body(request)
            .and_then(|v| v.as_array().map(Vec::len))
            .is_some_and(|n| n == self.0)
    }
}

/// Matches Get-Pseudonym requests carrying an AKA token.
struct CarriesToken;

impl wiremock::Match for CarriesToken {
    fn matches(&self, request: &Request) -> bool {
        decoded_body(request).is_some_and(|v| v[0].get("aka-token").is_some())
    }
}

fn worker(server: &MockServer) -> EntitlementWorker {
    let factory = RequestFactory::new(SubscriberInfo {
        imsi: Imsi::new(IMSI).expect("imsi"),
        sim_operator: Some("310260".into()),
        imei: Some("35209900176148".into()),
        software_version: Some("01".into()),
        device_model: "integration".into(),
    });
    let transport = ForwardingTransport {
        inner: HttpsTransport::new(TransportConfig::default()).expect("transport"),
        target: Url::parse(&format!("{}/ses", server.uri())).expect("url"),
    };
    let engine = EntitlementEngine::new(
        factory,
        "https://ses.carrier.example/ses",
        Arc::new(transport),
        Arc::new(FixedAka),
    )
    .expect("engine");
    EntitlementWorker::spawn(engine, Handle::current()).expect("worker")
}

async fn mount_challenge(server: &MockServer, expected: u64) {
    Mock::given(EntryCount(1))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"message-id": 1, "response-code": 1003, "aka-challenge": "Y2hhbGxlbmdl"}
        ])))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_authentication_then_token_reuse() {
    let server = MockServer::start().await;
    mount_challenge(&server, 1).await;
    Mock::given(EntryCount(2))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"message-id": 1, "response-code": 1000, "aka-token": "tok-1"},
            {"message-id": 2, "response-code": 1000,
             "imsi-pseudonym": "pseudo-abcdef", "refresh-interval": 24}
        ])))
        .expect(2)
        .mount(&server)
        .await;

    let worker = worker(&server);
    let record = worker
        .submit(CarrierId(1))
        .expect("submit")
        .await
        .expect("fetch")
        .expect("record");
    assert_eq!(record.pseudonym(), "pseudo-abcdef");
    assert_eq!(record.ttl_millis(), 24 * HOUR_IN_MILLIS);
    assert_eq!(record.owner().as_str(), IMSI);

    worker
        .submit(CarrierId(1))
        .expect("submit")
        .await
        .expect("fetch")
        .expect("record");

    let received = server.received_requests().await.expect("recording enabled");
    let bodies: Vec<Value> = received.iter().filter_map(decoded_body).collect();
    assert_eq!(bodies.len(), 3);
    assert_eq!(bodies[1][0]["aka-challenge-rsp"], json!("cmVzcG9uc2U="));
    assert_eq!(bodies[2][0]["aka-token"], json!("tok-1"));

    tokio::task::spawn_blocking(move || worker.shutdown())
        .await
        .expect("join")
        .expect("shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_token_triggers_one_full_authentication() {
    let server = MockServer::start().await;
    mount_challenge(&server, 2).await;
    // Token requests are always answered with a new challenge.
    Mock::given(EntryCount(2))
        .and(CarriesToken)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"message-id": 1, "response-code": 1003}
        ])))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(EntryCount(2))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"message-id": 1, "response-code": 1000, "aka-token": "tok-1"},
            {"message-id": 2, "response-code": 1000, "imsi-pseudonym": "pseudo-abcdef"}
        ])))
        .with_priority(2)
        .expect(2)
        .mount(&server)
        .await;

    let worker = worker(&server);
    worker
        .submit(CarrierId(1))
        .expect("submit")
        .await
        .expect("first fetch");
    let record = worker
        .submit(CarrierId(1))
        .expect("submit")
        .await
        .expect("second fetch")
        .expect("record");
    assert_eq!(record.pseudonym(), "pseudo-abcdef");

    tokio::task::spawn_blocking(move || worker.shutdown())
        .await
        .expect("join")
        .expect("shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_unavailable_is_connection_failure() {
    let server = MockServer::start().await;
    Mock::given(EntryCount(1))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let worker = worker(&server);
    let err = worker
        .submit(CarrierId(1))
        .expect("submit")
        .await
        .unwrap_err();
    match err {
        WorkerError::Entitlement(e) => assert_eq!(e.reason(), FailureReason::HttpsConnectionFailure),
        other => panic!("expected entitlement error, got {other:?}"),
    }

    tokio::task::spawn_blocking(move || worker.shutdown())
        .await
        .expect("join")
        .expect("shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn three_gpp_auth_ongoing_is_transient() {
    let server = MockServer::start().await;
    mount_challenge(&server, 1).await;
    Mock::given(EntryCount(2))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"message-id": 1, "response-code": 1000},
            {"message-id": 2, "response-code": 1112}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let worker = worker(&server);
    let err = worker
        .submit(CarrierId(1))
        .expect("submit")
        .await
        .unwrap_err();
    match err {
        WorkerError::Entitlement(e) => assert_eq!(e.reason(), FailureReason::TransientFailure),
        other => panic!("expected entitlement error, got {other:?}"),
    }

    tokio::task::spawn_blocking(move || worker.shutdown())
        .await
        .expect("join")
        .expect("shutdown");
}
