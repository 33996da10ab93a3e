// End-to-end tests of the relay pipeline against a real HTTP endpoint
//
// The queue side is faked with in-memory deliveries that record how they were
// settled; the sink side is a local axum server answering with scripted
// statuses and recording every body it receives.

use anyhow::Result;
use async_trait::async_trait;
use axum::{Router, body::Bytes, extract::State, http::StatusCode, routing::post};
use reading_relay::{
    Delivery, DeliveryPipeline, HttpSink, Outcome, RejectReason, RetryPolicy, consume,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Ack,
    Nack { requeue: bool },
}

struct RecordedDelivery {
    payload: Vec<u8>,
    settlements: Mutex<Vec<Settlement>>,
}

impl RecordedDelivery {
    fn new(payload: &str) -> Arc<Self> {
        Arc::new(Self {
            payload: payload.as_bytes().to_vec(),
            settlements: Mutex::new(Vec::new()),
        })
    }

    fn settlements(&self) -> Vec<Settlement> {
        self.settlements.lock().unwrap().clone()
    }
}

#[async_trait]
impl Delivery for RecordedDelivery {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn ack(&self) -> Result<()> {
        self.settlements.lock().unwrap().push(Settlement::Ack);
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        self.settlements
            .lock()
            .unwrap()
            .push(Settlement::Nack { requeue });
        Ok(())
    }
}

#[derive(Clone, Default)]
struct IngestState {
    statuses: Arc<Mutex<VecDeque<u16>>>,
    bodies: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl IngestState {
    fn hits(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }
}

async fn ingest(State(state): State<IngestState>, body: Bytes) -> (StatusCode, &'static str) {
    let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    state.bodies.lock().unwrap().push(value);

    let status = state.statuses.lock().unwrap().pop_front().unwrap_or(201);
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, "ok")
}

/// Start an ingestion endpoint answering with `statuses`, then 201 once exhausted
async fn start_ingest_server(statuses: &[u16]) -> (String, IngestState) {
    let state = IngestState {
        statuses: Arc::new(Mutex::new(statuses.iter().copied().collect())),
        ..Default::default()
    };
    let app = Router::new()
        .route("/api/weather/logs", post(ingest))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/api/weather/logs"), state)
}

const BACKOFF_UNIT: Duration = Duration::from_millis(20);

fn pipeline(url: &str) -> DeliveryPipeline<HttpSink> {
    let sink = HttpSink::new(url, Duration::from_secs(5)).unwrap();
    DeliveryPipeline::new(sink, RetryPolicy::new(3, BACKOFF_UNIT))
}

const VALID_READING: &str = r#"{
    "timestamp": "2025-11-20T14:00:00.000000",
    "location": {"latitude": -23.5505, "longitude": -46.6333},
    "current": {
        "temperature": 24.3, "humidity": 71, "windSpeed": 9.4,
        "weatherCode": 3, "condition": "Overcast", "precipitation": 0.0
    },
    "forecast": {
        "time": ["2025-11-20T15:00", "2025-11-20T16:00"],
        "temperature": [23.9, 23.1],
        "humidity": [74, 78],
        "windSpeed": [8.1, 7.0],
        "weatherCode": [61, 63],
        "precipitationProbability": [55, 70]
    }
}"#;

#[tokio::test]
async fn empty_timestamp_is_discarded_without_http_call() {
    let (url, state) = start_ingest_server(&[]).await;
    let delivery = RecordedDelivery::new(r#"{"timestamp":"","current":{"temperature":20}}"#);

    let outcome = pipeline(&url).process(&delivery).await;

    assert!(matches!(outcome, Outcome::Rejected(RejectReason::Validation(_))));
    assert_eq!(
        delivery.settlements(),
        vec![Settlement::Nack { requeue: false }]
    );
    assert_eq!(state.hits(), 0);
}

#[tokio::test]
async fn unavailable_sink_recovers_on_third_attempt() {
    let (url, state) = start_ingest_server(&[503, 503, 200]).await;
    let delivery = RecordedDelivery::new(VALID_READING);
    let start = Instant::now();

    let outcome = pipeline(&url).process(&delivery).await;

    assert!(matches!(
        outcome,
        Outcome::Acked {
            attempts: 3,
            status: 200
        }
    ));
    assert_eq!(delivery.settlements(), vec![Settlement::Ack]);
    assert_eq!(state.hits(), 3);
    assert!(start.elapsed() >= BACKOFF_UNIT * 3);
}

#[tokio::test]
async fn persistent_server_errors_requeue() {
    let (url, state) = start_ingest_server(&[500, 500, 500]).await;
    let delivery = RecordedDelivery::new(VALID_READING);

    let outcome = pipeline(&url).process(&delivery).await;

    assert!(matches!(outcome, Outcome::Requeued { attempts: 3, .. }));
    assert_eq!(
        delivery.settlements(),
        vec![Settlement::Nack { requeue: true }]
    );
    assert_eq!(state.hits(), 3);
}

#[tokio::test]
async fn implausible_humidity_is_discarded() {
    let (url, state) = start_ingest_server(&[]).await;
    let delivery = RecordedDelivery::new(
        r#"{"timestamp":"2025-11-20T14:00:00","current":{"temperature":20,"humidity":150,"windSpeed":2}}"#,
    );

    pipeline(&url).process(&delivery).await;

    assert_eq!(
        delivery.settlements(),
        vec![Settlement::Nack { requeue: false }]
    );
    assert_eq!(state.hits(), 0);
}

#[tokio::test]
async fn sink_receives_reading_in_wire_format() {
    let (url, state) = start_ingest_server(&[]).await;
    let delivery = RecordedDelivery::new(VALID_READING);

    pipeline(&url).process(&delivery).await;

    let bodies = state.bodies.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["timestamp"], "2025-11-20T14:00:00.000000");
    assert_eq!(body["location"]["longitude"], -46.6333);
    assert_eq!(body["current"]["windSpeed"], 9.4);
    assert_eq!(body["current"]["condition"], "Overcast");
    assert_eq!(body["forecast"]["time"][1], "2025-11-20T16:00");
    assert_eq!(body["forecast"]["precipitationProbability"][0], 55);
    assert!(body.get("dailyForecast").is_none());
}

#[tokio::test]
async fn unreachable_sink_requeues_after_all_attempts() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let delivery = RecordedDelivery::new(VALID_READING);
    let outcome = pipeline(&format!("http://{addr}/api/weather/logs"))
        .process(&delivery)
        .await;

    match outcome {
        Outcome::Requeued {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(last_error.status(), None);
        }
        other => panic!("expected requeue, got {other:?}"),
    }
    assert_eq!(
        delivery.settlements(),
        vec![Settlement::Nack { requeue: true }]
    );
}

#[tokio::test]
async fn consumer_loop_settles_every_delivery_once() {
    // Second reading fails twice before the sink accepts it
    let (url, state) = start_ingest_server(&[201, 502, 502]).await;
    let deliveries = vec![
        RecordedDelivery::new(VALID_READING),
        RecordedDelivery::new(VALID_READING),
        RecordedDelivery::new("definitely not json"),
        RecordedDelivery::new(VALID_READING),
    ];

    let stream = futures_util::stream::iter(
        deliveries
            .iter()
            .cloned()
            .map(Ok::<_, std::io::Error>)
            .collect::<Vec<_>>(),
    );
    let processed = consume(stream, &pipeline(&url)).await;

    assert_eq!(processed, 4);
    assert_eq!(deliveries[0].settlements(), vec![Settlement::Ack]);
    assert_eq!(deliveries[1].settlements(), vec![Settlement::Ack]);
    assert_eq!(
        deliveries[2].settlements(),
        vec![Settlement::Nack { requeue: false }]
    );
    assert_eq!(deliveries[3].settlements(), vec![Settlement::Ack]);
    // 1 + 3 attempts for the valid readings before the garbage, 1 after
    assert_eq!(state.hits(), 5);
}
