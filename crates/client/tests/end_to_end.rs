//! End-to-end tests: a real server on an ephemeral port, the trainer loop
//! and the client, all in one process.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use rtrain_api::config::ServerConfig;
use rtrain_api::router::build_app_router;
use rtrain_api::state::AppState;
use rtrain_client::{ClientError, NoProgress, PollOptions, ProgressDisplay, RTrainSession, RetryPolicy};
use rtrain_core::compute::JobRegistry;
use rtrain_core::tensor::Tensor;
use rtrain_core::training::TrainingRequest;
use rtrain_worker::{Trainer, WorkerConfig};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct TestServer {
    addr: SocketAddr,
    cancel: CancellationToken,
}

impl TestServer {
    async fn start(password: Option<&str>) -> Self {
        let pool = rtrain_db::create_memory_pool().await.unwrap();
        rtrain_db::run_migrations(&pool).await.unwrap();

        let config = ServerConfig {
            password: password.map(str::to_string),
            ..ServerConfig::default()
        };
        let registry = Arc::new(JobRegistry::with_defaults());
        let cancel = CancellationToken::new();

        let trainer = Trainer::new(
            pool.clone(),
            Arc::clone(&registry),
            WorkerConfig {
                poll_interval: Duration::from_millis(10),
                progress_interval: Duration::from_millis(10),
                ..WorkerConfig::default()
            },
        );
        let trainer_cancel = cancel.clone();
        tokio::spawn(async move { trainer.run(trainer_cancel).await });

        let state = AppState {
            pool,
            config: Arc::new(config.clone()),
            registry,
        };
        let app = build_app_router(state, &config);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .unwrap();
        });

        Self { addr, cancel }
    }

    fn session(&self) -> RTrainSession {
        RTrainSession::new(&format!("http://{}", self.addr))
            .unwrap()
            .with_options(PollOptions {
                initial_delay: Duration::from_millis(10),
                poll_interval: Duration::from_millis(20),
                retry: RetryPolicy {
                    max_attempts: 3,
                    initial_backoff: Duration::from_millis(10),
                    max_backoff: Duration::from_millis(50),
                },
            })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Default)]
struct Recorder {
    steps: Vec<u32>,
}

impl ProgressDisplay for Recorder {
    fn advance(&mut self, per_mille: u32) {
        self.steps.push(per_mille);
    }
}

/// `y = 3x - 1` sampled at a handful of points.
fn line_request(architecture: &str) -> TrainingRequest {
    let xs: Vec<f64> = (0..8).map(|i| f64::from(i) / 4.0).collect();
    let ys: Vec<f64> = xs.iter().map(|x| 3.0 * x - 1.0).collect();
    TrainingRequest {
        architecture: architecture.into(),
        loss: "mean_squared_error".into(),
        optimizer: "sgd".into(),
        learning_rate: Some(0.1),
        weights: Vec::new(),
        x_train: Tensor::encode(vec![8, 1], &xs).unwrap(),
        y_train: Tensor::encode(vec![8, 1], &ys).unwrap(),
        epochs: 300,
        batch_size: 4,
    }
}

// ---------------------------------------------------------------------------
// Test: a training job runs from submission to trained model
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remote_training_round_trip() {
    let server = TestServer::start(Some("pw")).await;
    let session = server.session().with_password("pw");

    session.ping().await.unwrap();

    let mut display = Recorder::default();
    let model = tokio::time::timeout(
        Duration::from_secs(30),
        session.train(&line_request("linear"), &mut display, &CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(model.architecture, "linear");
    let kernel = model.weights[0].decode().unwrap();
    let bias = model.weights[1].decode().unwrap();
    assert!((kernel[0] - 3.0).abs() < 0.1, "kernel was {}", kernel[0]);
    assert!((bias[0] + 1.0).abs() < 0.1, "bias was {}", bias[0]);

    // Whatever was shown only ever moved forward and ended at completion.
    assert!(display.steps.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(display.steps.last(), Some(&1000));
}

// ---------------------------------------------------------------------------
// Test: an engine failure reaches the caller as a compute failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsupported_architecture_fails_remotely() {
    let server = TestServer::start(None).await;
    let session = server.session();

    let err = tokio::time::timeout(
        Duration::from_secs(30),
        session.train(&line_request("mlp"), &mut NoProgress, &CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap_err();

    assert_matches!(err, ClientError::ComputeFailed(ref msg) if msg.contains("mlp"));
}

// ---------------------------------------------------------------------------
// Test: authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_password_is_rejected() {
    let server = TestServer::start(Some("pw")).await;

    let err = server
        .session()
        .train(&line_request("linear"), &mut NoProgress, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_matches!(err, ClientError::SubmissionRejected { status: 401, .. });

    // The probe stays open.
    server.session().ping().await.unwrap();
}

#[tokio::test]
async fn url_embedded_password_is_used() {
    let server = TestServer::start(Some("pw")).await;
    let session = RTrainSession::new(&format!("http://anyone:pw@{}", server.addr)).unwrap();

    let status = session.status(&"0".repeat(32)).await.unwrap_err();
    // Authenticated, so the lookup itself fails.
    assert_matches!(status, ClientError::HttpStatus { status: 404, .. });
}
