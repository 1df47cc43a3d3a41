#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use scanpay_service::clock::ManualClock;
use scanpay_service::config::Config;
use scanpay_service::models::{Merchant, Transaction, User};
use scanpay_service::services::{
    Authorization, Delivery, GatewayError, InMemoryDirectory, Notification, Notifier,
    PaymentGateway, RefundOutcome,
};
use scanpay_service::{AppState, Application, Collaborators};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub fn dec(s: &str) -> Decimal {
    s.parse().expect("valid decimal literal")
}

/// How the stub gateway answers.
#[derive(Debug, Clone, Copy)]
pub enum GatewayMode {
    Approve,
    Decline,
    /// Never answers; the caller's timeout fires.
    Hang,
    /// Transport failure.
    Fail,
    /// Approves after a delay, to widen race windows.
    SlowApprove(Duration),
}

pub struct StubGateway {
    mode: Mutex<GatewayMode>,
    refund_mode: Mutex<GatewayMode>,
    pub authorize_calls: AtomicUsize,
    pub refund_calls: AtomicUsize,
}

impl StubGateway {
    pub fn new(mode: GatewayMode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            refund_mode: Mutex::new(GatewayMode::Approve),
            authorize_calls: AtomicUsize::new(0),
            refund_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_mode(&self, mode: GatewayMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_refund_mode(&self, mode: GatewayMode) {
        *self.refund_mode.lock().unwrap() = mode;
    }

    pub fn authorizations(&self) -> usize {
        self.authorize_calls.load(Ordering::SeqCst)
    }

    pub fn refunds(&self) -> usize {
        self.refund_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn authorize(
        &self,
        transaction: &Transaction,
        _payment_method: &str,
    ) -> Result<Authorization, GatewayError> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        match mode {
            GatewayMode::Approve => Ok(Authorization::approved(format!("PG_{}", transaction.reference))),
            GatewayMode::Decline => Ok(Authorization::declined("card declined")),
            GatewayMode::Hang => std::future::pending().await,
            GatewayMode::Fail => Err(GatewayError::Connection("connection refused".into())),
            GatewayMode::SlowApprove(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Authorization::approved(format!("PG_{}", transaction.reference)))
            }
        }
    }

    async fn refund(
        &self,
        _transaction: &Transaction,
        _amount: Decimal,
    ) -> Result<RefundOutcome, GatewayError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.refund_mode.lock().unwrap();
        match mode {
            GatewayMode::Hang => std::future::pending().await,
            GatewayMode::Fail => Err(GatewayError::Connection("connection refused".into())),
            GatewayMode::Decline => Ok(RefundOutcome {
                approved: false,
                message: Some("refund window closed".into()),
            }),
            _ => Ok(RefundOutcome {
                approved: true,
                message: None,
            }),
        }
    }
}

/// Records every notification; delivery outcome is switchable.
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    deliver: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            deliver: Mutex::new(true),
        })
    }

    pub fn fail_deliveries(&self) {
        *self.deliver.lock().unwrap() = false;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|n| n.subject).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, notification: &Notification) -> Delivery {
        self.sent.lock().unwrap().push(notification.clone());
        Delivery {
            delivered: *self.deliver.lock().unwrap(),
        }
    }
}

/// Engine wired with deterministic collaborators and one merchant and one
/// customer registered.
pub struct TestEngine {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<StubGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub directory: Arc<InMemoryDirectory>,
    pub merchant: Merchant,
    pub customer: User,
}

impl TestEngine {
    pub fn new(mode: GatewayMode) -> Self {
        Self::with_config(mode, test_config())
    }

    pub fn with_config(mode: GatewayMode, config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap(),
        ));
        let gateway = StubGateway::new(mode);
        let notifier = RecordingNotifier::new();
        let directory = Arc::new(InMemoryDirectory::new());

        let merchant = Merchant {
            id: Uuid::new_v4(),
            business_name: "Corner Cafe".to_string(),
            email: "cafe@example.com".to_string(),
        };
        let customer = User {
            id: Uuid::new_v4(),
            email: "payer@example.com".to_string(),
            full_name: "Pat Payer".to_string(),
            email_verified: true,
        };
        directory.register_merchant(merchant.clone());
        directory.register_user(customer.clone());

        let state = AppState::new(
            config,
            Collaborators {
                directory: directory.clone(),
                gateway: gateway.clone(),
                notifier: notifier.clone(),
                clock: clock.clone(),
            },
        );

        Self {
            state,
            clock,
            gateway,
            notifier,
            directory,
            merchant,
            customer,
        }
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.payment.gateway_timeout_seconds = 1;
    config
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub engine: TestEngine,
    shutdown: CancellationToken,
}

impl TestApp {
    pub async fn spawn(mode: GatewayMode) -> Self {
        Self::spawn_with(mode, test_config()).await
    }

    pub async fn spawn_with(mode: GatewayMode, config: Config) -> Self {
        let mut engine = TestEngine::with_config(mode, config.clone());

        let app = Application::build_with(
            config,
            Collaborators {
                directory: engine.directory.clone(),
                gateway: engine.gateway.clone(),
                notifier: engine.notifier.clone(),
                clock: engine.clock.clone(),
            },
        )
        .await
        .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);
        let shutdown = app.shutdown_token();
        engine.state = app.state();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client
                .get(format!("{}/health", address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        Self {
            address,
            port,
            engine,
            shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
