//! Application wiring and server lifecycle.

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, SERVICE_NAME};
use crate::handlers;
use crate::services::{
    init_metrics, Directory, HttpNotifier, InMemoryDirectory, LoggingNotifier, Notifier,
    OtpManager, OtpSettings, PaymentGateway, QrCodeManager, QrSettings, SandboxGateway, Sweeper,
    TransactionDeps, TransactionManager, TransactionSettings, WalletLedger,
};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, request_id_middleware, window_rate_limit_middleware,
    SharedRateLimiter, WindowRateLimiter, REQUEST_ID_HEADER,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub otp: Arc<OtpManager>,
    pub qr_codes: Arc<QrCodeManager>,
    pub transactions: Arc<TransactionManager>,
    pub wallet: Arc<WalletLedger>,
    pub rate_limiter: SharedRateLimiter,
    pub sweeper: Sweeper,
    pub clock: Arc<dyn Clock>,
}

/// External collaborators. Tests swap these for deterministic stubs.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn Directory>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Seeded in-memory directory, sandbox gateway, and an HTTP notifier when
    /// an endpoint is configured.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let directory = InMemoryDirectory::new();
        for merchant in &config.directory.merchants {
            directory.register_merchant(merchant.clone());
        }
        for user in &config.directory.users {
            directory.register_user(user.clone());
        }

        let notifier: Arc<dyn Notifier> = match &config.notifier.endpoint {
            Some(endpoint) => {
                tracing::info!(%endpoint, "Using HTTP notifier");
                Arc::new(HttpNotifier::new(endpoint.clone(), config.notifier.api_key.clone())?)
            }
            None => {
                tracing::warn!("Notifier endpoint not configured - notifications will only be logged");
                Arc::new(LoggingNotifier)
            }
        };

        Ok(Self {
            directory: Arc::new(directory),
            gateway: Arc::new(SandboxGateway),
            notifier,
            clock: Arc::new(SystemClock),
        })
    }
}

impl AppState {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let Collaborators {
            directory,
            gateway,
            notifier,
            clock,
        } = collaborators;

        let otp = Arc::new(OtpManager::new(
            OtpSettings::from(&config.otp),
            directory.clone(),
            notifier.clone(),
            clock.clone(),
        ));
        let qr_codes = Arc::new(QrCodeManager::new(
            QrSettings::from(&config),
            directory.clone(),
            clock.clone(),
        ));
        let wallet = Arc::new(WalletLedger::new(clock.clone()));
        let transactions = Arc::new(TransactionManager::new(
            TransactionSettings::from(&config.payment),
            TransactionDeps {
                directory,
                gateway,
                notifier,
                wallet: wallet.clone(),
                qr_codes: qr_codes.clone(),
                clock: clock.clone(),
            },
        ));
        let rate_limiter = WindowRateLimiter::per_minute(config.rate_limit.requests_per_minute);
        let sweeper = Sweeper::new(
            otp.clone(),
            qr_codes.clone(),
            transactions.clone(),
            rate_limiter.clone(),
            clock.clone(),
        );

        Self {
            config: Arc::new(config),
            otp,
            qr_codes,
            transactions,
            wallet,
            rate_limiter,
            sweeper,
            clock,
        }
    }
}

/// Build the HTTP router. Everything under `/api` sits behind the rate limiter.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/otp/send", post(handlers::otp::send_otp))
        .route("/otp/verify", post(handlers::otp::verify_otp))
        .route("/otp/cleanup", post(handlers::otp::cleanup_otps))
        .route("/otp/:id/resend", post(handlers::otp::resend_otp))
        .route("/qrcodes", post(handlers::qr::create_qr_code))
        .route("/qrcodes/validate", post(handlers::qr::validate_qr_code))
        .route("/qrcodes/scan", post(handlers::qr::scan_qr_code))
        .route("/qrcodes/cleanup", post(handlers::qr::cleanup_qr_codes))
        .route(
            "/qrcodes/merchant/:merchant_id",
            get(handlers::qr::list_merchant_qr_codes),
        )
        .route("/qrcodes/:id", get(handlers::qr::get_qr_code))
        .route("/qrcodes/:id/image", get(handlers::qr::get_qr_image))
        .route("/qrcodes/:id/deactivate", post(handlers::qr::deactivate_qr_code))
        .route(
            "/transactions",
            post(handlers::transactions::create_transaction),
        )
        .route(
            "/transactions/process-payment",
            post(handlers::transactions::process_payment),
        )
        .route(
            "/transactions/reference/:reference",
            get(handlers::transactions::get_transaction_by_reference),
        )
        .route(
            "/transactions/merchant/:merchant_id",
            get(handlers::transactions::list_merchant_transactions),
        )
        .route(
            "/transactions/:id",
            get(handlers::transactions::get_transaction),
        )
        .route(
            "/transactions/:id/refund",
            post(handlers::transactions::refund_transaction),
        )
        .route("/wallets/:merchant_id", get(handlers::wallets::get_wallet))
        .layer(from_fn_with_state(
            state.rate_limiter.clone(),
            window_rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .nest("/api", api)
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
}

impl Application {
    /// Build with the collaborators described by `config`.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let collaborators = Collaborators::from_config(&config)?;
        Self::build_with(config, collaborators).await
    }

    pub async fn build_with(config: Config, collaborators: Collaborators) -> Result<Self, AppError> {
        init_metrics();

        // Port 0 binds a random port for tests.
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        let state = AppState::new(config, collaborators);
        tracing::info!(service = SERVICE_NAME, port, "Listening");

        Ok(Self {
            port,
            listener,
            state,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Token that stops the server and the sweeper when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve until Ctrl-C or the shutdown token fires.
    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let interval = Duration::from_secs(self.state.config.sweep.interval_seconds);
        let sweeper = self
            .state
            .sweeper
            .clone()
            .spawn(interval, self.shutdown.child_token());

        let app = router(self.state);
        let token = self.shutdown.clone();
        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl-C"),
                _ = token.cancelled() => {}
            }
        })
        .await?;

        self.shutdown.cancel();
        if let Err(e) = sweeper.await {
            tracing::error!(error = %e, "Sweeper task panicked");
        }
        tracing::info!("Server stopped");
        Ok(())
    }
}
