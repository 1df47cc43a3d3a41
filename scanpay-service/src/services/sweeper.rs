//! Periodic housekeeping: OTP purge, QR expiry, PENDING transaction expiry
//! and rate limiter bucket eviction.

use crate::clock::Clock;
use crate::services::otp::OtpManager;
use crate::services::qr::QrCodeManager;
use crate::services::transactions::TransactionManager;
use serde::Serialize;
use service_core::middleware::SharedRateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub otps_purged: usize,
    pub qr_codes_deactivated: usize,
    pub transactions_expired: usize,
    pub rate_limit_buckets_evicted: usize,
}

#[derive(Clone)]
pub struct Sweeper {
    otp: Arc<OtpManager>,
    qr_codes: Arc<QrCodeManager>,
    transactions: Arc<TransactionManager>,
    rate_limiter: SharedRateLimiter,
    clock: Arc<dyn Clock>,
}

impl Sweeper {
    pub fn new(
        otp: Arc<OtpManager>,
        qr_codes: Arc<QrCodeManager>,
        transactions: Arc<TransactionManager>,
        rate_limiter: SharedRateLimiter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            otp,
            qr_codes,
            transactions,
            rate_limiter,
            clock,
        }
    }

    /// One full pass at the current clock time.
    pub fn run_once(&self) -> SweepReport {
        let now = self.clock.now();
        let horizon = now - self.transactions.settings().timeout;

        let report = SweepReport {
            otps_purged: self.otp.sweep(now),
            qr_codes_deactivated: self.qr_codes.sweep_expired(now),
            transactions_expired: self.transactions.sweep_expired(horizon),
            // The limiter keys its windows off wall time, not the injected clock.
            rate_limit_buckets_evicted: self.rate_limiter.sweep(chrono::Utc::now()),
        };

        tracing::debug!(?report, "Sweep finished");
        report
    }

    /// Run a pass every `interval` until `shutdown` is cancelled.
    pub fn spawn(self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(interval_secs = interval.as_secs(), "Sweeper started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.run_once();
                    }
                }
            }
        })
    }
}
