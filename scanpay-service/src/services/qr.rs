//! Dynamic QR payment requests.
//!
//! A code is redeemable while it is active, unexpired and unscanned.
//! Scanning is single-use: the record stays active but can never be
//! redeemed again. Deactivation is one-way.

use crate::clock::Clock;
use crate::config::Config;
use crate::error::PaymentError;
use crate::models::DynamicQrCode;
use crate::services::codegen::random_suffix;
use crate::services::directory::Directory;
use crate::services::limits::AmountLimits;
use crate::services::metrics;
use crate::services::repository::QrCodeRepository;
use crate::utils::generate_qr_base64;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

const MAX_PAYLOAD_ATTEMPTS: usize = 5;
const NONCE_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct QrSettings {
    pub expiry: Duration,
    pub base_url: String,
    /// A fixed amount must be payable, so it obeys the transaction limits.
    pub amount_limits: AmountLimits,
}

impl From<&Config> for QrSettings {
    fn from(config: &Config) -> Self {
        Self {
            expiry: Duration::minutes(config.qr.expiry_minutes),
            base_url: config.qr.base_url.trim_end_matches('/').to_string(),
            amount_limits: AmountLimits::from(&config.payment),
        }
    }
}

pub struct QrCodeManager {
    repo: QrCodeRepository,
    directory: Arc<dyn Directory>,
    clock: Arc<dyn Clock>,
    settings: QrSettings,
}

impl QrCodeManager {
    pub fn new(settings: QrSettings, directory: Arc<dyn Directory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo: QrCodeRepository::new(),
            directory,
            clock,
            settings,
        }
    }

    /// Merchant-initiated payload. The nonce keeps payloads unique even when
    /// two codes are minted in the same millisecond.
    fn merchant_payload(
        &self,
        merchant_id: Uuid,
        amount: Option<Decimal>,
        purpose: &str,
        now: DateTime<Utc>,
    ) -> String {
        let mut payload = format!("{}/pay?merchant={}", self.settings.base_url, merchant_id);
        if let Some(amount) = amount {
            payload.push_str(&format!("&amount={}", amount));
        }
        payload.push_str(&format!(
            "&purpose={}&timestamp={}&nonce={}",
            urlencoding::encode(purpose),
            now.timestamp_millis(),
            random_suffix(NONCE_LEN)
        ));
        payload
    }

    /// Payload for a code bound to an existing transaction.
    pub fn transaction_payload(&self, reference: &str) -> String {
        format!(
            "{}/pay?txn={}",
            self.settings.base_url,
            urlencoding::encode(reference)
        )
    }

    #[tracing::instrument(skip(self, description))]
    pub async fn issue(
        &self,
        merchant_id: Uuid,
        amount: Option<Decimal>,
        purpose: &str,
        description: &str,
    ) -> Result<DynamicQrCode, PaymentError> {
        if self.directory.find_merchant(merchant_id).await.is_none() {
            return Err(PaymentError::not_found("Merchant"));
        }
        if let Some(amount) = amount {
            self.settings.amount_limits.check(amount)?;
        }
        let purpose = purpose.trim();
        if purpose.is_empty() {
            return Err(PaymentError::Validation("QR purpose must not be empty".into()));
        }

        let now = self.clock.now();
        for _ in 0..MAX_PAYLOAD_ATTEMPTS {
            let code = DynamicQrCode {
                id: Uuid::new_v4(),
                merchant_id,
                transaction_id: None,
                qr_data: self.merchant_payload(merchant_id, amount, purpose, now),
                amount,
                purpose: purpose.to_string(),
                description: description.to_string(),
                active: true,
                expires_at: now + self.settings.expiry,
                created_at: now,
                scanned_at: None,
                scanned_by: None,
            };

            if self.repo.insert(code.clone()) {
                metrics::record_qr_issued();
                tracing::info!(qr_id = %code.id, expires_at = %code.expires_at, "QR code issued");
                return Ok(code);
            }
            tracing::warn!("QR payload collision, regenerating");
        }

        Err(PaymentError::Internal(anyhow::anyhow!(
            "could not mint a unique QR payload after {} attempts",
            MAX_PAYLOAD_ATTEMPTS
        )))
    }

    /// Look a code up by payload and mark it scanned.
    #[tracing::instrument(skip(self, qr_data))]
    pub fn redeem(&self, qr_data: &str, scanned_by: Uuid) -> Result<DynamicQrCode, PaymentError> {
        let id = self
            .repo
            .id_for_data(qr_data)
            .ok_or_else(|| PaymentError::not_found("QR code"))?;
        self.mark_scanned(id, scanned_by)
    }

    #[tracing::instrument(skip(self))]
    pub fn mark_scanned(&self, id: Uuid, scanned_by: Uuid) -> Result<DynamicQrCode, PaymentError> {
        let now = self.clock.now();
        let scanned = self
            .repo
            .update(&id, |code| {
                if !code.active {
                    return Err(PaymentError::InvalidState("QR code is inactive".into()));
                }
                if code.scanned_at.is_some() {
                    return Err(PaymentError::InvalidState("QR code was already scanned".into()));
                }
                if code.is_expired(now) {
                    return Err(PaymentError::InvalidState("QR code has expired".into()));
                }
                code.scanned_at = Some(now);
                code.scanned_by = Some(scanned_by);
                Ok(code.clone())
            })
            .ok_or_else(|| PaymentError::not_found("QR code"))??;

        tracing::info!(qr_id = %id, "QR code scanned");
        Ok(scanned)
    }

    /// Undo a scan by `scanned_by` that never produced a transaction.
    /// Returns whether the scan was released.
    #[tracing::instrument(skip(self))]
    pub fn release_scan(&self, id: Uuid, scanned_by: Uuid) -> bool {
        let released = self
            .repo
            .update(&id, |code| {
                if code.scanned_by != Some(scanned_by) || code.transaction_id.is_some() {
                    return false;
                }
                code.scanned_at = None;
                code.scanned_by = None;
                true
            })
            .unwrap_or(false);
        if released {
            tracing::warn!(qr_id = %id, "QR scan released");
        }
        released
    }

    /// Redeemability pre-check with no side effects.
    pub fn validate(&self, qr_data: &str) -> bool {
        let now = self.clock.now();
        self.repo
            .find_by_data(qr_data)
            .map(|code| code.is_redeemable(now))
            .unwrap_or(false)
    }

    #[tracing::instrument(skip(self))]
    pub fn deactivate(&self, id: Uuid) -> Result<DynamicQrCode, PaymentError> {
        let code = self
            .repo
            .update(&id, |code| {
                code.active = false;
                code.clone()
            })
            .ok_or_else(|| PaymentError::not_found("QR code"))?;
        tracing::info!(qr_id = %id, "QR code deactivated");
        Ok(code)
    }

    /// Deactivate every active code whose expiry is before `now`.
    #[tracing::instrument(skip(self))]
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let swept = self
            .repo
            .update_where(|c| c.active && c.expires_at < now, |c| c.active = false)
            .len();
        if swept > 0 {
            tracing::info!(swept, "Expired QR codes deactivated");
        }
        metrics::record_sweep("qr", swept);
        swept
    }

    /// Attach the transaction created from a scan.
    #[tracing::instrument(skip(self))]
    pub fn bind_transaction(
        &self,
        id: Uuid,
        transaction_id: Uuid,
    ) -> Result<DynamicQrCode, PaymentError> {
        self.repo
            .update(&id, |code| match code.transaction_id {
                Some(existing) if existing != transaction_id => Err(PaymentError::InvalidState(
                    "QR code is already bound to another transaction".into(),
                )),
                _ => {
                    code.transaction_id = Some(transaction_id);
                    Ok(code.clone())
                }
            })
            .ok_or_else(|| PaymentError::not_found("QR code"))?
    }

    pub fn find(&self, id: Uuid) -> Option<DynamicQrCode> {
        self.repo.get(&id)
    }

    pub fn find_by_data(&self, qr_data: &str) -> Option<DynamicQrCode> {
        self.repo.find_by_data(qr_data)
    }

    pub fn active_for_merchant(&self, merchant_id: Uuid) -> Vec<DynamicQrCode> {
        self.repo.filter(|c| c.merchant_id == merchant_id && c.active)
    }

    /// Active codes already past expiry, waiting for the next sweep.
    pub fn expired_active(&self, now: DateTime<Utc>) -> Vec<DynamicQrCode> {
        self.repo.filter(|c| c.active && c.expires_at < now)
    }

    /// Base64 PNG rendering of a stored code's payload.
    pub fn render_png_base64(&self, id: Uuid) -> Result<String, PaymentError> {
        let code = self.find(id).ok_or_else(|| PaymentError::not_found("QR code"))?;
        Ok(generate_qr_base64(&code.qr_data)?)
    }
}
