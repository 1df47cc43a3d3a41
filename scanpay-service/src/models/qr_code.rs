use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A redeemable payment request encoded as a QR payload.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DynamicQrCode {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub transaction_id: Option<Uuid>,
    /// Opaque payload; unique across all issued codes.
    pub qr_data: String,
    /// `None` means the customer enters the amount.
    pub amount: Option<Decimal>,
    pub purpose: String,
    pub description: String,
    pub active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub scanned_at: Option<DateTime<Utc>>,
    pub scanned_by: Option<Uuid>,
}

impl DynamicQrCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.is_expired(now) && self.scanned_at.is_none()
    }
}
