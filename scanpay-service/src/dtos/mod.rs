use crate::models::{
    DeliveryStatus, DeliveryTarget, DynamicQrCode, LedgerEntry, OneTimePasscode, OtpPurpose,
    Transaction, TransactionStatus,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// OTP

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub subject_id: Uuid,
    pub purpose: OtpPurpose,
    pub channel: DeliveryTarget,
}

/// Never carries the code itself.
#[derive(Debug, Serialize)]
pub struct OtpResponse {
    pub otp_id: Uuid,
    pub purpose: OtpPurpose,
    pub channel: &'static str,
    pub expires_at: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,
}

impl From<OneTimePasscode> for OtpResponse {
    fn from(otp: OneTimePasscode) -> Self {
        Self {
            otp_id: otp.id,
            purpose: otp.purpose,
            channel: otp.channel.kind(),
            expires_at: otp.expires_at,
            delivery_status: otp.delivery_status,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    pub subject_id: Uuid,
    #[validate(length(min = 4, max = 10, message = "Code must be 4 to 10 digits"))]
    pub code: String,
    pub purpose: OtpPurpose,
}

#[derive(Debug, Serialize)]
pub struct VerifyOtpResponse {
    pub verified: bool,
}

// QR codes

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQrCodeRequest {
    pub merchant_id: Uuid,
    pub amount: Option<Decimal>,
    #[validate(length(min = 1, max = 64, message = "Purpose must be 1 to 64 characters"))]
    #[serde(default = "default_purpose")]
    pub purpose: String,
    #[validate(length(max = 255, message = "Description must be at most 255 characters"))]
    #[serde(default)]
    pub description: String,
}

fn default_purpose() -> String {
    "PAYMENT".to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateQrCodeRequest {
    #[validate(length(min = 1, message = "QR data is required"))]
    pub qr_data: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateQrCodeResponse {
    pub valid: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ScanQrCodeRequest {
    #[validate(length(min = 1, message = "QR data is required"))]
    pub qr_data: String,
    pub scanned_by: Uuid,
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct QrCodeResponse {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub qr_data: String,
    pub amount: Option<Decimal>,
    pub purpose: String,
    pub description: String,
    pub active: bool,
    pub redeemable: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub scanned_at: Option<DateTime<Utc>>,
    pub scanned_by: Option<Uuid>,
}

impl QrCodeResponse {
    pub fn at(code: DynamicQrCode, now: DateTime<Utc>) -> Self {
        Self {
            redeemable: code.is_redeemable(now),
            id: code.id,
            merchant_id: code.merchant_id,
            transaction_id: code.transaction_id,
            qr_data: code.qr_data,
            amount: code.amount,
            purpose: code.purpose,
            description: code.description,
            active: code.active,
            expires_at: code.expires_at,
            created_at: code.created_at,
            scanned_at: code.scanned_at,
            scanned_by: code.scanned_by,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QrImageResponse {
    pub id: Uuid,
    pub qr_data: String,
    pub image_base64: String,
}

#[derive(Debug, Serialize)]
pub struct ScanQrCodeResponse {
    pub qr_code: QrCodeResponse,
    pub transaction: TransactionResponse,
}

// Transactions

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTransactionRequest {
    pub merchant_id: Uuid,
    pub amount: Decimal,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter ISO code"))]
    pub currency: Option<String>,
    #[validate(length(max = 255, message = "Description must be at most 255 characters"))]
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProcessPaymentRequest {
    #[validate(length(min = 1, message = "Reference is required"))]
    pub reference: String,
    pub customer_id: Uuid,
    #[validate(length(min = 1, max = 64, message = "Payment method is required"))]
    pub payment_method: String,
    #[validate(length(min = 4, max = 10, message = "Code must be 4 to 10 digits"))]
    pub otp_code: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct TransactionListQuery {
    pub status: Option<TransactionStatus>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub reference: String,
    pub merchant_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub status: TransactionStatus,
    pub qr_data: Option<String>,
    pub payment_method: Option<String>,
    pub gateway_reference: Option<String>,
    pub refunded_amount: Decimal,
    pub refunded: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Transaction> for TransactionResponse {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id,
            reference: t.reference,
            merchant_id: t.merchant_id,
            customer_id: t.customer_id,
            amount: t.amount,
            currency: t.currency,
            description: t.description,
            status: t.status,
            qr_data: t.qr_data,
            payment_method: t.payment_method,
            gateway_reference: t.gateway_reference,
            refunded_amount: t.refunded_amount,
            refunded: t.refunded,
            created_at: t.created_at,
            completed_at: t.completed_at,
        }
    }
}

// Wallets

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub merchant_id: Uuid,
    pub balance: Decimal,
    pub entries: Vec<LedgerEntry>,
}

// Housekeeping

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub removed: usize,
}
