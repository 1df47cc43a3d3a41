//! Domain models for scanpay-service.

mod account;
mod ledger;
mod otp;
mod qr_code;
mod transaction;

pub use account::{Merchant, User};
pub use ledger::{Direction, LedgerEntry};
pub use otp::{DeliveryStatus, DeliveryTarget, OneTimePasscode, OtpChannel, OtpPurpose};
pub use qr_code::DynamicQrCode;
pub use transaction::{Transaction, TransactionStatus};
