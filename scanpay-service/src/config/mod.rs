use crate::models::{Merchant, User};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde::Deserialize;
use service_core::error::AppError;

pub const SERVICE_NAME: &str = "scanpay-service";
const ENV_PREFIX: &str = "SCANPAY";

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub otp: OtpConfig,
    pub qr: QrConfig,
    pub payment: PaymentConfig,
    pub rate_limit: RateLimitConfig,
    pub sweep: SweepConfig,
    pub notifier: NotifierConfig,
    pub directory: DirectorySeed,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            otp: OtpConfig::default(),
            qr: QrConfig::default(),
            payment: PaymentConfig::default(),
            rate_limit: RateLimitConfig::default(),
            sweep: SweepConfig::default(),
            notifier: NotifierConfig::default(),
            directory: DirectorySeed::default(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3010,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct OtpConfig {
    pub expiry_minutes: i64,
    pub code_length: usize,
    pub max_attempts: u32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            expiry_minutes: 10,
            code_length: 6,
            max_attempts: 3,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct QrConfig {
    pub expiry_minutes: i64,
    pub base_url: String,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            expiry_minutes: 30,
            base_url: "https://scanpay.com".to_string(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PaymentConfig {
    pub timeout_minutes: i64,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub default_currency: String,
    pub allowed_currencies: Vec<String>,
    pub gateway_timeout_seconds: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: 15,
            min_amount: Decimal::new(1, 2),
            max_amount: Decimal::new(1_000_000, 2),
            default_currency: "USD".to_string(),
            allowed_currencies: ["USD", "EUR", "GBP", "INR"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            gateway_timeout_seconds: 10,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 100,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SweepConfig {
    pub interval_seconds: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
        }
    }
}

/// Without an endpoint, notifications are only logged.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct NotifierConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<Secret<String>>,
}

/// Accounts registered in the in-memory directory at start-up.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct DirectorySeed {
    pub merchants: Vec<Merchant>,
    pub users: Vec<User>,
}

impl Config {
    /// Load from `configuration.*` and `SCANPAY__*` environment variables,
    /// then validate.
    pub fn load() -> Result<Self, AppError> {
        let config: Config =
            service_core::config::load(ENV_PREFIX, &["payment.allowed_currencies"])?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let fail = |msg: String| Err(AppError::ConfigError(anyhow::anyhow!(msg)));

        if self.otp.expiry_minutes <= 0 {
            return fail("otp.expiry_minutes must be positive".into());
        }
        if !(4..=10).contains(&self.otp.code_length) {
            return fail(format!(
                "otp.code_length must be between 4 and 10, got {}",
                self.otp.code_length
            ));
        }
        if self.otp.max_attempts == 0 {
            return fail("otp.max_attempts must be positive".into());
        }
        if self.qr.expiry_minutes <= 0 {
            return fail("qr.expiry_minutes must be positive".into());
        }
        if self.qr.base_url.trim().is_empty() {
            return fail("qr.base_url must not be empty".into());
        }
        if self.payment.timeout_minutes <= 0 {
            return fail("payment.timeout_minutes must be positive".into());
        }
        if self.payment.gateway_timeout_seconds == 0 {
            return fail("payment.gateway_timeout_seconds must be positive".into());
        }
        if self.payment.min_amount <= Decimal::ZERO {
            return fail("payment.min_amount must be positive".into());
        }
        if self.payment.min_amount > self.payment.max_amount {
            return fail(format!(
                "payment.min_amount {} exceeds payment.max_amount {}",
                self.payment.min_amount, self.payment.max_amount
            ));
        }
        if self.payment.allowed_currencies.is_empty() {
            return fail("payment.allowed_currencies must not be empty".into());
        }
        if !self
            .payment
            .allowed_currencies
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&self.payment.default_currency))
        {
            return fail(format!(
                "payment.default_currency {} is not in payment.allowed_currencies",
                self.payment.default_currency
            ));
        }
        if self.rate_limit.requests_per_minute == 0 {
            return fail("rate_limit.requests_per_minute must be positive".into());
        }
        if self.sweep.interval_seconds == 0 {
            return fail("sweep.interval_seconds must be positive".into());
        }
        Ok(())
    }
}
