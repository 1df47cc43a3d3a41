//! One-time passcode issuance and verification.
//!
//! Codes are grouped per `(subject, purpose)`. Issuing supersedes every
//! earlier unused code of the pair, so at most one valid code exists per
//! pair. Verification answers only yes or no: a missing, expired, exhausted
//! or wrong code all produce `false`.

use crate::clock::Clock;
use crate::config::OtpConfig;
use crate::error::PaymentError;
use crate::models::{DeliveryStatus, DeliveryTarget, OneTimePasscode, OtpChannel, OtpPurpose};
use crate::services::codegen::generate_passcode;
use crate::services::directory::Directory;
use crate::services::metrics;
use crate::services::notifier::{Notification, NotificationChannel, Notifier};
use crate::services::repository::OtpRepository;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OtpSettings {
    pub expiry: Duration,
    pub code_length: usize,
    pub max_attempts: u32,
}

impl From<&OtpConfig> for OtpSettings {
    fn from(config: &OtpConfig) -> Self {
        Self {
            expiry: Duration::minutes(config.expiry_minutes),
            code_length: config.code_length,
            max_attempts: config.max_attempts,
        }
    }
}

pub struct OtpManager {
    repo: OtpRepository,
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: OtpSettings,
}

impl OtpManager {
    pub fn new(
        settings: OtpSettings,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo: OtpRepository::new(),
            directory,
            notifier,
            clock,
            settings,
        }
    }

    /// Email address on record for a user or merchant subject.
    async fn subject_email(&self, subject_id: Uuid) -> Option<String> {
        if let Some(user) = self.directory.find_user(subject_id).await {
            return Some(user.email);
        }
        self.directory
            .find_merchant(subject_id)
            .await
            .map(|merchant| merchant.email)
    }

    /// Issue a fresh code for `(subject, purpose)` and hand it to the
    /// notifier. The code is usable whether or not delivery succeeds.
    #[tracing::instrument(skip(self, target), fields(channel = tracing::field::Empty))]
    pub async fn issue(
        &self,
        subject_id: Uuid,
        purpose: OtpPurpose,
        target: DeliveryTarget,
    ) -> Result<OneTimePasscode, PaymentError> {
        let email = self
            .subject_email(subject_id)
            .await
            .ok_or_else(|| PaymentError::not_found("Subject"))?;

        let code = generate_passcode(self.settings.code_length);
        let title = purpose.title().to_string();
        let body = purpose.message(&code, self.settings.expiry.num_minutes());

        let (destination, channel) = match target {
            DeliveryTarget::Email { address } => (
                address.filter(|a| !a.trim().is_empty()).unwrap_or(email),
                OtpChannel::Email {
                    subject: title,
                    body,
                },
            ),
            DeliveryTarget::Push {
                device_token,
                device_type,
            } => (
                device_token.clone(),
                OtpChannel::Push {
                    device_token,
                    device_type,
                    title,
                    body,
                },
            ),
        };
        tracing::Span::current().record("channel", channel.kind());

        let now = self.clock.now();
        let otp = OneTimePasscode {
            id: Uuid::new_v4(),
            subject_id,
            code,
            destination,
            purpose,
            channel,
            used: false,
            attempts: 0,
            max_attempts: self.settings.max_attempts,
            expires_at: now + self.settings.expiry,
            created_at: now,
            used_at: None,
            delivery_status: DeliveryStatus::Pending,
            delivered_at: None,
        };

        let superseded = self.repo.with_pair(subject_id, purpose, |codes| {
            let mut superseded = 0;
            for old in codes.iter_mut().filter(|c| !c.used) {
                old.used = true;
                superseded += 1;
            }
            codes.push(otp.clone());
            superseded
        });

        metrics::record_otp_issued(purpose.as_str(), otp.channel.kind());
        tracing::info!(otp_id = %otp.id, superseded, "OTP issued");

        Ok(self.dispatch(otp).await)
    }

    /// Send the stored content and record the delivery outcome.
    async fn dispatch(&self, otp: OneTimePasscode) -> OneTimePasscode {
        let notification = Notification {
            destination: otp.destination.clone(),
            channel: match &otp.channel {
                OtpChannel::Email { .. } => NotificationChannel::Email,
                OtpChannel::Push { device_type, .. } => NotificationChannel::Push {
                    device_type: device_type.clone(),
                },
            },
            subject: otp.channel.heading().to_string(),
            body: otp.channel.body().to_string(),
        };

        let delivery = self.notifier.deliver(&notification).await;
        let delivered_at = self.clock.now();

        let updated = self.repo.with_code(&otp.id, |stored| {
            if delivery.delivered {
                stored.delivery_status = DeliveryStatus::Sent;
                stored.delivered_at = Some(delivered_at);
            } else {
                stored.delivery_status = DeliveryStatus::Failed;
            }
            stored.clone()
        });

        if !delivery.delivered {
            tracing::warn!(otp_id = %otp.id, "OTP delivery failed");
        }
        // A concurrent sweep may have purged the record meanwhile.
        updated.unwrap_or(otp)
    }

    /// Check `code` against the newest unused code of the pair.
    #[tracing::instrument(skip(self, code))]
    pub fn verify(&self, subject_id: Uuid, code: &str, purpose: OtpPurpose) -> bool {
        let now = self.clock.now();

        let verified = self.repo.with_pair(subject_id, purpose, |codes| {
            let Some(current) = codes.iter_mut().rev().find(|c| !c.used) else {
                return false;
            };
            if !current.is_valid(now) {
                return false;
            }
            if bool::from(current.code.as_bytes().ct_eq(code.as_bytes())) {
                current.used = true;
                current.used_at = Some(now);
                true
            } else {
                current.attempts += 1;
                false
            }
        });

        metrics::record_otp_verification(verified);
        if verified {
            tracing::info!("OTP verified");
        } else {
            tracing::warn!("OTP verification failed");
        }
        verified
    }

    /// Re-send a still-valid code without touching its value, attempts or
    /// expiry.
    #[tracing::instrument(skip(self))]
    pub async fn resend(&self, otp_id: Uuid) -> Result<OneTimePasscode, PaymentError> {
        let otp = self
            .repo
            .get(&otp_id)
            .ok_or_else(|| PaymentError::not_found("OTP"))?;

        if !otp.is_valid(self.clock.now()) {
            return Err(PaymentError::VerificationFailed);
        }

        Ok(self.dispatch(otp).await)
    }

    /// Delete unused codes that expired before `now`.
    #[tracing::instrument(skip(self))]
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let purged = self.repo.purge_expired_unused(now);
        if purged > 0 {
            tracing::info!(purged, "Expired OTPs purged");
        }
        metrics::record_sweep("otp", purged);
        purged
    }

    pub fn find(&self, otp_id: Uuid) -> Option<OneTimePasscode> {
        self.repo.get(&otp_id)
    }

    pub fn stored_codes(&self) -> usize {
        self.repo.len()
    }
}
