use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtpPurpose {
    Login,
    Registration,
    EmailVerification,
    Payment,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Registration => "REGISTRATION",
            Self::EmailVerification => "EMAIL_VERIFICATION",
            Self::Payment => "PAYMENT",
            Self::PasswordReset => "PASSWORD_RESET",
        }
    }

    /// Human title used in the message heading.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Login => "Login Verification Code",
            Self::Registration => "Registration Verification Code",
            Self::EmailVerification => "Email Verification Code",
            Self::Payment => "Payment Authorization Code",
            Self::PasswordReset => "Password Reset Code",
        }
    }

    fn lead(&self) -> &'static str {
        match self {
            Self::Login => "Your login verification code is",
            Self::Registration => "Your registration verification code is",
            Self::EmailVerification => "Your email verification code is",
            Self::Payment => "Your payment authorization code is",
            Self::PasswordReset => "Your password reset code is",
        }
    }

    /// Message body carrying the code.
    pub fn message(&self, code: &str, expiry_minutes: i64) -> String {
        format!(
            "{}: {}. This code will expire in {} minutes.",
            self.lead(),
            code,
            expiry_minutes
        )
    }
}

impl std::fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

/// Channel-specific delivery payload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OtpChannel {
    Email {
        subject: String,
        body: String,
    },
    Push {
        device_token: String,
        device_type: String,
        title: String,
        body: String,
    },
}

impl OtpChannel {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Email { .. } => "email",
            Self::Push { .. } => "push",
        }
    }

    pub fn heading(&self) -> &str {
        match self {
            Self::Email { subject, .. } => subject,
            Self::Push { title, .. } => title,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Email { body, .. } | Self::Push { body, .. } => body,
        }
    }
}

/// Where and how a newly issued code should be delivered.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeliveryTarget {
    /// `address` falls back to the subject's directory email when absent.
    Email {
        #[serde(default)]
        address: Option<String>,
    },
    Push {
        device_token: String,
        device_type: String,
    },
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OneTimePasscode {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub code: String,
    /// Email address or push device token.
    pub destination: String,
    pub purpose: OtpPurpose,
    pub channel: OtpChannel,
    pub used: bool,
    pub attempts: u32,
    pub max_attempts: u32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub delivery_status: DeliveryStatus,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OneTimePasscode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.attempts < self.max_attempts && !self.is_expired(now)
    }
}

impl std::fmt::Debug for OneTimePasscode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneTimePasscode")
            .field("id", &self.id)
            .field("subject_id", &self.subject_id)
            .field("code", &"[REDACTED]")
            .field("purpose", &self.purpose)
            .field("channel", &self.channel.kind())
            .field("used", &self.used)
            .field("attempts", &self.attempts)
            .field("max_attempts", &self.max_attempts)
            .field("expires_at", &self.expires_at)
            .field("delivery_status", &self.delivery_status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn debug_output_hides_the_code() {
        let now = Utc::now();
        let otp = OneTimePasscode {
            id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
            code: "493021".to_string(),
            destination: "user@example.com".to_string(),
            purpose: OtpPurpose::Payment,
            channel: OtpChannel::Email {
                subject: OtpPurpose::Payment.title().to_string(),
                body: OtpPurpose::Payment.message("493021", 10),
            },
            used: false,
            attempts: 0,
            max_attempts: 3,
            expires_at: now + Duration::minutes(10),
            created_at: now,
            used_at: None,
            delivery_status: DeliveryStatus::Pending,
            delivered_at: None,
        };

        let rendered = format!("{:?}", otp);
        assert!(!rendered.contains("493021"));
        assert!(otp.is_valid(now));
        assert!(!otp.is_valid(now + Duration::minutes(10)));
    }

    #[test]
    fn channel_is_tagged_by_type() {
        let channel: OtpChannel = serde_json::from_str(
            r#"{"type":"push","device_token":"tok","device_type":"ios","title":"t","body":"b"}"#,
        )
        .unwrap();
        assert_eq!(channel.kind(), "push");
        assert_eq!(channel.heading(), "t");
    }
}
