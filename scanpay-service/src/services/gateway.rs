//! Payment gateway contract and the sandbox implementation.

use crate::models::Transaction;
use crate::services::codegen::generate_gateway_reference;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The gateway could not be reached or answered with garbage. A decline is
/// not an error; it is an [`Authorization`] with `approved == false`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Unexpected response: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    pub approved: bool,
    pub gateway_reference: Option<String>,
    pub message: Option<String>,
}

impl Authorization {
    pub fn approved(gateway_reference: String) -> Self {
        Self {
            approved: true,
            gateway_reference: Some(gateway_reference),
            message: None,
        }
    }

    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            approved: false,
            gateway_reference: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub approved: bool,
    pub message: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorize(
        &self,
        transaction: &Transaction,
        payment_method: &str,
    ) -> Result<Authorization, GatewayError>;

    async fn refund(
        &self,
        transaction: &Transaction,
        amount: Decimal,
    ) -> Result<RefundOutcome, GatewayError>;
}

/// Approves everything. Used by local runs.
#[derive(Debug, Default, Clone)]
pub struct SandboxGateway;

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn authorize(
        &self,
        transaction: &Transaction,
        payment_method: &str,
    ) -> Result<Authorization, GatewayError> {
        let reference = generate_gateway_reference(Utc::now());
        tracing::info!(
            reference = %transaction.reference,
            gateway_reference = %reference,
            payment_method,
            "Sandbox gateway approved authorization"
        );
        Ok(Authorization::approved(reference))
    }

    async fn refund(
        &self,
        transaction: &Transaction,
        amount: Decimal,
    ) -> Result<RefundOutcome, GatewayError> {
        tracing::info!(reference = %transaction.reference, %amount, "Sandbox gateway approved refund");
        Ok(RefundOutcome {
            approved: true,
            message: None,
        })
    }
}
