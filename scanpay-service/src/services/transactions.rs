//! Transaction lifecycle: creation, settlement and refund.
//!
//! Legal transitions are `PENDING -> SUCCESS | FAILED | EXPIRED` and
//! `SUCCESS -> REFUNDED`. Every transition is a compare-and-set on the
//! stored status under the record lock, so each edge fires at most once.
//! Settlement and refund additionally claim the transaction for the whole
//! operation, which makes a concurrent duplicate fail fast instead of
//! reaching the gateway twice.

use crate::clock::Clock;
use crate::config::PaymentConfig;
use crate::error::PaymentError;
use crate::models::{Transaction, TransactionStatus};
use crate::services::codegen::generate_transaction_reference;
use crate::services::directory::Directory;
use crate::services::gateway::PaymentGateway;
use crate::services::limits::AmountLimits;
use crate::services::metrics;
use crate::services::notifier::{Notification, Notifier};
use crate::services::qr::QrCodeManager;
use crate::services::repository::TransactionRepository;
use crate::services::wallet::WalletLedger;
use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

const MAX_REFERENCE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct TransactionSettings {
    pub timeout: Duration,
    pub limits: AmountLimits,
    pub default_currency: String,
    pub allowed_currencies: Vec<String>,
    pub gateway_timeout: std::time::Duration,
}

impl From<&PaymentConfig> for TransactionSettings {
    fn from(config: &PaymentConfig) -> Self {
        Self {
            timeout: Duration::minutes(config.timeout_minutes),
            limits: AmountLimits::from(config),
            default_currency: config.default_currency.to_ascii_uppercase(),
            allowed_currencies: config
                .allowed_currencies
                .iter()
                .map(|c| c.to_ascii_uppercase())
                .collect(),
            gateway_timeout: std::time::Duration::from_secs(config.gateway_timeout_seconds),
        }
    }
}

/// Collaborators the transaction manager drives.
pub struct TransactionDeps {
    pub directory: Arc<dyn Directory>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub wallet: Arc<WalletLedger>,
    pub qr_codes: Arc<QrCodeManager>,
    pub clock: Arc<dyn Clock>,
}

/// Exclusive claim on one transaction, released on drop.
struct Claim<'a> {
    claims: &'a DashMap<Uuid, ()>,
    id: Uuid,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.claims.remove(&self.id);
    }
}

pub struct TransactionManager {
    repo: TransactionRepository,
    in_flight: DashMap<Uuid, ()>,
    deps: TransactionDeps,
    settings: TransactionSettings,
}

impl TransactionManager {
    pub fn new(settings: TransactionSettings, deps: TransactionDeps) -> Self {
        Self {
            repo: TransactionRepository::new(),
            in_flight: DashMap::new(),
            deps,
            settings,
        }
    }

    pub fn settings(&self) -> &TransactionSettings {
        &self.settings
    }

    fn claim(&self, id: Uuid) -> Result<Claim<'_>, PaymentError> {
        match self.in_flight.entry(id) {
            Entry::Occupied(_) => Err(PaymentError::InvalidState(
                "Transaction is already being processed".into(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(Claim {
                    claims: &self.in_flight,
                    id,
                })
            }
        }
    }

    /// Compare-and-set transition. `apply` runs only if the stored status is
    /// still `from`.
    fn transition(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
        apply: impl FnOnce(&mut Transaction),
    ) -> Result<Transaction, PaymentError> {
        debug_assert!(from.can_transition_to(to));
        let updated = self
            .repo
            .update(&id, |t| {
                if t.status != from {
                    return Err(PaymentError::InvalidState(format!(
                        "Transaction is {}, expected {}",
                        t.status, from
                    )));
                }
                t.status = to;
                apply(t);
                Ok(t.clone())
            })
            .ok_or_else(|| PaymentError::not_found("Transaction"))??;

        metrics::record_transaction(to.as_str());
        tracing::info!(transaction_id = %id, from = %from, to = %to, "Transaction transitioned");
        Ok(updated)
    }

    fn resolve_currency(&self, currency: Option<&str>) -> Result<String, PaymentError> {
        let currency = currency
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.settings.default_currency.clone());
        if !self.settings.allowed_currencies.contains(&currency) {
            return Err(PaymentError::Validation(format!(
                "Currency {} is not supported",
                currency
            )));
        }
        Ok(currency)
    }

    async fn ensure_merchant(&self, merchant_id: Uuid) -> Result<(), PaymentError> {
        match self.deps.directory.find_merchant(merchant_id).await {
            Some(_) => Ok(()),
            None => Err(PaymentError::not_found("Merchant")),
        }
    }

    /// Create a PENDING transaction with a fresh reference and its
    /// transaction-bound QR payload.
    #[tracing::instrument(skip(self, description))]
    pub async fn create(
        &self,
        merchant_id: Uuid,
        amount: Decimal,
        currency: Option<&str>,
        description: &str,
    ) -> Result<Transaction, PaymentError> {
        self.ensure_merchant(merchant_id).await?;
        self.settings.limits.check(amount)?;
        let currency = self.resolve_currency(currency)?;
        self.mint(merchant_id, amount, currency, description)
    }

    /// Persist a validated PENDING transaction under a unique reference.
    fn mint(
        &self,
        merchant_id: Uuid,
        amount: Decimal,
        currency: String,
        description: &str,
    ) -> Result<Transaction, PaymentError> {
        for _ in 0..MAX_REFERENCE_ATTEMPTS {
            let now = self.deps.clock.now();
            let reference = generate_transaction_reference(now);
            let transaction = Transaction::pending(
                merchant_id,
                amount,
                currency.clone(),
                description.to_string(),
                reference.clone(),
                Some(self.deps.qr_codes.transaction_payload(&reference)),
                now,
            );

            if self.repo.insert(transaction.clone()) {
                metrics::record_transaction(TransactionStatus::Pending.as_str());
                tracing::info!(
                    transaction_id = %transaction.id,
                    reference = %transaction.reference,
                    "Transaction created"
                );
                return Ok(transaction);
            }
            tracing::warn!(%reference, "Transaction reference collision, regenerating");
        }

        Err(PaymentError::Internal(anyhow::anyhow!(
            "could not mint a unique transaction reference after {} attempts",
            MAX_REFERENCE_ATTEMPTS
        )))
    }

    /// Redeem a scanned QR code and open a PENDING transaction for it.
    ///
    /// A code with a fixed amount ignores `entered_amount`; an open-amount
    /// code requires it. Merchant, amount and currency are checked before
    /// the code is consumed, and the scan is released if minting fails.
    #[tracing::instrument(skip(self, qr_data))]
    pub async fn create_from_scan(
        &self,
        qr_data: &str,
        scanned_by: Uuid,
        entered_amount: Option<Decimal>,
    ) -> Result<Transaction, PaymentError> {
        let qr = self
            .deps
            .qr_codes
            .find_by_data(qr_data)
            .ok_or_else(|| PaymentError::not_found("QR code"))?;

        let amount = qr.amount.or(entered_amount).ok_or_else(|| {
            PaymentError::Validation("An amount is required for this QR code".into())
        })?;
        self.settings.limits.check(amount)?;
        self.ensure_merchant(qr.merchant_id).await?;
        let currency = self.resolve_currency(None)?;

        let qr = self.deps.qr_codes.mark_scanned(qr.id, scanned_by)?;
        let transaction = match self.mint(qr.merchant_id, amount, currency, &qr.description) {
            Ok(transaction) => transaction,
            Err(e) => {
                self.deps.qr_codes.release_scan(qr.id, scanned_by);
                return Err(e);
            }
        };
        self.deps.qr_codes.bind_transaction(qr.id, transaction.id)?;
        Ok(transaction)
    }

    /// Authorize a PENDING transaction with the gateway and settle it.
    ///
    /// On approval the transaction becomes SUCCESS before the wallet is
    /// credited, so a repeated call finds it settled and is refused. A
    /// decline or a gateway timeout settles it as FAILED. A transport
    /// failure leaves it PENDING and is reported as `GatewayUnavailable`.
    #[tracing::instrument(skip(self, payment_method))]
    pub async fn authorize_and_settle(
        &self,
        reference: &str,
        customer_id: Uuid,
        payment_method: &str,
    ) -> Result<Transaction, PaymentError> {
        let id = self
            .repo
            .id_for_reference(reference)
            .ok_or_else(|| PaymentError::not_found("Transaction"))?;
        let _claim = self.claim(id)?;

        let transaction = self
            .repo
            .get(&id)
            .ok_or_else(|| PaymentError::not_found("Transaction"))?;
        if transaction.status != TransactionStatus::Pending {
            return Err(PaymentError::InvalidState(format!(
                "Transaction is {}, only PENDING transactions can be paid",
                transaction.status
            )));
        }

        let now = self.deps.clock.now();
        if transaction.created_at + self.settings.timeout < now {
            self.transition(id, TransactionStatus::Pending, TransactionStatus::Expired, |t| {
                t.completed_at = Some(now);
            })?;
            return Err(PaymentError::InvalidState("Transaction has expired".into()));
        }

        let customer = self
            .deps
            .directory
            .find_user(customer_id)
            .await
            .ok_or_else(|| PaymentError::not_found("Customer"))?;

        let outcome = tokio::time::timeout(
            self.settings.gateway_timeout,
            self.deps.gateway.authorize(&transaction, payment_method),
        )
        .await;

        let authorization = match outcome {
            Ok(Ok(authorization)) => Some(authorization),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Gateway authorization call failed");
                return Err(PaymentError::GatewayUnavailable(e.to_string()));
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.settings.gateway_timeout.as_secs(),
                    "Gateway authorization timed out"
                );
                None
            }
        };

        let completed_at = self.deps.clock.now();
        let method = payment_method.to_string();

        match authorization {
            Some(auth) if auth.approved => {
                let settled = self.transition(
                    id,
                    TransactionStatus::Pending,
                    TransactionStatus::Success,
                    |t| {
                        t.customer_id = Some(customer_id);
                        t.payment_method = Some(method);
                        t.gateway_reference = auth.gateway_reference;
                        t.completed_at = Some(completed_at);
                    },
                )?;

                self.deps.wallet.credit(
                    settled.merchant_id,
                    settled.amount,
                    &format!("Payment {}", settled.reference),
                )?;

                if customer.email_verified {
                    self.notify(Notification::email(
                        &customer.email,
                        "Payment Successful",
                        format!(
                            "Your payment of {} {} was successful. Transaction reference: {}",
                            settled.amount, settled.currency, settled.reference
                        ),
                    ))
                    .await;
                }
                Ok(settled)
            }
            declined => {
                let reason = declined
                    .and_then(|a| a.message)
                    .unwrap_or_else(|| "Gateway did not answer in time".to_string());
                tracing::warn!(%reason, "Payment not authorized");

                let failed = self.transition(
                    id,
                    TransactionStatus::Pending,
                    TransactionStatus::Failed,
                    |t| {
                        t.customer_id = Some(customer_id);
                        t.payment_method = Some(method);
                        t.completed_at = Some(completed_at);
                    },
                )?;

                if customer.email_verified {
                    self.notify(Notification::email(
                        &customer.email,
                        "Payment Failed",
                        format!(
                            "Your payment of {} {} could not be completed. Transaction reference: {}",
                            failed.amount, failed.currency, failed.reference
                        ),
                    ))
                    .await;
                }
                Ok(failed)
            }
        }
    }

    /// Refund part or all of a settled transaction. A single refund moves
    /// the transaction to REFUNDED. A gateway failure or timeout leaves it
    /// SUCCESS with the wallet untouched.
    #[tracing::instrument(skip(self))]
    pub async fn refund(&self, id: Uuid, amount: Decimal) -> Result<Transaction, PaymentError> {
        let _claim = self.claim(id)?;

        let transaction = self
            .repo
            .get(&id)
            .ok_or_else(|| PaymentError::not_found("Transaction"))?;
        if transaction.status != TransactionStatus::Success {
            return Err(PaymentError::InvalidState(format!(
                "Transaction is {}, only SUCCESS transactions can be refunded",
                transaction.status
            )));
        }
        if amount <= Decimal::ZERO {
            return Err(PaymentError::Validation("Refund amount must be positive".into()));
        }
        if amount > transaction.amount {
            return Err(PaymentError::AmountExceedsOriginal {
                requested: amount,
                original: transaction.amount,
            });
        }

        let outcome = tokio::time::timeout(
            self.settings.gateway_timeout,
            self.deps.gateway.refund(&transaction, amount),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                timeout_secs = self.settings.gateway_timeout.as_secs(),
                "Gateway refund timed out"
            );
            PaymentError::GatewayUnavailable("Gateway did not answer the refund in time".into())
        })?
        .map_err(|e| {
            tracing::error!(error = %e, "Gateway refund call failed");
            PaymentError::GatewayUnavailable(e.to_string())
        })?;
        if !outcome.approved {
            return Err(PaymentError::GatewayDeclined(
                outcome
                    .message
                    .unwrap_or_else(|| "Refund declined".to_string()),
            ));
        }

        let memo = format!("Refund {}", transaction.reference);
        self.deps.wallet.debit(transaction.merchant_id, amount, &memo)?;

        let refunded = match self.transition(
            id,
            TransactionStatus::Success,
            TransactionStatus::Refunded,
            |t| {
                t.refunded_amount = amount;
                t.refunded = true;
            },
        ) {
            Ok(t) => t,
            Err(e) => {
                self.deps
                    .wallet
                    .credit(transaction.merchant_id, amount, &format!("Reversal {}", memo))?;
                return Err(e);
            }
        };

        if let Some(customer_id) = refunded.customer_id {
            if let Some(customer) = self.deps.directory.find_user(customer_id).await {
                if customer.email_verified {
                    self.notify(Notification::email(
                        &customer.email,
                        "Refund Processed",
                        format!(
                            "A refund of {} {} has been issued for transaction {}",
                            amount, refunded.currency, refunded.reference
                        ),
                    ))
                    .await;
                }
            }
        }

        Ok(refunded)
    }

    async fn notify(&self, notification: Notification) {
        let delivery = self.deps.notifier.deliver(&notification).await;
        if !delivery.delivered {
            tracing::warn!(subject = %notification.subject, "Customer notification not delivered");
        }
    }

    /// Expire PENDING transactions created before `horizon`. Transactions
    /// with a settlement in flight are left for the settlement to finish.
    #[tracing::instrument(skip(self))]
    pub fn sweep_expired(&self, horizon: DateTime<Utc>) -> usize {
        let now = self.deps.clock.now();
        let expired = self
            .repo
            .update_where(
                |t| {
                    t.status == TransactionStatus::Pending
                        && t.created_at < horizon
                        && !self.in_flight.contains_key(&t.id)
                },
                |t| {
                    t.status = TransactionStatus::Expired;
                    t.completed_at = Some(now);
                },
            )
            .len();

        if expired > 0 {
            metrics::record_transactions(TransactionStatus::Expired.as_str(), expired);
            tracing::info!(expired, "Pending transactions expired");
        }
        metrics::record_sweep("transaction", expired);
        expired
    }

    pub fn find(&self, id: Uuid) -> Option<Transaction> {
        self.repo.get(&id)
    }

    pub fn find_by_reference(&self, reference: &str) -> Option<Transaction> {
        self.repo.find_by_reference(reference)
    }

    pub fn list_for_merchant(&self, merchant_id: Uuid) -> Vec<Transaction> {
        self.repo.filter(|t| t.merchant_id == merchant_id)
    }

    pub fn list_for_customer(&self, customer_id: Uuid) -> Vec<Transaction> {
        self.repo.filter(|t| t.customer_id == Some(customer_id))
    }

    pub fn list_by_status(&self, status: TransactionStatus) -> Vec<Transaction> {
        self.repo.filter(|t| t.status == status)
    }
}
