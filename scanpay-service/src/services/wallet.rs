//! Merchant wallet balances with a non-negative invariant.
//!
//! Each merchant's balance and entry history share one map slot, so a
//! balance check and the mutation it guards happen under a single shard
//! lock and concurrent credits and debits never lose an update.

use crate::clock::Clock;
use crate::error::PaymentError;
use crate::models::{Direction, LedgerEntry};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default)]
struct WalletAccount {
    balance: Decimal,
    entries: Vec<LedgerEntry>,
}

pub struct WalletLedger {
    accounts: DashMap<Uuid, WalletAccount>,
    clock: Arc<dyn Clock>,
}

impl WalletLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            accounts: DashMap::new(),
            clock,
        }
    }

    fn ensure_positive(amount: Decimal) -> Result<(), PaymentError> {
        if amount <= Decimal::ZERO {
            return Err(PaymentError::Validation(format!(
                "Ledger amount must be positive, got {}",
                amount
            )));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, memo))]
    pub fn credit(
        &self,
        merchant_id: Uuid,
        amount: Decimal,
        memo: &str,
    ) -> Result<LedgerEntry, PaymentError> {
        Self::ensure_positive(amount)?;
        let posted_at = self.clock.now();

        let mut account = self.accounts.entry(merchant_id).or_default();
        account.balance += amount;
        let entry = LedgerEntry {
            entry_id: Uuid::new_v4(),
            merchant_id,
            direction: Direction::Credit,
            amount,
            balance_after: account.balance,
            memo: memo.to_string(),
            posted_at,
        };
        account.entries.push(entry.clone());

        tracing::info!(balance = %entry.balance_after, "Wallet credited");
        Ok(entry)
    }

    /// Subtract `amount` only if the balance covers it. On failure nothing
    /// is mutated.
    #[tracing::instrument(skip(self, memo))]
    pub fn debit(
        &self,
        merchant_id: Uuid,
        amount: Decimal,
        memo: &str,
    ) -> Result<LedgerEntry, PaymentError> {
        Self::ensure_positive(amount)?;
        let posted_at = self.clock.now();

        let Some(mut account) = self.accounts.get_mut(&merchant_id) else {
            return Err(PaymentError::InsufficientBalance {
                available: Decimal::ZERO,
                requested: amount,
            });
        };

        if account.balance < amount {
            tracing::warn!(available = %account.balance, "Wallet debit rejected");
            return Err(PaymentError::InsufficientBalance {
                available: account.balance,
                requested: amount,
            });
        }

        account.balance -= amount;
        let entry = LedgerEntry {
            entry_id: Uuid::new_v4(),
            merchant_id,
            direction: Direction::Debit,
            amount,
            balance_after: account.balance,
            memo: memo.to_string(),
            posted_at,
        };
        account.entries.push(entry.clone());

        tracing::info!(balance = %entry.balance_after, "Wallet debited");
        Ok(entry)
    }

    pub fn balance(&self, merchant_id: Uuid) -> Decimal {
        self.accounts
            .get(&merchant_id)
            .map(|a| a.balance)
            .unwrap_or(Decimal::ZERO)
    }

    /// Entry history, oldest first.
    pub fn entries(&self, merchant_id: Uuid) -> Vec<LedgerEntry> {
        self.accounts
            .get(&merchant_id)
            .map(|a| a.entries.clone())
            .unwrap_or_default()
    }
}
