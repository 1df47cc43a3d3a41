//! In-memory concurrent stores backing the managers.
//!
//! Every record lives in a sharded map. Mutation goes through `update`, which
//! runs the closure while holding the record's shard write lock, so a
//! read-check-write inside one closure is atomic with respect to any other
//! mutation of the same record.

use crate::models::{DynamicQrCode, OneTimePasscode, OtpPurpose, Transaction};
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct TransactionRepository {
    by_id: DashMap<Uuid, Transaction>,
    by_reference: DashMap<String, Uuid>,
}

impl TransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new transaction. Returns `false` without storing anything if
    /// the reference is already taken.
    pub fn insert(&self, transaction: Transaction) -> bool {
        match self.by_reference.entry(transaction.reference.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let id = transaction.id;
                self.by_id.insert(id, transaction);
                slot.insert(id);
                true
            }
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Transaction> {
        self.by_id.get(id).map(|t| t.value().clone())
    }

    pub fn find_by_reference(&self, reference: &str) -> Option<Transaction> {
        let id = *self.by_reference.get(reference)?;
        self.get(&id)
    }

    pub fn id_for_reference(&self, reference: &str) -> Option<Uuid> {
        self.by_reference.get(reference).map(|id| *id)
    }

    pub fn update<T>(&self, id: &Uuid, f: impl FnOnce(&mut Transaction) -> T) -> Option<T> {
        self.by_id.get_mut(id).map(|mut t| f(t.value_mut()))
    }

    /// Apply `f` to every record matching `pred`, one record lock at a time.
    /// Returns the updated records.
    pub fn update_where(
        &self,
        pred: impl Fn(&Transaction) -> bool,
        f: impl Fn(&mut Transaction),
    ) -> Vec<Transaction> {
        let mut touched = Vec::new();
        for mut entry in self.by_id.iter_mut() {
            if pred(entry.value()) {
                f(entry.value_mut());
                touched.push(entry.value().clone());
            }
        }
        touched
    }

    /// Matching records, newest first.
    pub fn filter(&self, pred: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        let mut found: Vec<_> = self
            .by_id
            .iter()
            .filter(|t| pred(t.value()))
            .map(|t| t.value().clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct QrCodeRepository {
    by_id: DashMap<Uuid, DynamicQrCode>,
    by_data: DashMap<String, Uuid>,
}

impl QrCodeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new code. Returns `false` if the payload is already taken.
    pub fn insert(&self, code: DynamicQrCode) -> bool {
        match self.by_data.entry(code.qr_data.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let id = code.id;
                self.by_id.insert(id, code);
                slot.insert(id);
                true
            }
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<DynamicQrCode> {
        self.by_id.get(id).map(|c| c.value().clone())
    }

    pub fn id_for_data(&self, qr_data: &str) -> Option<Uuid> {
        self.by_data.get(qr_data).map(|id| *id)
    }

    pub fn find_by_data(&self, qr_data: &str) -> Option<DynamicQrCode> {
        let id = self.id_for_data(qr_data)?;
        self.get(&id)
    }

    pub fn update<T>(&self, id: &Uuid, f: impl FnOnce(&mut DynamicQrCode) -> T) -> Option<T> {
        self.by_id.get_mut(id).map(|mut c| f(c.value_mut()))
    }

    pub fn update_where(
        &self,
        pred: impl Fn(&DynamicQrCode) -> bool,
        f: impl Fn(&mut DynamicQrCode),
    ) -> Vec<DynamicQrCode> {
        let mut touched = Vec::new();
        for mut entry in self.by_id.iter_mut() {
            if pred(entry.value()) {
                f(entry.value_mut());
                touched.push(entry.value().clone());
            }
        }
        touched
    }

    pub fn filter(&self, pred: impl Fn(&DynamicQrCode) -> bool) -> Vec<DynamicQrCode> {
        let mut found: Vec<_> = self
            .by_id
            .iter()
            .filter(|c| pred(c.value()))
            .map(|c| c.value().clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }
}

type OtpKey = (Uuid, OtpPurpose);

/// Codes grouped per `(subject, purpose)`, oldest first within a group.
#[derive(Debug, Default)]
pub struct OtpRepository {
    by_pair: DashMap<OtpKey, Vec<OneTimePasscode>>,
    index: DashMap<Uuid, OtpKey>,
}

impl OtpRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to every code of one pair.
    ///
    /// Codes pushed by `f` are indexed by id before the pair lock is released.
    pub fn with_pair<T>(
        &self,
        subject_id: Uuid,
        purpose: OtpPurpose,
        f: impl FnOnce(&mut Vec<OneTimePasscode>) -> T,
    ) -> T {
        let key = (subject_id, purpose);
        let mut codes = self.by_pair.entry(key).or_default();
        let before = codes.len();
        let out = f(codes.value_mut());
        for code in codes.iter().skip(before) {
            self.index.insert(code.id, key);
        }
        out
    }

    /// Run `f` against one code by id, under its pair lock.
    pub fn with_code<T>(&self, id: &Uuid, f: impl FnOnce(&mut OneTimePasscode) -> T) -> Option<T> {
        let key = *self.index.get(id)?;
        let mut codes = self.by_pair.get_mut(&key)?;
        codes.iter_mut().find(|c| c.id == *id).map(f)
    }

    pub fn get(&self, id: &Uuid) -> Option<OneTimePasscode> {
        self.with_code(id, |c| c.clone())
    }

    /// Delete unused codes that expired before `now`. Used codes stay for
    /// audit. Returns the number of deleted codes.
    pub fn purge_expired_unused(&self, now: DateTime<Utc>) -> usize {
        let mut purged = Vec::new();
        self.by_pair.retain(|_, codes| {
            codes.retain(|c| {
                let stale = !c.used && c.expires_at < now;
                if stale {
                    purged.push(c.id);
                }
                !stale
            });
            !codes.is_empty()
        });
        for id in &purged {
            self.index.remove(id);
        }
        purged.len()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
