//! Read-only account lookups.

use crate::models::{Merchant, User};
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_merchant(&self, id: Uuid) -> Option<Merchant>;
    async fn find_user(&self, id: Uuid) -> Option<User>;
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    merchants: DashMap<Uuid, Merchant>,
    users: DashMap<Uuid, User>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_merchant(&self, merchant: Merchant) {
        self.merchants.insert(merchant.id, merchant);
    }

    /// Drop an offboarded merchant. Returns the removed record.
    pub fn remove_merchant(&self, id: Uuid) -> Option<Merchant> {
        self.merchants.remove(&id).map(|(_, merchant)| merchant)
    }

    pub fn register_user(&self, user: User) {
        self.users.insert(user.id, user);
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn find_merchant(&self, id: Uuid) -> Option<Merchant> {
        self.merchants.get(&id).map(|m| m.value().clone())
    }

    async fn find_user(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|u| u.value().clone())
    }
}
