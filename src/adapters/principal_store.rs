//! In-memory principal and token store backed by `dashmap`.
use std::{
    collections::HashSet,
    sync::atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    config::models::SeedConfig,
    core::{
        principal::{Credentials, NewPrincipal, Permissions, Principal, PrincipalId},
        token::{Token, TokenHash, TokenScope, hash_plaintext},
    },
    ports::{
        principal_store::PrincipalStore,
        store::{StoreError, StoreResult},
    },
};

#[derive(Default)]
pub struct InMemoryPrincipalStore {
    principals: DashMap<PrincipalId, Principal>,
    /// Lowercased email to id; addresses are unique regardless of case.
    emails: DashMap<String, PrincipalId>,
    password_hashes: DashMap<PrincipalId, String>,
    permissions: DashMap<PrincipalId, HashSet<String>>,
    tokens: DashMap<TokenHash, Token>,
    last_id: AtomicI64,
}

fn email_key(email: &str) -> String {
    email.to_lowercase()
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding the configured principals and their tokens.
    pub fn from_seed(seed: &SeedConfig) -> Self {
        let store = Self::new();
        for entry in &seed.principals {
            let principal = Principal::new(entry.id, &entry.name, &entry.email, entry.activated);
            store.insert_principal(principal, entry.permissions.iter().cloned().collect());
            if let Some(hash) = &entry.password_hash {
                store.password_hashes.insert(entry.id, hash.clone());
            }

            for token in &entry.tokens {
                let Some(ttl) = TimeDelta::try_seconds(token.ttl_secs) else {
                    tracing::warn!(
                        principal_id = entry.id,
                        ttl_secs = token.ttl_secs,
                        "Skipping seed token with out of range ttl"
                    );
                    continue;
                };
                let token = Token::from_plaintext(
                    &token.plaintext,
                    entry.id,
                    ttl,
                    TokenScope::Authentication,
                );
                store.tokens.insert(token.hash, token);
            }
        }
        tracing::info!(
            principals = store.principals.len(),
            tokens = store.tokens.len(),
            "Seeded principal store"
        );
        store
    }

    /// Store a principal under its existing id. Later registrations are
    /// numbered after the highest id seen.
    pub fn insert_principal(&self, principal: Principal, permissions: Permissions) {
        let Some(id) = principal.id() else {
            tracing::warn!("Refusing to store the anonymous principal");
            return;
        };
        let codes = permissions.codes().map(str::to_string).collect();
        self.last_id.fetch_max(id, Ordering::Relaxed);
        self.emails.insert(email_key(&principal.email), id);
        self.principals.insert(id, principal);
        self.permissions.insert(id, codes);
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn principal_for_token(
        &self,
        scope: TokenScope,
        plaintext: &str,
    ) -> StoreResult<Principal> {
        let hash = hash_plaintext(plaintext);
        let principal_id = {
            let token = self.tokens.get(&hash).ok_or(StoreError::RecordNotFound)?;
            if token.scope != scope || token.is_expired_at(Utc::now()) {
                return Err(StoreError::RecordNotFound);
            }
            token.principal_id
        };

        self.principals
            .get(&principal_id)
            .map(|p| p.clone())
            .ok_or(StoreError::RecordNotFound)
    }

    async fn permissions_for(&self, principal_id: PrincipalId) -> StoreResult<Permissions> {
        Ok(self
            .permissions
            .get(&principal_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_token(&self, token: Token) -> StoreResult<()> {
        if !self.principals.contains_key(&token.principal_id) {
            return Err(StoreError::Backend(format!(
                "token references unknown principal {}",
                token.principal_id
            )));
        }
        self.tokens.insert(token.hash, token);
        Ok(())
    }

    async fn register(&self, principal: NewPrincipal) -> StoreResult<Principal> {
        match self.emails.entry(email_key(&principal.email)) {
            Entry::Occupied(_) => Err(StoreError::DuplicateEmail),
            Entry::Vacant(slot) => {
                let id = self.last_id.fetch_add(1, Ordering::Relaxed) + 1;
                let stored = Principal::new(id, principal.name, principal.email, false);
                self.principals.insert(id, stored.clone());
                self.password_hashes.insert(id, principal.password_hash);
                self.permissions.insert(id, HashSet::new());
                slot.insert(id);
                Ok(stored)
            }
        }
    }

    async fn credentials_for_email(&self, email: &str) -> StoreResult<Credentials> {
        let id = *self
            .emails
            .get(&email_key(email))
            .ok_or(StoreError::RecordNotFound)?;
        let principal = self
            .principals
            .get(&id)
            .map(|p| p.clone())
            .ok_or(StoreError::RecordNotFound)?;
        // Principals seeded without a password cannot log in.
        let password_hash = self
            .password_hashes
            .get(&id)
            .map(|hash| hash.clone())
            .ok_or(StoreError::RecordNotFound)?;

        Ok(Credentials {
            principal,
            password_hash,
        })
    }

    async fn activate(&self, principal_id: PrincipalId) -> StoreResult<Principal> {
        let mut principal = self
            .principals
            .get_mut(&principal_id)
            .ok_or(StoreError::RecordNotFound)?;
        principal.activated = true;
        Ok(principal.clone())
    }

    async fn grant_permissions(
        &self,
        principal_id: PrincipalId,
        codes: &[&str],
    ) -> StoreResult<()> {
        if !self.principals.contains_key(&principal_id) {
            return Err(StoreError::RecordNotFound);
        }
        self.permissions
            .entry(principal_id)
            .or_default()
            .extend(codes.iter().map(|code| code.to_string()));
        Ok(())
    }

    async fn delete_tokens_for(
        &self,
        principal_id: PrincipalId,
        scope: TokenScope,
    ) -> StoreResult<usize> {
        let before = self.tokens.len();
        self.tokens
            .retain(|_, token| !(token.principal_id == principal_id && token.scope == scope));
        Ok(before - self.tokens.len())
    }
}
