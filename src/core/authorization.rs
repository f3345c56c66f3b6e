//! Composable authorization gates.
//!
//! Gates are checked in a fixed order: authenticated, then activated, then
//! permitted. Each gate implies the ones before it and the first failure
//! short-circuits.
use std::{fmt, sync::Arc, time::Duration};

use eyre::{WrapErr, eyre};

use crate::{
    core::{error::ApiError, principal::Principal},
    ports::{principal_store::PrincipalStore, store::bounded},
};

/// A single authorization requirement attached to a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Authenticated,
    Activated,
    Permission(String),
}

impl Gate {
    pub fn permission(code: impl Into<String>) -> Self {
        Gate::Permission(code.into())
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::Authenticated => write!(f, "authenticated"),
            Gate::Activated => write!(f, "activated"),
            Gate::Permission(code) => write!(f, "permission({code})"),
        }
    }
}

pub fn require_authenticated(principal: &Principal) -> Result<(), ApiError> {
    if principal.is_anonymous() {
        return Err(ApiError::AuthenticationRequired);
    }
    Ok(())
}

pub fn require_activated(principal: &Principal) -> Result<(), ApiError> {
    require_authenticated(principal)?;
    if !principal.activated {
        return Err(ApiError::AccountNotActivated);
    }
    Ok(())
}

/// Evaluates gates. Permission sets are loaded fresh for every check.
#[derive(Clone)]
pub struct AuthorizationChain {
    store: Arc<dyn PrincipalStore>,
    query_timeout: Duration,
}

impl AuthorizationChain {
    pub fn new(store: Arc<dyn PrincipalStore>, query_timeout: Duration) -> Self {
        Self {
            store,
            query_timeout,
        }
    }

    pub async fn require_permission(
        &self,
        principal: &Principal,
        code: &str,
    ) -> Result<(), ApiError> {
        require_activated(principal)?;

        let id = principal
            .id()
            .ok_or_else(|| eyre!("activated principal without an id"))?;
        let permissions = bounded(self.query_timeout, self.store.permissions_for(id))
            .await
            .wrap_err_with(|| format!("loading permissions for principal {id}"))?;

        if !permissions.include(code) {
            return Err(ApiError::NotPermitted);
        }
        Ok(())
    }

    pub async fn check(&self, gate: &Gate, principal: &Principal) -> Result<(), ApiError> {
        match gate {
            Gate::Authenticated => require_authenticated(principal),
            Gate::Activated => require_activated(principal),
            Gate::Permission(code) => self.require_permission(principal, code).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{adapters::principal_store::InMemoryPrincipalStore, core::principal::Permissions};

    fn create_test_chain() -> AuthorizationChain {
        let store = InMemoryPrincipalStore::new();
        store.insert_principal(
            Principal::new(1, "Alice", "alice@example.com", true),
            ["movies:read"].into_iter().collect(),
        );
        store.insert_principal(
            Principal::new(2, "Bob", "bob@example.com", false),
            ["movies:read", "movies:write"].into_iter().collect(),
        );
        AuthorizationChain::new(Arc::new(store), Duration::from_secs(3))
    }

    #[test]
    fn test_anonymous_rejected_by_every_gate() {
        let anon = Principal::anonymous();
        assert!(matches!(
            require_authenticated(&anon),
            Err(ApiError::AuthenticationRequired)
        ));
        assert!(matches!(
            require_activated(&anon),
            Err(ApiError::AuthenticationRequired)
        ));
    }

    #[tokio::test]
    async fn test_inactive_principal_stops_at_activation() {
        let chain = create_test_chain();
        let bob = Principal::new(2, "Bob", "bob@example.com", false);
        assert!(chain.check(&Gate::Authenticated, &bob).await.is_ok());
        assert!(matches!(
            chain.check(&Gate::Activated, &bob).await,
            Err(ApiError::AccountNotActivated)
        ));
        // Holding the permission does not bypass the activation gate.
        assert!(matches!(
            chain.check(&Gate::permission("movies:write"), &bob).await,
            Err(ApiError::AccountNotActivated)
        ));
    }

    #[tokio::test]
    async fn test_permission_gate() {
        let chain = create_test_chain();
        let alice = Principal::new(1, "Alice", "alice@example.com", true);
        assert!(
            chain
                .check(&Gate::permission("movies:read"), &alice)
                .await
                .is_ok()
        );
        assert!(matches!(
            chain.check(&Gate::permission("movies:write"), &alice).await,
            Err(ApiError::NotPermitted)
        ));
    }

    #[tokio::test]
    async fn test_permissions_are_loaded_per_check() {
        let store = Arc::new(InMemoryPrincipalStore::new());
        let alice = Principal::new(1, "Alice", "alice@example.com", true);
        store.insert_principal(alice.clone(), Permissions::new());
        let chain = AuthorizationChain::new(store.clone(), Duration::from_secs(3));

        assert!(chain.require_permission(&alice, "movies:read").await.is_err());
        store.grant_permissions(1, &["movies:read"]).await.unwrap();
        assert!(chain.require_permission(&alice, "movies:read").await.is_ok());
    }
}
