use async_trait::async_trait;

use crate::{
    core::{
        principal::{Credentials, NewPrincipal, Permissions, Principal, PrincipalId},
        token::{Token, TokenScope},
    },
    ports::store::StoreResult,
};

/// PrincipalStore defines the port for resolving credentials to identities
#[async_trait]
pub trait PrincipalStore: Send + Sync + 'static {
    /// Look up the principal owning `plaintext` for the given scope.
    ///
    /// # Returns
    /// `StoreError::RecordNotFound` when no token with a matching hash and
    /// scope exists, or when the matching token has expired
    async fn principal_for_token(&self, scope: TokenScope, plaintext: &str)
    -> StoreResult<Principal>;

    /// Load the current permission set of a principal
    async fn permissions_for(&self, principal_id: PrincipalId) -> StoreResult<Permissions>;

    /// Persist a token (only its hash is kept)
    async fn insert_token(&self, token: Token) -> StoreResult<()>;

    /// Store a new, not yet activated principal and assign its id.
    ///
    /// # Returns
    /// `StoreError::DuplicateEmail` when another principal uses the address
    async fn register(&self, principal: NewPrincipal) -> StoreResult<Principal>;

    /// Login material for the principal with this email address
    async fn credentials_for_email(&self, email: &str) -> StoreResult<Credentials>;

    /// Mark a principal as activated and return the updated record
    async fn activate(&self, principal_id: PrincipalId) -> StoreResult<Principal>;

    /// Add permission codes to a principal's set
    async fn grant_permissions(&self, principal_id: PrincipalId, codes: &[&str])
    -> StoreResult<()>;

    /// Remove every token of `scope` owned by a principal.
    ///
    /// # Returns
    /// The number of tokens removed
    async fn delete_tokens_for(&self, principal_id: PrincipalId, scope: TokenScope)
    -> StoreResult<usize>;
}
