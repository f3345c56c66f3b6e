//! Resolved request identity.
use std::collections::HashSet;

use serde::Serialize;

pub type PrincipalId = i64;

static ANONYMOUS: Principal = Principal {
    id: None,
    name: String::new(),
    email: String::new(),
    activated: false,
};

/// Identity bound to a single request.
///
/// Built once per request by the authenticator and read-only afterwards.
/// The anonymous principal has no identifier, is never activated and holds
/// no permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    id: Option<PrincipalId>,
    pub name: String,
    pub email: String,
    pub activated: bool,
}

impl Principal {
    pub fn new(
        id: PrincipalId,
        name: impl Into<String>,
        email: impl Into<String>,
        activated: bool,
    ) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            email: email.into(),
            activated,
        }
    }

    /// The principal assigned when no credential is presented.
    pub fn anonymous() -> Self {
        ANONYMOUS.clone()
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_none()
    }

    pub fn id(&self) -> Option<PrincipalId> {
        self.id
    }
}

/// A validated registration ready to be stored.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Login material held for a principal.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub principal: Principal,
    pub password_hash: String,
}

/// Set of permission codes such as `movies:read`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(HashSet<String>);

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
