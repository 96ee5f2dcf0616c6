//! Identity collaborator consumed by the `not_guest` rule

use crate::types::PrincipalId;
use parking_lot::RwLock;

/// Source of the current request's identity
///
/// Implemented by the session layer of the host application.
pub trait IdentityProvider: Send + Sync {
    /// Identifier of the current principal, `None` when nobody is logged in
    fn current_principal_id(&self) -> Option<PrincipalId>;

    /// Whether the current principal is anonymous
    fn is_anonymous(&self) -> bool {
        self.current_principal_id().is_none()
    }
}

/// Identity that never authenticates anyone
///
/// Used when no identity collaborator is configured, so `not_guest` fails
/// closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousIdentity;

impl IdentityProvider for AnonymousIdentity {
    fn current_principal_id(&self) -> Option<PrincipalId> {
        None
    }
}

/// Identity whose current principal can be switched at runtime
#[derive(Debug, Default)]
pub struct SessionIdentity {
    current: RwLock<Option<PrincipalId>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `principal` logged in
    pub fn logged_in(principal: impl Into<PrincipalId>) -> Self {
        Self {
            current: RwLock::new(Some(principal.into())),
        }
    }

    pub fn login(&self, principal: impl Into<PrincipalId>) {
        *self.current.write() = Some(principal.into());
    }

    pub fn logout(&self) {
        *self.current.write() = None;
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_principal_id(&self) -> Option<PrincipalId> {
        self.current.read().clone()
    }
}
