//! Capability checks and the system principal.
//!
//! Authentication lives elsewhere. The repository only asks a `CapabilityCheck`
//! whether a user may perform a guarded mutation.

use crate::error::{RepositoryError, Result};
use crate::resource::{ResourceUri, User};

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Lock,
    Unlock,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Lock => write!(f, "lock"),
            Capability::Unlock => write!(f, "unlock"),
        }
    }
}

pub trait CapabilityCheck: Send + Sync {
    fn permits(&self, user: &User, capability: Capability, uri: &ResourceUri) -> bool;
}

/// Permits everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl CapabilityCheck for AllowAll {
    fn permits(&self, _user: &User, _capability: Capability, _uri: &ResourceUri) -> bool {
        true
    }
}

/// The elevated identity the repository acts as for its own bookkeeping.
///
/// Constructed once at startup and passed to whatever needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrincipal {
    user: User,
}

impl SystemPrincipal {
    pub fn new(site: &str) -> Self {
        Self {
            user: User::with_name(&format!("{}-admin", site), "Site Administrator"),
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn is(&self, user: &User) -> bool {
        self.user.login == user.login
    }
}

/// Guards mutations behind a `CapabilityCheck`, with the system principal exempt.
pub struct Guard {
    check: Box<dyn CapabilityCheck>,
    system: SystemPrincipal,
}

impl Guard {
    pub fn new(check: Box<dyn CapabilityCheck>, system: SystemPrincipal) -> Self {
        Self { check, system }
    }

    pub fn system(&self) -> &SystemPrincipal {
        &self.system
    }

    pub fn require(&self, user: &User, capability: Capability, uri: &ResourceUri) -> Result<()> {
        if self.system.is(user) || self.check.permits(user, capability, uri) {
            return Ok(());
        }
        tracing::debug!("{} may not {} {}", user, capability, uri);
        Err(RepositoryError::PermissionDenied(format!(
            "{} may not {} {}",
            user, capability, uri
        )))
    }
}
