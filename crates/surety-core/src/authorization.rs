use crate::error::SuretyError;
use std::collections::HashMap;

/// Externally-controlled roles recognized by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Originates and prices coverage.
    Issuer,
    /// Triggers payouts against active policies.
    ClaimsAuthority,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Self::Issuer => "issuer",
            Self::ClaimsAuthority => "claims authority",
        }
    }
}

/// Principal identities for the two roles, fixed at construction.
#[derive(Debug, Clone)]
pub struct RolesConfig {
    pub issuer: String,
    pub claims_authority: String,
}

impl RolesConfig {
    pub fn new(issuer: impl Into<String>, claims_authority: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            claims_authority: claims_authority.into(),
        }
    }
}

/// Named-role capability map checked per operation.
///
/// The map is immutable after construction: there is no ambient admin state
/// and no rotation path. If rotation is ever needed it gets its own gated
/// operation rather than mutability here.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    principals: HashMap<Role, String>,
}

impl AuthorizationGate {
    pub fn new(config: RolesConfig) -> Self {
        let mut principals = HashMap::new();
        principals.insert(Role::Issuer, config.issuer);
        principals.insert(Role::ClaimsAuthority, config.claims_authority);
        Self { principals }
    }

    pub fn principal(&self, role: Role) -> &str {
        self.principals
            .get(&role)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn require(&self, role: Role, caller: &str) -> Result<(), SuretyError> {
        if self.principal(role) != caller {
            return Err(SuretyError::Unauthorized {
                role: role.name(),
                caller: caller.to_string(),
            });
        }
        Ok(())
    }

    pub fn require_issuer(&self, caller: &str) -> Result<(), SuretyError> {
        self.require(Role::Issuer, caller)
    }

    pub fn require_claims_authority(&self, caller: &str) -> Result<(), SuretyError> {
        self.require(Role::ClaimsAuthority, caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AuthorizationGate {
        AuthorizationGate::new(RolesConfig::new("issuer-1", "claims-1"))
    }

    #[test]
    fn accepts_configured_principals() {
        let gate = gate();
        assert!(gate.require_issuer("issuer-1").is_ok());
        assert!(gate.require_claims_authority("claims-1").is_ok());
    }

    #[test]
    fn rejects_unknown_caller() {
        let gate = gate();
        let err = gate.require_issuer("intruder").unwrap_err();
        assert!(matches!(err, SuretyError::Unauthorized { .. }));
        assert!(err.to_string().contains("intruder"));
    }

    #[test]
    fn roles_are_disjoint() {
        let gate = gate();
        assert!(gate.require_issuer("claims-1").is_err());
        assert!(gate.require_claims_authority("issuer-1").is_err());
    }
}
