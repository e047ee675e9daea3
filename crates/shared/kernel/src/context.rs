use crate::error::KeeperError;
use keeper_database::DbSession;
use keeper_domain::identity::{Principal, UserId};

/// Per-request scope: who is calling, and the database session that may carry
/// an ambient transaction.
#[derive(Debug, Default)]
pub struct RequestContext {
    principal: Option<Principal>,
    db: DbSession,
}

impl RequestContext {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn authenticated(principal: Principal) -> Self {
        Self { principal: Some(principal), db: DbSession::default() }
    }

    #[must_use]
    pub const fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Owner id of the caller, if one was resolved.
    #[must_use]
    pub fn owner(&self) -> Option<UserId> {
        self.principal.as_ref().map(|p| p.id)
    }

    /// Owner id of the caller.
    ///
    /// # Errors
    /// Returns [`KeeperError::Unauthorized`] for an anonymous context.
    pub fn require_owner(&self) -> Result<UserId, KeeperError> {
        self.owner().ok_or_else(|| KeeperError::unauthorized("authentication required"))
    }

    pub const fn db(&mut self) -> &mut DbSession {
        &mut self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn anonymous_has_no_owner() {
        let ctx = RequestContext::anonymous();
        assert!(ctx.owner().is_none());
        assert_eq!(ctx.require_owner().unwrap_err().kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn authenticated_exposes_owner() {
        let mut ctx = RequestContext::authenticated(Principal { id: 7, login: "alice".into() });
        assert_eq!(ctx.owner(), Some(7));
        assert_eq!(ctx.principal().map(|p| p.login.as_str()), Some("alice"));
        assert!(!ctx.db().in_transaction());
    }
}
