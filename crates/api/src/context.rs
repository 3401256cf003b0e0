use pipeops_auth::{Capabilities, RoleName, Session};
use pipeops_core::UserId;

/// Hydrated session for a request.
///
/// Inserted by the guard middleware; present for every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    session: Session,
}

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn user_id(&self) -> UserId {
        self.session.user_id
    }

    pub fn role(&self) -> &RoleName {
        &self.session.role
    }

    pub fn capabilities(&self) -> Capabilities {
        self.session.capabilities()
    }
}
