use atelier_auth::{CommandAuthorization, Permission};

use crate::app::errors::ApiError;
use crate::context::Scope;

/// Small helper wrapper to associate required permissions with a command.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, permission: &'static str) -> Self {
        Self {
            inner,
            required: vec![Permission::new(permission)],
        }
    }
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Authorize `command` for the request, handing it back for dispatch.
pub fn authorized<C>(scope: &Scope, command: C, permission: &'static str) -> Result<C, ApiError> {
    let cmd = CmdAuth::new(command, permission);
    crate::authz::authorize_command(&scope.tenant, &scope.principal, &cmd)?;
    Ok(cmd.inner)
}

/// Permission check for reads and record operations that have no command.
pub fn require(scope: &Scope, permission: &'static str) -> Result<(), ApiError> {
    authorized(scope, (), permission)
}
