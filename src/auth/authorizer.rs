//! Ownership and role-hierarchy authorization.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::store::{RoleStore, StoreError, User};

#[derive(Debug, Error)]
pub enum AuthorizeError {
    /// The required role is not configured. A deployment defect, not a denial.
    #[error("role not found: {0}")]
    RoleNotFound(String),
    #[error(transparent)]
    Store(StoreError),
}

#[derive(Clone)]
pub struct RoleAuthorizer {
    roles: Arc<dyn RoleStore>,
}

impl RoleAuthorizer {
    #[must_use]
    pub fn new(roles: Arc<dyn RoleStore>) -> Self {
        Self { roles }
    }

    /// Owners are always allowed without a role lookup. Anyone else needs a
    /// role level at least that of `required_role`.
    ///
    /// # Errors
    /// `AuthorizeError::RoleNotFound` for an unknown `required_role`.
    pub async fn authorize(
        &self,
        principal: &User,
        resource_owner_id: i64,
        required_role: &str,
    ) -> Result<bool, AuthorizeError> {
        if principal.id == resource_owner_id {
            return Ok(true);
        }

        let required = match self.roles.get_by_name(required_role).await {
            Ok(role) => role,
            Err(StoreError::NotFound) => {
                error!(role = required_role, "required role is not configured");
                return Err(AuthorizeError::RoleNotFound(required_role.to_string()));
            }
            Err(err) => return Err(AuthorizeError::Store(err)),
        };

        let allowed = principal.role.level >= required.level;
        debug!(
            user_id = principal.id,
            level = principal.role.level,
            required = required.level,
            allowed,
            "role check"
        );
        Ok(allowed)
    }
}
